//! Document storage for Shotline.
//!
//! This crate provides:
//! - The `ObjectStore` contract (collection-scoped get/put/delete)
//! - An in-memory store and a JSON file store
//! - Typed repositories for persisted documents such as run snapshots

pub mod error;
pub mod file;
pub mod repository;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use file::JsonFileStore;
pub use repository::{Document, Repository};
pub use store::{validate_key, MemoryStore, ObjectStore};
