//! Storyboard shots and the characters/locations they reference.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One storyboard shot: the unit of work turned into one generated asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Shot {
    /// Stable shot identifier
    pub id: String,

    /// Free-text description of what happens in the shot
    #[serde(default)]
    pub description: String,

    /// Explicit prompt for image generation (preferred over `description`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_prompt: Option<String>,

    /// Location name as written in the script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Character names, separated by `,`, `，` or `、`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,

    /// Shot size / camera angle annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,

    /// Camera movement annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<String>,
}

impl Shot {
    /// Create a shot with only an id and a description.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            generation_prompt: None,
            location: None,
            characters: None,
            camera: None,
            movement: None,
        }
    }

    /// Character names referenced by this shot, trimmed, empties dropped.
    pub fn character_names(&self) -> Vec<&str> {
        self.characters
            .as_deref()
            .map(|raw| {
                raw.split([',', '，', '、'])
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A recurring character with a visual description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Reference image URLs; only the first is sent with a task
    #[serde(default)]
    pub reference_images: Vec<String>,
}

/// A recurring location with a visual description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reference_images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_names_split_on_all_separators() {
        let mut shot = Shot::new("s1", "a duel");
        shot.characters = Some("Alice, Bob，Carol、 Dave ,".to_string());
        assert_eq!(shot.character_names(), vec!["Alice", "Bob", "Carol", "Dave"]);
    }

    #[test]
    fn test_character_names_empty() {
        let shot = Shot::new("s1", "empty street");
        assert!(shot.character_names().is_empty());
    }

    #[test]
    fn test_shot_deserializes_camel_case() {
        let shot: Shot = serde_json::from_str(
            r#"{"id":"s1","description":"d","generationPrompt":"p","location":"Bar"}"#,
        )
        .unwrap();
        assert_eq!(shot.generation_prompt.as_deref(), Some("p"));
        assert_eq!(shot.location.as_deref(), Some("Bar"));
        assert!(shot.camera.is_none());
    }
}
