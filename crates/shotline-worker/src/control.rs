//! Run-state flags shared between an orchestrator and its run loop.
//!
//! Callers only express intents (pause, resume, cancel); the loop observes
//! them through a watch channel and suspends on it while paused.

use shotline_models::{BatchId, RunStatus};
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub(crate) struct RunState {
    /// Intent: the run should keep going
    pub running: bool,
    pub paused: bool,
    /// The run loop has not returned yet
    pub active: bool,
    pub batch_id: Option<BatchId>,
}

pub(crate) struct RunControl {
    state: watch::Sender<RunState>,
}

impl RunControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::default());
        Self { state }
    }

    /// Mark a run as started, unless one is still active.
    pub fn claim(&self, batch_id: BatchId) -> Option<ActiveRun<'_>> {
        let claimed = self.state.send_if_modified(|s| {
            if s.active {
                return false;
            }
            *s = RunState {
                running: true,
                paused: false,
                active: true,
                batch_id: Some(batch_id),
            };
            true
        });
        claimed.then(|| ActiveRun(self))
    }

    pub fn pause(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.running && !s.paused {
                s.paused = true;
                true
            } else {
                false
            }
        })
    }

    pub fn resume(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.running && s.paused {
                s.paused = false;
                true
            } else {
                false
            }
        })
    }

    /// Clear the run intent. Returns the state before cancelling, if a run
    /// was going.
    pub fn cancel(&self) -> Option<RunState> {
        let mut previous = None;
        self.state.send_if_modified(|s| {
            if !s.running {
                return false;
            }
            previous = Some(s.clone());
            s.running = false;
            s.paused = false;
            true
        });
        previous
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    pub fn status(&self) -> RunStatus {
        let s = self.state.borrow();
        RunStatus {
            is_running: s.running,
            is_paused: s.paused,
            batch_id: s.batch_id.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }
}

/// Clears the run flags when the run loop exits, however it exits.
pub(crate) struct ActiveRun<'a>(&'a RunControl);

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.0.state.send_modify(|s| {
            s.running = false;
            s.paused = false;
            s.active = false;
        });
    }
}

/// Suspend while the run is paused. Returns `false` once it has been cancelled.
pub(crate) async fn wait_until_runnable(rx: &mut watch::Receiver<RunState>) -> bool {
    match rx.wait_for(|s| !s.running || !s.paused).await {
        Ok(state) => state.running,
        Err(_) => false,
    }
}

/// Like [`wait_until_runnable`], but for a run nested inside another one:
/// returns once both are runnable, or `false` as soon as either is cancelled.
pub(crate) async fn wait_until_both_runnable(
    own: &mut watch::Receiver<RunState>,
    outer: &mut watch::Receiver<RunState>,
) -> bool {
    loop {
        if !wait_until_runnable(own).await || !wait_until_runnable(outer).await {
            return false;
        }
        // The inner run may have been paused while waiting on the outer one.
        let own_state = own.borrow();
        if own_state.running && !own_state.paused {
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let control = RunControl::new();

        let run = control.claim(BatchId::new());
        assert!(run.is_some());
        assert!(control.claim(BatchId::new()).is_none());

        // Cancelling clears the intent but the loop is still active.
        assert!(control.cancel().is_some());
        assert!(control.claim(BatchId::new()).is_none());

        drop(run);
        assert!(control.claim(BatchId::new()).is_some());
    }

    #[test]
    fn test_rejected_claim_leaves_active_run_untouched() {
        let control = RunControl::new();
        let first = BatchId::new();
        let _run = control.claim(first.clone());
        assert!(control.pause());

        assert!(control.claim(BatchId::new()).is_none());

        let status = control.status();
        assert!(status.is_running);
        assert!(status.is_paused);
        assert_eq!(status.batch_id, Some(first));
        assert!(control.claim(BatchId::new()).is_none());
    }

    #[test]
    fn test_pause_resume_only_while_running() {
        let control = RunControl::new();
        assert!(!control.pause());

        let _run = control.claim(BatchId::new());
        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.status().is_paused);
        assert!(control.resume());
        assert!(!control.resume());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_runnable_wakes_on_resume_and_cancel() {
        let control = RunControl::new();
        let _run = control.claim(BatchId::new());
        let mut rx = control.subscribe();

        assert!(wait_until_runnable(&mut rx).await);

        control.pause();
        let waiting = tokio::time::timeout(Duration::from_secs(1), wait_until_runnable(&mut rx)).await;
        assert!(waiting.is_err());

        control.resume();
        assert!(wait_until_runnable(&mut rx).await);

        control.pause();
        control.cancel();
        assert!(!wait_until_runnable(&mut rx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_run_waits_on_outer_pause_and_cancel() {
        let outer = RunControl::new();
        let inner = RunControl::new();
        let _outer_run = outer.claim(BatchId::new());
        let _inner_run = inner.claim(BatchId::new());
        let mut own = inner.subscribe();
        let mut parent = outer.subscribe();

        assert!(wait_until_both_runnable(&mut own, &mut parent).await);

        outer.pause();
        let waiting = tokio::time::timeout(
            Duration::from_secs(1),
            wait_until_both_runnable(&mut own, &mut parent),
        )
        .await;
        assert!(waiting.is_err());

        outer.cancel();
        assert!(!wait_until_both_runnable(&mut own, &mut parent).await);
        assert!(inner.is_running());
    }
}
