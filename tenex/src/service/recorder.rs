//! Flight-recorder gate: a process-wide, runtime-togglable recording flag.
//!
//! The flag is a single atomic boolean with a watch channel for state-change
//! notifications. It gates whether the service persists request/response
//! pairs through the call logger; the recorder is a pure observer and never
//! affects the request path. The flag is process-scoped and not persisted
//! across restarts.

use once_cell::sync::Lazy;
use tokio::sync::watch;

/// Runtime-togglable recording flag.
pub struct RecordingState {
    tx: watch::Sender<bool>,
}

static GLOBAL: Lazy<RecordingState> = Lazy::new(|| RecordingState::new(false));

impl RecordingState {
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// The process-wide flag.
    pub fn global() -> &'static RecordingState {
        &GLOBAL
    }

    pub fn is_enabled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flips the flag; subscribers observe a state-changed notification.
    /// Setting the current value again is a no-op.
    pub fn set_enabled(&self, enabled: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == enabled {
                false
            } else {
                *current = enabled;
                true
            }
        });
        if changed {
            tracing::info!(enabled, "recording state-changed");
        }
    }

    /// Subscribes to state-change notifications.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toggle_notifies_subscribers() {
        let state = RecordingState::new(false);
        let mut rx = state.subscribe();
        assert!(!state.is_enabled());

        state.set_enabled(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(state.is_enabled());
    }

    #[tokio::test]
    async fn redundant_set_does_not_notify() {
        let state = RecordingState::new(true);
        let mut rx = state.subscribe();
        rx.borrow_and_update();

        state.set_enabled(true);
        assert!(!rx.has_changed().unwrap());

        state.set_enabled(false);
        assert!(rx.has_changed().unwrap());
    }
}
