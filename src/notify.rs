//! State notifications
//!
//! The recorder reports saved files, disconnects and session failures to a
//! single replaceable [`StateListener`] and to any number of broadcast
//! subscribers.

use crate::storage::MediaUri;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Hooks the surrounding application can implement. All default to no-ops.
///
/// Implementations must not panic; they run on whichever task or callback
/// worker produced the event.
pub trait StateListener: Send + Sync {
    fn on_saved(&self, _location: &MediaUri) {}

    fn on_disconnected(&self) {}

    fn on_create_session_failed(&self) {}
}

/// Events emitted by the recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Preview is running
    PreviewStarted,
    /// A take started
    RecordingStarted { orientation: i32 },
    /// A take was published
    Saved(MediaUri),
    /// The camera went away
    Disconnected,
    /// The capture session could not be configured
    SessionConfigureFailed,
    /// An operation failed
    Error(String),
}

/// Fans notifications out to the listener and the event channel
pub struct Notifier {
    listener: RwLock<Option<Arc<dyn StateListener>>>,
    event_tx: broadcast::Sender<RecorderEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            listener: RwLock::new(None),
            event_tx,
        }
    }

    /// Replace the listener. `None` removes it.
    pub fn set_listener(&self, listener: Option<Arc<dyn StateListener>>) {
        *self.listener.write() = listener;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event without touching the listener
    pub fn emit(&self, event: RecorderEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn saved(&self, location: &MediaUri) {
        if let Some(listener) = self.listener() {
            listener.on_saved(location);
        }
        self.emit(RecorderEvent::Saved(location.clone()));
    }

    pub fn disconnected(&self) {
        if let Some(listener) = self.listener() {
            listener.on_disconnected();
        }
        self.emit(RecorderEvent::Disconnected);
    }

    pub fn create_session_failed(&self) {
        if let Some(listener) = self.listener() {
            listener.on_create_session_failed();
        }
        self.emit(RecorderEvent::SessionConfigureFailed);
    }

    // Clone out of the lock so a listener swap never waits on a callback.
    fn listener(&self) -> Option<Arc<dyn StateListener>> {
        self.listener.read().clone()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener {
        saved: AtomicUsize,
    }

    impl StateListener for CountingListener {
        fn on_saved(&self, _location: &MediaUri) {
            self.saved.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SilentListener;
    impl StateListener for SilentListener {}

    #[test]
    fn test_default_hooks_are_noops() {
        let notifier = Notifier::new();
        notifier.set_listener(Some(Arc::new(SilentListener)));
        notifier.disconnected();
        notifier.create_session_failed();
        notifier.saved(&MediaUri::new("Movies/a.mp4"));
    }

    #[test]
    fn test_replacing_listener() {
        let notifier = Notifier::new();
        let first = Arc::new(CountingListener::default());
        let second = Arc::new(CountingListener::default());
        let uri = MediaUri::new("Movies/a.mp4");

        notifier.set_listener(Some(first.clone()));
        notifier.saved(&uri);
        notifier.set_listener(Some(second.clone()));
        notifier.saved(&uri);
        notifier.set_listener(None);
        notifier.saved(&uri);

        assert_eq!(first.saved.load(Ordering::SeqCst), 1);
        assert_eq!(second.saved.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.disconnected();
        notifier.emit(RecorderEvent::PreviewStarted);

        assert_eq!(rx.recv().await.unwrap(), RecorderEvent::Disconnected);
        assert_eq!(rx.recv().await.unwrap(), RecorderEvent::PreviewStarted);
    }
}
