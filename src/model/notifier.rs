//! Change notifier - rate-bounded "a new snapshot exists" signal.
//!
//! A background thread samples the published revision every
//! `notify_interval` and emits one [`ModelChanged`] when it advanced, however
//! many snapshots were published in between.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;

/// Event name used for `on_changed` callbacks.
pub const CHANGED_EVENT: &str = "changed";

/// Emitted when the published snapshot advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelChanged {
    /// Revision of the snapshot observed when the event was emitted.
    pub revision: u64,
}

pub(crate) struct ChangeNotifier {
    last_seen: AtomicU64,
    subscribers: Mutex<Vec<Sender<ModelChanged>>>,
    #[cfg(feature = "emitter")]
    emitter: Mutex<EventEmitter>,
}

impl ChangeNotifier {
    pub fn new(initial_revision: u64) -> Self {
        Self {
            last_seen: AtomicU64::new(initial_revision),
            subscribers: Mutex::new(Vec::new()),
            #[cfg(feature = "emitter")]
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<ModelChanged> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    #[cfg(feature = "emitter")]
    pub fn on_changed<F>(&self, listener: F)
    where
        F: Fn(ModelChanged) + Send + Sync + 'static,
    {
        self.emitter.lock().on(CHANGED_EVENT, listener);
    }

    /// Compare `revision` to the last one notified; emit once if it moved.
    pub fn tick(&self, revision: u64) -> bool {
        if self.last_seen.swap(revision, Ordering::SeqCst) == revision {
            return false;
        }

        let event = ModelChanged { revision };
        debug!(revision, "model changed");

        // Dropped receivers unsubscribe.
        self.subscribers.lock().retain(|tx| tx.send(event).is_ok());

        #[cfg(feature = "emitter")]
        self.emitter.lock().emit(CHANGED_EVENT, event);

        true
    }
}

/// Handle of the thread driving a [`ChangeNotifier`].
pub(crate) struct NotifierThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl NotifierThread {
    pub fn spawn<F>(
        name: String,
        notifier: Arc<ChangeNotifier>,
        interval: Duration,
        revision: F,
    ) -> std::io::Result<Self>
    where
        F: Fn() -> u64 + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new().name(name).spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    notifier.tick(revision());
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NotifierThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_emits_once_per_advance() {
        let notifier = ChangeNotifier::new(0);
        let rx = notifier.subscribe();

        assert!(!notifier.tick(0));
        assert!(notifier.tick(3));
        assert!(!notifier.tick(3));
        assert!(notifier.tick(4));

        let events: Vec<ModelChanged> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![ModelChanged { revision: 3 }, ModelChanged { revision: 4 }]
        );
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let notifier = ChangeNotifier::new(0);
        let kept = notifier.subscribe();
        drop(notifier.subscribe());

        notifier.tick(1);
        assert_eq!(notifier.subscribers.lock().len(), 1);
        assert_eq!(kept.try_recv().unwrap().revision, 1);
    }

    #[test]
    fn thread_coalesces_and_stops() {
        let notifier = Arc::new(ChangeNotifier::new(0));
        let rx = notifier.subscribe();
        let revision = Arc::new(AtomicU64::new(0));

        let source = Arc::clone(&revision);
        let notify_thread = NotifierThread::spawn(
            "notify-test".into(),
            Arc::clone(&notifier),
            Duration::from_millis(20),
            move || source.load(Ordering::SeqCst),
        )
        .unwrap();

        revision.store(3, Ordering::SeqCst);

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.revision, 3);

        // Later ticks see the same revision and stay quiet.
        thread::sleep(Duration::from_millis(100));
        notify_thread.stop();
        assert!(rx.try_recv().is_err());
    }

    #[cfg(feature = "emitter")]
    #[test]
    fn callbacks_receive_events() {
        use std::sync::atomic::AtomicBool;

        let notifier = ChangeNotifier::new(0);
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);

        notifier.on_changed(move |event| {
            assert_eq!(event.revision, 7);
            flag.store(true, Ordering::SeqCst);
        });
        notifier.tick(7);

        // EventEmitter dispatches on its own threads, give it time
        thread::sleep(Duration::from_millis(100));
        assert!(called.load(Ordering::SeqCst));
    }
}
