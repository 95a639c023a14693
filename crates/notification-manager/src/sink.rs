use crate::{DialogId, Error, NotificationPayload, OnlineStatus, Result, UpdateBatch};
use std::time::{SystemTime, UNIX_EPOCH};

/// Receiver of flushed update batches (the presentation layer).
///
/// Called from inside the manager; implementations must not block or call
/// back into it.
pub trait UpdateSink<P: NotificationPayload>: Send + Sync {
    fn send_updates(&self, batch: UpdateBatch<P>) -> Result<()>;
}

impl<P: NotificationPayload> UpdateSink<P> for crossbeam_channel::Sender<UpdateBatch<P>> {
    fn send_updates(&self, batch: UpdateBatch<P>) -> Result<()> {
        self.send(batch)
            .map_err(|_| Error::Sink("update receiver dropped".to_string()))
    }
}

/// Host-provided clock and presence information.
pub trait NotificationEnvironment: Send + Sync {
    /// Milliseconds on a monotonic-enough clock; also the base for server time.
    fn now_ms(&self) -> u64;

    fn online_status(&self) -> OnlineStatus {
        OnlineStatus::default()
    }

    /// Whether notifications for the dialog can also arrive by push from the
    /// cloud. Secret chats cannot, so they are never delayed.
    fn has_cloud_delivery(&self, _dialog_id: DialogId) -> bool {
        true
    }
}

/// Wall-clock environment reporting no remote presence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl NotificationEnvironment for SystemEnvironment {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Single-shot completion handle for removal operations.
pub type Promise = Box<dyn FnOnce(Result<()>) + Send>;

/// A promise that discards its outcome.
pub fn ignore_promise() -> Promise {
    Box::new(|_| {})
}

/// A promise paired with a receiver observing its outcome.
pub fn promise_channel() -> (Promise, crossbeam_channel::Receiver<Result<()>>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let promise: Promise = Box::new(move |result| {
        let _ = tx.send(result);
    });
    (promise, rx)
}

/// Deterministic environment and sink helpers for tests and replays.
pub mod test_utils {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Environment with a hand-advanced clock.
    #[derive(Debug, Default)]
    pub struct ManualEnvironment {
        now_ms: AtomicU64,
        status: Mutex<OnlineStatus>,
        local_only_dialogs: Mutex<HashSet<DialogId>>,
    }

    impl ManualEnvironment {
        pub fn new(now_ms: u64) -> Self {
            Self {
                now_ms: AtomicU64::new(now_ms),
                ..Default::default()
            }
        }

        pub fn advance(&self, ms: u64) {
            self.now_ms.fetch_add(ms, Ordering::SeqCst);
        }

        pub fn set_now_ms(&self, now_ms: u64) {
            self.now_ms.store(now_ms, Ordering::SeqCst);
        }

        pub fn set_online_status(&self, status: OnlineStatus) {
            if let Ok(mut current) = self.status.lock() {
                *current = status;
            }
        }

        pub fn set_local_only(&self, dialog_id: DialogId) {
            if let Ok(mut dialogs) = self.local_only_dialogs.lock() {
                dialogs.insert(dialog_id);
            }
        }
    }

    impl NotificationEnvironment for ManualEnvironment {
        fn now_ms(&self) -> u64 {
            self.now_ms.load(Ordering::SeqCst)
        }

        fn online_status(&self) -> OnlineStatus {
            self.status.lock().map(|s| *s).unwrap_or_default()
        }

        fn has_cloud_delivery(&self, dialog_id: DialogId) -> bool {
            self.local_only_dialogs
                .lock()
                .map(|dialogs| !dialogs.contains(&dialog_id))
                .unwrap_or(true)
        }
    }

    /// Drains every batch currently waiting in the channel.
    pub fn drain_batches<P>(
        rx: &crossbeam_channel::Receiver<UpdateBatch<P>>,
    ) -> Vec<UpdateBatch<P>> {
        rx.try_iter().collect()
    }
}
