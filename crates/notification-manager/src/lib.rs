//! Notification grouping core for messaging clients.
//!
//! [`NotificationManager`] receives notification events from the sync layer,
//! holds them briefly per group, keeps the most recent groups "active" and
//! hands batched [`NotificationUpdate`]s to an [`UpdateSink`].

pub mod config;
pub mod error;
pub mod group;
pub mod notification_manager;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod sink;
pub mod storage;
pub mod timeout;
pub mod types;
pub mod update_queue;

pub use config::NotificationLimits;
pub use error::{Error, Result};
pub use group::{GroupIndex, NotificationGroup, NotificationGroupKey};
pub use notification_manager::{NotificationManager, NotificationManagerOptions};
#[cfg(feature = "runtime")]
pub use runtime::{NotificationHandle, NotificationRuntime};
pub use sink::{
    ignore_promise, promise_channel, NotificationEnvironment, Promise, SystemEnvironment,
    UpdateSink,
};
pub use storage::{InMemoryStorage, StorageAdapter};
pub use timeout::MultiTimeout;
pub use types::*;
pub use update_queue::PendingUpdates;
