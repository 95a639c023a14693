use thiserror::Error;

use crate::{NotificationGroupId, NotificationId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid notification identifier")]
    InvalidNotificationId,

    #[error("Invalid notification group identifier")]
    InvalidGroupId,

    #[error("Unknown notification group: {0}")]
    UnknownGroup(NotificationGroupId),

    #[error("Notification {notification_id} not found in group {group_id}")]
    UnknownNotification {
        group_id: NotificationGroupId,
        notification_id: NotificationId,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Update sink error: {0}")]
    Sink(String),

    #[error("Manager is stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;
