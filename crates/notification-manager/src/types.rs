use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_NOTIFICATION_GROUP_COUNT_MAX: i32 = 1;
pub const MAX_NOTIFICATION_GROUP_COUNT_MAX: i32 = 25;
pub const MIN_NOTIFICATION_GROUP_SIZE_MAX: i32 = 1;
pub const MAX_NOTIFICATION_GROUP_SIZE_MAX: i32 = 25;

pub const DEFAULT_GROUP_COUNT_MAX: i32 = 10;
pub const DEFAULT_GROUP_SIZE_MAX: i32 = 10;
/// Materialized notifications kept beyond the visible window for scroll-back.
pub const EXTRA_GROUP_SIZE: usize = 10;

pub const DEFAULT_ONLINE_CLOUD_TIMEOUT_MS: i32 = 300_000;
pub const DEFAULT_ONLINE_CLOUD_DELAY_MS: i32 = 30_000;
pub const DEFAULT_DEFAULT_DELAY_MS: i32 = 1_500;

pub const MIN_NOTIFICATION_DELAY_MS: i32 = 1;

pub const MIN_UPDATE_DELAY_MS: u64 = 50;
pub const MAX_UPDATE_DELAY_MS: u64 = 60_000;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $repr:ty) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            pub fn get(self) -> $repr {
                self.0
            }

            pub fn is_valid(self) -> bool {
                self.0 != 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Sequential notification identifier; zero is "none".
    NotificationId,
    i32
);
id_type!(
    /// Sequential notification group identifier; zero is "none".
    NotificationGroupId,
    i32
);
id_type!(DialogId, i64);
id_type!(MessageId, i64);

/// Capability the manager needs from an opaque notification payload.
///
/// Equality is used to drop edits that change nothing.
pub trait NotificationPayload: fmt::Debug + Clone + PartialEq + Send + 'static {
    fn describe(&self) -> String;

    /// Message the notification refers to, if any. Used by group removal
    /// bounded by message id.
    fn message_id(&self) -> Option<MessageId> {
        None
    }
}

/// Default closed set of payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotificationType {
    #[serde(rename_all = "camelCase")]
    NewMessage { message_id: MessageId },
    NewSecretChat,
    #[serde(rename_all = "camelCase")]
    NewCall { call_id: i32 },
}

impl NotificationPayload for NotificationType {
    fn describe(&self) -> String {
        match self {
            NotificationType::NewMessage { message_id } => format!("NewMessage[{message_id}]"),
            NotificationType::NewSecretChat => "NewSecretChat".to_string(),
            NotificationType::NewCall { call_id } => format!("NewCall[{call_id}]"),
        }
    }

    fn message_id(&self) -> Option<MessageId> {
        match self {
            NotificationType::NewMessage { message_id } => Some(*message_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification<P> {
    pub id: NotificationId,
    pub date: i32,
    pub payload: P,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification<P> {
    pub date: i32,
    pub settings_dialog_id: DialogId,
    pub is_silent: bool,
    pub id: NotificationId,
    pub payload: P,
}

impl<P> PendingNotification<P> {
    pub(crate) fn into_notification(self) -> Notification<P> {
        Notification {
            id: self.id,
            date: self.date,
            payload: self.payload,
        }
    }
}

/// Event handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum NotificationUpdate<P> {
    /// The group entered the active set; `notifications` is its full visible list.
    #[serde(rename_all = "camelCase")]
    AddGroup {
        group_id: NotificationGroupId,
        dialog_id: DialogId,
        total_count: i32,
        notifications: Vec<Notification<P>>,
    },
    /// The listed notifications are no longer visible. When the group left the
    /// active set this lists every id that was visible.
    #[serde(rename_all = "camelCase")]
    RemoveGroup {
        group_id: NotificationGroupId,
        dialog_id: DialogId,
        total_count: i32,
        removed_notification_ids: Vec<NotificationId>,
    },
    #[serde(rename_all = "camelCase")]
    AddNotification {
        group_id: NotificationGroupId,
        settings_dialog_id: DialogId,
        is_silent: bool,
        total_count: i32,
        notification: Notification<P>,
    },
    #[serde(rename_all = "camelCase")]
    EditNotification {
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        payload: P,
    },
    #[serde(rename_all = "camelCase")]
    RemoveNotification {
        group_id: NotificationGroupId,
        total_count: i32,
        notification_id: NotificationId,
    },
}

impl<P> NotificationUpdate<P> {
    pub fn group_id(&self) -> NotificationGroupId {
        match self {
            NotificationUpdate::AddGroup { group_id, .. }
            | NotificationUpdate::RemoveGroup { group_id, .. }
            | NotificationUpdate::AddNotification { group_id, .. }
            | NotificationUpdate::EditNotification { group_id, .. }
            | NotificationUpdate::RemoveNotification { group_id, .. } => *group_id,
        }
    }
}

/// All updates buffered for one group, in the order they were produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatch<P> {
    pub group_id: NotificationGroupId,
    pub updates: Vec<NotificationUpdate<P>>,
}

/// Presence information consulted by the delay heuristic. Times are unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatus {
    pub is_online_local: bool,
    pub is_online_remote: bool,
    pub was_online_local: i64,
    pub was_online_remote: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ids_are_invalid() {
        assert!(!NotificationId::default().is_valid());
        assert!(NotificationGroupId(1).is_valid());
        assert!(DialogId(-5).is_valid());
    }

    #[test]
    fn update_serializes_with_type_tag() {
        let update: NotificationUpdate<NotificationType> = NotificationUpdate::RemoveNotification {
            group_id: NotificationGroupId(3),
            total_count: 1,
            notification_id: NotificationId(7),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["@type"], "removeNotification");
        assert_eq!(json["groupId"], 3);
        assert_eq!(json["notificationId"], 7);
    }

    #[test]
    fn message_payload_exposes_message_id() {
        let payload = NotificationType::NewMessage {
            message_id: MessageId(42),
        };
        assert_eq!(payload.message_id(), Some(MessageId(42)));
        assert_eq!(payload.describe(), "NewMessage[42]");
        assert_eq!(NotificationType::NewSecretChat.message_id(), None);
    }
}
