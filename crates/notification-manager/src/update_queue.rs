use std::collections::HashMap;

use crate::{NotificationGroupId, NotificationId, NotificationPayload, NotificationUpdate};

/// Outgoing updates buffered per group until that group's update timer fires.
#[derive(Debug)]
pub struct PendingUpdates<P> {
    updates: HashMap<NotificationGroupId, Vec<NotificationUpdate<P>>>,
}

impl<P> Default for PendingUpdates<P> {
    fn default() -> Self {
        Self {
            updates: HashMap::new(),
        }
    }
}

impl<P: NotificationPayload> PendingUpdates<P> {
    pub fn push(&mut self, update: NotificationUpdate<P>) {
        self.updates
            .entry(update.group_id())
            .or_default()
            .push(update);
    }

    pub fn group_ids(&self) -> Vec<NotificationGroupId> {
        self.updates.keys().copied().collect()
    }

    /// Removes the group's buffered updates and coalesces them.
    pub fn take(&mut self, group_id: NotificationGroupId) -> Vec<NotificationUpdate<P>> {
        self.updates
            .remove(&group_id)
            .map(coalesce)
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.updates.clear();
    }
}

/// Folds updates that cancel out within one batch.
///
/// An edit of a notification added earlier in the batch is merged into that
/// add. A removal of a notification added earlier in the batch drops both,
/// unless a group addition or removal sits between them. A group removal that
/// lists exactly the notifications of the immediately preceding group
/// addition drops both.
pub fn coalesce<P: NotificationPayload>(
    updates: Vec<NotificationUpdate<P>>,
) -> Vec<NotificationUpdate<P>> {
    let mut out: Vec<Option<NotificationUpdate<P>>> = Vec::with_capacity(updates.len());
    for update in updates {
        match update {
            NotificationUpdate::EditNotification {
                group_id,
                notification_id,
                payload,
            } => {
                if let Some(added) = find_added(&mut out, notification_id) {
                    *added = payload;
                } else {
                    out.push(Some(NotificationUpdate::EditNotification {
                        group_id,
                        notification_id,
                        payload,
                    }));
                }
            }
            NotificationUpdate::RemoveNotification {
                group_id,
                total_count,
                notification_id,
            } => {
                let slot = latest_since_group_event(&out).find_map(|(pos, u)| {
                    matches!(u, NotificationUpdate::AddNotification { notification, .. }
                        if notification.id == notification_id)
                    .then_some(pos)
                });
                match slot {
                    Some(pos) => out[pos] = None,
                    None => out.push(Some(NotificationUpdate::RemoveNotification {
                        group_id,
                        total_count,
                        notification_id,
                    })),
                }
            }
            NotificationUpdate::RemoveGroup {
                group_id,
                dialog_id,
                total_count,
                removed_notification_ids,
            } => {
                let last = out.iter().rposition(Option::is_some);
                let cancels = last.is_some_and(|pos| {
                    matches!(&out[pos], Some(NotificationUpdate::AddGroup { notifications, .. })
                        if notifications.iter().map(|n| n.id).eq(removed_notification_ids.iter().copied()))
                });
                match last {
                    Some(pos) if cancels => out[pos] = None,
                    _ => out.push(Some(NotificationUpdate::RemoveGroup {
                        group_id,
                        dialog_id,
                        total_count,
                        removed_notification_ids,
                    })),
                }
            }
            other => out.push(Some(other)),
        }
    }
    out.into_iter().flatten().collect()
}

/// Surviving updates, newest first, up to and excluding the latest group
/// addition or removal.
fn latest_since_group_event<P>(
    out: &[Option<NotificationUpdate<P>>],
) -> impl Iterator<Item = (usize, &NotificationUpdate<P>)> {
    out.iter()
        .enumerate()
        .rev()
        .filter_map(|(pos, u)| u.as_ref().map(|u| (pos, u)))
        .take_while(|(_, u)| {
            !matches!(
                u,
                NotificationUpdate::AddGroup { .. } | NotificationUpdate::RemoveGroup { .. }
            )
        })
}

/// Payload of the latest add still carrying `notification_id`. A group
/// removal listing the id, or a removal of it, ends the search.
fn find_added<P>(
    out: &mut [Option<NotificationUpdate<P>>],
    notification_id: NotificationId,
) -> Option<&mut P> {
    for update in out.iter_mut().rev().flatten() {
        match update {
            NotificationUpdate::AddNotification { notification, .. }
                if notification.id == notification_id =>
            {
                return Some(&mut notification.payload);
            }
            NotificationUpdate::AddGroup { notifications, .. } => {
                return notifications
                    .iter_mut()
                    .find(|n| n.id == notification_id)
                    .map(|n| &mut n.payload);
            }
            NotificationUpdate::RemoveGroup {
                removed_notification_ids,
                ..
            } if removed_notification_ids.contains(&notification_id) => return None,
            NotificationUpdate::RemoveNotification {
                notification_id: removed,
                ..
            } if *removed == notification_id => return None,
            _ => {}
        }
    }
    None
}
