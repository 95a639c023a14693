use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::{
    DialogId, Notification, NotificationGroupId, NotificationId, NotificationUpdate,
    PendingNotification, EXTRA_GROUP_SIZE,
};

/// Position of a group in the recency order.
///
/// Ascending order puts the most recently active group first: later date,
/// then larger dialog id, then larger group id. The default key (all zero)
/// sorts after every group that has a date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NotificationGroupKey {
    pub group_id: NotificationGroupId,
    pub dialog_id: DialogId,
    pub last_notification_date: i32,
}

impl Ord for NotificationGroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .last_notification_date
            .cmp(&self.last_notification_date)
            .then_with(|| other.dialog_id.cmp(&self.dialog_id))
            .then_with(|| other.group_id.cmp(&self.group_id))
    }
}

impl PartialOrd for NotificationGroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NotificationGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{}]",
            self.group_id, self.dialog_id, self.last_notification_date
        )
    }
}

impl NotificationGroupKey {
    /// Whether a group with this key is inside the active set bounded by
    /// `boundary` (the key of the last active slot).
    pub fn is_active(&self, boundary: &NotificationGroupKey) -> bool {
        self.last_notification_date != 0 && self <= boundary
    }
}

#[derive(Debug)]
pub struct NotificationGroup<P> {
    pub(crate) total_count: i32,
    pub(crate) notifications: Vec<Notification<P>>,
    pub(crate) pending_notifications_flush_time: u64,
    pub(crate) pending_notifications: Vec<PendingNotification<P>>,
    pub(crate) hidden_notifications: Vec<Notification<P>>,
}

impl<P> Default for NotificationGroup<P> {
    fn default() -> Self {
        Self {
            total_count: 0,
            notifications: Vec::new(),
            pending_notifications_flush_time: 0,
            pending_notifications: Vec::new(),
            hidden_notifications: Vec::new(),
        }
    }
}

impl<P: Clone> NotificationGroup<P> {
    pub fn total_count(&self) -> i32 {
        self.total_count
    }

    pub fn notifications(&self) -> &[Notification<P>] {
        &self.notifications
    }

    pub fn pending_notifications(&self) -> &[PendingNotification<P>] {
        &self.pending_notifications
    }

    pub fn hidden_notifications(&self) -> &[Notification<P>] {
        &self.hidden_notifications
    }

    /// Date of the newest materialized notification, 0 when there is none.
    pub fn last_notification_date(&self) -> i32 {
        self.notifications
            .iter()
            .map(|n| n.date)
            .max()
            .unwrap_or(0)
    }

    /// The most recent `size_max` materialized notifications.
    pub fn visible(&self, size_max: usize) -> &[Notification<P>] {
        let start = self.notifications.len().saturating_sub(size_max);
        &self.notifications[start..]
    }

    pub fn visible_ids(&self, size_max: usize) -> Vec<NotificationId> {
        self.visible(size_max).iter().map(|n| n.id).collect()
    }

    pub(crate) fn is_visible_position(&self, pos: usize, size_max: usize) -> bool {
        pos + size_max >= self.notifications.len()
    }

    /// Drops the oldest materialized notifications beyond `keep`.
    pub(crate) fn trim(&mut self, keep: usize) -> usize {
        let excess = self.notifications.len().saturating_sub(keep);
        if excess > 0 {
            self.notifications.drain(..excess);
        }
        excess
    }

    pub(crate) fn insert_sorted(&mut self, notification: Notification<P>) {
        let pos = self
            .notifications
            .partition_point(|n| n.id < notification.id);
        self.notifications.insert(pos, notification);
    }

    pub(crate) fn hide(&mut self, notification: Notification<P>) {
        if self.hidden_notifications.len() >= EXTRA_GROUP_SIZE {
            self.hidden_notifications.remove(0);
        }
        self.hidden_notifications.push(notification);
    }

    pub(crate) fn fix_total_count(&mut self) {
        self.total_count = self.total_count.max(self.notifications.len() as i32);
    }

    /// A group with hidden notifications stays so they can be restored.
    pub(crate) fn is_dead(&self) -> bool {
        self.total_count == 0
            && self.notifications.is_empty()
            && self.pending_notifications.is_empty()
            && self.hidden_notifications.is_empty()
    }

    pub(crate) fn add_group_update(
        &self,
        key: &NotificationGroupKey,
        size_max: usize,
    ) -> Option<NotificationUpdate<P>> {
        let notifications = self.visible(size_max).to_vec();
        if notifications.is_empty() {
            return None;
        }
        Some(NotificationUpdate::AddGroup {
            group_id: key.group_id,
            dialog_id: key.dialog_id,
            total_count: self.total_count,
            notifications,
        })
    }

    pub(crate) fn remove_group_update(
        &self,
        key: &NotificationGroupKey,
        removed_notification_ids: Vec<NotificationId>,
    ) -> Option<NotificationUpdate<P>> {
        if removed_notification_ids.is_empty() {
            return None;
        }
        Some(NotificationUpdate::RemoveGroup {
            group_id: key.group_id,
            dialog_id: key.dialog_id,
            total_count: self.total_count,
            removed_notification_ids,
        })
    }
}

/// Groups ordered by recency, with a side lookup from group id to key.
///
/// Keys are never mutated in place: a date change goes through `take` and
/// `insert`.
#[derive(Debug)]
pub struct GroupIndex<P> {
    groups: BTreeMap<NotificationGroupKey, NotificationGroup<P>>,
    keys: HashMap<NotificationGroupId, NotificationGroupKey>,
}

impl<P> Default for GroupIndex<P> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }
}

impl<P: Clone> GroupIndex<P> {
    pub fn key(&self, group_id: NotificationGroupId) -> Option<NotificationGroupKey> {
        self.keys.get(&group_id).copied()
    }

    pub fn get(&self, group_id: NotificationGroupId) -> Option<&NotificationGroup<P>> {
        let key = self.keys.get(&group_id)?;
        self.groups.get(key)
    }

    pub fn get_mut(
        &mut self,
        group_id: NotificationGroupId,
    ) -> Option<(NotificationGroupKey, &mut NotificationGroup<P>)> {
        let key = *self.keys.get(&group_id)?;
        self.groups.get_mut(&key).map(|group| (key, group))
    }

    pub fn get_by_key(&self, key: &NotificationGroupKey) -> Option<&NotificationGroup<P>> {
        self.groups.get(key)
    }

    /// Returns the group, creating an empty undated one if it is unknown.
    pub fn get_or_create(
        &mut self,
        group_id: NotificationGroupId,
        dialog_id: DialogId,
    ) -> &mut NotificationGroup<P> {
        let key = *self.keys.entry(group_id).or_insert(NotificationGroupKey {
            group_id,
            dialog_id,
            last_notification_date: 0,
        });
        self.groups.entry(key).or_default()
    }

    pub fn take(
        &mut self,
        group_id: NotificationGroupId,
    ) -> Option<(NotificationGroupKey, NotificationGroup<P>)> {
        let key = self.keys.remove(&group_id)?;
        self.groups.remove(&key).map(|group| (key, group))
    }

    pub fn insert(&mut self, key: NotificationGroupKey, group: NotificationGroup<P>) {
        if let Some(old) = self.keys.insert(key.group_id, key) {
            self.groups.remove(&old);
        }
        self.groups.insert(key, group);
    }

    /// Key of the last slot of the active set, or the default key when there
    /// are fewer groups than slots.
    pub fn last_updated_key(&self, group_count_max: usize) -> NotificationGroupKey {
        group_count_max
            .checked_sub(1)
            .and_then(|n| self.groups.keys().nth(n))
            .copied()
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NotificationGroupKey, &NotificationGroup<P>)> {
        self.groups.iter()
    }

    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (&NotificationGroupKey, &mut NotificationGroup<P>)> {
        self.groups.iter_mut()
    }

    pub fn group_ids(&self) -> Vec<NotificationGroupId> {
        self.groups.keys().map(|key| key.group_id).collect()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.keys.clear();
    }
}
