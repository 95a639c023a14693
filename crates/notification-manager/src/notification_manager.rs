use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::{
        clamp_delay, clamp_group_count_max, clamp_group_size_max, read_option,
        CLOUD_DELAY_OPTION, CURRENT_NOTIFICATION_GROUP_ID_KEY, CURRENT_NOTIFICATION_ID_KEY,
        DEFAULT_DELAY_OPTION, GROUP_COUNT_MAX_OPTION, GROUP_SIZE_MAX_OPTION,
        ONLINE_CLOUD_TIMEOUT_OPTION,
    },
    DialogId, Error, GroupIndex, InMemoryStorage, MessageId, MultiTimeout, Notification,
    NotificationEnvironment, NotificationGroup, NotificationGroupId, NotificationGroupKey,
    NotificationId, NotificationLimits, NotificationPayload, NotificationType, NotificationUpdate,
    PendingNotification, PendingUpdates, Promise, StorageAdapter, UpdateBatch, UpdateSink,
    DEFAULT_DEFAULT_DELAY_MS, DEFAULT_GROUP_COUNT_MAX, DEFAULT_GROUP_SIZE_MAX,
    DEFAULT_ONLINE_CLOUD_DELAY_MS, DEFAULT_ONLINE_CLOUD_TIMEOUT_MS, MAX_UPDATE_DELAY_MS,
    MIN_NOTIFICATION_DELAY_MS, MIN_UPDATE_DELAY_MS,
};

pub struct NotificationManagerOptions<P: NotificationPayload> {
    pub environment: Arc<dyn NotificationEnvironment>,
    pub sink: Arc<dyn UpdateSink<P>>,
    pub storage: Option<Arc<dyn StorageAdapter>>,
}

/// Settings a freshly materialized notification was added with. Notifications
/// that only slide back into view carry none and are reported silently.
type AddedSettings = HashMap<NotificationId, (DialogId, bool)>;

/// Owns every notification group and turns notification events into batched
/// group updates.
///
/// All methods take `&mut self`; the host serializes calls and drives
/// [`NotificationManager::run_timeouts`] at [`NotificationManager::next_timeout_at`].
pub struct NotificationManager<P: NotificationPayload = NotificationType> {
    environment: Arc<dyn NotificationEnvironment>,
    storage: Arc<dyn StorageAdapter>,
    sink: Arc<dyn UpdateSink<P>>,

    is_running: bool,
    running_sync: bool,

    current_notification_id: NotificationId,
    current_notification_group_id: NotificationGroupId,

    limits: NotificationLimits,

    groups: GroupIndex<P>,
    pending_updates: PendingUpdates<P>,

    flush_pending_notifications_timeout: MultiTimeout,
    flush_pending_updates_timeout: MultiTimeout,
}

impl<P: NotificationPayload> NotificationManager<P> {
    pub fn new(opts: NotificationManagerOptions<P>) -> Self {
        Self {
            environment: opts.environment,
            storage: opts
                .storage
                .unwrap_or_else(|| Arc::new(InMemoryStorage::new())),
            sink: opts.sink,
            is_running: false,
            running_sync: false,
            current_notification_id: NotificationId::default(),
            current_notification_group_id: NotificationGroupId::default(),
            limits: NotificationLimits::default(),
            groups: GroupIndex::default(),
            pending_updates: PendingUpdates::default(),
            flush_pending_notifications_timeout: MultiTimeout::new(
                "FlushPendingNotificationsTimeout",
            ),
            flush_pending_updates_timeout: MultiTimeout::new("FlushPendingUpdatesTimeout"),
        }
    }

    pub fn is_disabled(&self) -> bool {
        !self.is_running
    }

    pub fn start(&mut self) {
        if self.is_running {
            return;
        }
        self.current_notification_id =
            NotificationId(self.read_counter(CURRENT_NOTIFICATION_ID_KEY));
        self.current_notification_group_id =
            NotificationGroupId(self.read_counter(CURRENT_NOTIFICATION_GROUP_ID_KEY));
        self.limits = self.read_limits();
        self.is_running = true;
        info!(
            notification_id = %self.current_notification_id,
            group_id = %self.current_notification_group_id,
            limits = ?self.limits,
            "notification manager started"
        );
    }

    /// Delivers everything still buffered and drops all in-memory state.
    pub fn stop(&mut self) {
        if !self.is_running {
            return;
        }
        self.flush_all_pending_notifications();
        self.flush_all_pending_updates();
        self.flush_pending_notifications_timeout.clear();
        self.flush_pending_updates_timeout.clear();
        self.pending_updates.clear();
        self.groups.clear();
        self.running_sync = false;
        self.is_running = false;
        info!("notification manager stopped");
    }

    pub fn now_ms(&self) -> u64 {
        self.environment.now_ms()
    }

    pub fn limits(&self) -> NotificationLimits {
        self.limits
    }

    pub fn get_max_notification_id(&self) -> NotificationId {
        self.current_notification_id
    }

    /// Allocates the next notification id.
    ///
    /// # Panics
    /// When the id space is exhausted; ids cannot be reused.
    pub fn get_next_notification_id(&mut self) -> NotificationId {
        if self.is_disabled() {
            return NotificationId::default();
        }
        let next = self
            .current_notification_id
            .get()
            .checked_add(1)
            .expect("notification id space exhausted");
        self.current_notification_id = NotificationId(next);
        self.persist_counter(CURRENT_NOTIFICATION_ID_KEY, next);
        self.current_notification_id
    }

    /// Allocates the next notification group id.
    ///
    /// # Panics
    /// When the id space is exhausted; ids cannot be reused.
    pub fn get_next_notification_group_id(&mut self) -> NotificationGroupId {
        if self.is_disabled() {
            return NotificationGroupId::default();
        }
        let next = self
            .current_notification_group_id
            .get()
            .checked_add(1)
            .expect("notification group id space exhausted");
        self.current_notification_group_id = NotificationGroupId(next);
        self.persist_counter(CURRENT_NOTIFICATION_GROUP_ID_KEY, next);
        self.current_notification_group_id
    }

    /// Reads a persisted identifier counter. A value above the id space is
    /// kept at the top of it, so the next allocation fails instead of reusing
    /// ids.
    fn read_counter(&self, key: &str) -> i32 {
        let raw = read_option(self.storage.as_ref(), key, 0);
        i32::try_from(raw)
            .ok()
            .filter(|value| *value >= 0)
            .unwrap_or_else(|| {
                warn!(key, value = raw, "identifier counter out of range");
                if raw > 0 {
                    i32::MAX
                } else {
                    0
                }
            })
    }

    fn persist_counter(&self, key: &str, value: i32) {
        if let Err(e) = self.storage.put(key, value.to_string()) {
            warn!(key, error = %e, "failed to persist identifier counter");
        }
    }

    pub fn group(&self, group_id: NotificationGroupId) -> Option<&NotificationGroup<P>> {
        self.groups.get(group_id)
    }

    /// Known group keys in recency order.
    pub fn group_keys(&self) -> Vec<NotificationGroupKey> {
        self.groups.iter().map(|(key, _)| *key).collect()
    }

    /// Groups currently allowed to show notifications, most recent first.
    pub fn active_group_ids(&self) -> Vec<NotificationGroupId> {
        let boundary = self.last_updated_group_key();
        self.groups
            .iter()
            .filter(|(key, _)| key.is_active(&boundary))
            .map(|(key, _)| key.group_id)
            .collect()
    }

    /// Notifications the presentation layer currently shows for the group.
    pub fn visible_notifications(&self, group_id: NotificationGroupId) -> Vec<Notification<P>> {
        let boundary = self.last_updated_group_key();
        match (self.groups.key(group_id), self.groups.get(group_id)) {
            (Some(key), Some(group)) if key.is_active(&boundary) => {
                group.visible(self.limits.group_size_max).to_vec()
            }
            _ => Vec::new(),
        }
    }

    fn last_updated_group_key(&self) -> NotificationGroupKey {
        self.groups.last_updated_key(self.limits.group_count_max)
    }

    pub fn get_notification_delay_ms(
        &self,
        dialog_id: DialogId,
        notification: &PendingNotification<P>,
    ) -> i32 {
        let now_ms = self.environment.now_ms() as i64;
        let delay_ms = if !self.environment.has_cloud_delivery(dialog_id) {
            0
        } else {
            let status = self.environment.online_status();
            let timeout_ms = self.limits.online_cloud_timeout_ms as i64;
            let now = now_ms / 1000;
            let remote_is_fresher = status.was_online_remote
                > status.was_online_local.max(now - timeout_ms / 1000);
            let cloud_ms = if !status.is_online_local
                && (status.is_online_remote || remote_is_fresher)
            {
                (self.limits.cloud_delay_ms as i64).min(timeout_ms)
            } else {
                0
            };
            (self.limits.default_delay_ms as i64).max(cloud_ms)
        };

        let passed_ms = if notification.date > 0 {
            (now_ms - (notification.date as i64 + 1) * 1000).max(0)
        } else {
            0
        };
        (delay_ms - passed_ms).max(MIN_NOTIFICATION_DELAY_MS as i64) as i32
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_notification(
        &mut self,
        group_id: NotificationGroupId,
        dialog_id: DialogId,
        date: i32,
        settings_dialog_id: DialogId,
        is_silent: bool,
        notification_id: NotificationId,
        payload: P,
    ) {
        if self.is_disabled() {
            return;
        }
        if !group_id.is_valid() || !notification_id.is_valid() || !dialog_id.is_valid() {
            warn!(%group_id, %notification_id, %dialog_id, "dropping notification with invalid identifiers");
            return;
        }
        debug!(
            %notification_id, %group_id, %dialog_id, date, is_silent,
            payload = %payload.describe(),
            "add notification"
        );

        let notification = PendingNotification {
            date,
            settings_dialog_id,
            is_silent,
            id: notification_id,
            payload,
        };
        let delay_ms = self.get_notification_delay_ms(dialog_id, &notification);
        let flush_time = self.environment.now_ms() + delay_ms as u64;
        debug!(%notification_id, delay_ms, "delay notification");

        let group = self.groups.get_or_create(group_id, dialog_id);
        if group.pending_notifications_flush_time == 0
            || flush_time < group.pending_notifications_flush_time
        {
            group.pending_notifications_flush_time = flush_time;
            self.flush_pending_notifications_timeout
                .set_timeout_at(group_id.get() as i64, flush_time);
        }
        group.pending_notifications.push(notification);
    }

    pub fn edit_notification(
        &mut self,
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        payload: P,
    ) {
        if self.is_disabled() {
            return;
        }
        let boundary = self.last_updated_group_key();
        let size_max = self.limits.group_size_max;
        let Some((key, group)) = self.groups.get_mut(group_id) else {
            return;
        };

        if let Some(pos) = group
            .notifications
            .iter()
            .position(|n| n.id == notification_id)
        {
            if group.notifications[pos].payload == payload {
                return;
            }
            debug!(%notification_id, %group_id, payload = %payload.describe(), "edit notification");
            group.notifications[pos].payload = payload.clone();
            if group.is_visible_position(pos, size_max) && key.is_active(&boundary) {
                self.add_update(NotificationUpdate::EditNotification {
                    group_id,
                    notification_id,
                    payload,
                });
            }
            return;
        }

        if let Some(pending) = group
            .pending_notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
        {
            debug!(%notification_id, %group_id, "edit pending notification");
            pending.payload = payload;
        } else if let Some(hidden) = group
            .hidden_notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
        {
            hidden.payload = payload;
        }
    }

    pub fn remove_notification(
        &mut self,
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        is_permanent: bool,
        promise: Promise,
    ) {
        if !notification_id.is_valid() {
            return promise(Err(Error::InvalidNotificationId));
        }
        if self.is_disabled() {
            return promise(Ok(()));
        }
        let Some((_, group)) = self.groups.get_mut(group_id) else {
            return promise(Err(Error::UnknownGroup(group_id)));
        };

        if let Some(pos) = group
            .pending_notifications
            .iter()
            .position(|n| n.id == notification_id)
        {
            debug!(%notification_id, %group_id, "remove pending notification");
            group.pending_notifications.remove(pos);
            if group.pending_notifications.is_empty() {
                group.pending_notifications_flush_time = 0;
                self.flush_pending_notifications_timeout
                    .cancel_timeout(group_id.get() as i64);
                if group.is_dead() {
                    self.groups.take(group_id);
                }
            }
            return promise(Ok(()));
        }

        let Some(pos) = group
            .notifications
            .iter()
            .position(|n| n.id == notification_id)
        else {
            if let Some(pos) = group
                .hidden_notifications
                .iter()
                .position(|n| n.id == notification_id)
            {
                if is_permanent {
                    group.hidden_notifications.remove(pos);
                }
                return promise(Ok(()));
            }
            return promise(Err(Error::UnknownNotification {
                group_id,
                notification_id,
            }));
        };

        debug!(%notification_id, %group_id, is_permanent, "remove notification");
        let Some((key, mut group)) = self.groups.take(group_id) else {
            return promise(Err(Error::UnknownGroup(group_id)));
        };
        let old_visible = group.visible_ids(self.limits.group_size_max);
        let removed = group.notifications.remove(pos);
        group.total_count -= 1;
        group.fix_total_count();
        if !is_permanent {
            group.hide(removed);
        }
        self.on_notifications_removed(key, group, old_visible, AddedSettings::new(), false);
        promise(Ok(()))
    }

    /// Re-inserts a notification removed with `is_permanent = false`.
    pub fn restore_notification(
        &mut self,
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        promise: Promise,
    ) {
        if self.is_disabled() {
            return promise(Ok(()));
        }
        let Some((key, mut group)) = self.groups.take(group_id) else {
            return promise(Err(Error::UnknownGroup(group_id)));
        };
        let Some(pos) = group
            .hidden_notifications
            .iter()
            .position(|n| n.id == notification_id)
        else {
            self.groups.insert(key, group);
            return promise(Err(Error::UnknownNotification {
                group_id,
                notification_id,
            }));
        };

        debug!(%notification_id, %group_id, "restore notification");
        let old_visible = group.visible_ids(self.limits.group_size_max);
        let notification = group.hidden_notifications.remove(pos);
        group.insert_sorted(notification);
        group.total_count += 1;
        self.on_notifications_removed(key, group, old_visible, AddedSettings::new(), false);
        promise(Ok(()))
    }

    /// Removes every notification up to `max_notification_id` or referring
    /// to a message up to `max_message_id`.
    pub fn remove_notification_group(
        &mut self,
        group_id: NotificationGroupId,
        max_notification_id: NotificationId,
        max_message_id: MessageId,
        new_total_count: Option<i32>,
        promise: Promise,
    ) {
        if !group_id.is_valid() {
            return promise(Err(Error::InvalidGroupId));
        }
        if self.is_disabled() {
            return promise(Ok(()));
        }
        let Some((key, mut group)) = self.groups.take(group_id) else {
            return promise(Err(Error::UnknownGroup(group_id)));
        };
        if !max_notification_id.is_valid() && !max_message_id.is_valid() {
            self.groups.insert(key, group);
            return promise(Ok(()));
        }

        let max_notification_id = if self.current_notification_id.is_valid() {
            max_notification_id.min(self.current_notification_id)
        } else {
            max_notification_id
        };
        let matches = |id: NotificationId, payload: &P| {
            (max_notification_id.is_valid() && id <= max_notification_id)
                || (max_message_id.is_valid()
                    && payload.message_id().is_some_and(|m| m <= max_message_id))
        };
        debug!(
            %group_id, %max_notification_id, %max_message_id, ?new_total_count,
            "remove notification group"
        );

        let pending_before = group.pending_notifications.len();
        group
            .pending_notifications
            .retain(|n| !matches(n.id, &n.payload));
        if pending_before != group.pending_notifications.len()
            && group.pending_notifications.is_empty()
        {
            group.pending_notifications_flush_time = 0;
            self.flush_pending_notifications_timeout
                .cancel_timeout(group_id.get() as i64);
        }
        group
            .hidden_notifications
            .retain(|n| !matches(n.id, &n.payload));

        let old_visible = group.visible_ids(self.limits.group_size_max);
        let before = group.notifications.len();
        group.notifications.retain(|n| !matches(n.id, &n.payload));
        let removed_count = (before - group.notifications.len()) as i32;

        group.total_count = match new_total_count {
            Some(count) => count.max(0),
            None => group.total_count - removed_count,
        };
        group.fix_total_count();

        self.on_notifications_removed(key, group, old_visible, AddedSettings::new(), true);
        promise(Ok(()))
    }

    /// Materializes the group's pending notifications.
    pub fn flush_pending_notifications(&mut self, group_id: NotificationGroupId) {
        let has_pending = self
            .groups
            .get(group_id)
            .is_some_and(|group| !group.pending_notifications.is_empty());
        self.flush_pending_notifications_timeout
            .cancel_timeout(group_id.get() as i64);
        if !has_pending {
            return;
        }
        let Some((key, mut group)) = self.groups.take(group_id) else {
            return;
        };

        let old_visible = group.visible_ids(self.limits.group_size_max);
        let pending = std::mem::take(&mut group.pending_notifications);
        group.pending_notifications_flush_time = 0;
        debug!(%group_id, count = pending.len(), group_key = %key, "flush pending notifications");

        let mut added = AddedSettings::with_capacity(pending.len());
        group.total_count += pending.len() as i32;
        for notification in pending {
            added.insert(
                notification.id,
                (notification.settings_dialog_id, notification.is_silent),
            );
            group.notifications.push(notification.into_notification());
        }
        group.notifications.sort_by_key(|n| n.id);

        self.on_notifications_removed(key, group, old_visible, added, false);
    }

    pub fn flush_all_pending_notifications(&mut self) {
        for key in self.flush_pending_notifications_timeout.keys() {
            self.flush_pending_notifications(NotificationGroupId(key as i32));
        }
    }

    /// Re-keys a group whose notifications changed, moves the active-set
    /// boundary if needed and queues the resulting updates.
    ///
    /// `group` must already be taken out of the index; `old_visible` is its
    /// visible window before the change and `added` lists notifications that
    /// were just materialized.
    fn on_notifications_removed(
        &mut self,
        key: NotificationGroupKey,
        mut group: NotificationGroup<P>,
        old_visible: Vec<NotificationId>,
        added: AddedSettings,
        combine_removals: bool,
    ) {
        let size_max = self.limits.group_size_max;
        group.trim(self.limits.keep_group_size());

        let final_key = NotificationGroupKey {
            last_notification_date: group.last_notification_date(),
            ..key
        };
        if final_key != key {
            debug!(from = %key, to = %final_key, "notification group position changed");
        }

        let boundary = self.last_updated_group_key();
        let was_active = key.is_active(&boundary);
        let is_active = final_key.is_active(&boundary);

        let mut updates = Vec::new();
        match (was_active, is_active) {
            (false, false) => {
                debug!(group_key = %final_key, "group is hidden by newer groups");
            }
            (true, true) => {
                updates.extend(visibility_changes(
                    &final_key,
                    &group,
                    &old_visible,
                    size_max,
                    &added,
                    combine_removals,
                ));
            }
            (false, true) => {
                if boundary.last_notification_date != 0 {
                    if let Some(evicted) = self.groups.get_by_key(&boundary) {
                        updates.extend(
                            evicted.remove_group_update(&boundary, evicted.visible_ids(size_max)),
                        );
                    }
                }
                updates.extend(group.add_group_update(&final_key, size_max));
            }
            (true, false) => {
                updates.extend(group.remove_group_update(&final_key, old_visible));
                if boundary.last_notification_date != 0 {
                    if let Some(promoted) = self.groups.get_by_key(&boundary) {
                        updates.extend(promoted.add_group_update(&boundary, size_max));
                    }
                }
            }
        }

        if group.is_dead() {
            debug!(group_key = %final_key, "delete notification group");
        } else {
            self.groups.insert(final_key, group);
        }
        for update in updates {
            self.add_update(update);
        }
    }

    fn add_update(&mut self, update: NotificationUpdate<P>) {
        let group_id = update.group_id();
        self.pending_updates.push(update);
        let delay_ms = if self.running_sync {
            MAX_UPDATE_DELAY_MS
        } else {
            MIN_UPDATE_DELAY_MS
        };
        self.flush_pending_updates_timeout
            .add_timeout_at(group_id.get() as i64, self.environment.now_ms() + delay_ms);
    }

    /// Delivers the group's buffered updates to the sink as one batch.
    pub fn flush_pending_updates(&mut self, group_id: NotificationGroupId) {
        self.flush_pending_updates_timeout
            .cancel_timeout(group_id.get() as i64);
        let updates = self.pending_updates.take(group_id);
        if updates.is_empty() {
            return;
        }
        debug!(%group_id, count = updates.len(), "flush pending updates");
        if let Err(e) = self.sink.send_updates(UpdateBatch { group_id, updates }) {
            warn!(%group_id, error = %e, "failed to deliver notification updates");
        }
    }

    pub fn flush_all_pending_updates(&mut self) {
        for group_id in self.pending_updates.group_ids() {
            self.flush_pending_updates(group_id);
        }
    }

    /// Upstream synchronization started; updates are held for up to
    /// `MAX_UPDATE_DELAY_MS`.
    pub fn before_sync(&mut self) {
        self.running_sync = true;
    }

    pub fn after_sync(&mut self) {
        self.running_sync = false;
        let at = self.environment.now_ms() + MIN_UPDATE_DELAY_MS;
        for key in self.flush_pending_updates_timeout.keys() {
            if self
                .flush_pending_updates_timeout
                .deadline(key)
                .is_some_and(|deadline| deadline > at)
            {
                self.flush_pending_updates_timeout.set_timeout_at(key, at);
            }
        }
    }

    /// Fires every expired deadline of both timers.
    pub fn run_timeouts(&mut self) {
        let now_ms = self.environment.now_ms();
        let expired = self.flush_pending_notifications_timeout.pop_expired(now_ms);
        if !expired.is_empty() {
            debug!(timeout = self.flush_pending_notifications_timeout.name(), count = expired.len(), "timeouts expired");
        }
        for key in expired {
            self.flush_pending_notifications(NotificationGroupId(key as i32));
        }

        let expired = self.flush_pending_updates_timeout.pop_expired(now_ms);
        if !expired.is_empty() {
            debug!(timeout = self.flush_pending_updates_timeout.name(), count = expired.len(), "timeouts expired");
        }
        for key in expired {
            self.flush_pending_updates(NotificationGroupId(key as i32));
        }
    }

    /// Earliest armed deadline across both timers.
    pub fn next_timeout_at(&self) -> Option<u64> {
        match (
            self.flush_pending_notifications_timeout.next_deadline(),
            self.flush_pending_updates_timeout.next_deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn read_limits(&self) -> NotificationLimits {
        let storage = self.storage.as_ref();
        NotificationLimits {
            group_count_max: clamp_group_count_max(read_option(
                storage,
                GROUP_COUNT_MAX_OPTION,
                DEFAULT_GROUP_COUNT_MAX as i64,
            )),
            group_size_max: clamp_group_size_max(read_option(
                storage,
                GROUP_SIZE_MAX_OPTION,
                DEFAULT_GROUP_SIZE_MAX as i64,
            )),
            online_cloud_timeout_ms: clamp_delay(read_option(
                storage,
                ONLINE_CLOUD_TIMEOUT_OPTION,
                DEFAULT_ONLINE_CLOUD_TIMEOUT_MS as i64,
            )),
            cloud_delay_ms: clamp_delay(read_option(
                storage,
                CLOUD_DELAY_OPTION,
                DEFAULT_ONLINE_CLOUD_DELAY_MS as i64,
            )),
            default_delay_ms: clamp_delay(read_option(
                storage,
                DEFAULT_DELAY_OPTION,
                DEFAULT_DEFAULT_DELAY_MS as i64,
            )),
        }
    }

    pub fn on_notification_group_count_max_changed(&mut self) {
        let group_count_max = self.read_limits().group_count_max;
        if group_count_max == self.limits.group_count_max {
            return;
        }
        info!(
            from = self.limits.group_count_max,
            to = group_count_max,
            "notification group count max changed"
        );
        let old = self.limits;
        self.limits.group_count_max = group_count_max;
        self.on_limits_changed(old);
    }

    pub fn on_notification_group_size_max_changed(&mut self) {
        let group_size_max = self.read_limits().group_size_max;
        if group_size_max == self.limits.group_size_max {
            return;
        }
        info!(
            from = self.limits.group_size_max,
            to = group_size_max,
            "notification group size max changed"
        );
        let old = self.limits;
        self.limits.group_size_max = group_size_max;
        self.on_limits_changed(old);
    }

    pub fn on_online_cloud_timeout_changed(&mut self) {
        self.limits.online_cloud_timeout_ms = self.read_limits().online_cloud_timeout_ms;
    }

    pub fn on_notification_cloud_delay_changed(&mut self) {
        self.limits.cloud_delay_ms = self.read_limits().cloud_delay_ms;
    }

    pub fn on_notification_default_delay_changed(&mut self) {
        self.limits.default_delay_ms = self.read_limits().default_delay_ms;
    }

    /// Recomputes active-set membership and visible windows after a limit
    /// change.
    fn on_limits_changed(&mut self, old: NotificationLimits) {
        let old_boundary = self.groups.last_updated_key(old.group_count_max);
        let new_boundary = self.groups.last_updated_key(self.limits.group_count_max);
        let size_max = self.limits.group_size_max;
        let keep = self.limits.keep_group_size();

        let mut updates = Vec::new();
        for (key, group) in self.groups.iter_mut() {
            let was_active = key.is_active(&old_boundary);
            let is_active = key.is_active(&new_boundary);
            let old_visible = group.visible_ids(old.group_size_max);
            group.trim(keep);
            match (was_active, is_active) {
                (true, false) => updates.extend(group.remove_group_update(key, old_visible)),
                (false, true) => updates.extend(group.add_group_update(key, size_max)),
                (true, true) => updates.extend(visibility_changes(
                    key,
                    group,
                    &old_visible,
                    size_max,
                    &AddedSettings::new(),
                    true,
                )),
                (false, false) => {}
            }
        }
        for update in updates {
            self.add_update(update);
        }
    }
}

/// Updates turning the previously visible window `old_visible` into the
/// group's current one.
///
/// Removals come first, so the shown window never exceeds `size_max`. A
/// single removal is reported as a notification removal unless
/// `combine_removals` is set; several are combined into one group removal.
fn visibility_changes<P: NotificationPayload>(
    key: &NotificationGroupKey,
    group: &NotificationGroup<P>,
    old_visible: &[NotificationId],
    size_max: usize,
    added: &AddedSettings,
    combine_removals: bool,
) -> Vec<NotificationUpdate<P>> {
    let new_visible = group.visible(size_max);
    let removed: Vec<NotificationId> = old_visible
        .iter()
        .copied()
        .filter(|id| !new_visible.iter().any(|n| n.id == *id))
        .collect();

    let mut updates = Vec::new();
    if removed.len() == 1 && !combine_removals {
        updates.push(NotificationUpdate::RemoveNotification {
            group_id: key.group_id,
            total_count: group.total_count,
            notification_id: removed[0],
        });
    } else {
        updates.extend(group.remove_group_update(key, removed));
    }

    for notification in new_visible {
        if old_visible.contains(&notification.id) {
            continue;
        }
        let (settings_dialog_id, is_silent) = added
            .get(&notification.id)
            .copied()
            .unwrap_or((key.dialog_id, true));
        updates.push(NotificationUpdate::AddNotification {
            group_id: key.group_id,
            settings_dialog_id,
            is_silent,
            total_count: group.total_count,
            notification: notification.clone(),
        });
    }
    updates
}
