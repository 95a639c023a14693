use notification_manager::config::{
    CLOUD_DELAY_OPTION, DEFAULT_DELAY_OPTION, GROUP_COUNT_MAX_OPTION, GROUP_SIZE_MAX_OPTION,
};
use notification_manager::sink::test_utils::{drain_batches, ManualEnvironment};
use notification_manager::{
    promise_channel, DialogId, Error, InMemoryStorage, MessageId, NotificationGroupId,
    NotificationId, NotificationManager, NotificationManagerOptions, NotificationType,
    NotificationUpdate, OnlineStatus, PendingNotification, StorageAdapter, UpdateBatch,
};
use std::collections::HashMap;
use std::sync::Arc;

const START_MS: u64 = 1_000_000;
const NOW_SECONDS: i32 = 1_000;

struct Harness {
    env: Arc<ManualEnvironment>,
    storage: Arc<InMemoryStorage>,
    manager: NotificationManager,
    rx: crossbeam_channel::Receiver<UpdateBatch<NotificationType>>,
}

fn message(id: i32) -> NotificationType {
    NotificationType::NewMessage {
        message_id: MessageId(id as i64 * 10),
    }
}

fn gid(id: i32) -> NotificationGroupId {
    NotificationGroupId(id)
}

fn nid(id: i32) -> NotificationId {
    NotificationId(id)
}

fn ids(values: &[i32]) -> Vec<NotificationId> {
    values.iter().copied().map(NotificationId).collect()
}

fn harness(group_count_max: i32, group_size_max: i32) -> Harness {
    let env = Arc::new(ManualEnvironment::new(START_MS));
    let storage = Arc::new(InMemoryStorage::new());
    storage
        .put(GROUP_COUNT_MAX_OPTION, group_count_max.to_string())
        .unwrap();
    storage
        .put(GROUP_SIZE_MAX_OPTION, group_size_max.to_string())
        .unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut manager = NotificationManager::new(NotificationManagerOptions::<NotificationType> {
        environment: env.clone(),
        sink: Arc::new(tx),
        storage: Some(storage.clone()),
    });
    manager.start();
    Harness {
        env,
        storage,
        manager,
        rx,
    }
}

impl Harness {
    fn add(&mut self, group: i32, dialog: i64, date: i32, id: i32) {
        self.manager.add_notification(
            gid(group),
            DialogId(dialog),
            date,
            DialogId(dialog),
            false,
            nid(id),
            message(id),
        );
    }

    fn advance(&mut self, ms: u64) {
        self.env.advance(ms);
        self.manager.run_timeouts();
    }

    /// Lets both batching windows elapse and returns every delivered batch.
    fn settle(&mut self) -> Vec<UpdateBatch<NotificationType>> {
        self.advance(1_500);
        self.advance(50);
        drain_batches(&self.rx)
    }

    fn settle_updates(&mut self) -> Vec<NotificationUpdate<NotificationType>> {
        self.settle()
            .into_iter()
            .flat_map(|batch| batch.updates)
            .collect()
    }
}

fn notification_ids(update: &NotificationUpdate<NotificationType>) -> Vec<NotificationId> {
    match update {
        NotificationUpdate::AddGroup { notifications, .. } => {
            notifications.iter().map(|n| n.id).collect()
        }
        NotificationUpdate::AddNotification { notification, .. } => vec![notification.id],
        _ => Vec::new(),
    }
}

#[test]
fn burst_is_reported_once_in_ascending_order_and_trimmed() {
    let mut h = harness(10, 3);
    for id in 1..=5 {
        h.add(1, 100, NOW_SECONDS, id);
    }
    h.advance(1_000);
    assert!(drain_batches(&h.rx).is_empty());

    let batches = h.settle();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].group_id, gid(1));
    match &batches[0].updates[..] {
        [NotificationUpdate::AddGroup {
            total_count,
            notifications,
            ..
        }] => {
            assert_eq!(*total_count, 5);
            assert_eq!(
                notifications.iter().map(|n| n.id).collect::<Vec<_>>(),
                ids(&[3, 4, 5])
            );
        }
        other => panic!("unexpected updates {other:?}"),
    }

    h.add(1, 100, NOW_SECONDS + 1, 6);
    h.add(1, 100, NOW_SECONDS + 1, 7);
    let updates = h.settle_updates();
    assert_eq!(updates.len(), 3);
    assert!(matches!(
        &updates[0],
        NotificationUpdate::RemoveGroup { removed_notification_ids, .. }
            if *removed_notification_ids == ids(&[3, 4])
    ));
    let added: Vec<NotificationId> = updates[1..].iter().flat_map(notification_ids).collect();
    assert_eq!(added, ids(&[6, 7]));
    assert_eq!(h.manager.group(gid(1)).unwrap().total_count(), 7);
}

#[test]
fn later_notifications_do_not_extend_the_batching_window() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    let deadline = h.manager.next_timeout_at().unwrap();
    assert_eq!(deadline, START_MS + 1_500);

    h.advance(1_000);
    h.add(1, 100, NOW_SECONDS, 2);
    assert_eq!(h.manager.next_timeout_at(), Some(deadline));

    h.advance(500);
    assert_eq!(h.manager.group(gid(1)).unwrap().notifications().len(), 2);
}

#[test]
fn flushing_an_empty_queue_emits_nothing() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    assert_eq!(h.settle().len(), 1);

    h.manager.flush_pending_notifications(gid(1));
    h.manager.flush_pending_notifications(gid(42));
    assert!(h.settle().is_empty());
    assert_eq!(h.manager.next_timeout_at(), None);
}

#[test]
fn edit_before_flush_yields_single_add_with_new_payload() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    h.manager.edit_notification(gid(1), nid(1), message(99));

    let updates = h.settle_updates();
    assert_eq!(updates.len(), 1);
    match &updates[0] {
        NotificationUpdate::AddGroup { notifications, .. } => {
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].payload, message(99));
        }
        other => panic!("unexpected update {other:?}"),
    }
    let group = h.manager.group(gid(1)).unwrap();
    assert_eq!(group.notifications().len(), 1);
    assert_eq!(group.notifications()[0].payload, message(99));
}

#[test]
fn edit_of_visible_notification_is_reported_once() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    h.settle();

    h.manager.edit_notification(gid(1), nid(1), message(1));
    h.manager.edit_notification(gid(1), nid(77), message(5));
    h.manager.edit_notification(gid(9), nid(1), message(5));
    assert!(h.settle().is_empty());

    h.manager.edit_notification(gid(1), nid(1), message(2));
    let updates = h.settle_updates();
    assert_eq!(
        updates,
        vec![NotificationUpdate::EditNotification {
            group_id: gid(1),
            notification_id: nid(1),
            payload: message(2),
        }]
    );
}

#[test]
fn oldest_group_is_evicted_when_a_newer_one_arrives() {
    let mut h = harness(2, 3);
    for id in 1..=3 {
        h.add(1, 10, NOW_SECONDS, id);
    }
    h.settle();
    h.add(2, 20, NOW_SECONDS + 1, 4);
    h.settle();
    h.add(3, 30, NOW_SECONDS + 2, 5);

    let batches = h.settle();
    let by_group: HashMap<NotificationGroupId, Vec<NotificationUpdate<NotificationType>>> =
        batches.into_iter().map(|b| (b.group_id, b.updates)).collect();
    assert_eq!(by_group.len(), 2);
    assert_eq!(
        by_group[&gid(1)],
        vec![NotificationUpdate::RemoveGroup {
            group_id: gid(1),
            dialog_id: DialogId(10),
            total_count: 3,
            removed_notification_ids: ids(&[1, 2, 3]),
        }]
    );
    assert!(matches!(
        &by_group[&gid(3)][..],
        [NotificationUpdate::AddGroup { total_count: 1, .. }]
    ));

    assert_eq!(h.manager.active_group_ids(), vec![gid(3), gid(2)]);
    assert!(h.manager.visible_notifications(gid(1)).is_empty());
    assert_eq!(h.manager.group(gid(1)).unwrap().total_count(), 3);
    assert_eq!(h.manager.group(gid(1)).unwrap().notifications().len(), 3);
    assert_eq!(h.manager.group(gid(2)).unwrap().total_count(), 1);
    assert_eq!(h.manager.group(gid(3)).unwrap().total_count(), 1);
}

fn apply_to_view(
    view: &mut HashMap<NotificationGroupId, Vec<NotificationId>>,
    update: &NotificationUpdate<NotificationType>,
) {
    match update {
        NotificationUpdate::AddGroup {
            group_id,
            notifications,
            ..
        } => {
            view.insert(*group_id, notifications.iter().map(|n| n.id).collect());
        }
        NotificationUpdate::RemoveGroup {
            group_id,
            removed_notification_ids,
            ..
        } => {
            view.entry(*group_id)
                .or_default()
                .retain(|id| !removed_notification_ids.contains(id));
        }
        NotificationUpdate::AddNotification {
            group_id,
            notification,
            ..
        } => {
            let shown = view.entry(*group_id).or_default();
            shown.push(notification.id);
            shown.sort();
        }
        NotificationUpdate::RemoveNotification {
            group_id,
            notification_id,
            ..
        } => {
            view.entry(*group_id)
                .or_default()
                .retain(|id| id != notification_id);
        }
        NotificationUpdate::EditNotification { .. } => {}
    }
}

#[test]
fn index_order_and_active_set_hold_after_every_step() {
    let mut h = harness(3, 2);
    let steps: [(i32, i64, i32); 10] = [
        (1, 10, 1_000),
        (2, 20, 1_000),
        (3, 30, 999),
        (4, 40, 1_001),
        (5, 50, 998),
        (1, 10, 1_002),
        (3, 30, 1_003),
        (2, 20, 1_000),
        (5, 50, 1_004),
        (4, 40, 1_001),
    ];
    let mut view: HashMap<NotificationGroupId, Vec<NotificationId>> = HashMap::new();
    let mut dated = std::collections::HashSet::new();

    for (step, (group, dialog, date)) in steps.into_iter().enumerate() {
        h.add(group, dialog, date, step as i32 + 1);
        dated.insert(group);
        for update in h.settle_updates() {
            apply_to_view(&mut view, &update);
        }

        let keys = h.manager.group_keys();
        for pair in keys.windows(2) {
            let a = (pair[0].last_notification_date, pair[0].dialog_id, pair[0].group_id);
            let b = (pair[1].last_notification_date, pair[1].dialog_id, pair[1].group_id);
            assert!(a > b, "index out of order at step {step}: {keys:?}");
        }

        let active = h.manager.active_group_ids();
        assert_eq!(active.len(), dated.len().min(3), "step {step}");
        let expected: Vec<NotificationGroupId> =
            keys.iter().take(3).map(|key| key.group_id).collect();
        assert_eq!(active, expected, "step {step}");

        for group in 1..=5 {
            let shown: Vec<NotificationId> = h
                .manager
                .visible_notifications(gid(group))
                .iter()
                .map(|n| n.id)
                .collect();
            assert!(shown.len() <= 2);
            assert_eq!(
                view.get(&gid(group)).cloned().unwrap_or_default(),
                shown,
                "view of group {group} diverged at step {step}"
            );
        }
    }
}

#[test]
fn group_removal_removes_exactly_up_to_max_id() {
    let mut h = harness(10, 10);
    for id in 1..=5 {
        h.add(1, 100, NOW_SECONDS, id);
    }
    h.settle();

    let (promise, done) = promise_channel();
    h.manager
        .remove_notification_group(gid(1), nid(3), MessageId(0), None, promise);
    assert!(done.try_recv().unwrap().is_ok());

    let updates = h.settle_updates();
    assert_eq!(
        updates,
        vec![NotificationUpdate::RemoveGroup {
            group_id: gid(1),
            dialog_id: DialogId(100),
            total_count: 2,
            removed_notification_ids: ids(&[1, 2, 3]),
        }]
    );
    let remaining: Vec<NotificationId> = h
        .manager
        .group(gid(1))
        .unwrap()
        .notifications()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(remaining, ids(&[4, 5]));

    let (promise, done) = promise_channel();
    h.manager
        .remove_notification_group(gid(1), nid(3), MessageId(0), None, promise);
    assert!(done.try_recv().unwrap().is_ok());
    assert!(h.settle().is_empty());
}

#[test]
fn group_removal_by_message_id_covers_pending_and_destroys_empty_group() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    h.settle();
    h.add(1, 100, NOW_SECONDS, 2);

    let (promise, done) = promise_channel();
    h.manager
        .remove_notification_group(gid(1), nid(0), MessageId(20), Some(0), promise);
    assert!(done.try_recv().unwrap().is_ok());

    let updates = h.settle_updates();
    assert!(matches!(
        &updates[..],
        [NotificationUpdate::RemoveGroup { removed_notification_ids, total_count: 0, .. }]
            if *removed_notification_ids == ids(&[1])
    ));
    assert!(h.manager.group(gid(1)).is_none());
    assert_eq!(h.manager.next_timeout_at(), None);
}

#[test]
fn removing_visible_notification_slides_older_one_into_view() {
    let mut h = harness(10, 2);
    for id in 1..=3 {
        h.add(1, 100, NOW_SECONDS, id);
    }
    h.settle();

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(1), nid(3), true, promise);
    assert!(done.try_recv().unwrap().is_ok());

    let updates = h.settle_updates();
    assert_eq!(updates.len(), 2);
    assert!(matches!(
        updates[0],
        NotificationUpdate::RemoveNotification { notification_id, total_count: 2, .. }
            if notification_id == nid(3)
    ));
    assert!(matches!(
        &updates[1],
        NotificationUpdate::AddNotification { notification, is_silent: true, .. }
            if notification.id == nid(1)
    ));
    assert!(h.manager.group(gid(1)).unwrap().hidden_notifications().is_empty());
}

#[test]
fn non_permanent_removal_can_be_restored() {
    let mut h = harness(10, 2);
    for id in 1..=2 {
        h.add(1, 100, NOW_SECONDS, id);
    }
    h.settle();

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(1), nid(2), false, promise);
    assert!(done.try_recv().unwrap().is_ok());
    let group = h.manager.group(gid(1)).unwrap();
    assert_eq!(group.total_count(), 1);
    assert_eq!(group.hidden_notifications().len(), 1);
    assert_eq!(
        h.settle_updates(),
        vec![NotificationUpdate::RemoveNotification {
            group_id: gid(1),
            total_count: 1,
            notification_id: nid(2),
        }]
    );

    let (promise, done) = promise_channel();
    h.manager.restore_notification(gid(1), nid(2), promise);
    assert!(done.try_recv().unwrap().is_ok());
    let updates = h.settle_updates();
    assert!(matches!(
        &updates[..],
        [NotificationUpdate::AddNotification { notification, total_count: 2, .. }]
            if notification.id == nid(2)
    ));

    let (promise, done) = promise_channel();
    h.manager.restore_notification(gid(1), nid(2), promise);
    assert!(matches!(
        done.try_recv().unwrap(),
        Err(Error::UnknownNotification { .. })
    ));
}

#[test]
fn removing_pending_notification_cancels_flush_and_drops_group() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(1), nid(1), true, promise);
    assert!(done.try_recv().unwrap().is_ok());

    assert_eq!(h.manager.next_timeout_at(), None);
    assert!(h.manager.group(gid(1)).is_none());
    assert!(h.settle().is_empty());
}

#[test]
fn removal_errors_resolve_the_promise() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    h.settle();

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(5), nid(1), true, promise);
    assert!(matches!(done.try_recv().unwrap(), Err(Error::UnknownGroup(g)) if g == gid(5)));

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(1), nid(9), true, promise);
    assert!(matches!(
        done.try_recv().unwrap(),
        Err(Error::UnknownNotification { .. })
    ));

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(1), nid(0), true, promise);
    assert!(matches!(
        done.try_recv().unwrap(),
        Err(Error::InvalidNotificationId)
    ));

    let (promise, done) = promise_channel();
    h.manager
        .remove_notification_group(gid(8), nid(1), MessageId(0), None, promise);
    assert!(matches!(done.try_recv().unwrap(), Err(Error::UnknownGroup(_))));
}

#[test]
fn add_then_remove_before_update_flush_delivers_nothing() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    h.advance(1_500);

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(1), nid(1), true, promise);
    assert!(done.try_recv().unwrap().is_ok());

    h.advance(50);
    assert!(drain_batches(&h.rx).is_empty());
    assert!(h.manager.group(gid(1)).is_none());
}

#[test]
fn group_count_change_reevaluates_active_set() {
    let mut h = harness(2, 10);
    h.add(1, 10, NOW_SECONDS, 1);
    h.settle();
    h.add(2, 20, NOW_SECONDS + 1, 2);
    h.settle();

    h.storage.put(GROUP_COUNT_MAX_OPTION, "1".to_string()).unwrap();
    h.manager.on_notification_group_count_max_changed();
    assert_eq!(h.manager.active_group_ids(), vec![gid(2)]);
    assert_eq!(
        h.settle_updates(),
        vec![NotificationUpdate::RemoveGroup {
            group_id: gid(1),
            dialog_id: DialogId(10),
            total_count: 1,
            removed_notification_ids: ids(&[1]),
        }]
    );

    h.storage.put(GROUP_COUNT_MAX_OPTION, "100".to_string()).unwrap();
    h.manager.on_notification_group_count_max_changed();
    assert_eq!(h.manager.limits().group_count_max, 25);
    let updates = h.settle_updates();
    assert!(matches!(
        &updates[..],
        [NotificationUpdate::AddGroup { group_id, .. }] if *group_id == gid(1)
    ));

    h.manager.on_notification_group_count_max_changed();
    assert!(h.settle().is_empty());
}

#[test]
fn group_size_change_shrinks_visible_window() {
    let mut h = harness(10, 3);
    for id in 1..=3 {
        h.add(1, 100, NOW_SECONDS, id);
    }
    h.settle();

    h.storage.put(GROUP_SIZE_MAX_OPTION, "1".to_string()).unwrap();
    h.manager.on_notification_group_size_max_changed();
    assert_eq!(
        h.settle_updates(),
        vec![NotificationUpdate::RemoveGroup {
            group_id: gid(1),
            dialog_id: DialogId(100),
            total_count: 3,
            removed_notification_ids: ids(&[1, 2]),
        }]
    );

    h.storage.put(GROUP_SIZE_MAX_OPTION, "2".to_string()).unwrap();
    h.manager.on_notification_group_size_max_changed();
    let updates = h.settle_updates();
    assert!(matches!(
        &updates[..],
        [NotificationUpdate::AddNotification { notification, is_silent: true, .. }]
            if notification.id == nid(2)
    ));
}

#[test]
fn notification_delay_stays_within_bounds() {
    let h = harness(10, 10);
    h.storage.put(CLOUD_DELAY_OPTION, "30000".to_string()).unwrap();
    h.storage.put(DEFAULT_DELAY_OPTION, "1500".to_string()).unwrap();
    let pending = |date: i32| PendingNotification {
        date,
        settings_dialog_id: DialogId(1),
        is_silent: false,
        id: nid(1),
        payload: message(1),
    };
    let upper = 1_500 + 30_000 + 300_000;

    let statuses = [
        OnlineStatus::default(),
        OnlineStatus {
            is_online_local: true,
            ..Default::default()
        },
        OnlineStatus {
            is_online_remote: true,
            ..Default::default()
        },
        OnlineStatus {
            was_online_remote: NOW_SECONDS as i64 - 10,
            was_online_local: NOW_SECONDS as i64 - 100,
            ..Default::default()
        },
    ];
    for status in statuses {
        h.env.set_online_status(status);
        for date in [0, NOW_SECONDS - 500, NOW_SECONDS - 2, NOW_SECONDS, NOW_SECONDS + 5] {
            let delay = h.manager.get_notification_delay_ms(DialogId(1), &pending(date));
            assert!((1..=upper).contains(&delay), "{status:?} {date} -> {delay}");
        }
    }

    h.env.set_online_status(OnlineStatus {
        is_online_remote: true,
        ..Default::default()
    });
    assert_eq!(
        h.manager
            .get_notification_delay_ms(DialogId(1), &pending(NOW_SECONDS)),
        30_000
    );
    assert_eq!(
        h.manager
            .get_notification_delay_ms(DialogId(1), &pending(NOW_SECONDS - 11)),
        20_000
    );

    h.env.set_online_status(OnlineStatus {
        is_online_local: true,
        is_online_remote: true,
        ..Default::default()
    });
    assert_eq!(
        h.manager
            .get_notification_delay_ms(DialogId(1), &pending(NOW_SECONDS)),
        1_500
    );

    h.env.set_local_only(DialogId(2));
    assert_eq!(
        h.manager
            .get_notification_delay_ms(DialogId(2), &pending(NOW_SECONDS)),
        1
    );
}

#[test]
fn identifiers_increase_and_survive_restart() {
    let env = Arc::new(ManualEnvironment::new(START_MS));
    let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
    let (tx, _rx) = crossbeam_channel::unbounded::<UpdateBatch<NotificationType>>();
    let options = || NotificationManagerOptions::<NotificationType> {
        environment: env.clone(),
        sink: Arc::new(tx.clone()),
        storage: Some(storage.clone()),
    };

    let mut manager = NotificationManager::new(options());
    assert_eq!(manager.get_next_notification_id(), nid(0));
    manager.start();
    assert_eq!(manager.get_next_notification_id(), nid(1));
    assert_eq!(manager.get_next_notification_id(), nid(2));
    assert_eq!(manager.get_next_notification_group_id(), gid(1));
    assert_eq!(manager.get_max_notification_id(), nid(2));
    manager.stop();

    let mut restarted = NotificationManager::new(options());
    restarted.start();
    assert_eq!(restarted.get_max_notification_id(), nid(2));
    assert_eq!(restarted.get_next_notification_id(), nid(3));
    assert_eq!(restarted.get_next_notification_group_id(), gid(2));
}

#[test]
#[should_panic(expected = "notification id space exhausted")]
fn identifier_overflow_is_fatal() {
    let h = harness(10, 10);
    h.storage
        .put("notification_id_current", i32::MAX.to_string())
        .unwrap();
    let (tx, _rx) = crossbeam_channel::unbounded::<UpdateBatch<NotificationType>>();
    let mut manager = NotificationManager::new(NotificationManagerOptions::<NotificationType> {
        environment: h.env.clone(),
        sink: Arc::new(tx),
        storage: Some(h.storage.clone()),
    });
    manager.start();
    manager.get_next_notification_id();
}

#[test]
fn calls_before_start_are_dropped() {
    let env = Arc::new(ManualEnvironment::new(START_MS));
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut manager: NotificationManager = NotificationManager::new(NotificationManagerOptions::<NotificationType> {
        environment: env,
        sink: Arc::new(tx),
        storage: None,
    });
    manager.add_notification(
        gid(1),
        DialogId(1),
        NOW_SECONDS,
        DialogId(1),
        false,
        nid(1),
        message(1),
    );
    assert!(manager.group(gid(1)).is_none());

    let (promise, done) = promise_channel();
    manager.remove_notification(gid(1), nid(1), true, promise);
    assert!(done.try_recv().unwrap().is_ok());
    assert!(drain_batches(&rx).is_empty());
}

#[test]
fn updates_are_held_during_sync() {
    let mut h = harness(10, 10);
    h.manager.before_sync();
    h.add(1, 100, NOW_SECONDS, 1);
    h.advance(1_500);
    h.advance(50);
    assert!(drain_batches(&h.rx).is_empty());

    h.manager.after_sync();
    h.advance(50);
    assert_eq!(drain_batches(&h.rx).len(), 1);
}

#[test]
fn stop_delivers_everything_buffered() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    h.manager.stop();

    let batches = drain_batches(&h.rx);
    assert_eq!(batches.len(), 1);
    assert!(matches!(
        &batches[0].updates[..],
        [NotificationUpdate::AddGroup { .. }]
    ));
    assert!(h.manager.is_disabled());
    assert!(h.manager.group(gid(1)).is_none());
}

#[test]
fn removal_after_regrouping_in_one_window_stays_removed() {
    let mut h = harness(1, 10);
    h.add(1, 10, NOW_SECONDS, 1);
    let mut view: HashMap<NotificationGroupId, Vec<NotificationId>> = HashMap::new();
    for update in h.settle_updates() {
        apply_to_view(&mut view, &update);
    }

    h.add(1, 10, NOW_SECONDS, 2);
    h.manager.flush_pending_notifications(gid(1));
    h.add(2, 20, NOW_SECONDS + 1, 3);
    h.manager.flush_pending_notifications(gid(2));
    assert_eq!(h.manager.active_group_ids(), vec![gid(2)]);

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(2), nid(3), true, promise);
    assert!(done.try_recv().unwrap().is_ok());
    assert_eq!(h.manager.active_group_ids(), vec![gid(1)]);

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(1), nid(2), true, promise);
    assert!(done.try_recv().unwrap().is_ok());

    h.advance(50);
    let batches = drain_batches(&h.rx);
    assert!(batches.iter().all(|batch| batch.group_id == gid(1)));
    for batch in &batches {
        for update in &batch.updates {
            apply_to_view(&mut view, update);
        }
    }

    let shown: Vec<NotificationId> = h
        .manager
        .visible_notifications(gid(1))
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(shown, ids(&[1]));
    assert_eq!(view[&gid(1)], shown);
}

#[test]
fn restoring_the_only_notification_revives_the_group() {
    let mut h = harness(10, 10);
    h.add(1, 100, NOW_SECONDS, 1);
    h.settle();

    let (promise, done) = promise_channel();
    h.manager.remove_notification(gid(1), nid(1), false, promise);
    assert!(done.try_recv().unwrap().is_ok());
    assert!(matches!(
        &h.settle_updates()[..],
        [NotificationUpdate::RemoveGroup { total_count: 0, .. }]
    ));
    let group = h.manager.group(gid(1)).unwrap();
    assert_eq!(group.hidden_notifications().len(), 1);
    assert!(h.manager.active_group_ids().is_empty());

    let (promise, done) = promise_channel();
    h.manager.restore_notification(gid(1), nid(1), promise);
    assert!(done.try_recv().unwrap().is_ok());
    let updates = h.settle_updates();
    assert!(matches!(
        &updates[..],
        [NotificationUpdate::AddGroup { total_count: 1, notifications, .. }]
            if notifications.len() == 1 && notifications[0].id == nid(1)
    ));
    assert_eq!(h.manager.active_group_ids(), vec![gid(1)]);
}

#[test]
fn out_of_range_counters_never_reuse_identifiers() {
    let h = harness(10, 10);
    h.storage
        .put("notification_id_current", (i32::MAX as i64 + 2).to_string())
        .unwrap();
    h.storage
        .put("notification_group_id_current", "-3".to_string())
        .unwrap();
    let (tx, _rx) = crossbeam_channel::unbounded::<UpdateBatch<NotificationType>>();
    let mut manager = NotificationManager::new(NotificationManagerOptions::<NotificationType> {
        environment: h.env.clone(),
        sink: Arc::new(tx),
        storage: Some(h.storage.clone()),
    });
    manager.start();

    assert_eq!(manager.get_max_notification_id(), nid(i32::MAX));
    assert_eq!(manager.get_next_notification_group_id(), gid(1));
}
