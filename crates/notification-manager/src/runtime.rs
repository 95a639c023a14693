use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    DialogId, Error, MessageId, NotificationGroupId, NotificationId, NotificationManager,
    NotificationPayload, Result, UpdateBatch, UpdateSink,
};

impl<P: NotificationPayload> UpdateSink<P> for mpsc::UnboundedSender<UpdateBatch<P>> {
    fn send_updates(&self, batch: UpdateBatch<P>) -> Result<()> {
        self.send(batch)
            .map_err(|_| Error::Sink("update receiver dropped".to_string()))
    }
}

enum Command<P> {
    NextNotificationId(oneshot::Sender<NotificationId>),
    NextGroupId(oneshot::Sender<NotificationGroupId>),
    Add {
        group_id: NotificationGroupId,
        dialog_id: DialogId,
        date: i32,
        settings_dialog_id: DialogId,
        is_silent: bool,
        notification_id: NotificationId,
        payload: P,
    },
    Edit {
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        payload: P,
    },
    Remove {
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        is_permanent: bool,
        done: oneshot::Sender<Result<()>>,
    },
    Restore {
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        done: oneshot::Sender<Result<()>>,
    },
    RemoveGroup {
        group_id: NotificationGroupId,
        max_notification_id: NotificationId,
        max_message_id: MessageId,
        new_total_count: Option<i32>,
        done: oneshot::Sender<Result<()>>,
    },
    Flush(NotificationGroupId),
    BeforeSync,
    AfterSync,
    OptionsChanged,
}

/// Cloneable front end to a manager running on its own tokio task.
pub struct NotificationHandle<P> {
    tx: mpsc::UnboundedSender<Command<P>>,
}

impl<P> Clone for NotificationHandle<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P: NotificationPayload> NotificationHandle<P> {
    fn send(&self, command: Command<P>) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::Stopped)
    }

    pub async fn next_notification_id(&self) -> Result<NotificationId> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::NextNotificationId(tx))?;
        rx.await.map_err(|_| Error::Stopped)
    }

    pub async fn next_group_id(&self) -> Result<NotificationGroupId> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::NextGroupId(tx))?;
        rx.await.map_err(|_| Error::Stopped)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_notification(
        &self,
        group_id: NotificationGroupId,
        dialog_id: DialogId,
        date: i32,
        settings_dialog_id: DialogId,
        is_silent: bool,
        notification_id: NotificationId,
        payload: P,
    ) -> Result<()> {
        self.send(Command::Add {
            group_id,
            dialog_id,
            date,
            settings_dialog_id,
            is_silent,
            notification_id,
            payload,
        })
    }

    pub fn edit_notification(
        &self,
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        payload: P,
    ) -> Result<()> {
        self.send(Command::Edit {
            group_id,
            notification_id,
            payload,
        })
    }

    pub async fn remove_notification(
        &self,
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        is_permanent: bool,
    ) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Remove {
            group_id,
            notification_id,
            is_permanent,
            done,
        })?;
        rx.await.map_err(|_| Error::Stopped)?
    }

    pub async fn restore_notification(
        &self,
        group_id: NotificationGroupId,
        notification_id: NotificationId,
    ) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Restore {
            group_id,
            notification_id,
            done,
        })?;
        rx.await.map_err(|_| Error::Stopped)?
    }

    pub async fn remove_notification_group(
        &self,
        group_id: NotificationGroupId,
        max_notification_id: NotificationId,
        max_message_id: MessageId,
        new_total_count: Option<i32>,
    ) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::RemoveGroup {
            group_id,
            max_notification_id,
            max_message_id,
            new_total_count,
            done,
        })?;
        rx.await.map_err(|_| Error::Stopped)?
    }

    /// Materializes the group's pending notifications without waiting for
    /// its timer.
    pub fn flush_pending_notifications(&self, group_id: NotificationGroupId) -> Result<()> {
        self.send(Command::Flush(group_id))
    }

    pub fn before_sync(&self) -> Result<()> {
        self.send(Command::BeforeSync)
    }

    pub fn after_sync(&self) -> Result<()> {
        self.send(Command::AfterSync)
    }

    /// Re-reads every option from storage.
    pub fn options_changed(&self) -> Result<()> {
        self.send(Command::OptionsChanged)
    }
}

/// Serializes all calls and timer firings for one manager.
pub struct NotificationRuntime;

impl NotificationRuntime {
    /// Starts `manager` on a new task. Dropping every handle stops it after
    /// delivering buffered updates.
    pub fn spawn<P: NotificationPayload>(
        mut manager: NotificationManager<P>,
    ) -> (NotificationHandle<P>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command<P>>();
        let task = tokio::spawn(async move {
            manager.start();
            loop {
                let sleep_for = manager
                    .next_timeout_at()
                    .map(|at| Duration::from_millis(at.saturating_sub(manager.now_ms())));
                let command = match sleep_for {
                    Some(duration) => tokio::select! {
                        command = rx.recv() => command.map(Some),
                        _ = tokio::time::sleep(duration) => Some(None),
                    },
                    None => rx.recv().await.map(Some),
                };
                match command {
                    Some(Some(command)) => apply(&mut manager, command),
                    Some(None) => {}
                    None => break,
                }
                manager.run_timeouts();
            }
            debug!("notification runtime shutting down");
            manager.stop();
        });
        (NotificationHandle { tx }, task)
    }
}

fn apply<P: NotificationPayload>(manager: &mut NotificationManager<P>, command: Command<P>) {
    match command {
        Command::NextNotificationId(reply) => {
            let _ = reply.send(manager.get_next_notification_id());
        }
        Command::NextGroupId(reply) => {
            let _ = reply.send(manager.get_next_notification_group_id());
        }
        Command::Add {
            group_id,
            dialog_id,
            date,
            settings_dialog_id,
            is_silent,
            notification_id,
            payload,
        } => manager.add_notification(
            group_id,
            dialog_id,
            date,
            settings_dialog_id,
            is_silent,
            notification_id,
            payload,
        ),
        Command::Edit {
            group_id,
            notification_id,
            payload,
        } => manager.edit_notification(group_id, notification_id, payload),
        Command::Remove {
            group_id,
            notification_id,
            is_permanent,
            done,
        } => manager.remove_notification(
            group_id,
            notification_id,
            is_permanent,
            Box::new(move |result| {
                let _ = done.send(result);
            }),
        ),
        Command::Restore {
            group_id,
            notification_id,
            done,
        } => manager.restore_notification(
            group_id,
            notification_id,
            Box::new(move |result| {
                let _ = done.send(result);
            }),
        ),
        Command::RemoveGroup {
            group_id,
            max_notification_id,
            max_message_id,
            new_total_count,
            done,
        } => manager.remove_notification_group(
            group_id,
            max_notification_id,
            max_message_id,
            new_total_count,
            Box::new(move |result| {
                let _ = done.send(result);
            }),
        ),
        Command::Flush(group_id) => manager.flush_pending_notifications(group_id),
        Command::BeforeSync => manager.before_sync(),
        Command::AfterSync => manager.after_sync(),
        Command::OptionsChanged => {
            manager.on_notification_group_count_max_changed();
            manager.on_notification_group_size_max_changed();
            manager.on_online_cloud_timeout_changed();
            manager.on_notification_cloud_delay_changed();
            manager.on_notification_default_delay_changed();
        }
    }
}
