use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use notification_manager::sink::test_utils::{drain_batches, ManualEnvironment};
use notification_manager::{
    promise_channel, DialogId, InMemoryStorage, MessageId, NotificationEnvironment,
    NotificationGroupId, NotificationId, NotificationLimits, NotificationManager,
    NotificationManagerOptions, NotificationType, OnlineStatus, StorageAdapter, UpdateBatch,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A timed list of manager operations replayed on a virtual clock.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Virtual clock value (ms) the replay starts at.
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,
    #[serde(default)]
    pub limits: NotificationLimits,
    pub steps: Vec<Step>,
}

fn default_start_ms() -> u64 {
    1_600_000_000_000
}

fn default_is_permanent() -> bool {
    true
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse scenario")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Offset from the scenario start.
    pub at_ms: u64,
    #[serde(flatten)]
    pub op: Op,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Op {
    #[serde(rename_all = "camelCase")]
    Add {
        group_id: NotificationGroupId,
        dialog_id: DialogId,
        /// Unix seconds; defaults to the virtual clock.
        date: Option<i32>,
        settings_dialog_id: Option<DialogId>,
        #[serde(default)]
        is_silent: bool,
        /// Allocated from the manager when omitted.
        notification_id: Option<NotificationId>,
        payload: NotificationType,
    },
    #[serde(rename_all = "camelCase")]
    Edit {
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        payload: NotificationType,
    },
    #[serde(rename_all = "camelCase")]
    Remove {
        group_id: NotificationGroupId,
        notification_id: NotificationId,
        #[serde(default = "default_is_permanent")]
        is_permanent: bool,
    },
    #[serde(rename_all = "camelCase")]
    Restore {
        group_id: NotificationGroupId,
        notification_id: NotificationId,
    },
    #[serde(rename_all = "camelCase")]
    RemoveGroup {
        group_id: NotificationGroupId,
        #[serde(default)]
        max_notification_id: NotificationId,
        #[serde(default)]
        max_message_id: MessageId,
        total_count: Option<i32>,
    },
    #[serde(rename_all = "camelCase")]
    Flush { group_id: NotificationGroupId },
    BeforeSync,
    AfterSync,
    /// Writes a raw option and signals every option change.
    SetOption { key: String, value: String },
    SetOnline { status: OnlineStatus },
    #[serde(rename_all = "camelCase")]
    LocalOnly { dialog_id: DialogId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Emitted {
    /// Virtual time since the scenario start.
    pub at_ms: u64,
    pub batch: UpdateBatch<NotificationType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub step: usize,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub emitted: Vec<Emitted>,
    pub failures: Vec<Failure>,
}

/// Drives one manager through a scenario.
pub struct Replay {
    env: Arc<ManualEnvironment>,
    storage: Arc<InMemoryStorage>,
    manager: NotificationManager,
    rx: Receiver<UpdateBatch<NotificationType>>,
    start_ms: u64,
    report: Report,
}

impl Replay {
    pub fn new(scenario: &Scenario) -> Result<Self> {
        let env = Arc::new(ManualEnvironment::new(scenario.start_ms));
        let storage = Arc::new(InMemoryStorage::new());
        scenario
            .limits
            .clamped()
            .store(storage.as_ref())
            .context("Failed to store limits")?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut manager = NotificationManager::new(NotificationManagerOptions::<NotificationType> {
            environment: env.clone(),
            sink: Arc::new(tx),
            storage: Some(storage.clone()),
        });
        manager.start();
        Ok(Self {
            env,
            storage,
            manager,
            rx,
            start_ms: scenario.start_ms,
            report: Report::default(),
        })
    }

    pub fn run(mut self, steps: &[Step]) -> Result<Report> {
        let mut order: Vec<(usize, &Step)> = steps.iter().enumerate().collect();
        order.sort_by_key(|(_, step)| step.at_ms);

        for (index, step) in order {
            self.advance_to(self.start_ms + step.at_ms);
            debug!(step = index, op = ?step.op, "apply step");
            self.apply(index, &step.op)?;
            self.collect();
        }
        while let Some(at) = self.manager.next_timeout_at() {
            self.advance_to(at);
        }
        self.manager.stop();
        self.collect();

        info!(
            batches = self.report.emitted.len(),
            failures = self.report.failures.len(),
            "replay finished"
        );
        Ok(self.report)
    }

    /// Moves the virtual clock to `target`, firing every deadline on the way.
    fn advance_to(&mut self, target: u64) {
        while let Some(at) = self.manager.next_timeout_at().filter(|at| *at <= target) {
            if at > self.env.now_ms() {
                self.env.set_now_ms(at);
            }
            self.manager.run_timeouts();
            self.collect();
        }
        if target > self.env.now_ms() {
            self.env.set_now_ms(target);
        }
    }

    fn collect(&mut self) {
        let at_ms = self.env.now_ms() - self.start_ms;
        for batch in drain_batches(&self.rx) {
            self.report.emitted.push(Emitted { at_ms, batch });
        }
    }

    fn apply(&mut self, index: usize, op: &Op) -> Result<()> {
        match op.clone() {
            Op::Add {
                group_id,
                dialog_id,
                date,
                settings_dialog_id,
                is_silent,
                notification_id,
                payload,
            } => {
                let notification_id =
                    notification_id.unwrap_or_else(|| self.manager.get_next_notification_id());
                let date = date.unwrap_or((self.env.now_ms() / 1000) as i32);
                self.manager.add_notification(
                    group_id,
                    dialog_id,
                    date,
                    settings_dialog_id.unwrap_or(dialog_id),
                    is_silent,
                    notification_id,
                    payload,
                );
            }
            Op::Edit {
                group_id,
                notification_id,
                payload,
            } => self
                .manager
                .edit_notification(group_id, notification_id, payload),
            Op::Remove {
                group_id,
                notification_id,
                is_permanent,
            } => {
                let (promise, done) = promise_channel();
                self.manager
                    .remove_notification(group_id, notification_id, is_permanent, promise);
                self.record(index, done);
            }
            Op::Restore {
                group_id,
                notification_id,
            } => {
                let (promise, done) = promise_channel();
                self.manager
                    .restore_notification(group_id, notification_id, promise);
                self.record(index, done);
            }
            Op::RemoveGroup {
                group_id,
                max_notification_id,
                max_message_id,
                total_count,
            } => {
                let (promise, done) = promise_channel();
                self.manager.remove_notification_group(
                    group_id,
                    max_notification_id,
                    max_message_id,
                    total_count,
                    promise,
                );
                self.record(index, done);
            }
            Op::Flush { group_id } => self.manager.flush_pending_notifications(group_id),
            Op::BeforeSync => self.manager.before_sync(),
            Op::AfterSync => self.manager.after_sync(),
            Op::SetOption { key, value } => {
                self.storage
                    .put(&key, value)
                    .with_context(|| format!("Failed to set option {key}"))?;
                self.manager.on_notification_group_count_max_changed();
                self.manager.on_notification_group_size_max_changed();
                self.manager.on_online_cloud_timeout_changed();
                self.manager.on_notification_cloud_delay_changed();
                self.manager.on_notification_default_delay_changed();
            }
            Op::SetOnline { status } => self.env.set_online_status(status),
            Op::LocalOnly { dialog_id } => self.env.set_local_only(dialog_id),
        }
        Ok(())
    }

    fn record(&mut self, step: usize, done: Receiver<notification_manager::Result<()>>) {
        let outcome = done
            .try_recv()
            .unwrap_or(Err(notification_manager::Error::Stopped));
        if let Err(e) = outcome {
            self.report.failures.push(Failure {
                step,
                error: e.to_string(),
            });
        }
    }
}
