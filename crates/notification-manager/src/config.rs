use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    Result, StorageAdapter, DEFAULT_DEFAULT_DELAY_MS, DEFAULT_GROUP_COUNT_MAX,
    DEFAULT_GROUP_SIZE_MAX, DEFAULT_ONLINE_CLOUD_DELAY_MS, DEFAULT_ONLINE_CLOUD_TIMEOUT_MS,
    EXTRA_GROUP_SIZE, MAX_NOTIFICATION_GROUP_COUNT_MAX, MAX_NOTIFICATION_GROUP_SIZE_MAX,
    MIN_NOTIFICATION_GROUP_COUNT_MAX, MIN_NOTIFICATION_GROUP_SIZE_MAX,
};

pub const GROUP_COUNT_MAX_OPTION: &str = "notification_group_count_max";
pub const GROUP_SIZE_MAX_OPTION: &str = "notification_group_size_max";
pub const ONLINE_CLOUD_TIMEOUT_OPTION: &str = "online_cloud_timeout_ms";
pub const CLOUD_DELAY_OPTION: &str = "notification_cloud_delay_ms";
pub const DEFAULT_DELAY_OPTION: &str = "notification_default_delay_ms";

pub(crate) const CURRENT_NOTIFICATION_ID_KEY: &str = "notification_id_current";
pub(crate) const CURRENT_NOTIFICATION_GROUP_ID_KEY: &str = "notification_group_id_current";

/// Effective limits and delays, always within their valid ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationLimits {
    pub group_count_max: usize,
    pub group_size_max: usize,
    pub online_cloud_timeout_ms: i32,
    pub cloud_delay_ms: i32,
    pub default_delay_ms: i32,
}

impl Default for NotificationLimits {
    fn default() -> Self {
        Self {
            group_count_max: DEFAULT_GROUP_COUNT_MAX as usize,
            group_size_max: DEFAULT_GROUP_SIZE_MAX as usize,
            online_cloud_timeout_ms: DEFAULT_ONLINE_CLOUD_TIMEOUT_MS,
            cloud_delay_ms: DEFAULT_ONLINE_CLOUD_DELAY_MS,
            default_delay_ms: DEFAULT_DEFAULT_DELAY_MS,
        }
    }
}

impl NotificationLimits {
    /// Materialized notifications kept per group.
    pub fn keep_group_size(&self) -> usize {
        self.group_size_max + EXTRA_GROUP_SIZE
    }

    /// Clamps every field into range.
    pub fn clamped(self) -> Self {
        Self {
            group_count_max: clamp_group_count_max(self.group_count_max as i64),
            group_size_max: clamp_group_size_max(self.group_size_max as i64),
            online_cloud_timeout_ms: clamp_delay(self.online_cloud_timeout_ms as i64),
            cloud_delay_ms: clamp_delay(self.cloud_delay_ms as i64),
            default_delay_ms: clamp_delay(self.default_delay_ms as i64),
        }
    }

    /// Writes these limits as raw options so the change signals pick them up.
    pub fn store(&self, storage: &dyn StorageAdapter) -> Result<()> {
        storage.put(GROUP_COUNT_MAX_OPTION, self.group_count_max.to_string())?;
        storage.put(GROUP_SIZE_MAX_OPTION, self.group_size_max.to_string())?;
        storage.put(
            ONLINE_CLOUD_TIMEOUT_OPTION,
            self.online_cloud_timeout_ms.to_string(),
        )?;
        storage.put(CLOUD_DELAY_OPTION, self.cloud_delay_ms.to_string())?;
        storage.put(DEFAULT_DELAY_OPTION, self.default_delay_ms.to_string())?;
        Ok(())
    }
}

pub fn clamp_group_count_max(value: i64) -> usize {
    value.clamp(
        MIN_NOTIFICATION_GROUP_COUNT_MAX as i64,
        MAX_NOTIFICATION_GROUP_COUNT_MAX as i64,
    ) as usize
}

pub fn clamp_group_size_max(value: i64) -> usize {
    value.clamp(
        MIN_NOTIFICATION_GROUP_SIZE_MAX as i64,
        MAX_NOTIFICATION_GROUP_SIZE_MAX as i64,
    ) as usize
}

pub fn clamp_delay(value: i64) -> i32 {
    value.clamp(0, i32::MAX as i64) as i32
}

/// Reads an integer option, falling back to `default` when it is missing or
/// does not parse.
pub(crate) fn read_option(storage: &dyn StorageAdapter, key: &str, default: i64) -> i64 {
    match storage.get(key) {
        Ok(Some(raw)) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
            warn!(option = key, value = %raw, "ignoring unparseable option");
            default
        }),
        Ok(None) => default,
        Err(e) => {
            warn!(option = key, error = %e, "failed to read option");
            default
        }
    }
}
