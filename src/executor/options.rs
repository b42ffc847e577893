use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::metrics::ExecutorMetrics;
use crate::primitives::concurrency::RampOptions;
use crate::types::{ExecutorError, Result};

/// Default number of lanes.
pub const DEFAULT_LANE_COUNT: usize = 32;
/// Default per-lane mailbox capacity, in sub-batches.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1000;
/// Default ceiling on outstanding mutation bytes.
pub const DEFAULT_MAX_PENDING_BYTES: i64 = 64 << 20;

/// How lanes treat transient apply conflicts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Stop retrying an edge once its context is cancelled.
    ///
    /// Off by default: transient conflicts are retried until they clear.
    pub abort_on_cancel: bool,
}

/// Configuration supplied when starting an [`super::Executor`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorOptions {
    /// Number of lanes (and lane threads).
    pub lane_count: usize,
    /// Maximum queued sub-batches per lane before submitters block.
    pub mailbox_capacity: usize,
    /// Outstanding-bytes ceiling enforced by the ramp meter.
    pub max_pending_bytes: i64,
    /// Ramp meter tuning.
    pub ramp: RampOptions,
    /// Transient conflict handling.
    pub retry: RetryPolicy,
    /// Optional metrics sink; [`super::default_metrics`] when unset.
    #[serde(skip)]
    pub metrics: Option<Arc<dyn ExecutorMetrics>>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            lane_count: DEFAULT_LANE_COUNT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            ramp: RampOptions::default(),
            retry: RetryPolicy::default(),
            metrics: None,
        }
    }
}

impl std::fmt::Debug for ExecutorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("lane_count", &self.lane_count)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("max_pending_bytes", &self.max_pending_bytes)
            .field("ramp", &self.ramp)
            .field("retry", &self.retry)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl ExecutorOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of lanes.
    pub fn lane_count(mut self, lanes: usize) -> Self {
        self.lane_count = lanes;
        self
    }

    /// Sets the per-lane mailbox capacity.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Sets the outstanding-bytes ceiling.
    pub fn max_pending_bytes(mut self, bytes: i64) -> Self {
        self.max_pending_bytes = bytes;
        self
    }

    /// Sets the ramp meter tuning.
    pub fn ramp(mut self, ramp: RampOptions) -> Self {
        self.ramp = ramp;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn ExecutorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Parses options from TOML; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let opts: Self =
            toml::from_str(raw).map_err(|err| ExecutorError::Config(err.to_string()))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reads and parses a TOML options file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| ExecutorError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Checks that the options describe a usable executor.
    pub fn validate(&self) -> Result<()> {
        if self.lane_count == 0 {
            return Err(ExecutorError::Invalid("lane_count must be positive"));
        }
        if self.lane_count > u32::MAX as usize {
            return Err(ExecutorError::Invalid("lane_count too large"));
        }
        if self.mailbox_capacity == 0 {
            return Err(ExecutorError::Invalid("mailbox_capacity must be positive"));
        }
        if self.max_pending_bytes <= 0 {
            return Err(ExecutorError::Invalid("max_pending_bytes must be positive"));
        }
        Ok(())
    }
}
