use std::sync::atomic::{AtomicI64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, trace};

/// Tuning knobs for [`RampMeter`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampOptions {
    /// Fraction of the ceiling above which callers start receiving a proportional pause.
    pub ramp_start_ratio: f64,
    /// First sleep used while over the ceiling, and the upper bound of the proportional pause.
    pub poll_interval_ms: u64,
    /// Upper bound for the escalating sleep while over the ceiling.
    pub max_poll_interval_ms: u64,
    /// Callers held longer than this are logged.
    pub slow_admission_ms: u64,
}

impl Default for RampOptions {
    fn default() -> Self {
        Self {
            ramp_start_ratio: 0.9,
            poll_interval_ms: 2,
            max_poll_interval_ms: 64,
            slow_admission_ms: 1_000,
        }
    }
}

/// Soft admission valve over an outstanding-bytes counter.
///
/// The meter never rejects: callers are only slowed down. Below the ramp start
/// admission is immediate, between the ramp start and the ceiling a single
/// proportional pause is applied, and above the ceiling the caller sleeps with
/// a doubling interval until the counter falls back under the ceiling.
#[derive(Clone, Debug)]
pub struct RampMeter {
    ceiling: i64,
    ramp_start: i64,
    poll_interval: Duration,
    max_poll_interval: Duration,
    slow_admission: Duration,
}

impl RampMeter {
    /// Creates a meter enforcing `ceiling` bytes.
    pub fn new(ceiling: i64, opts: RampOptions) -> Self {
        let ceiling = ceiling.max(1);
        let ratio = if opts.ramp_start_ratio.is_finite() {
            opts.ramp_start_ratio.clamp(0.0, 1.0)
        } else {
            1.0
        };
        let poll_interval = Duration::from_millis(opts.poll_interval_ms.max(1));
        let max_poll_interval =
            Duration::from_millis(opts.max_poll_interval_ms).max(poll_interval);
        Self {
            ceiling,
            ramp_start: (ceiling as f64 * ratio) as i64,
            poll_interval,
            max_poll_interval,
            slow_admission: Duration::from_millis(opts.slow_admission_ms),
        }
    }

    /// Ceiling in bytes.
    pub fn ceiling(&self) -> i64 {
        self.ceiling
    }

    /// Counter value above which the proportional pause kicks in.
    pub fn ramp_start(&self) -> i64 {
        self.ramp_start
    }

    /// Threshold above which a completed admission is considered slow.
    pub fn slow_admission(&self) -> Duration {
        self.slow_admission
    }

    /// Single pause applied for a given counter value.
    ///
    /// Zero at or below the ramp start, growing linearly to the poll interval
    /// at the ceiling, and equal to the poll interval above it.
    pub fn pressure_delay(&self, outstanding: i64) -> Duration {
        if outstanding <= self.ramp_start {
            return Duration::ZERO;
        }
        if outstanding >= self.ceiling || self.ceiling == self.ramp_start {
            return self.poll_interval;
        }
        let span = (self.ceiling - self.ramp_start) as u128;
        let over = (outstanding - self.ramp_start) as u128;
        let nanos = self.poll_interval.as_nanos() * over / span;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Holds the caller until `counter` is at or below the ceiling.
    ///
    /// Returns how long the caller was held. `tag` names the admission point in logs.
    pub fn admit(&self, counter: &AtomicI64, tag: &'static str) -> Duration {
        let start = Instant::now();
        let outstanding = counter.load(Ordering::Relaxed);
        if outstanding <= self.ramp_start {
            return Duration::ZERO;
        }
        if outstanding <= self.ceiling {
            let pause = self.pressure_delay(outstanding);
            trace!(tag, outstanding, pause_us = pause.as_micros() as u64, "ramp.pressure");
            if !pause.is_zero() {
                thread::sleep(pause);
            }
            return start.elapsed();
        }
        let mut interval = self.poll_interval;
        while counter.load(Ordering::Relaxed) > self.ceiling {
            thread::sleep(interval);
            interval = (interval * 2).min(self.max_poll_interval);
        }
        let held = start.elapsed();
        if held >= self.slow_admission {
            info!(
                tag,
                held_ms = held.as_millis() as u64,
                ceiling = self.ceiling,
                "ramp.blocked"
            );
        }
        held
    }
}
