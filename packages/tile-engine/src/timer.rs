//! Tile load timing
//!
//! Each load records checkpoints with [`LoadTimer::mark`]; the interval since
//! the previous checkpoint is attributed to the new label. Per-load timers are
//! merged into the loader's shared timer and reported through `tracing`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingStats {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl TimingStats {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }

    fn merge(&mut self, other: &TimingStats) {
        self.count += other.count;
        self.total += other.total;
        self.max = self.max.max(other.max);
    }

    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadTimer {
    last: Instant,
    stats: BTreeMap<String, TimingStats>,
}

impl Default for LoadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            stats: BTreeMap::new(),
        }
    }

    /// Attribute the time since the previous mark to `label`
    pub fn mark(&mut self, label: &str) {
        let now = Instant::now();
        self.mark_elapsed(label, now - self.last);
        self.last = now;
    }

    fn mark_elapsed(&mut self, label: &str, elapsed: Duration) {
        self.stats.entry(label.to_string()).or_default().record(elapsed);
    }

    /// Fold another timer's statistics into this one
    pub fn merge(&mut self, other: &LoadTimer) {
        for (label, stats) in &other.stats {
            self.stats.entry(label.clone()).or_default().merge(stats);
        }
    }

    pub fn stats(&self) -> &BTreeMap<String, TimingStats> {
        &self.stats
    }

    pub fn report(&self) {
        for (label, stats) in &self.stats {
            tracing::info!(
                label = %label,
                count = stats.count,
                mean_ms = stats.mean().as_secs_f64() * 1000.0,
                max_ms = stats.max.as_secs_f64() * 1000.0,
                "tile load timing"
            );
        }
    }
}
