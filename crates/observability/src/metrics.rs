//! Capture metrics
//!
//! Prometheus-facing recorders (through the `metrics` facade) and an
//! in-memory aggregator for the end-of-run summary.

use std::collections::BTreeMap;
use std::fmt;

use contracts::{CaptureOutcome, CaptureStatus, TriggerSource};
use metrics::{counter, gauge, histogram};

/// Record a trigger accepted for capture
pub fn record_trigger_received(source: &TriggerSource) {
    counter!("pixtrigger_triggers_total", "source" => source.label()).increment(1);
}

/// Record a position sample stored in the cache
pub fn record_position_update() {
    counter!("pixtrigger_position_updates_total").increment(1);
}

/// Record the current sequence counter value
pub fn record_sequence(value: u64) {
    gauge!("pixtrigger_sequence").set(value as f64);
}

/// Record one handled trigger
///
/// # Example
///
/// ```ignore
/// let outcome = outcomes.recv().await?;
/// observability::record_capture_outcome(&outcome);
/// ```
pub fn record_capture_outcome(outcome: &CaptureOutcome) {
    counter!("pixtrigger_captures_total", "status" => outcome.status.label()).increment(1);
    histogram!("pixtrigger_capture_duration_ms").record(outcome.duration.as_secs_f64() * 1000.0);

    if let Some(age) = outcome.position_age {
        histogram!("pixtrigger_position_age_ms").record(age.as_secs_f64() * 1000.0);
    }
    if !outcome.position_known {
        counter!("pixtrigger_captures_without_position_total").increment(1);
    }
    record_sequence(outcome.sequence + 1);
}

/// Capture summary aggregator
///
/// Aggregates outcomes in memory for the summary printed at shutdown.
#[derive(Debug, Clone, Default)]
pub struct CaptureSummaryAggregator {
    /// Handled triggers
    pub total: u64,

    pub tagged: u64,
    pub tag_skipped: u64,
    pub tag_failed: u64,
    pub capture_failed: u64,

    /// Captures tagged with the unknown-position sentinel
    pub without_position: u64,

    /// Capture + tag duration (ms)
    pub duration_stats: RunningStats,

    /// Position age at trigger (ms)
    pub position_age_stats: RunningStats,

    /// Triggers per source label
    pub by_source: BTreeMap<&'static str, u64>,

    /// Last sequence value handled
    pub last_sequence: Option<u64>,
}

impl CaptureSummaryAggregator {
    /// Create new aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome in
    pub fn update(&mut self, outcome: &CaptureOutcome) {
        self.total += 1;
        match outcome.status {
            CaptureStatus::Tagged => self.tagged += 1,
            CaptureStatus::TagSkipped => self.tag_skipped += 1,
            CaptureStatus::TagFailed(_) => self.tag_failed += 1,
            CaptureStatus::CaptureFailed(_) => self.capture_failed += 1,
        }
        if !outcome.position_known {
            self.without_position += 1;
        }

        self.duration_stats.push(outcome.duration.as_secs_f64() * 1000.0);
        if let Some(age) = outcome.position_age {
            self.position_age_stats.push(age.as_secs_f64() * 1000.0);
        }
        *self.by_source.entry(outcome.source.label()).or_insert(0) += 1;
        self.last_sequence = Some(outcome.sequence);
    }

    /// Generate summary report
    pub fn summary(&self) -> CaptureSummary {
        let captured = self.tagged + self.tag_skipped + self.tag_failed;
        CaptureSummary {
            total: self.total,
            captured,
            tagged: self.tagged,
            tag_failed: self.tag_failed,
            capture_failed: self.capture_failed,
            without_position: self.without_position,
            success_rate: if self.total > 0 {
                captured as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            duration_ms: StatsSummary::from(&self.duration_stats),
            position_age_ms: StatsSummary::from(&self.position_age_stats),
            by_source: self.by_source.clone(),
        }
    }

    /// Reset statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Capture summary
#[derive(Debug, Clone, Default)]
pub struct CaptureSummary {
    pub total: u64,
    /// Triggers that produced an image
    pub captured: u64,
    pub tagged: u64,
    pub tag_failed: u64,
    pub capture_failed: u64,
    pub without_position: u64,
    pub success_rate: f64,
    pub duration_ms: StatsSummary,
    pub position_age_ms: StatsSummary,
    pub by_source: BTreeMap<&'static str, u64>,
}

impl fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Capture Summary ===")?;
        writeln!(f, "Triggers handled: {}", self.total)?;
        writeln!(
            f,
            "Images captured: {} ({:.2}%)",
            self.captured, self.success_rate
        )?;
        writeln!(f, "Geotagged: {}", self.tagged)?;
        writeln!(f, "Geotag failures: {}", self.tag_failed)?;
        writeln!(f, "Capture failures: {}", self.capture_failed)?;
        writeln!(f, "Without position: {}", self.without_position)?;
        writeln!(f, "Capture duration (ms): {}", self.duration_ms)?;
        writeln!(f, "Position age (ms): {}", self.position_age_ms)?;

        if !self.by_source.is_empty() {
            writeln!(f, "Triggers by source:")?;
            for (source, count) in &self.by_source {
                writeln!(f, "  {}: {}", source, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
