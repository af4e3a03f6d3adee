//! Records-processed summaries attached to finished job runs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Counts and timing for one finished job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsProcessedSummary {
    /// Records read from all input files.
    pub records_read: u64,
    /// Records written to the output file(s).
    pub records_written: u64,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run finished.
    pub finish_time: DateTime<Utc>,
}

impl RecordsProcessedSummary {
    /// Creates a summary.
    #[must_use]
    pub const fn new(
        records_read: u64,
        records_written: u64,
        start_time: DateTime<Utc>,
        finish_time: DateTime<Utc>,
    ) -> Self {
        Self {
            records_read,
            records_written,
            start_time,
            finish_time,
        }
    }

    /// A zero-record summary for runs that failed before producing output.
    ///
    /// Failed runs still report a terminal event so jobs never appear stuck
    /// in progress; the zero counts mark them for investigation.
    #[must_use]
    pub fn none_processed(start_time: DateTime<Utc>, finish_time: DateTime<Utc>) -> Self {
        Self::new(0, 0, start_time, finish_time)
    }

    /// The run's wall-clock duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.finish_time - self.start_time
    }

    /// Records read per second, or 0 for instantaneous runs.
    #[must_use]
    pub fn records_read_per_second(&self) -> f64 {
        per_second(self.records_read, self.duration())
    }

    /// Records written per second, or 0 for instantaneous runs.
    #[must_use]
    pub fn records_written_per_second(&self) -> f64 {
        per_second(self.records_written, self.duration())
    }
}

#[allow(clippy::cast_precision_loss)]
fn per_second(count: u64, duration: Duration) -> f64 {
    let millis = duration.num_milliseconds();
    if millis <= 0 {
        return 0.0;
    }
    (count as f64) * 1000.0 / (millis as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rates_derive_from_duration() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let finish = start + Duration::seconds(10);
        let summary = RecordsProcessedSummary::new(1000, 500, start, finish);

        assert_eq!(summary.duration(), Duration::seconds(10));
        assert!((summary.records_read_per_second() - 100.0).abs() < f64::EPSILON);
        assert!((summary.records_written_per_second() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_duration_reports_zero_rate() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let summary = RecordsProcessedSummary::new(1000, 1000, t, t);
        assert!(summary.records_read_per_second().abs() < f64::EPSILON);
    }
}
