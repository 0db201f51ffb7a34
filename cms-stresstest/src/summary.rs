//! Aggregates [`WorkResult`]s into a [`RunSummary`].

use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use crate::workload::WorkResult;

/// Counters and running sums over all finished units of work.
///
/// The summary is only ever mutated by the task draining completions, so it needs no
/// synchronization.
#[derive(Default)]
pub struct RunSummary {
    /// The number of units submitted.
    pub total: usize,
    /// The number of units that finished, successfully or not.
    pub completed: usize,
    /// The number of units that reported success.
    pub succeeded: usize,
    /// The number of units that panicked.
    pub panicked: usize,

    /// Patients created by lifecycle units.
    pub patients_created: usize,
    /// Records submitted to the CMS.
    pub records_attempted: usize,
    /// Records the CMS accepted.
    pub records_created: usize,

    /// Successful uploads.
    pub uploads: usize,
    /// Uploads the CMS answered with an error.
    pub uploads_rejected: usize,
    /// Uploads that failed at the network level.
    pub uploads_ignored: usize,
    /// Total size of all successful uploads.
    pub bytes_uploaded: u64,

    /// Latencies of all successful uploads in seconds.
    pub upload_timing: DDSketch,

    /// Sum of the per-unit mean upload times of successful units.
    mean_upload_sum: Duration,
    /// Wall time of the whole run, set once all units finished.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Creates an empty summary expecting `total` units.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Adds the result of one finished unit.
    pub fn record(&mut self, result: &WorkResult) {
        self.completed += 1;

        if result.patient.is_some() {
            self.patients_created += 1;
        }
        self.records_attempted += result.records_attempted;
        self.records_created += result.records_created;

        self.uploads += result.uploads();
        self.uploads_rejected += result.uploads_rejected;
        self.uploads_ignored += result.uploads_ignored;
        self.bytes_uploaded += result.bytes_uploaded;
        for timing in &result.upload_timings {
            self.upload_timing.add(timing.as_secs_f64());
        }

        if result.success {
            self.succeeded += 1;
            self.mean_upload_sum += result.mean_upload().unwrap_or_default();
        }
    }

    /// Counts a unit that panicked and produced no result.
    pub fn record_panic(&mut self) {
        self.completed += 1;
        self.panicked += 1;
    }

    /// The fraction of submitted units that succeeded, `0.0` if nothing was submitted.
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64
    }

    /// The mean of the per-unit mean upload times over all successful units.
    ///
    /// Returns `None` if no unit succeeded.
    pub fn mean_upload(&self) -> Option<Duration> {
        let succeeded = u32::try_from(self.succeeded).ok()?;
        if succeeded == 0 {
            return None;
        }
        Some(self.mean_upload_sum / succeeded)
    }
}

impl fmt::Debug for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSummary")
            .field("total", &self.total)
            .field("completed", &self.completed)
            .field("succeeded", &self.succeeded)
            .field("panicked", &self.panicked)
            .field("records_created", &self.records_created)
            .field("uploads", &self.uploads)
            .field("uploads_rejected", &self.uploads_rejected)
            .field("uploads_ignored", &self.uploads_ignored)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "succeeded: {}/{} ({:.1}%)",
            self.succeeded,
            self.total,
            self.success_ratio() * 100.0
        )?;
        match self.mean_upload() {
            Some(mean) => write!(f, "mean upload time: {:.2}s", mean.as_secs_f64()),
            None => write!(f, "mean upload time: n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_successes_report_placeholder() {
        let mut summary = RunSummary::new(2);
        summary.record(&WorkResult::default());
        summary.record(&WorkResult {
            uploads_rejected: 2,
            ..Default::default()
        });

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.mean_upload(), None);
        assert_eq!(summary.success_ratio(), 0.0);

        let output = summary.to_string();
        assert!(output.contains("0/2"));
        assert!(output.contains("n/a"));
    }

    #[test]
    fn empty_run_has_zero_ratio() {
        let summary = RunSummary::new(0);
        assert_eq!(summary.success_ratio(), 0.0);
        assert!(summary.to_string().contains("0/0"));
    }

    #[test]
    fn averages_over_successful_units() {
        let mut summary = RunSummary::new(3);
        summary.record(&WorkResult {
            success: true,
            upload_timings: vec![Duration::from_secs(1), Duration::from_secs(3)],
            ..Default::default()
        });
        summary.record(&WorkResult {
            success: true,
            upload_timings: vec![Duration::from_secs(4)],
            ..Default::default()
        });
        // failed units contribute their uploads, but not to the mean
        summary.record(&WorkResult {
            success: false,
            upload_timings: vec![Duration::from_secs(100)],
            ..Default::default()
        });

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.uploads, 4);
        assert_eq!(summary.upload_timing.count(), 4);
        assert_eq!(summary.mean_upload(), Some(Duration::from_secs(3)));
        assert!(summary.to_string().contains("3.00s"));
    }

    #[test]
    fn counts_panics_as_failures() {
        let mut summary = RunSummary::new(1);
        summary.record_panic();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.panicked, 1);
        assert_eq!(summary.succeeded, 0);
    }
}
