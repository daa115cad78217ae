//! Batch reports: a text summary for the log, a CSV cost report for the
//! bucket, and JSON for anything else that wants the raw results.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::naming::format_duration;
use crate::runner::{JobResult, JobStatus};
use crate::store::ArtifactStore;

pub const CSV_HEADER: &str =
    "output_key,prompt,requested_duration_s,generation_time_s,estimated_cost_usd,status";

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Key the most recent report is always uploaded under.
pub const LATEST_REPORT_KEY: &str = "cost_report_latest.csv";

/// Aggregate of every job result in one run, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub hourly_rate_usd: f64,
    pub results: Vec<JobResult>,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
}

impl BatchReport {
    pub fn new(hourly_rate_usd: f64) -> Self {
        Self {
            started_at: Utc::now(),
            hourly_rate_usd,
            results: Vec::new(),
            generated: 0,
            skipped: 0,
            failed: 0,
            elapsed_secs: 0.0,
        }
    }

    pub fn record(&mut self, result: JobResult) {
        match result.status {
            JobStatus::Generated => self.generated += 1,
            JobStatus::SkippedExisting => self.skipped += 1,
            JobStatus::Failed => self.failed += 1,
        }
        self.results.push(result);
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    fn generated_results(&self) -> impl Iterator<Item = &JobResult> {
        self.results
            .iter()
            .filter(|r| r.status == JobStatus::Generated)
    }

    pub fn total_generation_secs(&self) -> f64 {
        self.generated_results()
            .filter_map(|r| r.generation_secs)
            .sum()
    }

    /// Mean generation time over generated jobs only; `None` if none were.
    pub fn average_generation_secs(&self) -> Option<f64> {
        if self.generated == 0 {
            return None;
        }
        Some(self.total_generation_secs() / self.generated as f64)
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.generated_results()
            .filter_map(|r| r.estimated_cost_usd)
            .sum()
    }

    /// Process exit status: non-zero if any job failed.
    pub fn exit_code(&self) -> u8 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }

    /// Human-readable summary: one line per job, then totals.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let width = self
            .results
            .iter()
            .map(|r| r.output_key.len())
            .max()
            .unwrap_or(0);

        for result in &self.results {
            let timing = match result.generation_secs {
                Some(secs) => format!("{secs:.1}s"),
                None => "-".to_string(),
            };
            let _ = write!(
                out,
                "{:<width$}  {:<16}  {:>8}",
                result.output_key,
                result.status.as_str(),
                timing
            );
            if let Some(error) = &result.error {
                let _ = write!(out, "  {error}");
            }
            out.push('\n');
        }

        let _ = writeln!(
            out,
            "Generated: {}  Skipped: {}  Failed: {}  (of {} jobs)",
            self.generated,
            self.skipped,
            self.failed,
            self.total()
        );
        let _ = writeln!(
            out,
            "Total elapsed: {:.1}s ({:.1}m)",
            self.elapsed_secs,
            self.elapsed_secs / 60.0
        );
        match self.average_generation_secs() {
            Some(avg) => {
                let _ = writeln!(out, "Average generation time: {avg:.1}s");
            }
            None => out.push_str("Average generation time: n/a\n"),
        }
        let _ = writeln!(
            out,
            "Estimated cost: ${:.3} at ${:.3}/h",
            self.total_cost_usd(),
            self.hourly_rate_usd
        );
        out
    }

    /// CSV cost report: header, one row per job, then a `TOTAL` row.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(64 * (self.results.len() + 2));
        out.push_str(CSV_HEADER);
        out.push('\n');

        for r in &self.results {
            let generation = r
                .generation_secs
                .map(|s| format!("{s:.2}"))
                .unwrap_or_default();
            let cost = r
                .estimated_cost_usd
                .map(|c| format!("{c:.4}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{},{},{},{},{},{}",
                csv_field(&r.output_key),
                csv_field(&r.job.prompt),
                format_duration(r.job.duration_secs),
                generation,
                cost,
                r.status
            );
        }

        let _ = writeln!(
            out,
            "TOTAL,{} generated,,{:.2},{:.4},",
            self.generated,
            self.total_generation_secs(),
            self.total_cost_usd()
        );
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Timestamped report key for this run, e.g. `cost_report_20261018_093000.csv`.
    pub fn report_key(&self) -> String {
        format!(
            "cost_report_{}.csv",
            self.started_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Upload the CSV under the timestamped key and [`LATEST_REPORT_KEY`].
    pub fn publish(&self, store: &dyn ArtifactStore) -> Result<Vec<String>, StoreError> {
        let csv = self.to_csv();
        let keys = vec![self.report_key(), LATEST_REPORT_KEY.to_string()];
        for key in &keys {
            store.put(key, csv.as_bytes(), CSV_CONTENT_TYPE)?;
        }
        log::info!("Cost report uploaded: {}", keys[0]);
        Ok(keys)
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn job(prompt: &str, duration_secs: f64, base_name: &str) -> Job {
        Job {
            line: 1,
            prompt: prompt.to_string(),
            duration_secs,
            base_name: base_name.to_string(),
            file_name: format!("{base_name}.wav"),
        }
    }

    fn result(status: JobStatus, secs: Option<f64>, prompt: &str, key: &str) -> JobResult {
        JobResult {
            job: job(prompt, 20.0, "x"),
            output_key: key.to_string(),
            status,
            generation_secs: secs,
            estimated_cost_usd: secs.map(|s| s / 3600.0),
            error: (status == JobStatus::Failed).then(|| "model crashed".to_string()),
        }
    }

    fn sample_report() -> BatchReport {
        let mut report = BatchReport::new(1.0);
        report.record(result(JobStatus::Generated, Some(36.0), "soft piano", "a_1.wav"));
        report.record(result(JobStatus::SkippedExisting, None, "rain", "b_2.wav"));
        report.record(result(JobStatus::Failed, None, "drums, loud", "c_3.wav"));
        report.record(result(JobStatus::Generated, Some(72.0), "say \"hi\"", "d_4.wav"));
        report.finish(Duration::from_secs(120));
        report
    }

    #[test]
    fn counts_and_averages_only_generated_jobs() {
        let report = sample_report();
        assert_eq!(report.total(), 4);
        assert_eq!((report.generated, report.skipped, report.failed), (2, 1, 1));
        assert_eq!(report.average_generation_secs(), Some(54.0));
        assert!((report.total_cost_usd() - 0.03).abs() < 1e-12);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn csv_has_one_row_per_job_plus_total() {
        let csv = sample_report().to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "a_1.wav,soft piano,20,36.00,0.0100,generated");
        assert_eq!(lines[2], "b_2.wav,rain,20,,,skipped_existing");
        assert_eq!(lines[3], "c_3.wav,\"drums, loud\",20,,,failed");
        assert_eq!(lines[4], "d_4.wav,\"say \"\"hi\"\"\",20,72.00,0.0200,generated");
        assert_eq!(lines[5], "TOTAL,2 generated,,108.00,0.0300,");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn summary_lists_every_job_and_totals() {
        let summary = sample_report().summary();
        for key in ["a_1.wav", "b_2.wav", "c_3.wav", "d_4.wav"] {
            assert!(summary.contains(key), "{key} missing from summary");
        }
        assert!(summary.contains("model crashed"));
        assert!(summary.contains("Generated: 2  Skipped: 1  Failed: 1  (of 4 jobs)"));
        assert!(summary.contains("Total elapsed: 120.0s (2.0m)"));
        assert!(summary.contains("Average generation time: 54.0s"));
    }

    #[test]
    fn empty_report_is_valid() {
        let mut report = BatchReport::new(0.526);
        report.finish(Duration::ZERO);
        assert_eq!(report.total(), 0);
        assert_eq!(report.average_generation_secs(), None);
        assert_eq!(report.exit_code(), 0);
        assert!(report.summary().contains("Average generation time: n/a"));
        assert_eq!(
            report.to_csv(),
            format!("{CSV_HEADER}\nTOTAL,0 generated,,0.00,0.0000,\n")
        );
    }

    #[test]
    fn json_uses_snake_case_statuses() {
        let json = sample_report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"][1]["status"], "skipped_existing");
        assert_eq!(value["failed"], 1);
    }

    #[test]
    fn publishes_timestamped_and_latest_copies() {
        let mut report = sample_report();
        report.started_at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let store = MemoryStore::new();

        let keys = report.publish(&store).unwrap();

        assert_eq!(
            keys,
            vec!["cost_report_20261018_093000.csv", "cost_report_latest.csv"]
        );
        let latest = store.object(LATEST_REPORT_KEY).unwrap();
        assert_eq!(latest.content_type, "text/csv");
        assert_eq!(latest.bytes, report.to_csv().into_bytes());
    }

    #[test]
    fn csv_field_quotes_only_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }
}
