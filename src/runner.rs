//! Sequential batch execution with per-job isolation.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::error::Error;
use crate::job::Job;
use crate::naming::output_key;
use crate::report::BatchReport;
use crate::store::ArtifactStore;
use crate::{GenerationEngine, Generator, WAV_CONTENT_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Generated,
    SkippedExisting,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Generated => "generated",
            JobStatus::SkippedExisting => "skipped_existing",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a job is in its lifecycle; only used for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Pending,
    CheckingExists,
    Skipped,
    Generating,
    Uploading,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "PENDING",
            JobState::CheckingExists => "CHECKING_EXISTS",
            JobState::Skipped => "SKIPPED",
            JobState::Generating => "GENERATING",
            JobState::Uploading => "UPLOADING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

fn transition(key: &str, from: JobState, to: JobState) {
    log::debug!("{key}: {from} -> {to}");
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job: Job,
    pub output_key: String,
    pub status: JobStatus,
    /// Wall-clock seconds for generation plus upload. Only set when generated.
    pub generation_secs: Option<f64>,
    pub estimated_cost_usd: Option<f64>,
    /// Only set when failed.
    pub error: Option<String>,
}

impl JobResult {
    fn skipped(job: &Job, output_key: String) -> Self {
        Self {
            job: job.clone(),
            output_key,
            status: JobStatus::SkippedExisting,
            generation_secs: None,
            estimated_cost_usd: None,
            error: None,
        }
    }

    fn failed(job: &Job, output_key: String, error: impl ToString) -> Self {
        Self {
            job: job.clone(),
            output_key,
            status: JobStatus::Failed,
            generation_secs: None,
            estimated_cost_usd: None,
            error: Some(error.to_string()),
        }
    }

    fn generated(job: &Job, output_key: String, secs: f64, hourly_rate_usd: f64) -> Self {
        Self {
            job: job.clone(),
            output_key,
            status: JobStatus::Generated,
            generation_secs: Some(secs),
            estimated_cost_usd: Some(estimate_cost(secs, hourly_rate_usd)),
            error: None,
        }
    }
}

/// Cost of `secs` of machine time at an hourly rate.
pub fn estimate_cost(secs: f64, hourly_rate_usd: f64) -> f64 {
    secs / 3600.0 * hourly_rate_usd
}

/// Drives a batch of jobs to completion, one at a time.
///
/// Owns the model handle; borrows the store. A job's failure is recorded in
/// its [`JobResult`] and never stops the jobs after it.
pub struct BatchRunner<'a, E: GenerationEngine> {
    store: &'a dyn ArtifactStore,
    generator: Generator<E>,
    hourly_rate_usd: f64,
}

impl<'a, E: GenerationEngine> BatchRunner<'a, E> {
    pub fn new(store: &'a dyn ArtifactStore, generator: Generator<E>, hourly_rate_usd: f64) -> Self {
        Self {
            store,
            generator,
            hourly_rate_usd,
        }
    }

    /// Run every job in order. Returns one result per job, in input order.
    pub fn run(&mut self, jobs: &[Job]) -> BatchReport {
        let clock = Instant::now();
        let mut report = BatchReport::new(self.hourly_rate_usd);

        log::info!(
            "Processing {} jobs against {}",
            jobs.len(),
            self.store.describe()
        );

        for (i, job) in jobs.iter().enumerate() {
            log::info!("Job {}/{}: {}", i + 1, jobs.len(), job.base_name);
            let result = self.process(job);

            match result.status {
                JobStatus::Generated => log::info!(
                    "Job complete: {} ({:.1}s, ${:.3})",
                    result.output_key,
                    result.generation_secs.unwrap_or_default(),
                    result.estimated_cost_usd.unwrap_or_default()
                ),
                JobStatus::SkippedExisting => {
                    log::info!("Skipping {} - already exists", result.output_key)
                }
                JobStatus::Failed => log::warn!(
                    "Job {} failed: {}",
                    i + 1,
                    result.error.as_deref().unwrap_or("unknown error")
                ),
            }

            report.record(result);
        }

        report.finish(clock.elapsed());
        report
    }

    fn process(&mut self, job: &Job) -> JobResult {
        let key = output_key(job);
        transition(&key, JobState::Pending, JobState::CheckingExists);

        match self.store.exists(&key) {
            Ok(true) => {
                transition(&key, JobState::CheckingExists, JobState::Skipped);
                return JobResult::skipped(job, key);
            }
            Ok(false) => {}
            Err(e) => {
                transition(&key, JobState::CheckingExists, JobState::Failed);
                return JobResult::failed(job, key, e);
            }
        }

        let started = Instant::now();
        match self.generate_and_upload(job, &key) {
            Ok(()) => {
                transition(&key, JobState::Uploading, JobState::Done);
                let secs = started.elapsed().as_secs_f64();
                JobResult::generated(job, key, secs, self.hourly_rate_usd)
            }
            Err(e) => {
                log::error!("{key}: {e}");
                JobResult::failed(job, key, e)
            }
        }
    }

    fn generate_and_upload(&mut self, job: &Job, key: &str) -> Result<(), Error> {
        transition(key, JobState::CheckingExists, JobState::Generating);
        log::info!("Generating {}s of audio for {:?}", job.duration_secs, job.prompt);
        let audio = self.generator.generate(&job.prompt, job.duration_secs)?;
        let bytes = audio.to_wav_bytes()?;

        transition(key, JobState::Generating, JobState::Uploading);
        log::info!("Uploading {key} ({} bytes)", bytes.len());
        self.store.put(key, &bytes, WAV_CONTENT_TYPE)?;
        Ok(())
    }
}
