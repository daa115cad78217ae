//! # clipforge
//!
//! Batch generation of audio clips from a prompt file into an object store.
//!
//! ## Features
//!
//! - **Idempotent runs**: every clip is stored under a key derived from its
//!   prompt, duration and name, so re-running a batch skips finished work
//! - **Per-job isolation**: a failed generation or upload is recorded and the
//!   batch moves on
//! - **Pluggable engines and stores**: the model sits behind
//!   [`GenerationEngine`], the bucket behind [`store::ArtifactStore`]
//! - **Cost reporting**: CSV and text reports with an estimated cost per clip
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clipforge::engines::tone::ToneEngine;
//! use clipforge::runner::BatchRunner;
//! use clipforge::store::MemoryStore;
//! use clipforge::{job, Generator};
//!
//! let jobs = job::parse_jobs("soft piano melody ; 20 ; demo\n")?;
//! let store = MemoryStore::new();
//! let mut runner = BatchRunner::new(&store, Generator::new(ToneEngine::new()), 0.526);
//!
//! let report = runner.run(&jobs);
//! println!("{}", report.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod download;
pub mod engines;
pub mod error;
pub mod generator;
pub mod job;
pub mod naming;
pub mod report;
pub mod runner;
pub mod store;

use std::io::Cursor;
use std::path::Path;

pub use error::{ConfigError, Error, GenerationError, MalformedLineError, StoreError};
pub use generator::Generator;

/// Sample rate of every stored clip.
pub const SAMPLE_RATE: u32 = 32_000;

/// Longest clip, in seconds, whose 32-bit float mono WAV stays within the
/// format's 4 GiB data limit.
pub const MAX_DURATION_SECS: f64 = u32::MAX as f64 / (SAMPLE_RATE as f64 * 4.0);

/// Content type used when uploading clips.
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

/// Audio produced by a generation engine.
///
/// Samples are interleaved f32 values in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl GeneratedAudio {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    /// Encode the audio as an in-memory 32-bit float WAV file.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, GenerationError> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 4));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, self.wav_spec())?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), GenerationError> {
        let mut writer = hound::WavWriter::create(path, self.wav_spec())?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Common interface for generative audio models.
///
/// An engine synthesizes one segment at a time; splitting long requests into
/// segments and stitching them back together is the job of [`Generator`].
pub trait GenerationEngine {
    /// Load the model and any associated resources.
    fn load_model(&mut self) -> Result<(), GenerationError>;

    /// Unload the currently loaded model and free associated resources.
    fn unload_model(&mut self);

    fn is_loaded(&self) -> bool;

    /// Native frame size of the model in samples per channel.
    ///
    /// Generated segments may be off from the requested length by up to one
    /// frame.
    fn frame_size(&self) -> usize {
        1
    }

    /// Generate a single segment of roughly `duration_secs` seconds.
    fn generate_segment(
        &mut self,
        prompt: &str,
        duration_secs: f64,
    ) -> Result<GeneratedAudio, GenerationError>;
}
