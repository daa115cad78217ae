use std::path::PathBuf;

/// Why a prompt line was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LineFault {
    #[error("expected 3 ';'-separated fields (prompt ; duration ; name), found {0}")]
    FieldCount(usize),
    #[error("duration '{0}' is not a number")]
    InvalidDuration(String),
    #[error("duration must be a positive number of seconds, got {0}")]
    NonPositiveDuration(String),
    #[error("duration {0} exceeds the longest clip a WAV file can hold")]
    DurationTooLong(String),
    #[error("prompt text is empty")]
    EmptyPrompt,
    #[error("output name is empty")]
    EmptyName,
}

/// A prompt file line that could not be turned into a job.
///
/// Any malformed line aborts the whole batch before a single job runs.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("malformed prompt on line {line}: {fault} (line was {content:?})")]
pub struct MalformedLineError {
    /// 1-based line number in the prompt file.
    pub line: usize,
    /// The raw, untrimmed line content.
    pub content: String,
    pub fault: LineFault,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("artifact store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to write '{key}': {reason}")]
    Write { key: String, reason: String },
    #[error("object '{0}' not found")]
    NotFound(String),
    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("Model not loaded. Call load_model() first.")]
    ModelNotLoaded,
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Generator program '{0}' not found")]
    GeneratorNotFound(String),
    #[error("Generator command failed: {0}")]
    Command(String),
    #[error("Expected {expected} Hz audio from the model, got {actual} Hz")]
    SampleRate { expected: u32, actual: u32 },
    #[error("Segment has {actual} channel(s) but earlier segments have {expected}")]
    ChannelMismatch { expected: u16, actual: u16 },
    #[error("Generated {actual_frames} frames, expected {expected_frames} (tolerance {tolerance})")]
    DurationMismatch {
        expected_frames: usize,
        actual_frames: usize,
        tolerance: usize,
    },
    #[error("Cannot generate {0}s of audio: duration must be positive and fit in one WAV file")]
    DurationOutOfRange(f64),
    #[error("{duration_secs}s cannot be split into segments of {max_segment_secs}s")]
    TooManySegments {
        duration_secs: f64,
        max_segment_secs: f64,
    },
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        ConfigError::Missing(e.field_name())
    }
}

/// Errors that end a run before or outside the per-job loop.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] MalformedLineError),
    #[error("Failed to read prompt file '{path}': {source}")]
    PromptFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
