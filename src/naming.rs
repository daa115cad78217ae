//! Deterministic output keys.
//!
//! The fingerprint is the first 8 hex digits of the MD5 of
//! `"{prompt}|{duration}|{file_name}"`, where the file name is the output
//! name as written in the prompt file with `.wav` appended only when it has
//! no such extension. The extension keeps its original case, so `demo.WAV`
//! and `demo.wav` get different fingerprints (the key itself always ends in
//! lowercase `.wav`). The separator and this normalization are fixed:
//! changing either renames every stored clip and defeats the skip-if-exists
//! check for earlier runs.

use crate::job::Job;

const FINGERPRINT_LEN: usize = 8;
const SEPARATOR: char = '|';

/// 8-character lowercase hex digest of a job's identifying fields.
pub fn fingerprint(prompt: &str, duration_secs: f64, file_name: &str) -> String {
    let content = format!(
        "{prompt}{SEPARATOR}{}{SEPARATOR}{file_name}",
        format_duration(duration_secs)
    );
    let digest = format!("{:x}", md5::compute(content.as_bytes()));
    digest[..FINGERPRINT_LEN].to_string()
}

/// Object key for a job's clip: `{base_name}_{fingerprint}.wav`.
pub fn output_key(job: &Job) -> String {
    format!(
        "{}_{}.wav",
        job.base_name,
        fingerprint(&job.prompt, job.duration_secs, &job.file_name)
    )
}

/// Render a duration the way it is hashed and reported.
///
/// Whole seconds print without a fractional part (`20`, not `20.0`).
pub fn format_duration(secs: f64) -> String {
    if secs.fract() == 0.0 && secs.abs() < 1e15 {
        format!("{}", secs as i64)
    } else {
        format!("{secs}")
    }
}
