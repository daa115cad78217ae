//! Prompt file parsing.
//!
//! Each non-blank, non-comment line describes one clip:
//!
//! ```text
//! # prompt ; duration in seconds ; output name
//! soft piano melody ; 20 ; demo
//! ```

use std::path::Path;

use serde::Serialize;

use crate::error::{Error, LineFault, MalformedLineError};
use crate::MAX_DURATION_SECS;

const COMMENT_MARKER: char = '#';
const FIELD_SEPARATOR: char = ';';

/// One generation request, parsed from a single prompt file line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    /// 1-based line number in the prompt file.
    pub line: usize,
    pub prompt: String,
    pub duration_secs: f64,
    /// Output name without the `.wav` extension.
    pub base_name: String,
    /// Output name as written, with `.wav` appended when it was missing.
    ///
    /// This is the form covered by the fingerprint, so `demo.WAV` keeps its
    /// own key instead of sharing one with `demo.wav`.
    pub file_name: String,
}

/// Parse prompt file contents into jobs, in input order.
///
/// Stops at the first malformed line; a partially parsed batch is never
/// returned.
pub fn parse_jobs(input: &str) -> Result<Vec<Job>, MalformedLineError> {
    let mut jobs = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            continue;
        }

        let job = parse_line(idx + 1, line).map_err(|fault| MalformedLineError {
            line: idx + 1,
            content: raw.to_string(),
            fault,
        })?;
        log::debug!(
            "Parsed job on line {}: {:?} -> {} ({}s)",
            job.line,
            job.prompt,
            job.base_name,
            job.duration_secs
        );
        jobs.push(job);
    }

    Ok(jobs)
}

/// Read and parse a UTF-8 prompt file.
pub fn load_jobs(path: &Path) -> Result<Vec<Job>, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::PromptFile {
        path: path.to_path_buf(),
        source,
    })?;
    let jobs = parse_jobs(&content)?;
    log::info!("Parsed {} jobs from {}", jobs.len(), path.display());
    Ok(jobs)
}

fn parse_line(line_no: usize, line: &str) -> Result<Job, LineFault> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    let [prompt, duration, name] = fields[..] else {
        return Err(LineFault::FieldCount(fields.len()));
    };

    if prompt.is_empty() {
        return Err(LineFault::EmptyPrompt);
    }

    let duration_secs = parse_duration(duration)?;

    let (base_name, file_name) = split_wav_extension(name);
    if base_name.is_empty() {
        return Err(LineFault::EmptyName);
    }

    Ok(Job {
        line: line_no,
        prompt: prompt.to_string(),
        duration_secs,
        base_name: base_name.to_string(),
        file_name,
    })
}

fn parse_duration(field: &str) -> Result<f64, LineFault> {
    let value: f64 = field
        .parse()
        .map_err(|_| LineFault::InvalidDuration(field.to_string()))?;
    // "inf" and "NaN" parse as f64 but are not durations.
    if !value.is_finite() {
        return Err(LineFault::InvalidDuration(field.to_string()));
    }
    if value <= 0.0 {
        return Err(LineFault::NonPositiveDuration(field.to_string()));
    }
    if value > MAX_DURATION_SECS {
        return Err(LineFault::DurationTooLong(field.to_string()));
    }
    Ok(value)
}

/// Split an output name into its stem and its file name.
///
/// `demo` becomes (`demo`, `demo.wav`); `demo.WAV` keeps its extension as
/// written: (`demo`, `demo.WAV`).
fn split_wav_extension(name: &str) -> (&str, String) {
    let split = name.len().saturating_sub(4);
    match name.get(split..) {
        Some(ext) if ext.eq_ignore_ascii_case(".wav") => {
            (name[..split].trim_end(), name.to_string())
        }
        _ => (name, format!("{name}.wav")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_and_skips_comments_and_blanks() {
        let input = "\
# clips for the demo reel

soft piano melody ; 20 ; demo
   # indented comment
  epic orchestral swell;2.5;intro.wav
";
        let jobs = parse_jobs(input).expect("valid input");
        assert_eq!(
            jobs,
            vec![
                Job {
                    line: 3,
                    prompt: "soft piano melody".to_string(),
                    duration_secs: 20.0,
                    base_name: "demo".to_string(),
                    file_name: "demo.wav".to_string(),
                },
                Job {
                    line: 5,
                    prompt: "epic orchestral swell".to_string(),
                    duration_secs: 2.5,
                    base_name: "intro".to_string(),
                    file_name: "intro.wav".to_string(),
                },
            ]
        );
    }

    #[test]
    fn rejects_two_field_line_with_its_line_number() {
        let input = "first ; 10 ; one\n\n# note\nsecond ; 10\nthird ; 10 ; three\n";
        let err = parse_jobs(input).unwrap_err();
        assert_eq!(err.line, 4);
        assert_eq!(err.content, "second ; 10");
        assert_eq!(err.fault, LineFault::FieldCount(2));
    }

    #[test]
    fn rejects_extra_separator() {
        let err = parse_jobs("a ; b ; 10 ; name").unwrap_err();
        assert_eq!(err.fault, LineFault::FieldCount(4));
    }

    #[test]
    fn rejects_bad_durations() {
        let cases = [
            ("piano ; ten ; x", LineFault::InvalidDuration("ten".to_string())),
            ("piano ; inf ; x", LineFault::InvalidDuration("inf".to_string())),
            ("piano ; 0 ; x", LineFault::NonPositiveDuration("0".to_string())),
            ("piano ; -5 ; x", LineFault::NonPositiveDuration("-5".to_string())),
        ];
        for (line, fault) in cases {
            let err = parse_jobs(line).unwrap_err();
            assert_eq!(err.line, 1);
            assert_eq!(err.fault, fault, "line {line:?}");
        }
    }

    #[test]
    fn rejects_durations_longer_than_one_wav_can_hold() {
        for line in ["drone ; 1e300 ; x", "drone ; 1e9 ; x", "drone ; 33555 ; x"] {
            let err = parse_jobs(line).unwrap_err();
            assert!(
                matches!(err.fault, LineFault::DurationTooLong(_)),
                "line {line:?} gave {:?}",
                err.fault
            );
        }
        let jobs = parse_jobs("drone ; 33554 ; x").expect("longest clip fits");
        assert_eq!(jobs[0].duration_secs, 33_554.0);
    }

    #[test]
    fn keeps_extension_case_in_file_name() {
        let jobs = parse_jobs("a ; 1 ; demo.WAV\nb ; 1 ; demo\nc ; 1 ; demo.wav").expect("valid");
        let names: Vec<_> = jobs
            .iter()
            .map(|j| (j.base_name.as_str(), j.file_name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![("demo", "demo.WAV"), ("demo", "demo.wav"), ("demo", "demo.wav")]
        );
    }

    #[test]
    fn rejects_empty_prompt_and_name() {
        assert_eq!(
            parse_jobs(" ; 10 ; x").unwrap_err().fault,
            LineFault::EmptyPrompt
        );
        assert_eq!(
            parse_jobs("piano ; 10 ; .WAV").unwrap_err().fault,
            LineFault::EmptyName
        );
    }

    #[test]
    fn keeps_non_ascii_names_intact() {
        let jobs = parse_jobs("drums ; 5 ; été").expect("valid input");
        assert_eq!(jobs[0].base_name, "été");
    }

    #[test]
    fn empty_input_yields_no_jobs() {
        assert!(parse_jobs("").expect("empty is valid").is_empty());
        assert!(parse_jobs("# only comments\n\n").expect("valid").is_empty());
    }

    #[test]
    fn load_jobs_reports_missing_file() {
        let err = load_jobs(Path::new("/nonexistent/prompts.txt")).unwrap_err();
        assert!(matches!(err, Error::PromptFile { .. }));
    }
}
