use std::borrow::Cow;
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};

use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::{GeneratedAudio, GenerationEngine, SAMPLE_RATE};

/// Engine that delegates each segment to an external program.
///
/// The program receives the prompt on stdin (newline-terminated) and the
/// configured arguments, with `{duration}` and `{sample_rate}` substituted.
/// It must write a WAV file to stdout and exit with status 0.
///
/// ```rust,no_run
/// use clipforge::config::GeneratorConfig;
/// use clipforge::engines::command::CommandEngine;
/// use clipforge::GenerationEngine;
///
/// let mut engine = CommandEngine::new(GeneratorConfig::new("/opt/musicgen/generate.py"));
/// engine.load_model()?;
/// let audio = engine.generate_segment("soft piano melody", 10.0)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct CommandEngine {
    config: GeneratorConfig,
    loaded: bool,
}

impl CommandEngine {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            loaded: false,
        }
    }

    fn program_name(&self) -> String {
        self.config.program.display().to_string()
    }

    fn render_args(&self, duration_secs: f64) -> Vec<String> {
        let duration = format!("{duration_secs:.3}");
        let sample_rate = SAMPLE_RATE.to_string();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{duration}", &duration)
                    .replace("{sample_rate}", &sample_rate)
            })
            .collect()
    }
}

impl GenerationEngine for CommandEngine {
    fn load_model(&mut self) -> Result<(), GenerationError> {
        let program = &self.config.program;
        // Bare names are resolved through PATH at spawn time.
        if program.components().count() > 1 && !program.exists() {
            return Err(GenerationError::GeneratorNotFound(self.program_name()));
        }
        log::info!("Using generator program {}", self.program_name());
        self.loaded = true;
        Ok(())
    }

    fn unload_model(&mut self) {
        self.loaded = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn frame_size(&self) -> usize {
        self.config.frame_size
    }

    fn generate_segment(
        &mut self,
        prompt: &str,
        duration_secs: f64,
    ) -> Result<GeneratedAudio, GenerationError> {
        if !self.loaded {
            return Err(GenerationError::ModelNotLoaded);
        }

        let mut child = Command::new(&self.config.program)
            .args(self.render_args(duration_secs))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GenerationError::GeneratorNotFound(self.program_name())
                } else {
                    GenerationError::Io(e)
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A generator that takes the prompt from its arguments may exit
            // without reading stdin; its exit status decides the outcome.
            if let Err(e) = stdin.write_all(newline_terminated(prompt).as_bytes()) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::Command(format!(
                "{} exited with code {:?}: {}",
                self.program_name(),
                output.status.code(),
                stderr.trim()
            )));
        }

        decode_wav(&output.stdout)
    }
}

fn newline_terminated(prompt: &str) -> Cow<'_, str> {
    if prompt.ends_with('\n') {
        Cow::Borrowed(prompt)
    } else {
        Cow::Owned(format!("{prompt}\n"))
    }
}

/// Decode WAV bytes into f32 samples, normalizing integer PCM to `[-1, 1]`.
pub fn decode_wav(bytes: &[u8]) -> Result<GeneratedAudio, GenerationError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(GeneratedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn substitutes_placeholders_in_args() {
        let mut config = GeneratorConfig::new("gen");
        config.args = vec![
            "--seconds={duration}".to_string(),
            "--sr".to_string(),
            "{sample_rate}".to_string(),
        ];
        let engine = CommandEngine::new(config);
        assert_eq!(
            engine.render_args(12.5),
            vec!["--seconds=12.500", "--sr", "32000"]
        );
    }

    #[test]
    fn decodes_int_pcm_to_unit_range() {
        let audio = decode_wav(&pcm16_wav(&[0, 16384, -32768], 32_000)).unwrap();
        assert_eq!(audio.sample_rate, 32_000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn decodes_float_wav_from_generated_audio() {
        let original = GeneratedAudio::mono(vec![0.1, -0.2, 0.3], SAMPLE_RATE);
        let decoded = decode_wav(&original.to_wav_bytes().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn rejects_garbage_output() {
        assert!(matches!(
            decode_wav(b"not a wav file"),
            Err(GenerationError::Wav(_))
        ));
    }

    #[test]
    fn refuses_to_generate_before_load() {
        let mut engine = CommandEngine::new(GeneratorConfig::new("gen"));
        assert!(matches!(
            engine.generate_segment("x", 1.0),
            Err(GenerationError::ModelNotLoaded)
        ));
    }

    #[test]
    fn missing_program_path_fails_to_load() {
        let mut engine =
            CommandEngine::new(GeneratorConfig::new("/nonexistent/dir/generate-audio"));
        assert!(matches!(
            engine.load_model(),
            Err(GenerationError::GeneratorNotFound(_))
        ));
        assert!(!engine.is_loaded());
    }

    #[cfg(unix)]
    #[test]
    fn runs_program_and_reads_stdout() {
        // `cat` echoes stdin, which is not a WAV file: exercises spawn, stdin
        // and the decode error path without needing a real model.
        let mut config = GeneratorConfig::new("cat");
        config.args = Vec::new();
        let mut engine = CommandEngine::new(config);
        engine.load_model().unwrap();
        assert!(matches!(
            engine.generate_segment("soft piano", 1.0),
            Err(GenerationError::Wav(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_a_command_error() {
        let mut config = GeneratorConfig::new("false");
        config.args = Vec::new();
        let mut engine = CommandEngine::new(config);
        engine.load_model().unwrap();
        assert!(matches!(
            engine.generate_segment("soft piano", 1.0),
            Err(GenerationError::Command(_))
        ));
    }
}
