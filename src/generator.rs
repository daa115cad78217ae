use crate::config::DEFAULT_MAX_SEGMENT_SECS;
use crate::error::GenerationError;
use crate::{GeneratedAudio, GenerationEngine, MAX_DURATION_SECS, SAMPLE_RATE};

/// Most segments a single clip may be split into.
const MAX_SEGMENTS: usize = 10_000;

/// Owned, lazily loaded handle around a [`GenerationEngine`].
///
/// The model is loaded on the first [`generate`](Generator::generate) call
/// and unloaded when the handle is dropped. Requests longer than the maximum
/// segment length are synthesized in consecutive segments and concatenated.
pub struct Generator<E: GenerationEngine> {
    engine: E,
    max_segment_secs: f64,
}

impl<E: GenerationEngine> Generator<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            max_segment_secs: DEFAULT_MAX_SEGMENT_SECS,
        }
    }

    pub fn with_max_segment_secs(mut self, secs: f64) -> Self {
        self.max_segment_secs = secs;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn ensure_loaded(&mut self) -> Result<(), GenerationError> {
        if !self.engine.is_loaded() {
            log::info!("Loading generation model...");
            self.engine.load_model()?;
            log::info!("Model loaded");
        }
        Ok(())
    }

    /// Generate one contiguous clip of `duration_secs` at [`SAMPLE_RATE`].
    ///
    /// The result holds exactly `round(duration_secs * SAMPLE_RATE)` frames.
    /// Engines may miss their segment length by up to one native frame; that
    /// slack is padded with silence or trimmed, anything larger is an error.
    pub fn generate(
        &mut self,
        prompt: &str,
        duration_secs: f64,
    ) -> Result<GeneratedAudio, GenerationError> {
        let plan = segment_plan(duration_secs, self.max_segment_secs)?;
        self.ensure_loaded()?;

        if plan.len() > 1 {
            log::info!(
                "Using chunked generation for {duration_secs}s audio ({} segments)",
                plan.len()
            );
        }

        let mut combined: Option<GeneratedAudio> = None;
        let mut remaining = duration_secs;
        for segment_secs in &plan {
            let audio = self.engine.generate_segment(prompt, *segment_secs)?;
            if audio.sample_rate != SAMPLE_RATE {
                return Err(GenerationError::SampleRate {
                    expected: SAMPLE_RATE,
                    actual: audio.sample_rate,
                });
            }

            match combined.as_mut() {
                None => combined = Some(audio),
                Some(acc) => {
                    if acc.channels != audio.channels {
                        return Err(GenerationError::ChannelMismatch {
                            expected: acc.channels,
                            actual: audio.channels,
                        });
                    }
                    acc.samples.extend_from_slice(&audio.samples);
                }
            }

            remaining -= segment_secs;
            if plan.len() > 1 {
                log::debug!(
                    "Generated segment: {segment_secs}s, remaining: {:.1}s",
                    remaining.max(0.0)
                );
            }
        }

        let mut audio = combined.unwrap_or_else(|| GeneratedAudio::mono(Vec::new(), SAMPLE_RATE));
        let tolerance = self.engine.frame_size().max(1) * plan.len().max(1);
        fit_to_duration(&mut audio, duration_secs, tolerance)?;
        Ok(audio)
    }
}

impl<E: GenerationEngine> Drop for Generator<E> {
    fn drop(&mut self) {
        if self.engine.is_loaded() {
            self.engine.unload_model();
        }
    }
}

/// Split a duration into segments of at most `max_segment_secs`.
fn segment_plan(duration_secs: f64, max_segment_secs: f64) -> Result<Vec<f64>, GenerationError> {
    if !(duration_secs.is_finite() && duration_secs > 0.0 && duration_secs <= MAX_DURATION_SECS) {
        return Err(GenerationError::DurationOutOfRange(duration_secs));
    }

    // Float residue under a microsecond does not get a segment of its own.
    let count = ((duration_secs - 1e-6) / max_segment_secs).ceil().max(1.0);
    if !(max_segment_secs > 0.0 && count.is_finite() && count <= MAX_SEGMENTS as f64) {
        return Err(GenerationError::TooManySegments {
            duration_secs,
            max_segment_secs,
        });
    }

    Ok((0..count as usize)
        .map(|i| (duration_secs - i as f64 * max_segment_secs).min(max_segment_secs))
        .collect())
}

/// Pad or trim `audio` to the exact frame count for `duration_secs`.
fn fit_to_duration(
    audio: &mut GeneratedAudio,
    duration_secs: f64,
    tolerance: usize,
) -> Result<(), GenerationError> {
    let expected_frames = (duration_secs * audio.sample_rate as f64).round() as usize;
    let actual_frames = audio.frames();

    if expected_frames.abs_diff(actual_frames) > tolerance {
        return Err(GenerationError::DurationMismatch {
            expected_frames,
            actual_frames,
            tolerance,
        });
    }

    audio
        .samples
        .resize(expected_frames * audio.channels.max(1) as usize, 0.0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Engine that records requests and returns silence, optionally missing
    /// the requested length by a fixed number of frames.
    #[derive(Default)]
    struct ScriptedEngine {
        loaded: bool,
        loads: usize,
        requests: Vec<f64>,
        frame_error: isize,
        frame_size: usize,
        sample_rate: Option<u32>,
    }

    impl GenerationEngine for ScriptedEngine {
        fn load_model(&mut self) -> Result<(), GenerationError> {
            self.loaded = true;
            self.loads += 1;
            Ok(())
        }

        fn unload_model(&mut self) {
            self.loaded = false;
        }

        fn is_loaded(&self) -> bool {
            self.loaded
        }

        fn frame_size(&self) -> usize {
            self.frame_size.max(1)
        }

        fn generate_segment(
            &mut self,
            _prompt: &str,
            duration_secs: f64,
        ) -> Result<GeneratedAudio, GenerationError> {
            self.requests.push(duration_secs);
            let frames = (duration_secs * SAMPLE_RATE as f64).round() as isize + self.frame_error;
            Ok(GeneratedAudio::mono(
                vec![0.1; frames.max(0) as usize],
                self.sample_rate.unwrap_or(SAMPLE_RATE),
            ))
        }
    }

    #[test]
    fn plans_segments_of_at_most_thirty_seconds() {
        assert_eq!(segment_plan(20.0, 30.0).unwrap(), vec![20.0]);
        assert_eq!(segment_plan(30.0, 30.0).unwrap(), vec![30.0]);
        assert_eq!(segment_plan(45.0, 30.0).unwrap(), vec![30.0, 15.0]);
        assert_eq!(segment_plan(75.0, 30.0).unwrap(), vec![30.0, 30.0, 15.0]);
    }

    #[test]
    fn refuses_to_plan_unbounded_durations() {
        for secs in [1e300, 1e20, 1e9, f64::INFINITY, f64::NAN, 0.0, -1.0] {
            assert!(
                matches!(
                    segment_plan(secs, 30.0),
                    Err(GenerationError::DurationOutOfRange(_))
                ),
                "{secs} should be rejected"
            );
        }
        assert!(matches!(
            segment_plan(60.0, 1e-9),
            Err(GenerationError::TooManySegments { .. })
        ));
        assert!(matches!(
            segment_plan(60.0, 0.0),
            Err(GenerationError::TooManySegments { .. })
        ));
    }

    #[test]
    fn huge_request_fails_without_touching_the_model() {
        let mut generator = Generator::new(ScriptedEngine::default());
        let err = generator.generate("drone", 1e300).unwrap_err();
        assert!(matches!(err, GenerationError::DurationOutOfRange(_)));
        assert!(generator.engine().requests.is_empty());
        assert_eq!(generator.engine().loads, 0);
    }

    #[test]
    fn short_request_is_a_single_pass() {
        let mut generator = Generator::new(ScriptedEngine::default());
        let audio = generator.generate("piano", 20.0).unwrap();
        assert_eq!(generator.engine().requests, vec![20.0]);
        assert_eq!(audio.frames(), 20 * 32_000);
    }

    #[test]
    fn long_request_is_stitched_into_one_buffer() {
        let mut generator = Generator::new(ScriptedEngine::default());
        let audio = generator.generate("piano", 45.0).unwrap();
        assert_eq!(generator.engine().requests, vec![30.0, 15.0]);
        assert_eq!(audio.frames(), 45 * 32_000);
        assert!((audio.duration_secs() - 45.0).abs() < 1.0 / 32_000.0);
    }

    #[test]
    fn loads_model_once() {
        let mut generator = Generator::new(ScriptedEngine::default());
        generator.generate("a", 1.0).unwrap();
        generator.generate("b", 1.0).unwrap();
        assert_eq!(generator.engine().loads, 1);
        assert!(generator.engine().is_loaded());
    }

    #[test]
    fn pads_and_trims_within_one_frame_per_segment() {
        let short = ScriptedEngine {
            frame_error: -640,
            frame_size: 640,
            ..Default::default()
        };
        let audio = Generator::new(short).generate("a", 45.0).unwrap();
        assert_eq!(audio.frames(), 45 * 32_000);
        assert_eq!(audio.samples.last(), Some(&0.0));

        let long = ScriptedEngine {
            frame_error: 300,
            frame_size: 640,
            ..Default::default()
        };
        let audio = Generator::new(long).generate("a", 10.0).unwrap();
        assert_eq!(audio.frames(), 10 * 32_000);
    }

    #[test]
    fn rejects_output_far_from_requested_length() {
        let engine = ScriptedEngine {
            frame_error: -10_000,
            frame_size: 640,
            ..Default::default()
        };
        let err = Generator::new(engine).generate("a", 10.0).unwrap_err();
        assert!(matches!(err, GenerationError::DurationMismatch { .. }));
    }

    #[test]
    fn rejects_wrong_sample_rate() {
        let engine = ScriptedEngine {
            sample_rate: Some(24_000),
            ..Default::default()
        };
        let err = Generator::new(engine).generate("a", 1.0).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::SampleRate {
                expected: 32_000,
                actual: 24_000
            }
        ));
    }
}
