use std::f32::consts::TAU;

use crate::error::GenerationError;
use crate::{GeneratedAudio, GenerationEngine, SAMPLE_RATE};

/// Deterministic stand-in for a generative model.
///
/// Renders a soft two-voice chord whose pitch is derived from the prompt, so
/// identical requests produce identical audio. Useful for dry runs that
/// exercise the store and reporting without a GPU.
#[derive(Debug, Default)]
pub struct ToneEngine {
    loaded: bool,
}

impl ToneEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Map a prompt onto a root frequency between 220 and 440 Hz.
fn root_frequency(prompt: &str) -> f32 {
    let digest = md5::compute(prompt.as_bytes());
    let step = u16::from_le_bytes([digest.0[0], digest.0[1]]) % 12;
    220.0 * 2f32.powf(step as f32 / 12.0)
}

impl GenerationEngine for ToneEngine {
    fn load_model(&mut self) -> Result<(), GenerationError> {
        self.loaded = true;
        Ok(())
    }

    fn unload_model(&mut self) {
        self.loaded = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn generate_segment(
        &mut self,
        prompt: &str,
        duration_secs: f64,
    ) -> Result<GeneratedAudio, GenerationError> {
        if !self.loaded {
            return Err(GenerationError::ModelNotLoaded);
        }

        let frames = (duration_secs * SAMPLE_RATE as f64).round() as usize;
        let root = root_frequency(prompt);
        let fifth = root * 1.5;
        let fade = (SAMPLE_RATE as usize / 50).min(frames / 2).max(1);

        let samples = (0..frames)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                let edge = i.min(frames - 1 - i);
                let envelope = (edge as f32 / fade as f32).min(1.0);
                0.2 * envelope * ((TAU * root * t).sin() + 0.5 * (TAU * fifth * t).sin())
            })
            .collect();

        Ok(GeneratedAudio::mono(samples, SAMPLE_RATE))
    }
}
