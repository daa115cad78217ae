//! Generation engines.
//!
//! # Available Engines
//!
//! - [`command::CommandEngine`] - runs an external generator program (for
//!   example a MusicGen wrapper script) once per segment
//! - [`tone::ToneEngine`] - deterministic synthesizer for dry runs and demos

pub mod command;
pub mod tone;
