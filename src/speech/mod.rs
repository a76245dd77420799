//! Pronunciation playback.
//!
//! Components:
//! - `cache`: synthesized clips keyed by exact source text, with a byte budget
//! - `decode`: base64 PCM16LE payloads → f32 buffers
//! - `playback`: the single playback slot and output devices
//! - `pipeline`: cache → normalize → synthesize → decode → play → cache write

pub mod cache;
pub mod decode;
pub mod pipeline;
pub mod playback;

pub use cache::AudioCache;
pub use pipeline::{Normalizer, PlaybackOutcome, SpeechPipeline, Synthesizer};
pub use playback::PlaybackSlot;
