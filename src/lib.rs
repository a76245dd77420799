//! shu-ismak: learning-progress and pronunciation core for a spoken
//! Palestinian Arabic course taught through Hebrew-script transliteration.
//!
//! Modules:
//! - `store`: durable key-value collections (progress, audio cache)
//! - `lessons`: static binyan/pattern/verb graph and tense order
//! - `progress`: completion state, default-and-merge loading, write-through updates
//! - `unlock`: progressive-unlock rules and the learning-path summary
//! - `speech`: audio cache, PCM decoding, single-slot playback, synthesis pipeline
//! - `gemini`: external model calls (normalize, synthesize, translate, feedback, topics)
//! - `api`: loopback HTTP API for the lesson UI

pub mod api;
pub mod config;
pub mod error;
pub mod gemini;
pub mod lessons;
pub mod progress;
pub mod prompts;
pub mod speech;
pub mod store;
pub mod unlock;
