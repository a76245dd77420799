//! Error types for each layer.
//!
//! These stay inside the crate's boundaries: the store, the audio cache and
//! the speech pipeline all convert them into "absent", "skipped" or a failed
//! outcome before anything reaches the HTTP layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage init failed: {0}")]
    Init(String),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("not a record file: {0}")]
    NotRecord(String),
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Gemini API key is not configured (set the configured key env var)")]
    MissingCredential,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response contained no {0}")]
    Empty(&'static str),

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(String),

    #[error("PCM payload has odd length {0}")]
    OddLength(usize),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("nothing to say")]
    EmptyInput,

    #[error("normalization: {0}")]
    Normalize(#[source] AiError),

    #[error("normalization returned empty text")]
    EmptyNormalization,

    #[error("synthesis: {0}")]
    Synthesize(#[source] AiError),

    #[error("synthesis returned no audio")]
    NoAudio,

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("playback: {0}")]
    Playback(String),
}
