//! Speech pipeline: text in, audible speech out, at most one clip at a time.
//!
//! Per request:
//! 1. Cache lookup by the exact input text (hit → decode → play, done)
//! 2. Normalize transliteration → diacritized Arabic (external model)
//! 3. Synthesize the wrapped Arabic text → base64 PCM (external model)
//! 4. Decode PCM16LE → f32
//! 5. Play through the shared slot (stops the previous clip first)
//! 6. Cache the raw payload under the untouched input text
//!
//! Requests are never queued. A new request silences older audio at once,
//! and an older request that finishes its network calls after a newer one
//! has started playing is dropped. Errors never leave `generate_and_play`;
//! they are logged and returned as `PlaybackOutcome::Failed`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::AudioCache;
use super::decode::decode_payload;
use super::playback::PlaybackSlot;
use crate::error::{AiError, PipelineError};
use crate::prompts;

/// Transliteration → native-script text.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, transliteration: &str) -> Result<String, AiError>;
}

/// Text → base64 little-endian 16-bit mono PCM.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, prompt: &str) -> Result<String, AiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum PlaybackOutcome {
    PlayedFromCache,
    PlayedFresh,
    /// A newer request reached playback first.
    Superseded,
    Failed(String),
}

pub struct SpeechPipeline {
    cache: AudioCache,
    normalizer: Arc<dyn Normalizer>,
    synthesizer: Arc<dyn Synthesizer>,
    slot: PlaybackSlot,
    sample_rate: u32,
    tickets: AtomicU64,
    in_flight: Arc<AtomicUsize>,
}

/// Keeps the in-flight count honest on every exit path.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SpeechPipeline {
    pub fn new(
        cache: AudioCache,
        normalizer: Arc<dyn Normalizer>,
        synthesizer: Arc<dyn Synthesizer>,
        slot: PlaybackSlot,
        sample_rate: u32,
    ) -> Self {
        Self {
            cache,
            normalizer,
            synthesizer,
            slot,
            sample_rate,
            tickets: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    /// The UI's loading flag: some request has not finished yet.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn is_playing(&self) -> bool {
        self.slot.is_playing()
    }

    pub fn stop(&self) {
        self.slot.stop();
    }

    pub async fn generate_and_play(&self, text: &str) -> PlaybackOutcome {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = InFlight::enter(&self.in_flight);
        let t_start = Instant::now();

        self.slot.preempt(ticket);

        let outcome = match self.run(ticket, text).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Speech request #{ticket} failed: {e}");
                PlaybackOutcome::Failed(e.to_string())
            }
        };
        info!(
            "Speech request #{ticket} {:?} in {:.0}ms",
            outcome,
            t_start.elapsed().as_secs_f64() * 1000.0
        );
        outcome
    }

    async fn run(&self, ticket: u64, text: &str) -> Result<PlaybackOutcome, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        if let Some(payload) = self.cache.get_cached_audio(text).await {
            match decode_payload(&payload, self.sample_rate) {
                Ok(buffer) => {
                    let played = self.slot.play(ticket, buffer).map_err(PipelineError::Playback)?;
                    return Ok(if played {
                        PlaybackOutcome::PlayedFromCache
                    } else {
                        PlaybackOutcome::Superseded
                    });
                }
                Err(e) => warn!("Cached clip unusable ({e}), synthesizing again"),
            }
        }

        let t_norm = Instant::now();
        let arabic = self
            .normalizer
            .normalize(text)
            .await
            .map_err(PipelineError::Normalize)?;
        let arabic = arabic.trim();
        if arabic.is_empty() {
            return Err(PipelineError::EmptyNormalization);
        }
        debug!(
            "Request #{ticket} normalized in {:.0}ms: {arabic}",
            t_norm.elapsed().as_secs_f64() * 1000.0
        );

        let t_synth = Instant::now();
        let payload = match self.synthesizer.synthesize(&prompts::speech_instruction(arabic)).await {
            Ok(p) if !p.trim().is_empty() => p,
            Ok(_) | Err(AiError::Empty(_)) => return Err(PipelineError::NoAudio),
            Err(e) => return Err(PipelineError::Synthesize(e)),
        };
        debug!(
            "Request #{ticket} synthesized {} payload bytes in {:.0}ms",
            payload.len(),
            t_synth.elapsed().as_secs_f64() * 1000.0
        );

        let buffer = decode_payload(&payload, self.sample_rate)?;
        let played = self.slot.play(ticket, buffer).map_err(PipelineError::Playback)?;

        // Written whether or not this request won the slot: a superseded clip
        // is still valid audio for the same text.
        self.cache.set_cached_audio(text, &payload).await;

        Ok(if played {
            PlaybackOutcome::PlayedFresh
        } else {
            PlaybackOutcome::Superseded
        })
    }
}
