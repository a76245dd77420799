//! Synthesized-speech cache keyed by the exact source text.
//!
//! Keys are used verbatim: no trimming, case folding or nikud stripping.
//! The cache is advisory. Reads that fail for any reason are misses, and
//! writes that fail are logged and forgotten.
//!
//! With a byte budget configured, each write is followed by evicting the
//! oldest-written clips until the collection fits. Reads do not refresh a
//! clip's position, so a hit costs no write. The clip just written is never
//! evicted by its own write.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::store::{Collection, KvStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCacheRecord {
    pub text: String,
    /// Base64 of the raw synthesized payload.
    pub audio_data: String,
    /// Unix millis at creation.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

pub struct AudioCache {
    store: Arc<dyn KvStore>,
    max_bytes: Option<u64>,
}

impl AudioCache {
    pub fn new(store: Arc<dyn KvStore>, max_bytes: Option<u64>) -> Self {
        Self { store, max_bytes }
    }

    pub async fn get_cached_audio(&self, text: &str) -> Option<String> {
        let raw = self.store.get(Collection::AudioCache, text).await?;
        let record: AudioCacheRecord = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!("Discarding unreadable cache record: {e}");
                return None;
            }
        };
        if record.text != text || record.audio_data.is_empty() {
            warn!("Discarding inconsistent cache record for {}", preview(text));
            return None;
        }
        debug!("Audio cache hit: {}", preview(text));
        Some(record.audio_data)
    }

    pub async fn set_cached_audio(&self, text: &str, audio_data: &str) {
        let record = AudioCacheRecord {
            text: text.to_string(),
            audio_data: audio_data.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize cache record: {e}");
                return;
            }
        };
        if !self.store.put(Collection::AudioCache, text, &json).await {
            warn!("Audio cache write skipped for {}", preview(text));
            return;
        }
        debug!("Cached {} bytes for {}", json.len(), preview(text));
        self.enforce_budget(text).await;
    }

    pub async fn stats(&self) -> CacheStats {
        let listed = self.store.list(Collection::AudioCache).await;
        CacheStats {
            entries: listed.len(),
            bytes: listed.iter().map(|m| m.bytes).sum(),
        }
    }

    async fn enforce_budget(&self, keep: &str) {
        let Some(budget) = self.max_bytes else {
            return;
        };
        let mut listed = self.store.list(Collection::AudioCache).await;
        let mut total: u64 = listed.iter().map(|m| m.bytes).sum();
        if total <= budget {
            return;
        }

        listed.sort_by_key(|m| m.written);
        let mut evicted = 0;
        for meta in listed {
            if total <= budget {
                break;
            }
            if meta.key == keep {
                continue;
            }
            if self.store.delete(Collection::AudioCache, &meta.key).await {
                total = total.saturating_sub(meta.bytes);
                evicted += 1;
            }
        }
        info!("Audio cache over budget: evicted {evicted} clips, {total} bytes remain");
    }
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(40).collect();
    if head.len() < text.len() {
        format!("\"{head}...\"")
    } else {
        format!("\"{head}\"")
    }
}
