//! Gemini API client for every external model call.
//!
//! Uses the REST `generateContent` endpoint directly. All calls need an API
//! key; without one they fail before any network traffic.
//!
//! Calls:
//! - `convert_transliteration_to_spoken_arabic`: Hebrew-script → diacritized Arabic
//! - `synthesize_speech`: single-voice TTS, returns base64 PCM16LE @ 24kHz
//! - `translate_for_drill`: Hebrew phrase → course transliteration
//! - `pronunciation_feedback`: recorded WAV + target phrase → feedback text
//! - `conversation_topic`: structured JSON topic with vocabulary

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::GeminiConfig;
use crate::error::AiError;
use crate::prompts;
use crate::speech::{Normalizer, Synthesizer};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyItem {
    /// Transliterated Arabic.
    pub arabic: String,
    pub hebrew: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationTopic {
    pub topic: String,
    pub vocabulary: Vec<VocabularyItem>,
    /// Transliterated example sentence.
    pub example: String,
}

pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn has_credential(&self) -> bool {
        self.config.resolve_api_key().is_some()
    }

    fn api_key(&self) -> Result<String, AiError> {
        self.config.resolve_api_key().ok_or(AiError::MissingCredential)
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Value, AiError> {
        let key = self.api_key()?;
        let url = format!(
            "{}/v1beta/models/{model}:generateContent",
            self.config.base_url.trim_end_matches('/')
        );
        let t_start = Instant::now();

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("Gemini request to {model} timed out");
                } else if e.is_connect() {
                    warn!("Cannot connect to Gemini at {}", self.config.base_url);
                }
                AiError::Http(e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Gemini {model} returned status {status}");
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;
        debug!(
            "Gemini {model} replied in {:.0}ms",
            t_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(data)
    }

    async fn generate_text(&self, system: &str, parts: Value, generation: Option<Value>) -> Result<String, AiError> {
        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": parts }],
        });
        if let Some(generation) = generation {
            body["generationConfig"] = generation;
        }
        let data = self.generate(&self.config.text_model, body).await?;
        let text = response_text(&data).ok_or(AiError::Empty("text"))?;
        Ok(text.trim().to_string())
    }

    pub async fn convert_transliteration_to_spoken_arabic(&self, transliteration: &str) -> Result<String, AiError> {
        self.generate_text(
            &prompts::normalize_instruction(),
            json!([{ "text": prompts::normalize_request(transliteration) }]),
            None,
        )
        .await
    }

    /// Returns the base64 audio exactly as delivered.
    pub async fn synthesize_speech(&self, prompt: &str) -> Result<String, AiError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.config.voice }
                    }
                }
            }
        });
        let data = self.generate(&self.config.tts_model, body).await?;
        response_audio(&data)
            .map(str::to_string)
            .ok_or(AiError::Empty("audio"))
    }

    pub async fn translate_for_drill(&self, hebrew: &str, context: &str) -> Result<String, AiError> {
        let raw = self
            .generate_text(
                &prompts::translate_instruction(),
                json!([{ "text": prompts::translate_request(hebrew, context) }]),
                None,
            )
            .await?;
        Ok(clean_transliteration(&raw))
    }

    pub async fn pronunciation_feedback(&self, audio_base64: &str, phrase: &str) -> Result<String, AiError> {
        self.generate_text(
            prompts::TUTOR_SYSTEM_PROMPT,
            json!([
                { "inlineData": { "mimeType": "audio/wav", "data": audio_base64 } },
                { "text": prompts::feedback_request(phrase) }
            ]),
            None,
        )
        .await
    }

    pub async fn conversation_topic(&self) -> Result<ConversationTopic, AiError> {
        let generation = json!({
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "topic": { "type": "STRING" },
                    "vocabulary": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "arabic": { "type": "STRING", "description": "Transliterated Arabic" },
                                "hebrew": { "type": "STRING" }
                            }
                        }
                    },
                    "example": { "type": "STRING", "description": "Transliterated Arabic example" }
                }
            }
        });
        let raw = self
            .generate_text(
                prompts::TUTOR_SYSTEM_PROMPT,
                json!([{ "text": prompts::TOPIC_REQUEST }]),
                Some(generation),
            )
            .await?;
        serde_json::from_str(&raw).map_err(|e| AiError::Malformed(format!("topic JSON: {e}")))
    }
}

#[async_trait]
impl Normalizer for GeminiClient {
    async fn normalize(&self, transliteration: &str) -> Result<String, AiError> {
        self.convert_transliteration_to_spoken_arabic(transliteration).await
    }
}

#[async_trait]
impl Synthesizer for GeminiClient {
    async fn synthesize(&self, prompt: &str) -> Result<String, AiError> {
        self.synthesize_speech(prompt).await
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(data: &Value) -> Option<String> {
    let parts = data["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn response_audio(data: &Value) -> Option<&str> {
    data["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .find_map(|p| p["inlineData"]["data"].as_str())
        .filter(|d| !d.is_empty())
}

/// Strip code fences and quoting. Apostrophes inside words are letter
/// marks in the transliteration (ג', ת'), so only outer ones go.
fn clean_transliteration(raw: &str) -> String {
    let without: String = raw.chars().filter(|c| *c != '`' && *c != '"').collect();
    without.trim().trim_matches('\'').trim().to_string()
}
