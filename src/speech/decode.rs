//! Payload decoding: base64 transport string → little-endian 16-bit PCM →
//! normalized f32 samples.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::DecodeError;

/// Mono float samples ready for an output device.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD
        .decode(payload.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))
}

#[cfg(test)]
pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Each signed 16-bit sample divided by 32768.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

pub fn decode_payload(payload: &str, sample_rate: u32) -> Result<AudioBuffer, DecodeError> {
    let bytes = decode_base64(payload)?;
    let samples = pcm16le_to_f32(&bytes)?;
    Ok(AudioBuffer {
        samples,
        sample_rate,
        channels: 1,
    })
}
