//! Frame codec (component A): structured (JSON, tagged) frames and raw
//! binary PCM audio frames.
//!
//! Structured frames use a `message` discriminator, following the same
//! `#[serde(tag = "...")]` pattern the teacher repo uses for its WebSocket
//! message enums (`VoiceClientMessage`, `ClientMessage`). An `#[serde(other)]`
//! catch-all on `DownstreamFrame` satisfies "unknown `message` kind is
//! logged and ignored" without failing deserialization of the whole frame.

use serde::{Deserialize, Serialize};

use crate::error::RtError;
use crate::types::{SpeakerIdentifier, Word};

/// Upstream control frames (client → service).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "message")]
pub enum UpstreamFrame {
    StartRecognition {
        audio_format: AudioFormat,
        transcription_config: TranscriptionConfig,
    },
    EndOfStream {
        last_seq: u64,
    },
    SetRecognitionConfig {
        transcription_config: TranscriptionConfig,
    },
    GetSpeakers,
}

/// Audio encoding descriptor carried in `StartRecognition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            kind: "raw",
            encoding: AudioEncoding::PcmS16le,
            sample_rate: 16_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    PcmS16le,
}

/// Additional vocabulary entry (`{content, sounds_like?[]}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabEntry {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sounds_like: Vec<String>,
}

/// Operating point for the recognition model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingPoint {
    Standard,
    Enhanced,
}

/// Transcription config record carried by `StartRecognition`/
/// `SetRecognitionConfig` (§4.A, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_point: Option<OperatingPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_locale: Option<String>,
    pub max_delay: f64,
    pub end_of_utterance_silence_trigger: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_utterance_max_delay: Option<f64>,
    pub enable_diarization: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_sensitivity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_speakers: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub prefer_current_speaker: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_vocab: Vec<VocabEntry>,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub punctuation_overrides: std::collections::HashMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_results: bool,
}

/// Downstream frames (service → client). `Unknown` is the forward-compat
/// catch-all: any unrecognized `message` discriminator deserializes here
/// instead of failing the whole frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "message")]
pub enum DownstreamFrame {
    RecognitionStarted {
        id: String,
        #[serde(default)]
        language_pack_info: Option<serde_json::Value>,
    },
    AudioAdded {
        seq_no: u64,
    },
    AddPartialTranscript {
        #[serde(default)]
        results: Vec<Word>,
    },
    AddTranscript {
        #[serde(default)]
        results: Vec<Word>,
    },
    EndOfUtterance,
    SpeakersResult {
        speakers: Vec<SpeakerIdentifier>,
    },
    Info {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Warning {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Error {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        reason: Option<String>,
    },
    EndOfTranscript,
    #[serde(other)]
    Unknown,
}

/// Parse one structured downstream text frame. Malformed JSON is a
/// protocol failure; an unrecognized `message` kind decodes to
/// `DownstreamFrame::Unknown` and is logged by the caller, not here.
pub fn decode_downstream(text: &str) -> Result<DownstreamFrame, RtError> {
    serde_json::from_str(text).map_err(|e| RtError::Protocol(format!("malformed frame: {e}")))
}

/// Serialize an upstream control frame to its JSON text payload.
pub fn encode_upstream(frame: &UpstreamFrame) -> Result<String, RtError> {
    serde_json::to_string(frame).map_err(|e| RtError::Protocol(format!("encode failure: {e}")))
}

/// Encode little-endian signed 16-bit PCM samples into a contiguous byte
/// buffer suitable for a single binary WebSocket frame.
pub fn encode_samples_i16le(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Decode a binary frame's bytes back into signed 16-bit PCM samples.
/// An odd byte count is a protocol failure (PCM_S16LE frames are always
/// an even number of bytes).
pub fn decode_samples_i16le(bytes: &[u8]) -> Result<Vec<i16>, RtError> {
    if bytes.len() % 2 != 0 {
        return Err(RtError::Protocol(format!(
            "binary audio frame has odd length {}, not valid PCM_S16LE",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}
