//! Configuration + presets (component J): strongly-typed configuration,
//! JSON serialization, five named presets.
//!
//! Grouped into nested structs the same way the teacher's `Config {
//! openrouter, models, budget, security, auth }` composes configuration,
//! with per-field `#[serde(default = "...")]` plus a matching `Default`
//! impl (`ModelsConfig`'s style).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RtError;
use crate::types::FocusConfig;
use crate::wire::{OperatingPoint, VocabEntry};

/// Endpoint URL override (§6).
pub const RT_URL_ENV_VAR: &str = "SPEECHMATICS_RT_URL";

/// Default endpoint used when `SPEECHMATICS_RT_URL` is unset.
pub const DEFAULT_RT_URL: &str = "wss://rt.example-stt.invalid/v2";

/// Which turn-detection policy is active (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPolicyKind {
    Fixed,
    Adaptive,
    Smart,
    External,
}

/// Segment emission cadence (§4.H preset table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitCadence {
    Words,
    Sentences,
    Complete,
    CompleteWithTiming,
}

/// Recognition-facing options (maps onto `TranscriptionConfig` on the
/// wire, plus client-only knobs like `sample_rate`/`audio_encoding`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub operating_point: Option<OperatingPoint>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub output_locale: Option<String>,
    #[serde(default)]
    pub enable_diarization: bool,
    #[serde(default)]
    pub speaker_sensitivity: Option<f64>,
    #[serde(default)]
    pub max_speakers: Option<u32>,
    #[serde(default)]
    pub prefer_current_speaker: bool,
    #[serde(default)]
    pub known_speakers: Vec<crate::types::SpeakerIdentifier>,
    #[serde(default)]
    pub additional_vocab: Vec<VocabEntry>,
    #[serde(default)]
    pub punctuation_overrides: HashMap<String, String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub include_results: bool,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            operating_point: None,
            domain: None,
            output_locale: None,
            enable_diarization: false,
            speaker_sensitivity: None,
            max_speakers: None,
            prefer_current_speaker: false,
            known_speakers: Vec::new(),
            additional_vocab: Vec::new(),
            punctuation_overrides: HashMap::new(),
            sample_rate: default_sample_rate(),
            include_results: false,
        }
    }
}

/// Turn-detection timing/policy options (§4.G, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
    #[serde(default = "default_silence_trigger")]
    pub end_of_utterance_silence_trigger: f64,
    #[serde(default = "default_max_delay_ceiling")]
    pub end_of_utterance_max_delay: f64,
    #[serde(default = "default_policy")]
    pub policy: TurnPolicyKind,
    #[serde(default = "default_emit_cadence")]
    pub emit_cadence: EmitCadence,
    #[serde(default = "default_smart_window_secs")]
    pub smart_window_secs: f64,
    #[serde(default = "default_smart_threshold")]
    pub smart_threshold: f32,
}

fn default_max_delay() -> f64 {
    0.9
}
fn default_silence_trigger() -> f64 {
    0.2
}
fn default_max_delay_ceiling() -> f64 {
    10.0
}
fn default_policy() -> TurnPolicyKind {
    TurnPolicyKind::Adaptive
}
fn default_emit_cadence() -> EmitCadence {
    EmitCadence::Complete
}
fn default_smart_window_secs() -> f64 {
    8.0
}
fn default_smart_threshold() -> f32 {
    0.5
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_delay: default_max_delay(),
            end_of_utterance_silence_trigger: default_silence_trigger(),
            end_of_utterance_max_delay: default_max_delay_ceiling(),
            policy: default_policy(),
            emit_cadence: default_emit_cadence(),
            smart_window_secs: default_smart_window_secs(),
            smart_threshold: default_smart_threshold(),
        }
    }
}

/// Transport timeouts and backpressure bound (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_max_inflight_audio_frames")]
    pub max_inflight_audio_frames: u64,
    #[serde(default)]
    pub app_id: Option<String>,
    /// Authenticate via `?jwt=<token>` instead of the `Authorization`
    /// header, for clients that cannot set upgrade request headers (§6).
    #[serde(default)]
    pub auth_via_query_param: bool,
}

fn default_open_timeout_ms() -> u64 {
    30_000
}
fn default_close_timeout_ms() -> u64 {
    10_000
}
fn default_ping_interval_ms() -> u64 {
    20_000
}
fn default_ping_timeout_ms() -> u64 {
    60_000
}
fn default_max_inflight_audio_frames() -> u64 {
    256
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: default_open_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            max_inflight_audio_frames: default_max_inflight_audio_frames(),
            app_id: None,
            auth_via_query_param: false,
        }
    }
}

/// Top-level configuration for a `VoiceAgent`/`RtSession`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RtConfig {
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// The five named presets plus `external`, matching the §4.H table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Fast,
    Adaptive,
    SmartTurn,
    Scribe,
    Captions,
    External,
}

impl RtConfig {
    /// Build the config for a named preset, then let the caller further
    /// customize fields before `validate()`/`connect()`.
    pub fn preset(preset: Preset) -> Self {
        let mut cfg = RtConfig::default();
        match preset {
            Preset::Fast => {
                cfg.turn.max_delay = 0.5;
                cfg.turn.end_of_utterance_silence_trigger = 0.15;
                cfg.turn.policy = TurnPolicyKind::Fixed;
                cfg.turn.emit_cadence = EmitCadence::Words;
                cfg.recognition.enable_diarization = true;
            }
            Preset::Adaptive => {
                cfg.turn.max_delay = 0.9;
                cfg.turn.end_of_utterance_silence_trigger = 0.2;
                cfg.turn.policy = TurnPolicyKind::Adaptive;
                cfg.turn.emit_cadence = EmitCadence::Complete;
                cfg.recognition.enable_diarization = true;
            }
            Preset::SmartTurn => {
                cfg.turn.max_delay = 1.0;
                cfg.turn.end_of_utterance_silence_trigger = 0.3;
                cfg.turn.policy = TurnPolicyKind::Smart;
                cfg.turn.emit_cadence = EmitCadence::Complete;
                cfg.recognition.enable_diarization = true;
            }
            Preset::Scribe => {
                cfg.turn.max_delay = 1.2;
                cfg.turn.end_of_utterance_silence_trigger = 0.3;
                cfg.turn.policy = TurnPolicyKind::Fixed;
                cfg.turn.emit_cadence = EmitCadence::Sentences;
                cfg.recognition.enable_diarization = true;
            }
            Preset::Captions => {
                cfg.turn.max_delay = 0.7;
                cfg.turn.end_of_utterance_silence_trigger = 0.2;
                cfg.turn.policy = TurnPolicyKind::Fixed;
                cfg.turn.emit_cadence = EmitCadence::CompleteWithTiming;
                cfg.recognition.enable_diarization = false;
            }
            Preset::External => {
                cfg.turn.max_delay = 0.7;
                cfg.turn.policy = TurnPolicyKind::External;
                cfg.turn.emit_cadence = EmitCadence::Complete;
                cfg.recognition.enable_diarization = true;
            }
        }
        cfg
    }

    /// Pre-connect validation (§7 "Configuration error").
    pub fn validate(&self) -> Result<(), RtError> {
        if self.turn.end_of_utterance_silence_trigger >= self.turn.max_delay {
            return Err(RtError::Configuration(format!(
                "end_of_utterance_silence_trigger ({}) must be < max_delay ({})",
                self.turn.end_of_utterance_silence_trigger, self.turn.max_delay
            )));
        }
        if self.turn.max_delay > self.turn.end_of_utterance_max_delay {
            return Err(RtError::Configuration(format!(
                "max_delay ({}) must be <= end_of_utterance_max_delay ({})",
                self.turn.max_delay, self.turn.end_of_utterance_max_delay
            )));
        }
        if let Some(s) = self.recognition.speaker_sensitivity {
            if !(0.0..=1.0).contains(&s) {
                return Err(RtError::Configuration(format!(
                    "speaker_sensitivity ({s}) must be within [0, 1]"
                )));
            }
        }
        for speaker in &self.recognition.known_speakers {
            if crate::types::is_reserved_engine_label(&speaker.label) {
                return Err(RtError::Configuration(format!(
                    "known speaker label '{}' collides with the reserved engine pattern S<N>",
                    speaker.label
                )));
            }
        }
        let overlap = self
            .focus
            .focus_speakers
            .intersection(&self.focus.ignore_speakers)
            .next();
        if let Some(speaker) = overlap {
            return Err(RtError::Configuration(format!(
                "speaker '{speaker}' is in both focus_speakers and ignore_speakers"
            )));
        }
        Ok(())
    }

    /// Resolve the endpoint URL: explicit override, else
    /// `SPEECHMATICS_RT_URL`, else the compiled-in default.
    pub fn resolve_endpoint(explicit: Option<&str>) -> String {
        explicit
            .map(str::to_string)
            .or_else(|| std::env::var(RT_URL_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_RT_URL.to_string())
    }
}
