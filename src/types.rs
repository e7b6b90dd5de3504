//! Shared data types: `Word`, `Segment`, `SpeakerIdentifier`, session state.
//!
//! These are plain data — owned, cloneable snapshots. Per the engine's DAG
//! rule (segments never back-reference words from the transcript buffer),
//! every `Vec<Word>` that ends up on a `Segment` is a copy.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single recognized word, partial or final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub is_final: bool,
    pub speaker_id: Option<String>,
    pub punctuation: Option<String>,
    pub language: String,
}

impl Word {
    /// Invariant: `start_time <= end_time`.
    pub fn is_well_formed(&self) -> bool {
        self.start_time <= self.end_time
    }

    /// True if the word's trailing punctuation is a sentence terminator.
    pub fn ends_sentence(&self) -> bool {
        matches!(self.punctuation.as_deref(), Some(".") | Some("?") | Some("!"))
    }

    /// True if the word carries any trailing punctuation mark at all.
    pub fn has_punctuation(&self) -> bool {
        self.punctuation.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Annotations a segment may carry. Kept as a set so `AddSegment`/
/// `AddPartialSegment` emit a stable, order-independent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Annotation {
    HasPartial,
    HasFinal,
    StartsWithFinal,
    EndsWithFinal,
    EndsWithEos,
    EndsWithPunctuation,
    FastSpeaker,
    HasDisfluency,
}

/// A contiguous run of words from one speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub speaker_id: String,
    pub is_active: bool,
    pub language: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub annotations: Vec<Annotation>,
    pub words: Option<Vec<Word>>,
}

impl Segment {
    pub fn has_annotation(&self, a: Annotation) -> bool {
        self.annotations.contains(&a)
    }
}

/// `{ label, identifiers }` — a user-visible label bound to one or more
/// service-issued opaque speaker identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerIdentifier {
    pub label: String,
    pub identifiers: Vec<String>,
}

/// Reserved engine-assigned speaker label pattern, e.g. `S1`, `S2`.
pub fn is_reserved_engine_label(label: &str) -> bool {
    let mut chars = label.chars();
    matches!(chars.next(), Some('S')) && chars.clone().next().is_some() && chars.all(|c| c.is_ascii_digit())
}

/// Labels matching `__..__` are silently ignored by the segmentation engine.
pub fn is_ignored_label(label: &str) -> bool {
    label.starts_with("__") && label.ends_with("__") && label.len() > 4
}

/// Session lifecycle state (§3 Session state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Started,
    Draining,
    Closed,
    Failed,
}

impl SessionState {
    /// Whether the session can still accept new `send_audio`/`send_control`
    /// calls.
    pub fn accepts_traffic(self) -> bool {
        matches!(self, SessionState::Started)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Per-speaker focus policy (§4.F rule 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    /// Emit all speakers; mark only focused ones `is_active`.
    Retain,
    /// Suppress emission entirely for ignored speakers.
    Ignore,
}

/// Per-speaker emission/activity filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusConfig {
    pub mode: FocusMode,
    pub focus_speakers: HashSet<String>,
    pub ignore_speakers: HashSet<String>,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            mode: FocusMode::Retain,
            focus_speakers: HashSet::new(),
            ignore_speakers: HashSet::new(),
        }
    }
}

impl FocusConfig {
    /// Whether a segment/word from `speaker_id` should be suppressed
    /// entirely (only possible under `Ignore` mode).
    pub fn is_suppressed(&self, speaker_id: &str) -> bool {
        self.mode == FocusMode::Ignore && self.ignore_speakers.contains(speaker_id)
    }

    /// Whether a speaker satisfies the focus predicate (`Segment.is_active`).
    pub fn is_active(&self, speaker_id: &str) -> bool {
        if self.focus_speakers.is_empty() {
            !self.ignore_speakers.contains(speaker_id)
        } else {
            self.focus_speakers.contains(speaker_id)
        }
    }
}
