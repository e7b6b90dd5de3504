//! Speaker registry (component I): maps engine-assigned speaker
//! identifiers (`S1`, `S2`, ...) onto user-visible labels reported by
//! `SpeakersResult`, without ever retroactively relabeling segments
//! already emitted (§4.I, Open Question resolved in DESIGN.md).

use std::collections::HashMap;

use crate::types::SpeakerIdentifier;

/// Tracks the known-speaker table for one session. Purely additive:
/// once a label is bound, a later `SpeakersResult` can extend its
/// identifier set but the registry never removes or overwrites an
/// existing binding for a different engine id.
#[derive(Debug, Default)]
pub struct SpeakerRegistry {
    by_engine_id: HashMap<String, String>,
    known: Vec<SpeakerIdentifier>,
}

impl SpeakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with a pre-enrolled `known_speakers` list (§4.I,
    /// §6 `known_speakers` config option) before any `SpeakersResult`
    /// frame has arrived.
    pub fn with_known_speakers(known_speakers: Vec<SpeakerIdentifier>) -> Self {
        let mut registry = Self::default();
        registry.apply_speakers_result(known_speakers);
        registry
    }

    /// Apply a `SpeakersResult` frame, which may arrive mid-session (after
    /// `GetSpeakers`) or at `EndOfTranscript`. Segments already emitted
    /// before this call keep whatever `speaker_id` they were given.
    pub fn apply_speakers_result(&mut self, speakers: Vec<SpeakerIdentifier>) {
        for speaker in speakers {
            for engine_id in &speaker.identifiers {
                self.by_engine_id.insert(engine_id.clone(), speaker.label.clone());
            }
            if let Some(existing) = self.known.iter_mut().find(|s| s.label == speaker.label) {
                for id in speaker.identifiers {
                    if !existing.identifiers.contains(&id) {
                        existing.identifiers.push(id);
                    }
                }
            } else {
                self.known.push(speaker);
            }
        }
    }

    /// Resolve an engine-assigned id (`S1`) to its bound user label, if
    /// any. Segmentation/transcript output always uses the engine id as
    /// `Segment::speaker_id`; this is purely a lookup surface for callers
    /// who want the human label.
    pub fn label_for(&self, engine_id: &str) -> Option<&str> {
        self.by_engine_id.get(engine_id).map(String::as_str)
    }

    pub fn known_speakers(&self) -> &[SpeakerIdentifier] {
        &self.known
    }
}
