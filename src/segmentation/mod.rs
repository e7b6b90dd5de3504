//! Segmentation engine (component F): groups words into per-speaker
//! segments with stable ordering, idempotent finalization, and
//! annotations.

pub mod annotations;

use std::collections::HashMap;

use crate::transcript::WordsUpdated;
use crate::types::{FocusConfig, Segment, Word};
use annotations::{derive_annotations, join_text, DEFAULT_FAST_SPEAKER_WPS};

/// An emission from the segmentation engine, handed to the facade to push
/// onto the event bus. The pair (`Partial`, `Final`) for the same segment
/// range is always produced in that order (§4.F rule 4).
#[derive(Debug, Clone)]
pub enum SegmentEvent {
    Partial(Segment),
    Final(Segment),
}

struct OpenSegment {
    words: Vec<Word>,
    last_emitted_text: Option<String>,
}

impl OpenSegment {
    fn new(word: Word) -> Self {
        Self {
            words: vec![word],
            last_emitted_text: None,
        }
    }

    fn tail(&self) -> &Word {
        self.words.last().expect("OpenSegment is never empty")
    }

    fn to_segment(&self, focus: &FocusConfig, fast_speaker_wps: f64) -> Segment {
        let speaker_id = self
            .words
            .first()
            .and_then(|w| w.speaker_id.clone())
            .unwrap_or_else(|| "S0".to_string());
        let start_time = self
            .words
            .iter()
            .map(|w| w.start_time)
            .fold(f64::INFINITY, f64::min);
        let end_time = self
            .words
            .iter()
            .map(|w| w.end_time)
            .fold(f64::NEG_INFINITY, f64::max);
        Segment {
            is_active: focus.is_active(&speaker_id),
            language: self
                .words
                .first()
                .map(|w| w.language.clone())
                .unwrap_or_default(),
            text: join_text(&self.words),
            start_time,
            end_time,
            annotations: derive_annotations(&self.words, fast_speaker_wps),
            words: Some(self.words.clone()),
            speaker_id,
        }
    }
}

/// Configuration the engine needs beyond what `FocusConfig` carries.
#[derive(Debug, Clone)]
pub struct SegmentationConfig {
    pub max_intra_gap: f64,
    pub fast_speaker_wps: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_intra_gap: 0.9,
            fast_speaker_wps: DEFAULT_FAST_SPEAKER_WPS,
        }
    }
}

/// Converts an unbounded per-word partial/final event stream into
/// coherent per-speaker segments.
pub struct SegmentationEngine {
    config: SegmentationConfig,
    focus: FocusConfig,
    open: HashMap<String, OpenSegment>,
}

impl SegmentationEngine {
    pub fn new(config: SegmentationConfig, focus: FocusConfig) -> Self {
        Self {
            config,
            focus,
            open: HashMap::new(),
        }
    }

    /// Update the active focus policy. Per §4.I, this never retroactively
    /// relabels or re-emits already-closed segments.
    pub fn set_focus(&mut self, focus: FocusConfig) {
        self.focus = focus;
    }

    /// Recompute open segments given a batch of new/revised words, in the
    /// order they should be applied (callers pass `new_finals` then
    /// `revised_partials`, or vice versa, per their own cadence needs —
    /// this engine processes whatever order it receives).
    pub fn on_words_updated(&mut self, update: &WordsUpdated) -> Vec<SegmentEvent> {
        let mut events = Vec::new();
        let mut words: Vec<Word> = Vec::with_capacity(update.new_finals.len() + update.revised_partials.len());
        words.extend(update.new_finals.iter().cloned());
        words.extend(update.revised_partials.iter().cloned());
        words.sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap_or(std::cmp::Ordering::Equal));

        let mut touched_speakers: Vec<String> = Vec::new();

        for word in words {
            let speaker_id = word.speaker_id.clone().unwrap_or_else(|| "S0".to_string());

            if crate::types::is_ignored_label(&speaker_id) {
                continue;
            }
            if self.focus.is_suppressed(&speaker_id) {
                // Ignore-mode: suppress emission entirely, including partials.
                // Still drop any previously-open segment for this speaker so
                // it never surfaces once ignored mid-stream.
                self.open.remove(&speaker_id);
                continue;
            }

            if let Some(existing) = self.open.get(&speaker_id) {
                let gap = word.start_time - existing.tail().end_time;
                let sentence_boundary = existing.tail().ends_sentence();
                if gap > self.config.max_intra_gap || sentence_boundary {
                    let closing = self.open.remove(&speaker_id).expect("checked Some above");
                    events.push(SegmentEvent::Final(
                        closing.to_segment(&self.focus, self.config.fast_speaker_wps),
                    ));
                }
            }

            self.open
                .entry(speaker_id.clone())
                .and_modify(|seg| seg.words.push(word.clone()))
                .or_insert_with(|| OpenSegment::new(word));

            if !touched_speakers.contains(&speaker_id) {
                touched_speakers.push(speaker_id);
            }
        }

        for speaker_id in touched_speakers {
            if let Some(seg) = self.open.get_mut(&speaker_id) {
                let segment = seg.to_segment(&self.focus, self.config.fast_speaker_wps);
                if seg.last_emitted_text.as_deref() != Some(segment.text.as_str()) {
                    seg.last_emitted_text = Some(segment.text.clone());
                    events.push(SegmentEvent::Partial(segment));
                }
            }
        }

        events
    }

    /// Timer-driven inactivity check (§4.F rule 4: "inactivity beyond
    /// `max_delay`"). `now` is the latest observed time in the session's
    /// timeline (seconds since session start).
    pub fn on_timer_tick(&mut self, now: f64) -> Vec<SegmentEvent> {
        let stale: Vec<String> = self
            .open
            .iter()
            .filter(|(_, seg)| now - seg.tail().end_time > self.config.max_intra_gap)
            .map(|(speaker, _)| speaker.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|speaker| self.open.remove(&speaker))
            .map(|seg| SegmentEvent::Final(seg.to_segment(&self.focus, self.config.fast_speaker_wps)))
            .collect()
    }

    /// Close every open segment (session `finalize`/`close`).
    pub fn finalize_all(&mut self) -> Vec<SegmentEvent> {
        self.open
            .drain()
            .map(|(_, seg)| SegmentEvent::Final(seg.to_segment(&self.focus, self.config.fast_speaker_wps)))
            .collect()
    }
}
