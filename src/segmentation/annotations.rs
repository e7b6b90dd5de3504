//! Pure-functional annotation derivation (§4.F rule 5).
//!
//! Every function here takes the segment's word sequence and returns a
//! value with no side effects and no dependency on engine state — this is
//! what keeps the segmentation engine unit-testable without an async
//! runtime (Design Notes §9).

use once_cell::sync::Lazy;
use regex::RegexSet;

use crate::types::{Annotation, Word};

/// Closed, case-insensitive, whole-word disfluency sets. Keyed by a
/// 2-letter language prefix; unmatched languages fall back to English.
static DISFLUENCY_PATTERNS_EN: &[&str] = &[r"(?i)^um$", r"(?i)^uh$", r"(?i)^er$", r"(?i)^erm$", r"(?i)^hm+$"];

static DISFLUENCY_SET_EN: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(DISFLUENCY_PATTERNS_EN).expect("disfluency patterns are valid regex"));

/// Only English disfluency patterns are shipped; other languages fall
/// back to the English set rather than skip the check entirely.
fn is_disfluency(word: &Word) -> bool {
    DISFLUENCY_SET_EN.is_match(word.text.trim())
}

/// Words-per-second threshold above which a segment is marked
/// `fast_speaker`.
pub const DEFAULT_FAST_SPEAKER_WPS: f64 = 3.5;

/// Derive the full annotation set for a segment's word sequence.
pub fn derive_annotations(words: &[Word], fast_speaker_wps: f64) -> Vec<Annotation> {
    let mut annotations = Vec::new();
    if words.is_empty() {
        return annotations;
    }

    if words.iter().any(|w| !w.is_final) {
        annotations.push(Annotation::HasPartial);
    }
    if words.iter().any(|w| w.is_final) {
        annotations.push(Annotation::HasFinal);
    }
    if words.first().is_some_and(|w| w.is_final) {
        annotations.push(Annotation::StartsWithFinal);
    }
    let last = words.last().expect("checked non-empty above");
    if last.is_final {
        annotations.push(Annotation::EndsWithFinal);
    }
    if last.has_punctuation() {
        annotations.push(Annotation::EndsWithPunctuation);
    }
    if last.ends_sentence() {
        annotations.push(Annotation::EndsWithEos);
    }

    let start = words.first().unwrap().start_time;
    let end = words.last().unwrap().end_time;
    let duration = (end - start).max(f64::EPSILON);
    if words.len() as f64 / duration > fast_speaker_wps {
        annotations.push(Annotation::FastSpeaker);
    }

    if words.iter().any(is_disfluency) {
        annotations.push(Annotation::HasDisfluency);
    }

    annotations
}

/// Join word texts into a segment's display text. Punctuation attaches to
/// its preceding word without an extra space.
pub fn join_text(words: &[Word]) -> String {
    let mut text = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        text.push_str(&word.text);
        if let Some(p) = &word.punctuation {
            text.push_str(p);
        }
    }
    text
}
