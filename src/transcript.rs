//! Transcript assembler (component E): maintains an ordered per-channel
//! word buffer and reconciles partials with finals.
//!
//! Owned exclusively by the session's downstream handling loop — not
//! `Send` across task boundaries in spirit, driven synchronously (§5:
//! "the word buffer in E is owned solely by E").

use crate::types::Word;

/// Normalized output of one `AddPartialTranscript`/`AddTranscript` batch,
/// handed to the segmentation engine (F).
#[derive(Debug, Clone, Default)]
pub struct WordsUpdated {
    pub new_finals: Vec<Word>,
    pub revised_partials: Vec<Word>,
    pub latest_time: f64,
}

/// Ordered word buffer keyed by `(start_time, end_time, speaker)`, with
/// partial/final reconciliation (§4.E).
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    /// Kept sorted by `(start_time, end_time)`; arrival order is preserved
    /// among ties since insertion always probes from the tail first.
    words: Vec<Word>,
    latest_time: f64,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// All words currently held, in buffer order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Ingest one partial batch. A partial batch is fully replaced by the
    /// next partial batch that shares its head word (same speaker and
    /// `start_time` of the first word).
    pub fn apply_partial(&mut self, batch: Vec<Word>) -> WordsUpdated {
        self.apply_batch(batch, false)
    }

    /// Ingest one final batch. Final words commit, removing any matching
    /// partials they supersede. Out-of-order arrival (final before its
    /// partial) is tolerated by writing the final directly. Repeated
    /// finals with identical `start_time` for the same speaker are
    /// idempotent (the later identical final simply replaces the former).
    pub fn apply_final(&mut self, batch: Vec<Word>) -> WordsUpdated {
        self.apply_batch(batch, true)
    }

    fn apply_batch(&mut self, batch: Vec<Word>, is_final_batch: bool) -> WordsUpdated {
        let mut new_finals = Vec::new();
        let mut revised_partials = Vec::new();

        for word in batch {
            self.latest_time = self.latest_time.max(word.end_time);

            // A word in the buffer "matches" an incoming word when it
            // overlaps in time and shares a speaker — that's the superseding
            // relationship defined for partial -> final replacement (§3).
            let replace_at = self.words.iter().position(|existing| {
                existing.speaker_id == word.speaker_id
                    && ranges_overlap(
                        existing.start_time,
                        existing.end_time,
                        word.start_time,
                        word.end_time,
                    )
                    && (!existing.is_final || is_final_batch)
            });

            match replace_at {
                Some(idx) if self.words[idx] == word => {
                    // Idempotent repeat of an identical final/partial.
                }
                Some(idx) => {
                    self.words[idx] = word.clone();
                    self.resort_from(idx);
                }
                None => {
                    let insert_at = self.insertion_point(&word);
                    self.words.insert(insert_at, word.clone());
                }
            }

            if word.is_final {
                new_finals.push(word);
            } else {
                revised_partials.push(word);
            }
        }

        WordsUpdated {
            new_finals,
            revised_partials,
            latest_time: self.latest_time,
        }
    }

    fn insertion_point(&self, word: &Word) -> usize {
        self.words
            .partition_point(|w| (w.start_time, w.end_time) <= (word.start_time, word.end_time))
    }

    /// After an in-place replacement the word's timestamps may have
    /// changed (a partial growing into a longer final); keep the buffer
    /// sorted by moving it to its correct slot if needed.
    fn resort_from(&mut self, idx: usize) {
        let word = self.words.remove(idx);
        let insert_at = self.insertion_point(&word);
        self.words.insert(insert_at, word);
    }
}

fn ranges_overlap(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> bool {
    a_start <= b_end && b_start <= a_end
}
