//! Adaptive policy: widen or narrow the fixed silence window based on
//! the most recently closed segment's annotations (§4.G Adaptive).
//!
//! Baseline window is `silence_trigger`; a trailing disfluency or a
//! segment lacking terminal punctuation pushes the window wider (the
//! speaker probably isn't done), while an explicit end-of-sentence
//! punctuation mark pulls it narrower. The result is always clamped to
//! `[silence_trigger, max_delay]`.

use std::time::Duration;

use crate::types::Annotation;

use super::{TurnAction, TurnContext, TurnPolicy};

pub struct AdaptivePolicy {
    delta: f64,
    /// Absolute time (seconds since session start) the open prediction
    /// window closes, if one is pending.
    deadline: Option<f64>,
}

impl AdaptivePolicy {
    pub fn new(delta: f64) -> Self {
        Self {
            delta,
            deadline: None,
        }
    }
}

/// Pure function so it can be exercised without constructing a policy or
/// a full `Segment`.
pub fn compute_window(
    silence_trigger: f64,
    max_delay: f64,
    has_trailing_disfluency: bool,
    ends_with_punctuation: bool,
    ends_with_eos: bool,
    delta: f64,
) -> f64 {
    let mut window = silence_trigger;
    if has_trailing_disfluency {
        window += delta;
    }
    if !ends_with_punctuation {
        window += delta;
    }
    if ends_with_eos {
        window -= delta;
    }
    window.clamp(silence_trigger, max_delay)
}

impl TurnPolicy for AdaptivePolicy {
    fn on_end_of_utterance(&mut self, ctx: &TurnContext) -> TurnAction {
        let segment = ctx.last_segment;
        let has_trailing_disfluency = segment.is_some_and(|s| s.has_annotation(Annotation::HasDisfluency));
        let ends_with_punctuation = segment.is_some_and(|s| s.has_annotation(Annotation::EndsWithPunctuation));
        let ends_with_eos = segment.is_some_and(|s| s.has_annotation(Annotation::EndsWithEos));

        let window = compute_window(
            ctx.silence_trigger,
            ctx.max_delay,
            has_trailing_disfluency,
            ends_with_punctuation,
            ends_with_eos,
            self.delta,
        );
        self.deadline = Some(ctx.now + window);
        TurnAction::OpenPrediction(Duration::from_secs_f64(window))
    }

    /// Cancels the pending window only while it is still open
    /// (`ctx.now < deadline`). A word that arrives after the deadline has
    /// already elapsed is too late to cancel — the window already closed,
    /// it just hasn't been noticed by a timer tick yet — so the pending
    /// close is left in place for `on_timer_fired` to carry out.
    fn on_word(&mut self, ctx: &TurnContext) -> TurnAction {
        match self.deadline {
            Some(deadline) if ctx.now < deadline => {
                self.deadline = None;
                TurnAction::CancelPrediction
            }
            _ => TurnAction::None,
        }
    }

    /// Only closes once the prediction window's deadline has actually
    /// elapsed; a tick that arrives before `d` has passed leaves the
    /// window open for a later tick to check again.
    fn on_timer_fired(&mut self, ctx: &TurnContext) -> TurnAction {
        match self.deadline {
            Some(deadline) if ctx.now >= deadline => {
                self.deadline = None;
                TurnAction::CloseTurn
            }
            _ => TurnAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_disfluency_widens_the_window() {
        let base = compute_window(0.5, 2.0, false, true, false, 0.2);
        let widened = compute_window(0.5, 2.0, true, true, false, 0.2);
        assert!(widened > base);
    }

    #[test]
    fn explicit_eos_narrows_but_never_below_silence_trigger() {
        let window = compute_window(0.5, 2.0, false, true, true, 10.0);
        assert_eq!(window, 0.5);
    }

    #[test]
    fn window_never_exceeds_max_delay() {
        let window = compute_window(0.5, 1.0, true, false, false, 5.0);
        assert_eq!(window, 1.0);
    }

    #[test]
    fn word_before_timer_cancels_pending_prediction() {
        let mut policy = AdaptivePolicy::new(0.2);
        let ctx = TurnContext {
            now: 0.0,
            silence_trigger: 0.5,
            max_delay: 2.0,
            last_segment: None,
        };
        assert!(matches!(policy.on_end_of_utterance(&ctx), TurnAction::OpenPrediction(_)));
        // Still well within the window (d = 0.7s here).
        let mid_window = TurnContext { now: 0.1, ..ctx };
        assert_eq!(policy.on_word(&mid_window), TurnAction::CancelPrediction);
        assert_eq!(policy.on_timer_fired(&mid_window), TurnAction::None);
    }

    #[test]
    fn timer_tick_before_deadline_does_not_close() {
        // A 50ms ceiling tick firing well before d has elapsed must not
        // close the turn early.
        let mut policy = AdaptivePolicy::new(0.2);
        let opened = TurnContext {
            now: 0.0,
            silence_trigger: 0.5,
            max_delay: 2.0,
            last_segment: None,
        };
        assert!(matches!(policy.on_end_of_utterance(&opened), TurnAction::OpenPrediction(_)));

        let early_tick = TurnContext { now: 0.05, ..opened };
        assert_eq!(policy.on_timer_fired(&early_tick), TurnAction::None);

        let late_tick = TurnContext { now: 0.75, ..opened };
        assert_eq!(policy.on_timer_fired(&late_tick), TurnAction::CloseTurn);
    }

    #[test]
    fn word_after_deadline_elapsed_cannot_cancel() {
        let mut policy = AdaptivePolicy::new(0.2);
        let opened = TurnContext {
            now: 0.0,
            silence_trigger: 0.5,
            max_delay: 2.0,
            last_segment: None,
        };
        assert!(matches!(policy.on_end_of_utterance(&opened), TurnAction::OpenPrediction(_)));

        // d = 0.7s; a "word" observed at 0.8s is too late to cancel.
        let too_late = TurnContext { now: 0.8, ..opened };
        assert_eq!(policy.on_word(&too_late), TurnAction::None);
        assert_eq!(policy.on_timer_fired(&too_late), TurnAction::CloseTurn);
    }
}
