//! Fixed policy: trust the engine's own silence-based `EndOfUtterance`
//! directly as the turn boundary (§4.G Fixed). Simplest and default
//! policy, grounded in the teacher's "just forward the upstream event"
//! handling style used for chat completions.

use super::{TurnAction, TurnContext, TurnPolicy};

pub struct FixedPolicy;

impl FixedPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FixedPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnPolicy for FixedPolicy {
    fn on_end_of_utterance(&mut self, _ctx: &TurnContext) -> TurnAction {
        TurnAction::CloseTurn
    }

    fn on_word(&mut self, _ctx: &TurnContext) -> TurnAction {
        TurnAction::None
    }

    fn on_timer_fired(&mut self, _ctx: &TurnContext) -> TurnAction {
        TurnAction::None
    }
}
