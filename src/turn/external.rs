//! External policy: the engine's own `EndOfUtterance` is ignored
//! entirely; a turn only closes when the client explicitly calls
//! `finalize(end_of_turn: true)` (§4.G External). Useful for callers
//! driving turn-taking from a push-to-talk button or a separate VAD.

use super::{TurnAction, TurnContext, TurnPolicy};

pub struct ExternalPolicy;

impl ExternalPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExternalPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnPolicy for ExternalPolicy {
    fn on_end_of_utterance(&mut self, _ctx: &TurnContext) -> TurnAction {
        TurnAction::None
    }

    fn on_word(&mut self, _ctx: &TurnContext) -> TurnAction {
        TurnAction::None
    }

    fn on_timer_fired(&mut self, _ctx: &TurnContext) -> TurnAction {
        TurnAction::None
    }
}
