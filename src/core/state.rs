//! Run state tracking for one conversion.

use tracing::debug;

/// Stages of a conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ResolvingConfig,
    Optimizing,
    Encoding,
    Serializing,
    Done,
    Failed,
}

impl PipelineState {
    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, ResolvingConfig)
            | (ResolvingConfig, Optimizing)
            | (Optimizing, Encoding)
            | (Encoding, Serializing)
            | (Serializing, Done) => true,
            (ResolvingConfig | Optimizing | Encoding | Serializing, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Records the stages a run has passed through.
///
/// A run is not resumable: once terminal, further transitions are ignored.
#[derive(Debug, Clone)]
pub struct RunState {
    history: Vec<PipelineState>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            history: vec![PipelineState::Idle],
        }
    }

    pub fn current(&self) -> PipelineState {
        *self.history.last().unwrap_or(&PipelineState::Idle)
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Moves to `next`, returning false when the transition is not allowed.
    pub fn advance(&mut self, next: PipelineState) -> bool {
        let current = self.current();
        if !current.can_advance_to(next) {
            debug!("Ignoring pipeline transition {:?} -> {:?}", current, next);
            return false;
        }
        debug!("Pipeline {:?} -> {:?}", current, next);
        self.history.push(next);
        true
    }

    pub fn fail(&mut self) -> bool {
        self.advance(PipelineState::Failed)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
