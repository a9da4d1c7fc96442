//! Lifecycle of one pending grant/revoke as seen by a caller.
//!
//! `Idle -> Submitting -> {Success, Failed} -> Idle`. `Submitting` is left only when the store
//! answers; there is no optimistic commit to roll back.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MutationState {
    #[default]
    Idle,
    Submitting,
    Success,
    Failed(Error),
}

impl MutationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationState::Success | MutationState::Failed(_))
    }
}

#[derive(Debug, Default)]
pub struct Mutation {
    state: MutationState,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &MutationState {
        &self.state
    }

    /// Enter `Submitting`. A settled outcome is acknowledged implicitly; a call already in
    /// flight is a conflict.
    pub fn begin(&mut self) -> Result<()> {
        if self.state == MutationState::Submitting {
            return Err(Error::Conflict("a mutation is already in flight".into()));
        }
        self.state = MutationState::Submitting;
        Ok(())
    }

    /// Record the store's answer. Ignored unless `Submitting`.
    pub fn finish<T>(&mut self, outcome: &Result<T>) {
        if self.state != MutationState::Submitting {
            return;
        }
        self.state = match outcome {
            Ok(_) => MutationState::Success,
            Err(e) => MutationState::Failed(e.clone()),
        };
    }

    /// Return to `Idle` after the outcome has been shown.
    pub fn acknowledge(&mut self) {
        if self.state.is_terminal() {
            self.state = MutationState::Idle;
        }
    }

    /// Drive one request through the full lifecycle.
    pub fn run<T, F: FnOnce() -> Result<T>>(&mut self, op: F) -> Result<T> {
        self.begin()?;
        let outcome = op();
        self.finish(&outcome);
        outcome
    }
}
