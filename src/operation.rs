//! Single-flight state for the two long-running session operations.

use std::fmt;

use crate::error_taxonomy::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Assist,
    Generate,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assist => f.write_str("assist"),
            Self::Generate => f.write_str("generate"),
        }
    }
}

/// `Succeeded`, `Failed` and `RateLimited` are display states; the next
/// submit moves straight back to `InFlight`.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationState<T> {
    Idle,
    InFlight,
    Succeeded(T),
    Failed(String),
    RateLimited(u64),
}

/// Identifies one submit so a settle can be matched to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTicket(u64);

#[derive(Debug)]
pub struct Operation<T> {
    kind: OperationKind,
    state: OperationState<T>,
    submits: u64,
}

impl<T> Operation<T> {
    #[must_use]
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            state: OperationState::Idle,
            submits: 0,
        }
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> &OperationState<T> {
        &self.state
    }

    /// Whether the trigger control accepts a click.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.is_loading()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self.state, OperationState::InFlight)
    }

    /// Start a submit. A second submit while one is in flight is rejected,
    /// never queued.
    pub fn begin(&mut self) -> Result<OperationTicket, SessionError> {
        if self.is_loading() {
            return Err(SessionError::Busy(self.kind));
        }
        self.submits += 1;
        self.state = OperationState::InFlight;
        Ok(OperationTicket(self.submits))
    }

    /// Record how a submit ended. Returns `false` for a ticket that is not
    /// the current in-flight submit.
    pub fn settle(&mut self, ticket: OperationTicket, state: OperationState<T>) -> bool {
        if ticket.0 != self.submits || !self.is_loading() {
            return false;
        }
        debug_assert!(!matches!(state, OperationState::InFlight));
        self.state = state;
        true
    }

    /// Drop back to `Idle` unless a submit is in flight.
    pub fn reset(&mut self) {
        if !self.is_loading() {
            self.state = OperationState::Idle;
        }
    }
}
