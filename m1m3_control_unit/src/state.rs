//! Lifecycle state machine.
//!
//! One [`DetailedState`] is current. A command is dispatched with a `match`
//! over `(state, command)`; the handler acts on the [`Model`](crate::model::Model)
//! and proposes the next state (or none). The safety controller then gets
//! the final word: a pending fault replaces any proposal with
//! `LoweringFault`.
//!
//! ## Submodules
//! - [`context`]: current state, dispatch, transition publication
//! - `lifecycle`: Offline, Standby, Disabled, Fault, LoweringFault
//! - `enabled`: Parked, Raising, Active, Lowering and their engineering twins

pub mod context;
mod enabled;
mod lifecycle;

use m1m3_common::config::ConfigError;
use m1m3_common::state::DetailedState;
use thiserror::Error;

use crate::command::{Command, CommandError};
use crate::force::ForceError;
use crate::hardpoint::HardpointError;
use crate::transport::TransportError;

pub use context::Context;

/// Why a command failed inside the state machine. Acknowledged FAILED.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    /// The current state does not accept the command.
    #[error("The command {command} is not valid in the {state} state.")]
    NotValid {
        command: &'static str,
        state: DetailedState,
    },
    /// Accepted in this state, but refused with these arguments.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Force(#[from] ForceError),
    #[error(transparent)]
    Hardpoint(#[from] HardpointError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Settings(#[from] ConfigError),
}

impl StateError {
    pub(crate) const fn not_valid(command: &Command, state: DetailedState) -> Self {
        Self::NotValid {
            command: command.name(),
            state,
        }
    }
}

/// Handler outcome: the proposed next state, `None` to stay.
pub(crate) type Transition = Result<Option<DetailedState>, StateError>;
