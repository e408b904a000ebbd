//! Authentication phase state machine using rust-fsm.
//!
//! The phase is derived from the session snapshot by [`derive_phase`]; the
//! machine declares which phase changes are legal. Every snapshot update in
//! the session store is checked against it before it is applied.
//!
//! ## State Diagram
//!
//! ```text
//!                 ┌─────────────────┐
//!        ┌───────►│    Anonymous    │ (initial)
//!        │        └────────┬────────┘
//!        │                 │ Begin
//!        │                 ▼
//!        │        ┌─────────────────┐   Fail    ┌─────────┐
//!   SignOut       │ Authenticating  │ ────────► │  Error  │
//!  (from any)     └────────┬────────┘           └─────────┘
//!        │                 │ ProfileMissing / ProfileResolved
//!        │                 ▼
//!        │     AuthenticatedNoProfile ◄──► AuthenticatedWithProfile
//!        └──────────────────┘
//! ```
//!
//! Anonymous cannot jump straight to an authenticated phase: a stale action
//! completing after logout is rejected instead of signing the actor back in.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Generates `phase_machine::{State, Input, StateMachine}`.
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub phase_machine(Anonymous)

    Anonymous => {
        Begin => Authenticating,
        SignOut => Anonymous
    },
    Authenticating => {
        Begin => Authenticating,
        SignOut => Anonymous,
        ProfileMissing => AuthenticatedNoProfile,
        ProfileResolved => AuthenticatedWithProfile,
        Fail => Error
    },
    AuthenticatedNoProfile => {
        Begin => Authenticating,
        SignOut => Anonymous,
        ProfileResolved => AuthenticatedWithProfile,
        Fail => Error
    },
    AuthenticatedWithProfile => {
        Begin => Authenticating,
        SignOut => Anonymous,
        ProfileMissing => AuthenticatedNoProfile,
        Fail => Error
    },
    Error => {
        Begin => Authenticating,
        SignOut => Anonymous,
        ProfileMissing => AuthenticatedNoProfile,
        ProfileResolved => AuthenticatedWithProfile
    }
}

pub use phase_machine::Input as PhaseInput;
pub use phase_machine::State as PhaseState;
pub use phase_machine::StateMachine as PhaseMachine;

/// Coarse authentication phase observed by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Anonymous,
    Authenticating,
    AuthenticatedNoProfile,
    AuthenticatedWithProfile,
    Error,
}

impl AuthPhase {
    /// True for both authenticated phases.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            AuthPhase::AuthenticatedNoProfile | AuthPhase::AuthenticatedWithProfile
        )
    }

    /// Machine input that lands on this phase.
    pub fn input(&self) -> PhaseInput {
        match self {
            AuthPhase::Anonymous => PhaseInput::SignOut,
            AuthPhase::Authenticating => PhaseInput::Begin,
            AuthPhase::AuthenticatedNoProfile => PhaseInput::ProfileMissing,
            AuthPhase::AuthenticatedWithProfile => PhaseInput::ProfileResolved,
            AuthPhase::Error => PhaseInput::Fail,
        }
    }

    /// Short lowercase name for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthPhase::Anonymous => "anonymous",
            AuthPhase::Authenticating => "authenticating",
            AuthPhase::AuthenticatedNoProfile => "authenticated_no_profile",
            AuthPhase::AuthenticatedWithProfile => "authenticated_with_profile",
            AuthPhase::Error => "error",
        }
    }
}

impl From<&PhaseState> for AuthPhase {
    fn from(state: &PhaseState) -> Self {
        match state {
            PhaseState::Anonymous => AuthPhase::Anonymous,
            PhaseState::Authenticating => AuthPhase::Authenticating,
            PhaseState::AuthenticatedNoProfile => AuthPhase::AuthenticatedNoProfile,
            PhaseState::AuthenticatedWithProfile => AuthPhase::AuthenticatedWithProfile,
            PhaseState::Error => AuthPhase::Error,
        }
    }
}

/// Phase as a pure function of the session fields. Checked in order: error,
/// loading, authentication, profile.
pub fn derive_phase(
    is_authenticated: bool,
    has_actor: bool,
    has_profile: bool,
    is_loading: bool,
    has_error: bool,
) -> AuthPhase {
    if has_error {
        AuthPhase::Error
    } else if is_loading {
        AuthPhase::Authenticating
    } else if !is_authenticated || !has_actor {
        AuthPhase::Anonymous
    } else if has_profile {
        AuthPhase::AuthenticatedWithProfile
    } else {
        AuthPhase::AuthenticatedNoProfile
    }
}
