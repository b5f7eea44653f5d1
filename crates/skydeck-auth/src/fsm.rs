//! Session state machine using rust-fsm.
//!
//! The session's lifecycle is tracked by an explicit finite state machine
//! instead of being derived from whatever happens to be in storage.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │    SignedOut    │ (initial)
//! └────────┬────────┘
//!          │ SignInRequested / ResumeRequested
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │    SigningIn    │     │    Resuming     │
//! └────────┬────────┘     └────────┬────────┘
//!          │                       │
//!          │ SignInSucceeded       │ RefreshDue ──► Refreshing
//!          │ SignInFailed          │ NoCredentials ──► SignedOut
//!          ▼                       │
//! ┌─────────────────┐              │
//! │    SignedIn     │ ◄────────────┘ (via RefreshSucceeded)
//! └────────┬────────┘
//!          │ RefreshDue                    RefreshFailed
//!          ▼                                    │
//! ┌─────────────────┐ ──────────────────────────┘
//! │   Refreshing    │ ──► SignedIn (RefreshSucceeded)
//! └─────────────────┘
//!          │ SignOutRequested (from SignedIn)
//!          ▼
//! ┌─────────────────┐
//! │   SigningOut    │ ──► SignedOut (SignOutCompleted)
//! └─────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Define the FSM using rust-fsm's declarative macro.
// This generates a module `session_machine` with:
// - session_machine::State (enum)
// - session_machine::Input (enum)
// - session_machine::StateMachine (type alias)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(SignedOut)

    SignedOut => {
        SignInRequested => SigningIn,
        ResumeRequested => Resuming
    },
    Resuming => {
        // Stored refresh token found - exchange it immediately
        RefreshDue => Refreshing,
        // Nothing persisted
        NoCredentials => SignedOut
    },
    SigningIn => {
        SignInSucceeded => SignedIn,
        SignInFailed => SignedOut
    },
    SignedIn => {
        RefreshDue => Refreshing,
        SignOutRequested => SigningOut
    },
    Refreshing => {
        RefreshSucceeded => SignedIn,
        RefreshRetried => Refreshing,
        RefreshFailed => SignedOut
    },
    SigningOut => {
        SignOutCompleted => SignedOut
    }
}

// Re-export the generated types with clearer names
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session state view for external consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session.
    SignedOut,
    /// Resuming a persisted session on startup.
    Resuming,
    /// Currently signing in.
    SigningIn,
    /// Signed in with a valid token pair.
    SignedIn,
    /// Exchanging the refresh token for a new pair.
    Refreshing,
    /// Currently signing out.
    SigningOut,
}

impl SessionState {
    /// Returns true if the session holds a usable token pair (SignedIn only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::SignedIn)
    }

    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionState::Resuming
                | SessionState::SigningIn
                | SessionState::Refreshing
                | SessionState::SigningOut
        )
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::SignedOut => SessionState::SignedOut,
            SessionMachineState::Resuming => SessionState::Resuming,
            SessionMachineState::SigningIn => SessionState::SigningIn,
            SessionMachineState::SignedIn => SessionState::SignedIn,
            SessionMachineState::Refreshing => SessionState::Refreshing,
            SessionMachineState::SigningOut => SessionState::SigningOut,
        }
    }
}

/// Configuration for retry behavior when a refresh hits a transient failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial delay between attempts in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms.saturating_mul(2u64.pow(attempt));
        let capped_ms = delay_ms.min(self.max_delay_ms);
        Duration::from_millis(capped_ms)
    }
}

/// Payload for session state change notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedPayload {
    /// Current session state.
    pub state: SessionState,
    /// User ID if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// User email if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
