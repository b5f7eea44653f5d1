//! Session management for the Skydeck client.
//!
//! This crate provides:
//! - A REST client for the auth API with bearer injection
//! - Session management with automatic token refresh
//! - Explicit FSM-based session state tracking
//! - An expiry-driven refresh schedule
//! - Shared single-flight refresh for concurrent 401 handling

mod client;
mod error;
mod fsm;
mod scheduler;
mod session;

pub use client::{
    endpoints, ApiClient, ApiClientBuilder, Credentials, SignupRequest, TokenGrant, User,
};
pub use error::{AuthError, AuthResult};
pub use fsm::session_machine;
pub use fsm::{
    RetryPolicy, SessionMachine, SessionMachineInput, SessionMachineState, SessionState,
    StateChangedPayload,
};
pub use scheduler::RefreshSchedule;
pub use session::{Session, SessionSnapshot, StateCallback};
