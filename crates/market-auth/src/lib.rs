//! Session and authentication lifecycle for the marketplace client.
//!
//! This crate provides:
//! - An HTTP pipeline that attaches credentials and renews them once on `401`,
//!   with concurrent renewals coalesced into a single refresh call
//! - Identity operations (login, register, logout, current user) with
//!   normalization of the server's payload shapes
//! - Role-conditional profile loading
//! - An observable session state container with FSM-checked phase changes
//!   and durable snapshot persistence
//! - Route resolution from the session snapshot

mod client;
mod error;
mod identity;
mod models;
mod navigation;
mod normalize;
mod phase_fsm;
mod profile;
mod session;

pub use client::{
    retry_decision, ApiClient, ApiRequest, ApiResponse, InFlight, RetryDecision, REFRESH_PATH,
};
pub use error::{AuthError, AuthResult};
pub use identity::{IdentityClient, CURRENT_USER_PATH, LOGIN_PATH, LOGOUT_PATH, REGISTER_PATH};
pub use models::{
    AccountStatus, Actor, ConsumerProfile, Location, RegisterRequest, Role, RoleProfile,
    VendorProfile,
};
pub use navigation::{resolve_route, Route};
pub use normalize::{
    error_message, normalize_auth_payload, normalize_token_payload, unwrap_record, AuthPayload,
};
pub use phase_fsm::phase_machine;
pub use phase_fsm::{derive_phase, AuthPhase, PhaseInput, PhaseMachine, PhaseState};
pub use profile::{ProfileLoader, CONSUMER_PROFILE_PATH, VENDOR_PROFILE_PATH};
pub use session::{AuthSnapshot, PersistedSession, SessionListener, SessionStore, SubscriptionId};
