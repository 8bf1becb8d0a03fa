//! Authentication and quota core.
//!
//! Leaves first: credential verification, the access-token codec, refresh
//! secrets, the session registry, the anonymous usage ledger, and the rate
//! limiter. The [`gateway`] module combines them into the single admission
//! decision made for every metered request; [`state`] wires them together at
//! startup.

pub mod access_token;
pub mod endpoints;
pub mod error;
pub mod gateway;
pub mod jwks;
pub mod ledger;
pub mod rate_limit;
pub mod refresh_token;
pub mod session;
pub mod state;
pub mod verifier;
