//! Agent API
//!
//! Request and response bodies exchanged between the rollout orchestrator
//! and the fleet agent endpoint.

pub mod models;

pub use models::*;
