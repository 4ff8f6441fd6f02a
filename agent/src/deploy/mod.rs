//! Deployment module

pub mod compose;
pub mod engine;
pub mod fsm;
pub mod runtime;
