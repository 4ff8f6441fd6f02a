//! Fleet Agent Library
//!
//! Per-agent deployment slots with crash-safe apply and rollback, the HTTP
//! endpoint exposing them, and the orchestrator that rolls a release out
//! across a fleet of agents.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod server;
pub mod storage;
pub mod utils;
