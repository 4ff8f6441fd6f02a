//! Agent HTTP endpoint

pub mod auth;
pub mod handlers;
pub mod locks;
pub mod serve;
pub mod state;
