//! Fleet orchestrator: plans a rollout and drives it across agents

pub mod client;
pub mod plan;
pub mod rollout;
