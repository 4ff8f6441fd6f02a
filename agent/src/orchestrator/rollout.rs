//! Sequential fleet rollout with compensating rollback.
//!
//! Nodes are deployed one at a time in the given order. When a node fails,
//! every node that already confirmed the deploy is rolled back in reverse
//! confirmation order, and the original failure is reported. Nothing is
//! persisted: an interrupted orchestrator leaves the fleet as the last
//! completed call left it.

use std::fmt;

use agent_api::DeployRequest;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AgentError;
use crate::orchestrator::client::{AgentNode, AgentTransport};

/// Rollback outcome for one already-deployed node
#[derive(Debug)]
pub struct Compensation {
    pub node: String,
    pub error: Option<AgentError>,
}

impl Compensation {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Details of a rollout that stopped on a failing node
#[derive(Debug)]
pub struct RolloutFailure {
    pub run_id: Uuid,

    /// Node whose deploy failed
    pub failed_node: String,

    /// Position of the failed node in the rollout order
    pub failed_index: usize,

    /// The deploy failure reported for that node
    pub cause: AgentError,

    /// Rollbacks issued, in the order they were sent
    pub compensations: Vec<Compensation>,
}

impl RolloutFailure {
    /// Whether every already-deployed node was rolled back
    pub fn fully_compensated(&self) -> bool {
        self.compensations.iter().all(Compensation::succeeded)
    }

    /// Nodes whose rollback failed
    pub fn uncompensated(&self) -> Vec<&str> {
        self.compensations
            .iter()
            .filter(|c| !c.succeeded())
            .map(|c| c.node.as_str())
            .collect()
    }
}

impl fmt::Display for RolloutFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deploy failed on {} (node {}): {}",
            self.failed_node,
            self.failed_index + 1,
            self.cause
        )?;
        if !self.compensations.is_empty() {
            let failed = self.uncompensated();
            if failed.is_empty() {
                write!(f, "; rolled back {} node(s)", self.compensations.len())?;
            } else {
                write!(f, "; rollback failed on {}", failed.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Rollout error
#[derive(Error, Debug)]
pub enum RolloutError {
    #[error("Rollout has no nodes")]
    NoNodes,

    #[error("Rollout failed: {0}")]
    Failed(Box<RolloutFailure>),
}

/// Successful rollout
#[derive(Debug, Clone)]
pub struct RolloutReport {
    pub run_id: Uuid,

    /// Nodes deployed, in order
    pub deployed: Vec<String>,
}

/// In-memory state of one rollout
struct RolloutRun<'a> {
    id: Uuid,
    nodes: &'a [AgentNode],
    cursor: usize,
    succeeded: Vec<&'a AgentNode>,
}

impl<'a> RolloutRun<'a> {
    fn new(nodes: &'a [AgentNode]) -> Self {
        Self {
            id: Uuid::new_v4(),
            nodes,
            cursor: 0,
            succeeded: Vec::with_capacity(nodes.len()),
        }
    }

    fn current(&self) -> Option<&'a AgentNode> {
        self.nodes.get(self.cursor)
    }

    fn confirm(&mut self, node: &'a AgentNode) {
        self.succeeded.push(node);
        self.cursor += 1;
    }
}

/// Drives rollouts through an agent transport
pub struct FleetOrchestrator<T: AgentTransport> {
    transport: T,
}

impl<T: AgentTransport> FleetOrchestrator<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Deploy to every node in order, compensating on the first failure
    pub async fn rollout(
        &self,
        nodes: &[AgentNode],
        request: &DeployRequest,
    ) -> Result<RolloutReport, RolloutError> {
        if nodes.is_empty() {
            return Err(RolloutError::NoNodes);
        }

        let mut run = RolloutRun::new(nodes);
        info!(
            run = %run.id,
            app = %request.app,
            tag = %request.tag,
            nodes = nodes.len(),
            "Starting rollout"
        );

        while let Some(node) = run.current() {
            info!(run = %run.id, node = %node, step = run.cursor + 1, "Deploying");
            match self.transport.deploy(node, request).await {
                Ok(_) => {
                    info!(run = %run.id, node = %node, "Deploy confirmed");
                    run.confirm(node);
                }
                Err(cause) => {
                    error!(run = %run.id, node = %node, "Deploy failed: {}", cause);
                    let compensations = self.compensate(&run, request).await;
                    return Err(RolloutError::Failed(Box::new(RolloutFailure {
                        run_id: run.id,
                        failed_node: node.to_string(),
                        failed_index: run.cursor,
                        cause,
                        compensations,
                    })));
                }
            }
        }

        info!(run = %run.id, "Rollout completed on all nodes");
        Ok(RolloutReport {
            run_id: run.id,
            deployed: run.succeeded.iter().map(|n| n.to_string()).collect(),
        })
    }

    /// Roll back confirmed nodes, newest first, without stopping on failures
    async fn compensate(&self, run: &RolloutRun<'_>, request: &DeployRequest) -> Vec<Compensation> {
        let rollback = request.rollback();
        let mut compensations = Vec::with_capacity(run.succeeded.len());

        for node in run.succeeded.iter().rev() {
            warn!(run = %run.id, node = %node, "Rolling back");
            let error = match self.transport.rollback(node, &rollback).await {
                Ok(_) => None,
                Err(e) => {
                    error!(run = %run.id, node = %node, "Rollback failed: {}", e);
                    Some(e)
                }
            };
            compensations.push(Compensation {
                node: node.to_string(),
                error,
            });
        }

        compensations
    }
}
