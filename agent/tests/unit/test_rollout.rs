//! Fleet rollout tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_api::{ApiResponse, ApplyOutcome, DeployRequest, RollbackRequest};
use async_trait::async_trait;
use fleet_agent::app::options::ServerOptions;
use fleet_agent::errors::AgentError;
use fleet_agent::orchestrator::client::{AgentClient, AgentNode, AgentTransport};
use fleet_agent::orchestrator::rollout::{FleetOrchestrator, RolloutError};
use fleet_agent::server::serve::serve;
use fleet_agent::server::state::ServerState;
use secrecy::SecretString;
use tempfile::TempDir;

use crate::common::{server_state, target, ScriptedRuntime, TOKEN};

/// Transport that records calls and fails on chosen nodes
#[derive(Default)]
struct FakeTransport {
    calls: Mutex<Vec<String>>,
    failing_deploys: HashSet<String>,
    failing_rollbacks: HashSet<String>,
}

impl FakeTransport {
    fn failing(deploys: &[&str], rollbacks: &[&str]) -> Self {
        Self {
            failing_deploys: deploys.iter().map(|n| url(n)).collect(),
            failing_rollbacks: rollbacks.iter().map(|n| url(n)).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, kind: &str, node: &AgentNode) {
        let name = node.url().trim_start_matches("http://");
        self.calls.lock().unwrap().push(format!("{} {}", kind, name));
    }
}

#[async_trait]
impl AgentTransport for FakeTransport {
    async fn deploy(&self, node: &AgentNode, _req: &DeployRequest) -> Result<ApiResponse, AgentError> {
        self.record("deploy", node);
        if self.failing_deploys.contains(node.url()) {
            return Err(AgentError::RemoteError {
                status: 500,
                message: "bring-up failed".to_string(),
                outcome: Some(ApplyOutcome::RolledBack),
            });
        }
        Ok(ApiResponse::ok().with_state(ApplyOutcome::Succeeded))
    }

    async fn rollback(
        &self,
        node: &AgentNode,
        _req: &RollbackRequest,
    ) -> Result<ApiResponse, AgentError> {
        self.record("rollback", node);
        if self.failing_rollbacks.contains(node.url()) {
            return Err(AgentError::NetworkError("connection refused".to_string()));
        }
        Ok(ApiResponse::ok().with_state(ApplyOutcome::Succeeded))
    }
}

fn url(name: &str) -> String {
    format!("http://{}", name)
}

fn nodes(names: &[&str]) -> Vec<AgentNode> {
    names
        .iter()
        .map(|n| AgentNode::new(&url(n), SecretString::from(TOKEN)).unwrap())
        .collect()
}

fn request(compose: &str) -> DeployRequest {
    DeployRequest {
        app: "shop".to_string(),
        tag: "production".to_string(),
        compose: compose.to_string(),
        env: Some("K=1".to_string()),
    }
}

fn failure(err: RolloutError) -> Box<fleet_agent::orchestrator::rollout::RolloutFailure> {
    match err {
        RolloutError::Failed(failure) => failure,
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_all_nodes_succeed() {
    let orchestrator = FleetOrchestrator::new(FakeTransport::default());

    let report = orchestrator
        .rollout(&nodes(&["n1", "n2", "n3"]), &request("A"))
        .await
        .unwrap();

    assert_eq!(report.deployed, vec![url("n1"), url("n2"), url("n3")]);
    assert_eq!(
        orchestrator.transport().calls(),
        vec!["deploy n1", "deploy n2", "deploy n3"]
    );
}

#[tokio::test]
async fn test_failure_compensates_in_reverse_order() {
    let orchestrator = FleetOrchestrator::new(FakeTransport::failing(&["n3"], &[]));

    let err = orchestrator
        .rollout(&nodes(&["n1", "n2", "n3", "n4"]), &request("A"))
        .await
        .unwrap_err();

    assert_eq!(
        orchestrator.transport().calls(),
        vec![
            "deploy n1",
            "deploy n2",
            "deploy n3",
            "rollback n2",
            "rollback n1"
        ]
    );
    let failure = failure(err);
    assert_eq!(failure.failed_node, url("n3"));
    assert_eq!(failure.failed_index, 2);
    assert!(failure.fully_compensated());
    assert_eq!(failure.cause.apply_outcome(), Some(ApplyOutcome::RolledBack));
}

#[tokio::test]
async fn test_first_node_failure_needs_no_compensation() {
    let orchestrator = FleetOrchestrator::new(FakeTransport::failing(&["n1"], &[]));

    let err = orchestrator
        .rollout(&nodes(&["n1", "n2"]), &request("A"))
        .await
        .unwrap_err();

    assert_eq!(orchestrator.transport().calls(), vec!["deploy n1"]);
    assert!(failure(err).compensations.is_empty());
}

#[tokio::test]
async fn test_failed_compensation_does_not_stop_the_others() {
    let orchestrator = FleetOrchestrator::new(FakeTransport::failing(&["n3"], &["n2"]));

    let err = orchestrator
        .rollout(&nodes(&["n1", "n2", "n3"]), &request("A"))
        .await
        .unwrap_err();

    assert_eq!(
        orchestrator.transport().calls(),
        vec!["deploy n1", "deploy n2", "deploy n3", "rollback n2", "rollback n1"]
    );
    let failure = failure(err);
    assert!(!failure.fully_compensated());
    assert_eq!(failure.uncompensated(), vec![url("n2")]);
    assert!(failure.to_string().contains("rollback failed on http://n2"));
}

#[tokio::test]
async fn test_empty_fleet_is_rejected() {
    let orchestrator = FleetOrchestrator::new(FakeTransport::default());

    let err = orchestrator.rollout(&[], &request("A")).await.unwrap_err();

    assert!(matches!(err, RolloutError::NoNodes));
    assert!(orchestrator.transport().calls().is_empty());
}

/// One agent endpoint served on a loopback port
struct LiveAgent {
    _dir: TempDir,
    runtime: Arc<ScriptedRuntime>,
    state: Arc<ServerState>,
    node: AgentNode,
}

impl LiveAgent {
    async fn start() -> Self {
        let runtime = Arc::new(ScriptedRuntime::new());
        let (dir, state) = server_state(runtime.clone());
        let options = ServerOptions {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let (addr, _handle) = serve(&options, state.clone(), std::future::pending())
            .await
            .unwrap();
        let node = AgentNode::new(&format!("http://{}", addr), SecretString::from(TOKEN)).unwrap();
        Self {
            _dir: dir,
            runtime,
            state,
            node,
        }
    }

    async fn live_compose(&self) -> Option<String> {
        self.state
            .engine
            .store()
            .read_current(&target("shop", "production"))
            .await
            .unwrap()
            .map(|b| b.compose)
    }
}

#[tokio::test]
async fn test_rollout_against_live_agents() {
    let agents = vec![
        LiveAgent::start().await,
        LiveAgent::start().await,
        LiveAgent::start().await,
    ];
    let fleet: Vec<AgentNode> = agents.iter().map(|a| a.node.clone()).collect();
    let client = AgentClient::with_timeout(Duration::from_secs(10)).unwrap();
    let orchestrator = FleetOrchestrator::new(client);

    orchestrator.rollout(&fleet, &request("A")).await.unwrap();
    for agent in &agents {
        assert_eq!(agent.live_compose().await.as_deref(), Some("A"));
    }

    // Third agent can no longer bring anything up, not even its backup
    agents[2].runtime.fail_all_up(true);
    let err = orchestrator.rollout(&fleet, &request("B")).await.unwrap_err();

    let failure = failure(err);
    assert_eq!(failure.failed_index, 2);
    assert!(failure.fully_compensated());
    match &failure.cause {
        AgentError::RemoteError {
            status, outcome, ..
        } => {
            assert_eq!(*status, 500);
            assert_eq!(*outcome, Some(ApplyOutcome::DoubleFailed));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(agents[0].live_compose().await.as_deref(), Some("A"));
    assert_eq!(agents[1].live_compose().await.as_deref(), Some("A"));
    assert_eq!(agents[0].runtime.brought_up(), vec!["A", "B", "A"]);
}

#[tokio::test]
async fn test_wrong_token_is_reported_as_unauthorized() {
    let agent = LiveAgent::start().await;
    let node = AgentNode::new(agent.node.url(), SecretString::from("wrong")).unwrap();
    let client = AgentClient::with_timeout(Duration::from_secs(10)).unwrap();

    let err = client.deploy(&node, &request("A")).await.unwrap_err();

    assert!(matches!(err, AgentError::RemoteError { status: 401, .. }));
    assert!(agent.runtime.calls().is_empty());
}
