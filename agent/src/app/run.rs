//! Agent run loop

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::deploy::compose::DockerCompose;
use crate::deploy::engine::ApplyEngine;
use crate::deploy::runtime::ContainerRuntime;
use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::storage::slot::SlotStore;

/// Run the agent endpoint with the docker compose runtime until shutdown
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    run_with_runtime(options, Arc::new(DockerCompose::default()), shutdown_signal).await
}

/// Run the agent endpoint with an explicit container runtime until shutdown
pub async fn run_with_runtime(
    options: AppOptions,
    runtime: Arc<dyn ContainerRuntime>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing fleet agent...");

    let root = Dir::new(&options.storage.apps_root);
    root.create().await.map_err(|e| {
        AgentError::StorageError(format!(
            "Cannot create apps root {}: {}",
            options.storage.apps_root.display(),
            e
        ))
    })?;
    info!("Deployment slots under {}", options.storage.apps_root.display());

    let engine = ApplyEngine::new(SlotStore::new(options.storage.clone()), runtime);
    let state = Arc::new(ServerState::new(engine, options.access_token.clone()));

    let (_addr, handle) = serve(&options.server, state, shutdown_signal).await?;

    match handle.await {
        Ok(result) => {
            info!("Agent endpoint stopped");
            result
        }
        Err(e) => {
            error!("Agent endpoint task failed: {}", e);
            Err(AgentError::ServerError(e.to_string()))
        }
    }
}
