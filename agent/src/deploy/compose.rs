//! Docker Compose runtime

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::deploy::runtime::{ComposeProject, ContainerRuntime};
use crate::errors::AgentError;
use crate::storage::layout::COMPOSE_FILE;
use crate::utils::{sh, CommandFailure};

/// Compose CLI flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeCli {
    /// `docker compose` (plugin)
    Plugin,
    /// `docker-compose` (standalone)
    Standalone,
}

impl ComposeCli {
    fn program(&self) -> &'static str {
        match self {
            ComposeCli::Plugin => "docker",
            ComposeCli::Standalone => "docker-compose",
        }
    }

    fn prefix(&self) -> &'static [&'static str] {
        match self {
            ComposeCli::Plugin => &["compose"],
            ComposeCli::Standalone => &[],
        }
    }
}

/// Runs `pull` and `up` through the docker compose CLI
#[derive(Debug, Clone)]
pub struct DockerCompose {
    cli: ComposeCli,
    /// Fall back to the standalone binary when the plugin cannot be started
    fallback: bool,
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self {
            cli: ComposeCli::Plugin,
            fallback: true,
        }
    }
}

impl DockerCompose {
    pub fn new(cli: ComposeCli) -> Self {
        Self {
            cli,
            fallback: false,
        }
    }

    async fn run(&self, project: &ComposeProject, args: &[&str]) -> Result<String, CommandFailure> {
        if !project.dir.join(COMPOSE_FILE).exists() {
            return Err(CommandFailure::Spawn(format!(
                "no {} in {}",
                COMPOSE_FILE,
                project.dir.display()
            )));
        }

        let result = run_cli(self.cli, project, args).await;
        match result {
            Err(CommandFailure::Spawn(e)) if self.fallback && self.cli == ComposeCli::Plugin => {
                warn!("docker compose unavailable ({}), trying docker-compose", e);
                run_cli(ComposeCli::Standalone, project, args).await
            }
            other => other,
        }
    }
}

/// Full argument list for one compose invocation.
///
/// The project name is always explicit; compose would otherwise derive it
/// from the directory name, which is only the tag.
fn cli_args<'a>(cli: ComposeCli, project: &'a ComposeProject, args: &[&'a str]) -> Vec<&'a str> {
    let mut full: Vec<&str> = cli.prefix().to_vec();
    full.extend_from_slice(&["-p", project.name.as_str(), "-f", COMPOSE_FILE]);
    full.extend_from_slice(args);
    full
}

async fn run_cli(
    cli: ComposeCli,
    project: &ComposeProject,
    args: &[&str],
) -> Result<String, CommandFailure> {
    sh(cli.program(), &cli_args(cli, project, args), Some(project.dir.as_path())).await
}

#[async_trait]
impl ContainerRuntime for DockerCompose {
    async fn pull(&self, project: &ComposeProject) -> Result<(), AgentError> {
        debug!(project = %project.name, "Pulling images in {}", project.dir.display());
        self.run(project, &["pull"])
            .await
            .map_err(|e| AgentError::ImagePullError(e.to_string()))?;
        Ok(())
    }

    async fn up(&self, project: &ComposeProject) -> Result<(), AgentError> {
        info!(project = %project.name, "Bringing up compose project in {}", project.dir.display());
        self.run(project, &["up", "-d", "--remove-orphans"])
            .await
            .map_err(|e| AgentError::BringUpError(e.to_string()))?;
        Ok(())
    }
}
