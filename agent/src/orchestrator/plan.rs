//! Deployment log and rollout planning
//!
//! A project keeps a JSON deployment log describing, per environment, where
//! its compose and env files live and which agents to roll out to. A
//! [`RolloutPlan`] turns one environment of that log into the request and the
//! ordered node list the orchestrator needs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use agent_api::DeployRequest;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentTarget;
use crate::orchestrator::client::AgentNode;

/// Default deployment log file name
pub const DEPLOYMENT_LOG_FILE: &str = "deployment-logs.json";

const MAX_NAME_LEN: usize = 50;
const MAX_ORG_LEN: usize = 50;
const MAX_IMAGE_LEN: usize = 100;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnv {
    Staging,
    Development,
    Production,
}

impl DeployEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployEnv::Staging => "staging",
            DeployEnv::Development => "development",
            DeployEnv::Production => "production",
        }
    }
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployEnv {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "staging" => Ok(DeployEnv::Staging),
            "development" => Ok(DeployEnv::Development),
            "production" => Ok(DeployEnv::Production),
            other => Err(AgentError::ValidationError(format!(
                "Unknown deployment environment: {:?}",
                other
            ))),
        }
    }
}

/// Released version of an environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentVersion {
    #[serde(default)]
    pub major: Option<u64>,
    #[serde(default)]
    pub minor: Option<u64>,
    #[serde(default)]
    pub patch: Option<u64>,
}

/// Per-environment section of the deployment log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentLog {
    pub docker_organization: String,
    pub docker_image: String,
    /// Path of the compose file, relative to the log file
    pub docker_compose: String,
    /// Env files, concatenated in order
    pub env_paths: Vec<String>,
    #[serde(default)]
    pub version: DeploymentVersion,
    #[serde(default)]
    pub version_tag: Option<String>,
    /// Agents, in rollout order
    pub agent_urls: Vec<String>,
}

impl EnvironmentLog {
    /// `v<major>.<minor>.<patch>[-<tag>]`
    pub fn version_string(&self) -> String {
        let v = &self.version;
        let mut version = format!(
            "v{}.{}.{}",
            v.major.unwrap_or(0),
            v.minor.unwrap_or(0),
            v.patch.unwrap_or(0)
        );
        if let Some(tag) = self.version_tag.as_deref().filter(|t| !t.is_empty()) {
            version.push('-');
            version.push_str(tag);
        }
        version
    }

    /// Image reference the environment runs: `org/image-env:version`
    pub fn image_ref(&self, env: DeployEnv) -> String {
        format!(
            "{}/{}-{}:{}",
            self.docker_organization,
            self.docker_image,
            env,
            self.version_string()
        )
    }

    fn validate(&self, env: DeployEnv) -> Result<(), AgentError> {
        let invalid = |msg: String| AgentError::ValidationError(format!("{}: {}", env, msg));

        if self.docker_organization.is_empty() || self.docker_organization.len() > MAX_ORG_LEN {
            return Err(invalid(format!(
                "dockerOrganization must be 1 to {} characters",
                MAX_ORG_LEN
            )));
        }
        if self.docker_image.is_empty() || self.docker_image.len() > MAX_IMAGE_LEN {
            return Err(invalid(format!(
                "dockerImage must be 1 to {} characters",
                MAX_IMAGE_LEN
            )));
        }
        if self.docker_compose.trim().is_empty() {
            return Err(invalid("dockerCompose is required".to_string()));
        }
        if self.env_paths.is_empty() {
            return Err(invalid("envPaths needs at least one entry".to_string()));
        }
        if self.agent_urls.is_empty() {
            return Err(invalid("agentUrls needs at least one entry".to_string()));
        }
        Ok(())
    }
}

/// Deployment log of one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLog {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging: Option<EnvironmentLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development: Option<EnvironmentLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production: Option<EnvironmentLog>,
}

impl DeploymentLog {
    /// Load a deployment log from disk
    pub async fn load(path: &Path) -> Result<Self, AgentError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(AgentError::NotFound(format!(
                "Deployment log {} does not exist",
                path.display()
            )));
        }
        let log: DeploymentLog = file.read_json().await?;
        if log.name.is_empty() || log.name.len() > MAX_NAME_LEN {
            return Err(AgentError::ValidationError(format!(
                "name must be 1 to {} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(log)
    }

    /// Section of one environment
    pub fn environment(&self, env: DeployEnv) -> Option<&EnvironmentLog> {
        match env {
            DeployEnv::Staging => self.staging.as_ref(),
            DeployEnv::Development => self.development.as_ref(),
            DeployEnv::Production => self.production.as_ref(),
        }
    }
}

/// Everything one rollout needs
#[derive(Debug, Clone)]
pub struct RolloutPlan {
    pub env: DeployEnv,
    pub request: DeployRequest,
    pub nodes: Vec<AgentNode>,
    /// Image the compose file is expected to reference
    pub image: String,
}

impl RolloutPlan {
    /// Build the plan for one environment.
    ///
    /// Relative compose and env paths resolve against `base_dir`, the
    /// directory holding the deployment log.
    pub async fn build(
        log: &DeploymentLog,
        env: DeployEnv,
        base_dir: &Path,
        token: SecretString,
    ) -> Result<Self, AgentError> {
        let section = log.environment(env).ok_or_else(|| {
            AgentError::ConfigError(format!(
                "Deployment log {:?} has no {} environment",
                log.name, env
            ))
        })?;
        section.validate(env)?;

        // Fail before contacting any node if the agents would reject the slot
        let target = DeploymentTarget::new(log.name.as_str(), env.as_str())?;

        let compose = read_input(base_dir, &section.docker_compose).await?;
        let mut env_blob = String::new();
        for path in &section.env_paths {
            let contents = read_input(base_dir, path).await?;
            env_blob.push_str(&contents);
            if !contents.is_empty() && !contents.ends_with('\n') {
                env_blob.push('\n');
            }
        }

        let nodes = section
            .agent_urls
            .iter()
            .map(|url| AgentNode::new(url, token.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            env,
            request: DeployRequest {
                app: target.app().to_string(),
                tag: target.tag().to_string(),
                compose,
                env: Some(env_blob),
            },
            nodes,
            image: section.image_ref(env),
        })
    }
}

async fn read_input(base_dir: &Path, path: &str) -> Result<String, AgentError> {
    let resolved: PathBuf = base_dir.join(path);
    File::new(&resolved).read_string().await.map_err(|e| {
        AgentError::ConfigError(format!("Cannot read {}: {}", resolved.display(), e))
    })
}
