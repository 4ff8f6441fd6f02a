//! Deployment models

use std::fmt;

use agent_api::{DeployRequest, RollbackRequest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::AgentError;

/// Minimum identifier length for app names and tags
pub const MIN_IDENT_LEN: usize = 2;

/// Maximum identifier length for app names and tags
pub const MAX_IDENT_LEN: usize = 100;

/// Identifies one deployment slot on an agent: an application at a tag.
///
/// Both parts are restricted to `[A-Za-z0-9._-]`, start with an alphanumeric
/// character and are 2 to 100 characters long, so each maps to exactly one
/// path component and two targets never share a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentTarget {
    app: String,
    tag: String,
}

impl DeploymentTarget {
    /// Create a validated target
    pub fn new(app: impl Into<String>, tag: impl Into<String>) -> Result<Self, AgentError> {
        let app = app.into();
        let tag = tag.into();
        validate_ident("app", &app)?;
        validate_ident("tag", &tag)?;
        Ok(Self { app, tag })
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Compose project name of the slot.
    ///
    /// Readable `<app>_<tag>` prefix, lowercased with `.` mapped to `-`, plus
    /// a digest of the exact pair so that targets differing only in case or
    /// punctuation still get distinct projects.
    pub fn project_name(&self) -> String {
        let digest = Sha256::digest(format!("{}/{}", self.app, self.tag).as_bytes());
        let suffix: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
        format!(
            "{}_{}_{}",
            project_part(&self.app),
            project_part(&self.tag),
            suffix
        )
    }
}

fn project_part(value: &str) -> String {
    value.to_ascii_lowercase().replace('.', "-")
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.app, self.tag)
    }
}

fn validate_ident(field: &str, value: &str) -> Result<(), AgentError> {
    let len = value.chars().count();
    if !(MIN_IDENT_LEN..=MAX_IDENT_LEN).contains(&len) {
        return Err(AgentError::ValidationError(format!(
            "{} must be between {} and {} characters, got {}",
            field, MIN_IDENT_LEN, MAX_IDENT_LEN, len
        )));
    }

    let starts_alnum = value.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_allowed = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !starts_alnum || !rest_allowed {
        return Err(AgentError::ValidationError(format!(
            "{} may only contain letters, digits, '.', '_' and '-' and must start with a letter or digit: {:?}",
            field, value
        )));
    }

    Ok(())
}

/// One configuration generation: the compose document plus an optional env blob.
///
/// Neither field is parsed by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationBundle {
    pub compose: String,
    #[serde(default)]
    pub env: Option<String>,
}

impl ConfigurationBundle {
    pub fn new(compose: impl Into<String>, env: Option<String>) -> Self {
        Self {
            compose: compose.into(),
            env,
        }
    }
}

/// Validate a deploy request into the slot it addresses and the bundle to apply
pub fn parse_deploy_request(
    req: DeployRequest,
) -> Result<(DeploymentTarget, ConfigurationBundle), AgentError> {
    let target = DeploymentTarget::new(req.app, req.tag)?;
    if req.compose.trim().is_empty() {
        return Err(AgentError::ValidationError(
            "compose must not be empty".to_string(),
        ));
    }
    Ok((target, ConfigurationBundle::new(req.compose, req.env)))
}

impl TryFrom<RollbackRequest> for DeploymentTarget {
    type Error = AgentError;

    fn try_from(req: RollbackRequest) -> Result<Self, Self::Error> {
        DeploymentTarget::new(req.app, req.tag)
    }
}
