//! Utility functions

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// Version information for the binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Collect `--key=value` and `--flag` arguments; anything else is ignored
pub fn parse_cli_args(args: impl Iterator<Item = String>) -> HashMap<String, String> {
    let mut cli_args = HashMap::new();
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            cli_args.insert(key.trim_start_matches('-').to_string(), value.to_string());
        } else if arg.starts_with("--") {
            cli_args.insert(arg.trim_start_matches('-').to_string(), "true".to_string());
        }
    }
    cli_args
}

/// Failure of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    /// The program could not be started at all
    Spawn(String),
    /// The program ran and exited unsuccessfully
    Exit { code: Option<i32>, stderr: String },
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandFailure::Spawn(e) => write!(f, "failed to start: {}", e),
            CommandFailure::Exit { code: Some(code), stderr } => {
                write!(f, "exited with status {}: {}", code, stderr.trim())
            }
            CommandFailure::Exit { code: None, stderr } => {
                write!(f, "terminated by signal: {}", stderr.trim())
            }
        }
    }
}

/// Run a program to completion, returning its stdout.
///
/// stdout and stderr are captured; a non-zero exit yields the captured stderr.
pub async fn sh(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String, CommandFailure> {
    debug!(program, ?args, ?cwd, "running command");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .map_err(|e| CommandFailure::Spawn(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        return Err(CommandFailure::Exit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Constant-time string comparison for credentials
pub fn constant_time_eq(expected: &str, presented: &str) -> bool {
    use sha2::{Digest, Sha256};

    // Compare fixed-size digests so the length of the secret does not leak
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(presented.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
