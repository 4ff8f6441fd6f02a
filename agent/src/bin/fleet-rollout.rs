//! Fleet Rollout - Entry Point
//!
//! Rolls the release described by a project's deployment log out to every
//! agent of one environment, in order, rolling back confirmed agents if a
//! later one fails.
//!
//! Usage: `fleet-rollout --env=<staging|development|production> [--log=<path>] [--yes]`
//! The shared agent secret is read from `ACCESS_TOKEN`.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use secrecy::SecretString;
use tracing::info;

use fleet_agent::logs::{init_logging, LogOptions};
use fleet_agent::orchestrator::client::{AgentClient, DEFAULT_REQUEST_TIMEOUT};
use fleet_agent::orchestrator::plan::{DeployEnv, DeploymentLog, RolloutPlan, DEPLOYMENT_LOG_FILE};
use fleet_agent::orchestrator::rollout::{FleetOrchestrator, RolloutError};
use fleet_agent::storage::settings::{ACCESS_TOKEN_VAR, LOG_LEVEL_VAR};
use fleet_agent::utils::{parse_cli_args, version_info};

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_cli() -> anyhow::Result<()> {
    let cli_args = parse_cli_args(env::args().skip(1));

    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(());
    }

    let log_level = env::var(LOG_LEVEL_VAR)
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or_default();
    let _log_guard = init_logging(LogOptions {
        log_level,
        ..Default::default()
    })?;

    let deploy_env: DeployEnv = cli_args
        .get("env")
        .context("A deployment environment is required (--env=staging|development|production)")?
        .parse()?;

    if deploy_env == DeployEnv::Production && !cli_args.contains_key("yes") {
        bail!("Refusing to deploy to production without --yes");
    }

    let log_path = cli_args
        .get("log")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEPLOYMENT_LOG_FILE));
    let base_dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let token = env::var(ACCESS_TOKEN_VAR)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .with_context(|| format!("{} must hold the shared agent secret", ACCESS_TOKEN_VAR))?;

    let timeout = match cli_args.get("timeout") {
        Some(secs) => Duration::from_secs(secs.parse().context("--timeout must be in seconds")?),
        None => DEFAULT_REQUEST_TIMEOUT,
    };

    let log = DeploymentLog::load(&log_path).await?;
    let plan = RolloutPlan::build(&log, deploy_env, &base_dir, SecretString::from(token)).await?;

    println!(
        "{} {} ({}) to {} agent(s), image {}",
        "Rolling out".bold(),
        plan.request.app.cyan(),
        plan.env,
        plan.nodes.len(),
        plan.image.dimmed()
    );
    info!(app = %plan.request.app, env = %plan.env, "Rollout planned");

    let orchestrator = FleetOrchestrator::new(AgentClient::with_timeout(timeout)?);
    match orchestrator.rollout(&plan.nodes, &plan.request).await {
        Ok(report) => {
            for node in &report.deployed {
                println!("  {} {}", "✔".green(), node);
            }
            println!("{} run {}", "Rollout succeeded".green().bold(), report.run_id);
            Ok(())
        }
        Err(RolloutError::Failed(failure)) => {
            println!(
                "  {} {} ({})",
                "✘".red(),
                failure.failed_node,
                failure.cause
            );
            for comp in &failure.compensations {
                match &comp.error {
                    None => println!("  {} {} rolled back", "↺".yellow(), comp.node),
                    Some(e) => println!(
                        "  {} {} rollback failed, manual intervention required: {}",
                        "!".red().bold(),
                        comp.node,
                        e
                    ),
                }
            }
            bail!("{}", failure)
        }
        Err(e) => Err(e.into()),
    }
}
