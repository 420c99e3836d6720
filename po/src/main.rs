//! Plan Orchestrator CLI entry point

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result, eyre};
use tracing::info;

use planorch::cli::{Cli, Command, exit_code_for, exit_codes};
use planorch::config::Config;
use planorch::run::{RunHost, RunRequest};

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

/// Parse `--inputs` as inline JSON or `@file.json`
fn parse_inputs(raw: Option<&str>) -> Result<BTreeMap<String, serde_json::Value>> {
    let Some(raw) = raw else {
        return Ok(BTreeMap::new());
    };
    let content = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).context(format!("reading inputs file {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&content).context("parsing ground inputs JSON")
}

fn deploy_package(host: &RunHost, package: &Path) -> Result<String> {
    if package.is_dir() {
        Ok(host.deploy_dir(package)?)
    } else {
        let bytes = std::fs::read(package).context(format!("reading package {}", package.display()))?;
        Ok(host.deploy_zip(&bytes)?)
    }
}

/// Block until the run's driver reaches a terminal state
async fn wait_for_run(handle: &planorch::run::RunHandle) {
    while !handle.is_terminal() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match Config::load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    let code = match dispatch(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_codes::RUN_FAILED
        }
    };
    std::process::exit(code);
}

async fn dispatch(command: Command, mut config: Config) -> Result<i32> {
    match command {
        Command::Serve => {
            let host = Arc::new(RunHost::new(config)?);
            planorch::server::serve(host).await?;
            Ok(exit_codes::OK)
        }

        Command::Deploy { package } => {
            let host = RunHost::new(config)?;
            match deploy_package(&host, &package) {
                Ok(plan_id) => {
                    println!("{plan_id}");
                    Ok(exit_codes::OK)
                }
                Err(e) => {
                    eprintln!("Deploy rejected: {e:#}");
                    Ok(exit_codes::DEPLOY_ERROR)
                }
            }
        }

        Command::Run {
            package,
            inputs,
            mock,
            max_cycles,
        } => {
            if mock {
                config.llm.provider = "mock".to_string();
            }
            if let Some(max_cycles) = max_cycles {
                config.orchestrator.max_cycles = max_cycles;
            }
            let host = RunHost::new(config)?;
            let plan_id = match deploy_package(&host, &package) {
                Ok(plan_id) => plan_id,
                Err(e) => {
                    eprintln!("Deploy rejected: {e:#}");
                    return Ok(exit_codes::DEPLOY_ERROR);
                }
            };

            let handle = host.start_run(RunRequest {
                plan_id,
                run_id: None,
                user_id: "cli".to_string(),
                ground_inputs: parse_inputs(inputs.as_deref())?,
                agents: BTreeMap::new(),
                user_inputs: Vec::new(),
            })?;
            info!(run_id = %handle.run_id, "Run started");
            wait_for_run(&handle).await;

            let info = host
                .run_info(&handle.run_id)
                .ok_or_else(|| eyre!("run vanished"))?;
            if let Ok(result) = host.run_result(&handle.run_id) {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            if let Some(error) = &info.error {
                eprintln!("Run {}: {} ({})", info.status, error.kind, error.detail);
                return Ok(exit_code_for(&error.kind));
            }
            Ok(exit_code_for(&info.status))
        }

        Command::Resume { run_id, cycle } => {
            let host = RunHost::new(config)?;
            let handle = host.resume_run(&run_id, cycle)?;
            wait_for_run(&handle).await;

            let info = host.run_info(&run_id).ok_or_else(|| eyre!("run vanished"))?;
            if let Some(error) = &info.error {
                eprintln!("Run {}: {} ({})", info.status, error.kind, error.detail);
                return Ok(exit_code_for(&error.kind));
            }
            Ok(exit_code_for(&info.status))
        }

        Command::Fork {
            run_id,
            cycle,
            new_run_id,
            inputs,
        } => {
            let host = RunHost::new(config)?;
            let handle = host.fork_run(&run_id, cycle, new_run_id, parse_inputs(inputs.as_deref())?)?;
            println!("{}", handle.run_id);
            wait_for_run(&handle).await;

            let info = host
                .run_info(&handle.run_id)
                .ok_or_else(|| eyre!("run vanished"))?;
            if let Some(error) = &info.error {
                eprintln!("Run {}: {} ({})", info.status, error.kind, error.detail);
                return Ok(exit_code_for(&error.kind));
            }
            Ok(exit_code_for(&info.status))
        }

        Command::Runs => {
            let host = RunHost::new(config)?;
            for info in host.list_runs() {
                println!(
                    "{}  plan={}  status={}  cycle={}",
                    info.run_id,
                    info.plan_id,
                    info.status,
                    info.cycle.map(|c| c.to_string()).unwrap_or_else(|| "-".into())
                );
            }
            Ok(exit_codes::OK)
        }

        Command::Checkpoints { run_id } => {
            let host = RunHost::new(config)?;
            for checkpoint in host.checkpoints(&run_id)? {
                println!(
                    "cycle={}  inferences={}  ts={}",
                    checkpoint.cycle, checkpoint.inf_count, checkpoint.ts
                );
            }
            Ok(exit_codes::OK)
        }
    }
}
