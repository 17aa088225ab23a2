use anyhow::{Context, Result};
use clap::Parser;
use kubefan::cli::CliArgs;
use kubefan::dispatch::{Dispatcher, ExecutionEvent};
use kubefan::model::{
    ClusterResult, CommandTool, ExecutionRequest, ExecutionSession, SessionStatus,
};
use kubefan::{ClusterDirectory, Settings};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter)?;

    let settings = resolve_settings(&args)?;
    let tool = CommandTool::from_token(&args.tool)
        .with_context(|| format!("unknown tool '{}', expected kubectl or flux", args.tool))?;
    let json_output = matches!(args.output.as_str(), "json");
    if !json_output && args.output != "text" {
        anyhow::bail!("unknown output format '{}', expected text or json", args.output);
    }

    let mut directory = ClusterDirectory::discover(&settings)?;
    if !args.skip_auth_check {
        directory.refresh_auth().await;
    }

    let targets = resolve_targets(&args, &directory);
    let request = ExecutionRequest::new(args.command.join(" "), tool, targets);

    let dispatcher = Dispatcher::new(settings);
    let mut handle = dispatcher.dispatch(request)?;

    let canceller = handle.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested, terminating in-flight commands");
            canceller.cancel();
        }
    });

    let mut session = None;
    while let Some(event) = handle.next_event().await {
        match event {
            ExecutionEvent::ClusterFinished(result) => {
                print_result(&result, json_output)?;
            }
            ExecutionEvent::SessionFinished(finished) => {
                session = Some(finished);
                break;
            }
        }
    }

    let session = session.context("execution ended without a final session")?;
    print_summary(&session, json_output)?;

    if session.status != SessionStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

fn resolve_settings(args: &CliArgs) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };

    if let Some(limit) = args.max_concurrency {
        settings.max_concurrency = limit.max(1);
    }
    if let Some(secs) = args.timeout_secs {
        settings.command_timeout = Duration::from_secs(secs.max(1));
    }
    if args.no_guard {
        settings.destructive_guard = false;
    }

    Ok(settings)
}

// Unauthenticated clusters are excluded here, before dispatch, so the
// dispatcher only ever sees authenticated targets.
fn resolve_targets(args: &CliArgs, directory: &ClusterDirectory) -> Vec<String> {
    if args.clusters.is_empty() {
        if args.skip_auth_check {
            return directory
                .clusters()
                .iter()
                .map(|cluster| cluster.name.clone())
                .collect();
        }
        return directory.authenticated();
    }

    args.clusters
        .iter()
        .filter(|name| {
            let known = directory
                .clusters()
                .iter()
                .any(|cluster| &cluster.name == *name);
            if !known {
                warn!("cluster '{name}' not found in kubeconfig contexts, skipping");
                return false;
            }
            if !args.skip_auth_check && !directory.is_authenticated(name) {
                debug!("cluster '{name}' is not authenticated, skipping");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

fn print_result(result: &ClusterResult, json_output: bool) -> Result<()> {
    if json_output {
        println!(
            "{}",
            serde_json::to_string(result).context("failed to encode result as json")?
        );
        return Ok(());
    }

    println!(
        "=== {} ({}, {:.2}s) ===",
        result.cluster,
        result.status,
        result.duration.as_secs_f64()
    );
    if let Some(error) = &result.error {
        println!("error: {error}");
    }
    let stdout = result.stdout.trim_end();
    if !stdout.is_empty() {
        println!("{stdout}");
    }
    let stderr = result.stderr.trim_end();
    if !stderr.is_empty() {
        println!("stderr:\n{stderr}");
    }
    println!();
    Ok(())
}

fn print_summary(session: &ExecutionSession, json_output: bool) -> Result<()> {
    if json_output {
        println!(
            "{}",
            serde_json::to_string(session).context("failed to encode session as json")?
        );
        return Ok(());
    }

    println!(
        "session {}: {}/{} clusters succeeded",
        session.status,
        session.succeeded(),
        session.request.clusters.len()
    );
    for result in session.sorted_results() {
        println!(
            "  {:<24} {:<10} {:.2}s",
            result.cluster,
            result.status.title(),
            result.duration.as_secs_f64()
        );
    }
    Ok(())
}
