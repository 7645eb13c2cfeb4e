use anyhow::{bail, Context, Result};
use codepipeline::api::{
    ApiError, AwsCliClient, ClientConfig, LimitedApi, PipelineApi, RetryPolicy, RetryingApi,
};
use codepipeline::cache::StateCache;
use codepipeline::cli::commands::{StatusCommand, TriggerCommand};
use codepipeline::cli::output::*;
use codepipeline::cli::{Cli, Command};
use codepipeline::core::AppConfig;
use codepipeline::logging::{self, LogTarget};
use codepipeline::refresh::refresh_once;
use codepipeline::ui::{self, SessionEnd};
use chrono::Utc;
use console::Term;
use std::sync::Arc;
use tracing::{error, info, warn};

type Api = RetryingApi<LimitedApi<AwsCliClient>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    let config = AppConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(cli.region.clone(), cli.profile.clone());

    // The interactive session owns the terminal, so it logs to a file
    let target = if cli.is_interactive() {
        match cli.log_file.clone().or_else(logging::default_log_file) {
            Some(path) => LogTarget::File(path),
            None => bail!("No cache directory available; pass --log-file"),
        }
    } else {
        LogTarget::Stderr
    };
    logging::init(&target, cli.verbose)?;

    // Backoff sleeps sit above the limiter and hold no call slot
    let client = AwsCliClient::new(ClientConfig::from(&config));
    let limited = LimitedApi::new(client, config.max_concurrent_calls);
    let api = Arc::new(RetryingApi::new(limited, RetryPolicy::from(&config.retry)));

    match &cli.command {
        None => run_interactive(api, &config, &target).await,
        Some(Command::Status(cmd)) => show_status(cmd, api).await,
        Some(Command::Trigger(cmd)) => trigger_pipeline(cmd, api).await,
    }
}

async fn run_interactive(api: Arc<Api>, config: &AppConfig, target: &LogTarget) -> Result<()> {
    if let LogTarget::File(path) = target {
        eprintln!("{} Logging to {}", INFO, style(path.display()).dim());
    }

    // Check credentials once before taking over the terminal
    let spinner = create_spinner("Listing pipelines...");
    let listed = api.list_pipelines().await;
    spinner.finish_and_clear();

    let initial = match listed {
        Ok(names) => {
            info!("Found {} pipelines", names.len());
            Some(names)
        }
        Err(e @ (ApiError::Auth(_) | ApiError::Internal(_))) => {
            eprintln!("{} {}", CROSS, style(&e).red());
            return Err(e).context("Cannot reach AWS CodePipeline");
        }
        Err(e) => {
            warn!("Initial pipeline list failed, the session will retry: {}", e);
            eprintln!("{} {}", WARN, style(&e).yellow());
            None
        }
    };

    let cache = Arc::new(StateCache::new());
    match ui::run(api, cache, config, initial).await? {
        SessionEnd::Quit => Ok(()),
        SessionEnd::Fatal(message) => {
            error!("Session ended: {}", message);
            eprintln!("{} {}", CROSS, style(&message).red());
            bail!("Session ended: {}", message)
        }
    }
}

async fn show_status(cmd: &StatusCommand, api: Arc<Api>) -> Result<()> {
    let cache = Arc::new(StateCache::new());

    let spinner = create_spinner("Fetching pipeline states...");
    let result = refresh_once(api, cache.clone()).await;
    spinner.finish_and_clear();
    result.context("Failed to list pipelines")?;

    let snapshot = cache.snapshot();
    if cmd.json {
        println!("{}", format_status_json(&snapshot)?);
    } else {
        println!("{}", format_status_table(&snapshot, Utc::now()));
    }

    let stale = snapshot.entries().iter().filter(|e| e.is_stale()).count();
    if stale > 0 {
        eprintln!("{} {} pipeline(s) could not be refreshed", WARN, stale);
    }
    Ok(())
}

async fn trigger_pipeline(cmd: &TriggerCommand, api: Arc<Api>) -> Result<()> {
    if !cmd.yes && !confirm(&cmd.name)? {
        println!("{} Cancelled", INFO);
        return Ok(());
    }

    let spinner = create_spinner(format!("Starting {}...", cmd.name));
    let result = api.start_execution(&cmd.name).await;
    spinner.finish_and_clear();

    match result {
        Ok(id) => {
            println!(
                "{} {} started execution {}",
                ROCKET,
                style(&cmd.name).bold(),
                style(&id).cyan()
            );
            println!("{} Execution {} is in progress", CHECK, style(&id).dim());
            Ok(())
        }
        Err(e) => {
            println!("{} {} {}", CROSS, style(&cmd.name).bold(), style(&e).red());
            Err(e).with_context(|| format!("Failed to start {}", cmd.name))
        }
    }
}

fn confirm(pipeline: &str) -> Result<bool> {
    let term = Term::stderr();
    term.write_str(&format!(
        "{} Start a new execution of {}? [y/N] ",
        WARN,
        style(pipeline).bold()
    ))?;
    let answer = term.read_line().context("Failed to read confirmation")?;
    Ok(is_affirmative(&answer))
}
