use anyhow::{Result, bail};
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::cli::Output;
use crate::config::{ExecOverrides, FilterSettings, KxConfig, Overrides, Settings};
use crate::exec::{Batch, BatchSummary, CommandSpec, Dispatcher, ProcessRunner, StdSink, Trigger};
use crate::filter::filter_contexts;
use crate::kube;

pub mod config;
pub mod exec;
pub mod list;
pub mod status;
pub mod version;

/// Context selection flags shared by every context-aware command
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Include contexts matching pattern (repeatable, /regex/ supported)
    #[arg(short = 'i', long = "include", value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Exclude contexts matching pattern (repeatable, wins over --include)
    #[arg(short = 'e', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,
}

/// Execution flags shared by `exec` and `status`
#[derive(Args, Debug, Default, Clone)]
pub struct BatchArgs {
    /// Only print output lines matching pattern ("a|b" matches either)
    #[arg(short = 'g', long = "grep", value_name = "PATTERN")]
    pub grep: Option<String>,

    /// Number of contexts processed at the same time
    #[arg(short = 'p', long = "parallel", value_name = "N", value_parser = parse_parallel)]
    pub parallel: Option<usize>,

    /// Per-context timeout (e.g. 30s, 1m, 2m30s)
    #[arg(short = 't', long = "timeout", value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<String>,
}

fn parse_parallel(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("invalid parallel value: {value} (must be a positive integer)")),
    }
}

fn parse_timeout(value: &str) -> Result<String, String> {
    humantime::parse_duration(value)
        .map(|_| value.to_string())
        .map_err(|_| format!("invalid timeout value: {value}"))
}

fn overrides(filters: FilterArgs, batch: Option<BatchArgs>) -> Overrides {
    let batch = batch.unwrap_or_default();
    Overrides {
        exec: ExecOverrides {
            parallel: batch.parallel,
            timeout: batch.timeout,
            grep: batch.grep,
        },
        filters: FilterSettings {
            include: filters.include,
            exclude: filters.exclude,
        },
    }
}

fn load_settings(custom_config: Option<&str>, overrides: Overrides) -> Result<Settings> {
    let settings = KxConfig::load(custom_config, Some(overrides))?.settings()?;
    tracing::trace!(?settings, "effective settings");
    Ok(settings)
}

/// Discover contexts and apply the configured filters.
async fn resolve_targets(settings: &Settings) -> Result<Vec<String>> {
    let contexts = kube::list_contexts(&settings.kubectl.list_contexts).await?;
    let targets = filter_contexts(
        contexts,
        &settings.filters.include,
        &settings.filters.exclude,
    );
    if targets.is_empty() {
        bail!("no contexts match the provided filters");
    }
    tracing::debug!("{} contexts selected", targets.len());
    Ok(targets)
}

fn print_contexts(targets: &[String]) {
    for target in targets {
        println!("{target}");
    }
}

/// Run `command` on every target, with Ctrl-C cancelling the batch.
async fn run_batch(
    settings: &Settings,
    targets: Vec<String>,
    command: CommandSpec,
    force: bool,
    output: &Output,
) -> Result<BatchSummary> {
    let batch = Batch::new(targets, command, settings.batch_config(force)?);
    output.verbose(&format!(
        "running '{}' on {} contexts ({} at a time)",
        batch.command().args().join(" "),
        batch.targets().len(),
        batch.config().concurrency_limit()
    ));

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let dispatcher = Dispatcher::new(ProcessRunner::new(settings.invocation()));
    let result = dispatcher
        .run(
            batch,
            Box::new(StdSink::new()),
            Trigger::interactive(),
            cancel.clone(),
        )
        .await;
    interrupt.abort();
    let summary = result?;

    if cancel.is_cancelled() {
        output.warning(&format!(
            "interrupted: {} of {} contexts did not finish",
            summary.cancelled, summary.total
        ));
        bail!("interrupted");
    }

    let unsuccessful = summary.failed + summary.timed_out;
    if unsuccessful > 0 {
        output.warning(&format!(
            "{unsuccessful} of {} contexts failed or timed out",
            summary.total
        ));
    } else {
        output.verbose(&format!("all {} contexts succeeded", summary.total));
    }
    Ok(summary)
}
