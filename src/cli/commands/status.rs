use anyhow::Result;
use clap::Args;

use super::{BatchArgs, FilterArgs};
use crate::cli::Output;
use crate::kube;

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub batch: BatchArgs,

    /// Show pods across all namespaces
    #[arg(short = 'A', long = "all-namespaces")]
    pub all_namespaces: bool,

    /// Extra kubectl arguments after `--` (e.g. -o wide)
    #[arg(
        value_name = "KUBECTL_ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub extra: Vec<String>,
}

pub async fn execute(args: StatusArgs, custom_config: Option<&str>, output: &Output) -> Result<()> {
    let settings =
        super::load_settings(custom_config, super::overrides(args.filters, Some(args.batch)))?;
    let targets = super::resolve_targets(&settings).await?;

    let command = kube::status_command(
        &settings.status.field_selector,
        args.all_namespaces,
        args.extra,
    );
    // a read-only query, never gated by --force
    super::run_batch(&settings, targets, command, false, output).await?;
    Ok(())
}
