use anyhow::Result;
use clap::Args;

use super::{BatchArgs, FilterArgs};
use crate::cli::Output;
use crate::exec::CommandSpec;

#[derive(Args)]
pub struct ExecArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub batch: BatchArgs,

    /// Allow write operations (apply, delete, scale, ...)
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// kubectl arguments, optionally after `--`
    #[arg(
        value_name = "KUBECTL_ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

pub async fn execute(args: ExecArgs, custom_config: Option<&str>, output: &Output) -> Result<()> {
    let settings =
        super::load_settings(custom_config, super::overrides(args.filters, Some(args.batch)))?;
    let targets = super::resolve_targets(&settings).await?;

    if args.command.is_empty() {
        output.info("no kubectl command given, listing matching contexts");
        super::print_contexts(&targets);
        return Ok(());
    }

    super::run_batch(
        &settings,
        targets,
        CommandSpec::new(args.command),
        args.force,
        output,
    )
    .await?;
    Ok(())
}
