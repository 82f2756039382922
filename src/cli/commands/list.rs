use anyhow::Result;
use clap::Args;

use super::FilterArgs;

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: FilterArgs,
}

pub async fn execute(args: ListArgs, custom_config: Option<&str>) -> Result<()> {
    let settings = super::load_settings(custom_config, super::overrides(args.filters, None))?;
    let targets = super::resolve_targets(&settings).await?;
    super::print_contexts(&targets);
    Ok(())
}
