use anyhow::Result;
use clap::Args;

use crate::cli::Output;

#[derive(Args)]
pub struct VersionArgs {
    /// Show detailed version information
    #[arg(short = 'd', long = "detailed")]
    pub detailed: bool,
}

pub async fn execute(args: VersionArgs, output: &Output) -> Result<()> {
    println!("kxctl version {}", crate::VERSION);

    if args.detailed {
        output.key_value("Description:", env!("CARGO_PKG_DESCRIPTION"), false);
        output.key_value("Repository:", env!("CARGO_PKG_REPOSITORY"), false);
        output.key_value("License:", env!("CARGO_PKG_LICENSE"), false);
        output.key_value(
            "Profile:",
            if cfg!(debug_assertions) { "debug" } else { "release" },
            false,
        );
    }
    Ok(())
}
