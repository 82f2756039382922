use anyhow::{Result, bail};
use clap::Args;

use crate::config::KxConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Only show this key (e.g. exec.parallel)
    pub key: Option<String>,

    /// Output format: toml, json
    #[arg(long, default_value = "toml")]
    pub format: String,
}

pub async fn execute(args: ConfigArgs, custom_config: Option<&str>) -> Result<()> {
    let config = KxConfig::load(custom_config, None::<&()>)?;

    if let Some(key) = args.key {
        match config.get_section(&key)? {
            serde_json::Value::String(s) => println!("{s}"),
            value => println!("{}", serde_json::to_string_pretty(&value)?),
        }
        return Ok(());
    }

    match args.format.to_lowercase().as_str() {
        "toml" => print!("{}", config.to_toml()?),
        "json" => println!("{}", serde_json::to_string_pretty(&config.settings()?)?),
        other => bail!("Unsupported format: {other}. Use toml or json"),
    }
    Ok(())
}
