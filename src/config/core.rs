use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::exec::{BatchConfig, Invocation};

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub kubectl: KubectlSettings,
    pub exec: ExecSettings,
    #[serde(default)]
    pub filters: FilterSettings,
    pub status: StatusSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubectlSettings {
    /// Per-context command prefix, `{context}` is substituted
    pub invocation: Vec<String>,
    /// Command printing one context name per line
    pub list_contexts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSettings {
    pub parallel: usize,
    /// humantime duration, "0s" disables the timeout
    pub timeout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grep: Option<String>,
}

/// Pattern lists accept a TOML array or, for `KXCTL_FILTERS__INCLUDE=prod,staging`
/// style environment values, a comma separated string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    #[serde(default, deserialize_with = "pattern_list")]
    pub include: Vec<String>,
    #[serde(default, deserialize_with = "pattern_list")]
    pub exclude: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternList {
    One(String),
    Many(Vec<String>),
}

fn pattern_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match PatternList::deserialize(deserializer)? {
        PatternList::Many(patterns) => patterns,
        PatternList::One(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSettings {
    pub field_selector: String,
}

/// Values coming from command-line flags. Unset fields leave lower layers alone;
/// filter lists are appended to the configured ones.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    pub exec: ExecOverrides,
    pub filters: FilterSettings,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grep: Option<String>,
}

impl Settings {
    pub fn timeout(&self) -> Result<Duration> {
        humantime::parse_duration(self.exec.timeout.trim())
            .with_context(|| format!("invalid timeout value: {}", self.exec.timeout))
    }

    pub fn invocation(&self) -> Invocation {
        Invocation::new(self.kubectl.invocation.clone())
    }

    /// Execution settings for one batch.
    pub fn batch_config(&self, force: bool) -> Result<BatchConfig> {
        Ok(BatchConfig {
            parallel: Some(self.exec.parallel),
            timeout: Some(self.timeout()?),
            force,
            grep: self.exec.grep.clone(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.invocation().program().is_none_or(str::is_empty) {
            bail!("kubectl.invocation must name a program");
        }
        if self.kubectl.list_contexts.is_empty() {
            bail!("kubectl.list_contexts cannot be empty");
        }
        if self.exec.parallel == 0 {
            bail!("exec.parallel must be a positive integer");
        }
        self.timeout()?;
        Ok(())
    }
}

pub struct KxConfig {
    figment: Figment,
}

impl KxConfig {
    pub fn load<T: Serialize>(custom_config: Option<&str>, cli_overrides: Option<T>) -> Result<Self> {
        tracing::trace!("CONFIG LOAD: Starting");

        let mut figment = Figment::new()
            .merge(Toml::string(DEFAULT_CONFIG))
            .merge(Toml::file(Self::user_config_path()))
            .merge(Toml::file("kxctl.toml"));

        if let Some(path) = custom_config {
            if !Path::new(path).exists() {
                bail!("config file not found: {path}");
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("KXCTL_").split("__"));

        if let Some(cli) = cli_overrides {
            tracing::trace!("CONFIG LOAD: Applying CLI overrides");
            // admerge appends arrays, so -i/-e add to configured filters
            figment = figment.admerge(Serialized::defaults(cli));
        }

        Ok(KxConfig { figment })
    }

    /// Extract and validate the merged settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .context("failed to parse kxctl configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Get a nested section as JSON
    pub fn get_section(&self, path: &str) -> Result<serde_json::Value> {
        let value = self.figment.extract_inner(path)?;
        Ok(value)
    }

    /// The merged configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String> {
        let settings: Settings = self.figment.extract()?;
        Ok(toml::to_string_pretty(&settings)?)
    }

    fn user_config_path() -> String {
        match std::env::var("HOME") {
            Ok(home) => format!("{home}/.config/kxctl/config.toml"),
            Err(_) => "~/.config/kxctl/config.toml".to_string(),
        }
    }
}
