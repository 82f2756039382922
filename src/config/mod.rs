//! Configuration management for kxctl
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. built-in defaults (`default-config.toml`)
//! 2. user config `~/.config/kxctl/config.toml`
//! 3. repository config `./kxctl.toml`
//! 4. a file passed with `--config`
//! 5. `KXCTL_` environment variables (`KXCTL_EXEC__PARALLEL=5`,
//!    `KXCTL_FILTERS__INCLUDE=prod,staging`)
//! 6. command-line flags

mod core;

pub use core::{
    ExecOverrides, ExecSettings, FilterSettings, KubectlSettings, KxConfig, Overrides, Settings, StatusSettings,
};
