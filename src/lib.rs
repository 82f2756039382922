//! # kxctl - run one kubectl command across many contexts
//!
//! kxctl selects kubeconfig contexts with include/exclude patterns and fans a
//! single kubectl command out over them, a bounded number at a time. Each
//! context's output is printed as one contiguous block; a write-verb guard
//! refuses mutating commands unless forced.
//!
//! ```bash
//! kxctl list -i prod
//! kxctl exec -i prod -e /-eu$/ -- get pods
//! kxctl -i prod -p 5 -t 30s -- get nodes
//! ```

pub mod cli;
pub mod config;
pub mod exec;
pub mod filter;
pub mod guard;
pub mod kube;

pub use cli::{Cli, Output};
pub use config::KxConfig;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
