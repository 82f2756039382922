//! Command-line interface for kxctl
//!
//! clap definitions, logging setup and the dispatch from subcommand to
//! implementation.

use anyhow::Result;
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{CommandFactory, Parser, Subcommand};

pub mod args;
mod commands;
mod output;

pub use output::Output;

const EXAMPLES: &str = "\
Examples:
  kxctl list -i prod
  kxctl exec -i production -- get pods
  kxctl exec -e staging -- get pods
  kxctl -i prod -- get pods                  (leading flags imply exec)
  kxctl exec -f -i prod -- apply -f deployment.yaml
  kxctl status -A -- -o wide
  kxctl exec -t 30s -p 3 -g \"stack1|stack2\" -- get pods -A

Patterns are substrings, or regular expressions when wrapped in slashes (/^prod-/).
Press Enter while a batch runs to print a progress report.";

/// Run one kubectl command across many cluster contexts
#[derive(Parser)]
#[command(
    name = "kxctl",
    version,
    about = "Run one kubectl command across many cluster contexts",
    long_about = "kxctl filters your kubeconfig contexts by include/exclude patterns and runs \
                  the same kubectl command against each of them with bounded parallelism.",
    after_help = EXAMPLES,
    styles = help_styles()
)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List contexts matching the filters
    List(commands::list::ListArgs),
    /// Run a kubectl command on every matching context
    Exec(commands::exec::ExecArgs),
    /// Show pods that are not Running or Succeeded
    Status(commands::status::StatusArgs),
    /// Display the merged configuration
    Config(commands::config::ConfigArgs),
    /// Show version information
    Version(commands::version::VersionArgs),
}

impl Cli {
    /// Parse from the process arguments, expanding the `exec` shorthand
    pub fn from_env() -> Self {
        let argv = std::env::args_os()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        Cli::parse_from(args::normalize(argv))
    }

    pub async fn run(self) -> Result<()> {
        setup_logging(self.verbose, self.quiet);

        let output = Output::new(self.verbose > 0, self.quiet);
        let config = self.config.as_deref();

        match self.command {
            Some(Commands::List(args)) => commands::list::execute(args, config).await,
            Some(Commands::Exec(args)) => commands::exec::execute(args, config, &output).await,
            Some(Commands::Status(args)) => commands::status::execute(args, config, &output).await,
            Some(Commands::Config(args)) => commands::config::execute(args, config).await,
            Some(Commands::Version(args)) => commands::version::execute(args, &output).await,
            None => {
                let mut cmd = Cli::command();
                cmd.print_help()?;
                Ok(())
            }
        }
    }
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info"),
            2 => tracing_subscriber::EnvFilter::new("debug"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    // stdout carries command output only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
