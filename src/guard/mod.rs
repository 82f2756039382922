//! Write-operation guard
//!
//! kubectl verbs that change cluster state must be confirmed with `--force`
//! before they are fanned out. The check covers the whole batch: either every
//! context runs the command or none does.

use thiserror::Error;

/// kubectl verbs that modify resources.
pub const WRITE_VERBS: &[&str] = &[
    "apply",
    "create",
    "delete",
    "edit",
    "patch",
    "replace",
    "scale",
    "set",
    "label",
    "annotate",
    "taint",
    "drain",
    "cordon",
    "uncordon",
    "rollout",
    "autoscale",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("write operation detected: '{command}'. Use --force flag to confirm")]
    WriteWithoutForce { command: String },
}

/// Whether `verb` is one of the mutating kubectl verbs (exact, case-sensitive).
pub fn is_mutating(verb: &str) -> bool {
    WRITE_VERBS.contains(&verb)
}

/// Check a command line (verb first) before anything is launched.
pub fn check(args: &[String], force: bool) -> Result<(), GuardError> {
    let Some(verb) = args.first() else {
        return Ok(());
    };

    if is_mutating(verb) && !force {
        return Err(GuardError::WriteWithoutForce {
            command: args.join(" "),
        });
    }

    if is_mutating(verb) {
        tracing::info!("running write operation '{verb}' with --force");
    }

    Ok(())
}
