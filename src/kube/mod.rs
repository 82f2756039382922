//! kubectl-specific collaborators
//!
//! Context discovery and the canned `status` query. Everything else about
//! kubectl is opaque to the execution engine.

use anyhow::{Context, Result, bail};
use std::process::Stdio;
use tokio::process::Command;

use crate::exec::CommandSpec;

/// Run the context listing command and return one context per non-empty line.
pub async fn list_contexts(list_command: &[String]) -> Result<Vec<String>> {
    let Some((program, args)) = list_command.split_first() else {
        bail!("kubectl.list_contexts is empty");
    };

    tracing::debug!(program = %program, args = ?args, "listing contexts");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to get kubectl contexts: cannot run {program}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "failed to get kubectl contexts: {} {}",
            output.status,
            stderr.trim()
        );
    }

    let contexts: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    tracing::debug!("found {} contexts", contexts.len());
    Ok(contexts)
}

/// `get pods --field-selector <selector> [--all-namespaces] [extra...]`
pub fn status_command(field_selector: &str, all_namespaces: bool, extra: Vec<String>) -> CommandSpec {
    let mut args = vec![
        "get".to_string(),
        "pods".to_string(),
        "--field-selector".to_string(),
        field_selector.to_string(),
    ];
    if all_namespaces {
        args.push("--all-namespaces".to_string());
    }
    args.extend(extra);
    CommandSpec::new(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_list_contexts_parses_lines() {
        let contexts = list_contexts(&sh("printf 'dev\\n\\n  prod-eu \\nprod-us\\n'"))
            .await
            .unwrap();
        assert_eq!(contexts, vec!["dev", "prod-eu", "prod-us"]);
    }

    #[tokio::test]
    async fn test_list_contexts_failure() {
        let err = list_contexts(&sh("echo 'no config' >&2; exit 1"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("failed to get kubectl contexts"));
        assert!(message.contains("no config"));
    }

    #[tokio::test]
    async fn test_list_contexts_missing_binary() {
        let err = list_contexts(&["/nonexistent/kubectl".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to get kubectl contexts"));
    }

    #[tokio::test]
    async fn test_list_contexts_empty_command() {
        assert!(list_contexts(&[]).await.is_err());
    }

    #[test]
    fn test_status_command() {
        let command = status_command(
            "status.phase!=Running",
            true,
            vec!["-o".to_string(), "wide".to_string()],
        );
        assert_eq!(
            command.args(),
            [
                "get",
                "pods",
                "--field-selector",
                "status.phase!=Running",
                "--all-namespaces",
                "-o",
                "wide"
            ]
        );
        assert_eq!(command.verb(), Some("get"));
    }
}
