use std::time::Duration;
use thiserror::Error;

/// Why a single context's command did not succeed.
///
/// These never fail a batch; they are printed in the context's output block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("exit status {code}")]
    NonZeroExit { code: i32 },
    #[error("killed by signal")]
    KilledBySignal,
    #[error("io error: {0}")]
    Io(String),
    #[error("invocation template is empty")]
    EmptyInvocation,
    #[error("timeout after {}", format_duration(*.0))]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl ExecError {
    /// Footer line printed under the context's output.
    pub fn footer(&self) -> String {
        match self {
            ExecError::Timeout(limit) => {
                format!("Timeout after {}", format_duration(*limit))
            }
            other => format!("Error: {other}"),
        }
    }
}

/// `2m30s`, `1h5m`, `200ms`
pub fn format_duration(d: Duration) -> String {
    humantime::format_duration(d).to_string().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footers() {
        assert_eq!(
            ExecError::Timeout(Duration::from_secs(30)).footer(),
            "Timeout after 30s"
        );
        assert_eq!(
            ExecError::NonZeroExit { code: 1 }.footer(),
            "Error: exit status 1"
        );
        assert_eq!(ExecError::Cancelled.footer(), "Error: cancelled");
    }

    #[test]
    fn test_durations_are_compact() {
        assert_eq!(
            ExecError::Timeout(Duration::from_secs(150)).footer(),
            "Timeout after 2m30s"
        );
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h2m5s");
        assert_eq!(format_duration(Duration::from_millis(200)), "200ms");
    }
}
