//! Common executor trait and request/result types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::language::Language;

/// Shortest admissible execution timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest admissible execution timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30);

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Request to execute a snippet of untrusted code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Programming language
    pub language: Language,
    /// The code to execute; opaque bytes, written to disk and never parsed
    pub code: String,
    /// Wall-clock execution deadline
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

impl ExecutionRequest {
    /// Create a new execution request with the default timeout
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        ExecutionRequest {
            language,
            code: code.into(),
            timeout: default_timeout(),
        }
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject out-of-range timeouts. Runs before any staging or isolation
    /// resource is allocated.
    pub fn validate(&self) -> Result<()> {
        if self.timeout < MIN_TIMEOUT || self.timeout > MAX_TIMEOUT {
            return Err(Error::Validation(format!(
                "timeout must be between {}s and {}s, got {}ms",
                MIN_TIMEOUT.as_secs(),
                MAX_TIMEOUT.as_secs(),
                self.timeout.as_millis()
            )));
        }
        Ok(())
    }
}

/// Result of code execution
///
/// Orchestrator-internal faults are reported as `Err` from the executor;
/// outcomes of the user's code (non-zero exit, timeout) are an `Ok` result
/// with the corresponding fields set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the code ran to completion and exited zero
    pub success: bool,
    /// Exit code; absent when the run was cut short by the deadline
    pub exit_code: Option<i64>,
    /// Captured standard output (possibly partial on timeout/kill)
    pub stdout: String,
    /// Captured standard error (possibly partial on timeout/kill)
    pub stderr: String,
    /// Wall-clock execution time
    #[serde(with = "humantime_serde")]
    pub execution_time: Duration,
    /// Was execution terminated by the deadline?
    pub timed_out: bool,
    /// Id of the container that ran the code
    pub container_id: Option<String>,
}

impl ExecutionResult {
    /// Result for a run that reached its own exit
    pub fn completed(
        exit_code: i64,
        stdout: String,
        stderr: String,
        execution_time: Duration,
        container_id: String,
    ) -> Self {
        ExecutionResult {
            success: exit_code == 0,
            exit_code: Some(exit_code),
            stdout,
            stderr,
            execution_time,
            timed_out: false,
            container_id: Some(container_id),
        }
    }

    /// Result for a run cut short by the deadline, keeping partial output
    pub fn timeout(
        partial_stdout: String,
        partial_stderr: String,
        timeout: Duration,
        container_id: String,
    ) -> Self {
        ExecutionResult {
            success: false,
            exit_code: None,
            stdout: partial_stdout,
            stderr: partial_stderr,
            execution_time: timeout,
            timed_out: true,
            container_id: Some(container_id),
        }
    }

    /// User-visible error line for failed runs, `None` on success
    pub fn error(&self) -> Option<String> {
        if self.timed_out {
            Some(format!(
                "execution timed out after {}s",
                self.execution_time.as_secs_f64()
            ))
        } else if !self.success {
            match self.exit_code {
                Some(code) => Some(format!("process exited with code {}", code)),
                None => Some("process terminated abnormally".to_string()),
            }
        } else {
            None
        }
    }
}

/// Trait for code execution backends
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Get the executor name
    fn name(&self) -> &str;

    /// Execute code in isolation
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult>;

    /// Check that the isolation backend is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_request() {
        let req = ExecutionRequest::new(Language::Python, "print('hello')")
            .with_timeout(Duration::from_secs(10));

        assert_eq!(req.language, Language::Python);
        assert_eq!(req.code, "print('hello')");
        assert_eq!(req.timeout, Duration::from_secs(10));
    }

    #[test]
    fn timeout_bounds_are_inclusive() {
        let req = ExecutionRequest::new(Language::Python, "");
        assert!(req.clone().with_timeout(MIN_TIMEOUT).validate().is_ok());
        assert!(req.clone().with_timeout(MAX_TIMEOUT).validate().is_ok());
    }

    #[test]
    fn out_of_range_timeouts_are_rejected() {
        let req = ExecutionRequest::new(Language::Python, "");
        let too_short = req.clone().with_timeout(Duration::from_millis(500));
        assert!(matches!(too_short.validate(), Err(Error::Validation(_))));

        let too_long = req.clone().with_timeout(Duration::from_secs(31));
        assert!(matches!(too_long.validate(), Err(Error::Validation(_))));

        let zero = req.with_timeout(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_execution_result() {
        let ok = ExecutionResult::completed(
            0,
            "output".to_string(),
            String::new(),
            Duration::from_secs(1),
            "abc123".to_string(),
        );
        assert!(ok.success);
        assert!(!ok.timed_out);
        assert_eq!(ok.error(), None);

        let nonzero = ExecutionResult::completed(
            2,
            String::new(),
            "boom".to_string(),
            Duration::from_secs(1),
            "abc123".to_string(),
        );
        assert!(!nonzero.success);
        assert_eq!(nonzero.error().unwrap(), "process exited with code 2");

        let timed_out = ExecutionResult::timeout(
            "partial".to_string(),
            String::new(),
            Duration::from_secs(5),
            "abc123".to_string(),
        );
        assert!(!timed_out.success);
        assert!(timed_out.timed_out);
        assert_eq!(timed_out.stdout, "partial");
        assert!(timed_out.error().unwrap().contains("timed out"));
    }
}
