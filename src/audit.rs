//! Best-effort execution audit log
//!
//! Appends one JSON line per execution to a local file, for diagnostics
//! only. A failed write is logged and otherwise ignored; losing this file
//! is safe.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::Result;
use crate::language::Language;
use crate::sandbox::{ExecutionRequest, ExecutionResult};

/// Append-only JSONL execution log
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        AuditLog { path }
    }

    /// Append a record, swallowing (but logging) any write failure
    pub async fn record(&self, record: &AuditRecord) {
        if let Err(e) = self.append(record).await {
            warn!("Failed to write audit record to {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;

        Ok(())
    }
}

/// One executed (or failed) request, as written to the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub language: Language,
    pub container_id: Option<String>,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub stdout_bytes: usize,
    pub stderr_bytes: usize,
    pub error: Option<String>,
}

impl AuditRecord {
    /// Build a record from an execution outcome, whichever way it went
    pub fn from_outcome(
        request: &ExecutionRequest,
        outcome: &Result<ExecutionResult>,
    ) -> Self {
        match outcome {
            Ok(result) => AuditRecord {
                timestamp: Utc::now(),
                language: request.language,
                container_id: result.container_id.clone(),
                exit_code: result.exit_code,
                timed_out: result.timed_out,
                duration_ms: result.execution_time.as_millis() as u64,
                stdout_bytes: result.stdout.len(),
                stderr_bytes: result.stderr.len(),
                error: result.error(),
            },
            Err(e) => AuditRecord {
                timestamp: Utc::now(),
                language: request.language,
                container_id: None,
                exit_code: None,
                timed_out: false,
                duration_ms: 0,
                stdout_bytes: 0,
                stderr_bytes: 0,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    fn sample_result() -> ExecutionResult {
        ExecutionResult::completed(
            0,
            "hello\n".to_string(),
            String::new(),
            Duration::from_millis(1234),
            "abc123".to_string(),
        )
    }

    #[tokio::test]
    async fn appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"));

        let request = ExecutionRequest::new(Language::Python, "print('hello')");
        let record = AuditRecord::from_outcome(&request, &Ok(sample_result()));

        log.record(&record).await;
        log.record(&record).await;

        let contents = tokio::fs::read_to_string(dir.path().join("audit.log"))
            .await
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.exit_code, Some(0));
        assert_eq!(parsed.duration_ms, 1234);
        assert_eq!(parsed.stdout_bytes, 6);
        assert!(parsed.error.is_none());
    }

    #[test]
    fn fault_outcome_records_the_error() {
        let request = ExecutionRequest::new(Language::Golang, "package main");
        let outcome = Err(Error::Container("daemon unreachable".into()));

        let record = AuditRecord::from_outcome(&request, &outcome);

        assert_eq!(record.language, Language::Golang);
        assert!(record.container_id.is_none());
        assert!(record.error.as_deref().unwrap().contains("daemon unreachable"));
    }
}
