#![forbid(unsafe_code)]

//! Query execution lifecycle as reported by the polling collaborator.
//!
//! ```text
//! queued ──► running ──► completed
//!    │          │    └──► failed
//!    └──────────┴───────► cancelled
//! ```
//!
//! `total_rows` and `columns` are only meaningful once the execution is
//! [`ExecutionStatus::Completed`].

use serde::{Deserialize, Serialize};

use crate::row::ColumnMetadata;

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether no further transitions will happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether rows can be fetched.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Completed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail attached to a failed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub message: String,
}

/// One server-side run of a submitted query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: String,
    #[serde(default)]
    pub sql: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub total_rows: Option<usize>,
    /// RFC 3339 timestamp from the server, passed through untouched.
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub error: Option<ExecutionFailure>,
}

impl Execution {
    /// A freshly submitted execution with nothing known yet.
    #[must_use]
    pub fn queued(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            sql: String::new(),
            status: ExecutionStatus::Queued,
            total_rows: None,
            started_at: None,
            finished_at: None,
            execution_time_ms: None,
            columns: Vec::new(),
            error: None,
        }
    }

    /// A completed execution with a known row count.
    #[must_use]
    pub fn completed(execution_id: impl Into<String>, total_rows: usize) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            total_rows: Some(total_rows),
            ..Self::queued(execution_id)
        }
    }

    /// Attach column metadata.
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<ColumnMetadata>) -> Self {
        self.columns = columns;
        self
    }

    /// Total row count, treating "unknown" as zero.
    #[must_use]
    pub fn known_total(&self) -> usize {
        self.total_rows.unwrap_or(0)
    }

    /// Whether rows can be fetched for this execution.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// Failure message, if the execution failed.
    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}
