#![forbid(unsafe_code)]

//! Simulated execution lifecycle and paginated row access.
//!
//! # Design
//!
//! The backend keeps a single current execution, like a one-tab query
//! console: submitting a new query replaces the previous one, and any id
//! other than the current one is unknown. Status is derived from the time
//! elapsed since submission rather than from a background timer:
//!
//! ```text
//! 0 ──── queued ──── 300ms ──── running ──── 300ms + execution_time ──► completed | failed
//! ```
//!
//! All durations are multiplied by the time scale (`1.0` is real time, `0.0`
//! completes every query instantly). Cancellation freezes the status at
//! `cancelled` if it arrives while the execution is still queued or running.
//!
//! # Failure Modes
//!
//! | Condition | Error |
//! |-----------|-------|
//! | Unknown or replaced execution id | `ExecutionNotFound` |
//! | Rows requested before completion | `NotCompleted` |
//! | Zero page limit | `InvalidRequest` |
//! | Offset armed with [`MockBackend::inject_failure`] | `Transport`, once |
//! | Offset past the last row | Empty page, not an error |

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use qgrid_core::{
    Execution, ExecutionFailure, ExecutionStatus, PageFetcher, QueryService, Row, ServiceError,
    ServiceResult,
};
use tracing::{debug, info};

use crate::sources::SampleSource;

/// Time every execution spends queued before it starts running.
pub const QUEUED_FOR: Duration = Duration::from_millis(300);

/// Failure message for executions that run into the server timeout.
pub const TIMEOUT_MESSAGE: &str = "Query timed out after 15 seconds";

#[derive(Debug, Clone)]
struct MockExecution {
    id: String,
    sql: String,
    source: SampleSource,
    submitted_at: Instant,
    cancelled_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    counter: u64,
    current: Option<MockExecution>,
    armed_failures: HashSet<usize>,
    fetch_log: Vec<(usize, usize)>,
}

/// In-process query backend over the built-in sample sources.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<State>,
    time_scale: f64,
    latency: Duration,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Real-time backend with no extra fetch latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            time_scale: 1.0,
            latency: Duration::ZERO,
        }
    }

    /// Multiply every lifecycle duration by `scale`. Negative values count
    /// as zero.
    #[must_use]
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = if scale.is_finite() { scale.max(0.0) } else { 1.0 };
        self
    }

    /// Sleep this long inside every page fetch.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub const fn time_scale(&self) -> f64 {
        self.time_scale
    }

    #[must_use]
    pub const fn latency(&self) -> Duration {
        self.latency
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn scaled(&self, duration: Duration) -> Duration {
        if self.time_scale == 1.0 {
            return duration;
        }
        duration.mul_f64(self.time_scale)
    }

    /// Make the next fetch at `offset` fail with a transport error.
    pub fn inject_failure(&self, offset: usize) {
        self.lock().armed_failures.insert(offset);
    }

    /// `(offset, limit)` of every page fetch that reached the backend.
    #[must_use]
    pub fn fetch_log(&self) -> Vec<(usize, usize)> {
        self.lock().fetch_log.clone()
    }

    /// Id of the current execution.
    #[must_use]
    pub fn current_execution_id(&self) -> Option<String> {
        self.lock().current.as_ref().map(|e| e.id.clone())
    }

    /// Submit `sql` at `now`, replacing the current execution.
    pub fn create_execution_at(&self, sql: &str, now: Instant) -> ServiceResult<String> {
        if sql.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("empty query".into()));
        }
        let source = SampleSource::route(sql);
        let mut state = self.lock();
        state.counter += 1;
        let id = format!("exec_{}", state.counter);
        if let Some(previous) = &state.current {
            debug!(previous = %previous.id, "replacing current execution");
        }
        state.current = Some(MockExecution {
            id: id.clone(),
            sql: sql.to_owned(),
            source,
            submitted_at: now,
            cancelled_at: None,
        });
        info!(execution_id = %id, %source, "execution submitted");
        Ok(id)
    }

    /// Snapshot of `execution_id` as of `now`.
    pub fn get_execution_at(&self, execution_id: &str, now: Instant) -> ServiceResult<Execution> {
        let state = self.lock();
        let exec = current(&state, execution_id)?;
        Ok(self.snapshot(exec, now))
    }

    /// Rows `offset .. offset + limit` of `execution_id` as of `now`.
    pub fn fetch_page_at(
        &self,
        execution_id: &str,
        offset: usize,
        limit: usize,
        now: Instant,
    ) -> ServiceResult<Vec<Row>> {
        if limit == 0 {
            return Err(ServiceError::InvalidRequest("limit must be greater than 0".into()));
        }
        let source = {
            let mut state = self.lock();
            let exec = current(&state, execution_id)?;
            let status = self.status_at(exec, now);
            if status != ExecutionStatus::Completed {
                return Err(ServiceError::NotCompleted {
                    execution_id: execution_id.to_owned(),
                    status,
                });
            }
            let source = exec.source;
            state.fetch_log.push((offset, limit));
            if state.armed_failures.remove(&offset) {
                debug!(execution_id, offset, "injected page failure");
                return Err(ServiceError::Transport(format!(
                    "injected failure at offset {offset}"
                )));
            }
            source
        };

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(source.page(offset, limit))
    }

    /// Cancel `execution_id` at `now` if it is still queued or running.
    pub fn cancel_execution_at(&self, execution_id: &str, now: Instant) -> ServiceResult<()> {
        let mut state = self.lock();
        let exec = current(&state, execution_id)?;
        let status = self.status_at(exec, now);
        if status.is_terminal() {
            debug!(execution_id, %status, "cancel ignored for finished execution");
            return Ok(());
        }
        if let Some(exec) = state.current.as_mut() {
            exec.cancelled_at = Some(now);
        }
        info!(execution_id, "execution cancelled");
        Ok(())
    }

    fn run_window(&self, source: SampleSource) -> (Duration, Duration) {
        let queued = self.scaled(QUEUED_FOR);
        (queued, queued + self.scaled(source.execution_time()))
    }

    fn status_at(&self, exec: &MockExecution, now: Instant) -> ExecutionStatus {
        if exec.cancelled_at.is_some_and(|at| at <= now) {
            return ExecutionStatus::Cancelled;
        }
        let elapsed = now.saturating_duration_since(exec.submitted_at);
        let (running_from, settled_at) = self.run_window(exec.source);
        if elapsed < running_from {
            ExecutionStatus::Queued
        } else if elapsed < settled_at {
            ExecutionStatus::Running
        } else if exec.source.times_out() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        }
    }

    fn snapshot(&self, exec: &MockExecution, now: Instant) -> Execution {
        let status = self.status_at(exec, now);
        let (_, settled_at) = self.run_window(exec.source);
        let mut execution = Execution {
            sql: exec.sql.clone(),
            status,
            ..Execution::queued(exec.id.clone())
        };
        match status {
            ExecutionStatus::Completed => {
                execution.total_rows = Some(exec.source.total_rows());
                execution.columns = exec.source.columns();
                execution.execution_time_ms = Some(duration_ms(settled_at));
            }
            ExecutionStatus::Failed => {
                execution.error = Some(ExecutionFailure {
                    message: TIMEOUT_MESSAGE.to_owned(),
                });
                execution.execution_time_ms = Some(duration_ms(settled_at));
            }
            ExecutionStatus::Cancelled => {
                let ran = exec
                    .cancelled_at
                    .map(|at| at.saturating_duration_since(exec.submitted_at))
                    .unwrap_or_default();
                execution.execution_time_ms = Some(duration_ms(ran));
            }
            ExecutionStatus::Queued | ExecutionStatus::Running => {}
        }
        execution
    }
}

fn current<'a>(state: &'a State, execution_id: &str) -> ServiceResult<&'a MockExecution> {
    state
        .current
        .as_ref()
        .filter(|exec| exec.id == execution_id)
        .ok_or_else(|| ServiceError::ExecutionNotFound(execution_id.to_owned()))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl QueryService for MockBackend {
    fn create_execution(&self, sql: &str) -> ServiceResult<String> {
        self.create_execution_at(sql, Instant::now())
    }

    fn get_execution(&self, execution_id: &str) -> ServiceResult<Execution> {
        self.get_execution_at(execution_id, Instant::now())
    }

    fn cancel_execution(&self, execution_id: &str) -> ServiceResult<()> {
        self.cancel_execution_at(execution_id, Instant::now())
    }
}

impl PageFetcher for MockBackend {
    fn fetch_page(&self, execution_id: &str, offset: usize, limit: usize) -> ServiceResult<Vec<Row>> {
        self.fetch_page_at(execution_id, offset, limit, Instant::now())
    }
}
