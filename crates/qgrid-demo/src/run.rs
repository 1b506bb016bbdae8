#![forbid(unsafe_code)]

//! One scripted browse of a mock query result.
//!
//! The driver submits the query, polls it to a terminal state, replays the
//! scroll script through a [`QuerySession`], waits for the window to settle
//! and prints the final visible range followed by a JSON summary line.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Invalid window config | [`DemoError::Config`] before anything is submitted |
//! | Execution fails or is cancelled | Reported as an error, nothing is fetched |
//! | Page fetch fails | Logged; the hole is retried once before printing |
//! | Window never settles | Rows print with empty cells where data is missing |

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use qgrid_core::{
    ConfigError, Execution, ExecutionStatus, PageFetcher, QueryService, RowRange, ServiceError,
    WindowConfig,
};
use qgrid_mock::MockBackend;
use qgrid_window::QuerySession;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cli::Opts;
use crate::format::{format_cell, format_execution_time, format_number};

/// Upper bound on waiting for in-flight pages after the script ends.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum DemoError {
    Config(Vec<ConfigError>),
    Service(ServiceError),
    ExecutionFailed {
        execution_id: String,
        message: String,
    },
    Cancelled(String),
    Io(io::Error),
}

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(errors) => {
                write!(f, "invalid window config:")?;
                for error in errors {
                    write!(f, " {error}")?;
                }
                Ok(())
            }
            Self::Service(err) => write!(f, "service error: {err}"),
            Self::ExecutionFailed {
                execution_id,
                message,
            } => write!(f, "execution {execution_id} failed: {message}"),
            Self::Cancelled(id) => write!(f, "execution {id} was cancelled"),
            Self::Io(err) => write!(f, "output error: {err}"),
        }
    }
}

impl std::error::Error for DemoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Service(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ServiceError> for DemoError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl From<io::Error> for DemoError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub execution_id: String,
    pub total_rows: usize,
    pub final_range: Option<RowRange>,
    /// Rows of the final range that were still missing when printed.
    pub missing: usize,
    pub loaded: usize,
    pub pages_fetched: usize,
    pub pages_failed: u64,
    pub holes_retried: usize,
    pub ranges_fired: u64,
    pub ranges_superseded: u64,
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Apply command-line overrides on top of `base` and validate the result.
pub fn window_config(opts: &Opts, base: WindowConfig) -> Result<WindowConfig, DemoError> {
    let mut config = base;
    if let Some(page_size) = opts.page_size {
        config = config.with_page_size(page_size);
    }
    if let Some(debounce_ms) = opts.debounce_ms {
        config = config.with_debounce(ms(debounce_ms));
    }
    config.validate().map_err(DemoError::Config)?;
    Ok(config)
}

/// Run with window config taken from the environment.
pub fn run<W: Write>(opts: &Opts, out: &mut W) -> Result<RunSummary, DemoError> {
    let config = window_config(opts, WindowConfig::from_env())?;
    run_with_config(opts, config, out)
}

pub fn run_with_config<W: Write>(
    opts: &Opts,
    config: WindowConfig,
    out: &mut W,
) -> Result<RunSummary, DemoError> {
    let backend = Arc::new(
        MockBackend::new()
            .with_time_scale(opts.time_scale)
            .with_latency(ms(opts.latency_ms)),
    );
    for &offset in &opts.fail_offsets {
        backend.inject_failure(offset);
    }
    info!(
        page_size = config.page_size,
        debounce_ms = config.debounce.as_millis() as u64,
        latency_ms = opts.latency_ms,
        "starting browse"
    );

    let mut session = QuerySession::new(Arc::clone(&backend) as Arc<dyn PageFetcher>, config);
    let execution = await_execution(&*backend, &mut session, opts, out)?;
    write_header(out, &execution)?;

    for &(start, end) in &opts.scroll {
        debug!(start, end, "scroll");
        session.on_range_change(start, end);
        thread::sleep(ms(opts.scroll_gap_ms));
        session.pump();
    }
    if !settle(&mut session, SETTLE_TIMEOUT) {
        warn!(timeout_ms = SETTLE_TIMEOUT.as_millis() as u64, "window did not settle");
    }

    let total = execution.known_total();
    let final_range = opts
        .scroll
        .last()
        .and_then(|&(start, end)| RowRange::clamp(start, end, total));

    let mut holes_retried = 0;
    if let Some(range) = final_range
        && missing_in(&session, range) > 0
    {
        let report = session.ensure_loaded(range.start(), range.end());
        holes_retried = report.dispatched.len();
        info!(pages = holes_retried, "retrying holes in final range");
        settle(&mut session, SETTLE_TIMEOUT);
    }

    let missing = match final_range {
        Some(range) => {
            write_rows(out, &session, &execution, range)?;
            missing_in(&session, range)
        }
        None => {
            writeln!(out, "(no rows in range)")?;
            0
        }
    };

    let stats = session.coalescer().stats();
    let debounce = session.debouncer().stats();
    let summary = RunSummary {
        execution_id: execution.execution_id.clone(),
        total_rows: total,
        final_range,
        missing,
        loaded: session.loaded_count(),
        pages_fetched: backend.fetch_log().len(),
        pages_failed: stats.failed,
        holes_retried,
        ranges_fired: debounce.fired,
        ranges_superseded: debounce.superseded,
    };
    writeln!(out, "{}", summary_json(&summary))?;
    session.dispose();
    Ok(summary)
}

/// Submit the query and poll it until it reaches a terminal status.
fn await_execution<W: Write>(
    service: &dyn QueryService,
    session: &mut QuerySession,
    opts: &Opts,
    out: &mut W,
) -> Result<Execution, DemoError> {
    let execution_id = service.create_execution(opts.query())?;
    info!(%execution_id, sql = opts.query(), "submitted query");

    let mut last_status = None;
    loop {
        let execution = service.get_execution(&execution_id)?;
        let status = execution.status;
        if last_status != Some(status) {
            writeln!(out, "[{execution_id}] {status}")?;
            last_status = Some(status);
        }
        session.update_execution(execution.clone());
        match status {
            ExecutionStatus::Completed => return Ok(execution),
            ExecutionStatus::Failed => {
                let message = execution
                    .failure_message()
                    .unwrap_or("unknown error")
                    .to_owned();
                writeln!(out, "error: {message}")?;
                return Err(DemoError::ExecutionFailed {
                    execution_id,
                    message,
                });
            }
            ExecutionStatus::Cancelled => return Err(DemoError::Cancelled(execution_id)),
            ExecutionStatus::Queued | ExecutionStatus::Running => thread::sleep(ms(opts.poll_ms)),
        }
    }
}

/// Pump until no range is waiting on the debouncer and no page is in
/// flight. Returns `false` if `timeout` elapsed first.
fn settle(session: &mut QuerySession, timeout: Duration) -> bool {
    let give_up = Instant::now() + timeout;
    loop {
        session.pump();
        let next = session.next_deadline();
        if next.is_none() && session.coalescer().pending().is_empty() {
            return true;
        }
        let now = Instant::now();
        if now >= give_up {
            return false;
        }
        let wait = next
            .map_or(give_up, |due| due.min(give_up))
            .saturating_duration_since(now)
            .max(ms(1));
        session.wait_settled(wait);
    }
}

fn missing_in(session: &QuerySession, range: RowRange) -> usize {
    range.len().saturating_sub(session.window().loaded_in(range.as_std()))
}

fn write_header<W: Write>(out: &mut W, execution: &Execution) -> io::Result<()> {
    let total = format_number(execution.known_total() as u64);
    match execution.execution_time_ms {
        Some(elapsed) => writeln!(out, "{total} rows in {}", format_execution_time(elapsed))?,
        None => writeln!(out, "{total} rows")?,
    }
    let names: Vec<&str> = execution.columns.iter().map(|c| c.name.as_str()).collect();
    writeln!(out, "columns: {}", names.join(", "))
}

fn write_rows<W: Write>(
    out: &mut W,
    session: &QuerySession,
    execution: &Execution,
    range: RowRange,
) -> io::Result<()> {
    writeln!(out, "rows {}-{}:", range.start(), range.end())?;
    for (index, row) in session.rows(range) {
        let cells: Vec<String> = execution
            .columns
            .iter()
            .map(|column| format_cell(row.and_then(|r| r.get(&column.name)), column.column_type))
            .collect();
        if row.is_some() {
            writeln!(out, "{index:>8} | {}", cells.join(" | "))?;
        } else {
            writeln!(out, "{index:>8} | (not loaded)")?;
        }
    }
    Ok(())
}

fn summary_json(summary: &RunSummary) -> serde_json::Value {
    json!({
        "executionId": summary.execution_id,
        "totalRows": summary.total_rows,
        "finalRange": summary.final_range.map(|r| [r.start(), r.end()]),
        "missing": summary.missing,
        "loaded": summary.loaded,
        "pagesFetched": summary.pages_fetched,
        "pagesFailed": summary.pages_failed,
        "holesRetried": summary.holes_retried,
        "rangesFired": summary.ranges_fired,
        "rangesSuperseded": summary.ranges_superseded,
    })
}
