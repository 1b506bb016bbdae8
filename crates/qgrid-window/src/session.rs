#![forbid(unsafe_code)]

//! The rendering-facing owner of one row window.
//!
//! [`QuerySession`] glues the execution currently on screen to a
//! [`FetchCoalescer`] and a [`RangeDebouncer`]. It is the only object a table
//! view talks to: status updates come in through
//! [`QuerySession::update_execution`], scroll positions through
//! [`QuerySession::on_range_change`], and the host loop calls
//! [`QuerySession::pump`] to apply finished fetches and fire due ranges.
//!
//! # Lifecycle
//!
//! ```text
//! begin(queued) ─► update(running) ─► update(completed, total) ─► prime page 0
//!                                                                  │
//!        on_range_change ─► (debounce) ─► pump ─► ensure_loaded ◄──┘
//!
//! cancel / begin(other id) ─► reset cache, bump generation, drop timer
//! dispose / drop           ─► same, and refuse all further work
//! ```
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Range requested before completion | No-op |
//! | Range past the last row | Clamped; fully out of bounds is a no-op |
//! | Execution replaced mid-fetch | Old settlements discarded on next pump |
//! | Execution fails or is cancelled | Cache and pending pages dropped |
//! | Calls after `dispose` | Ignored |

use std::sync::Arc;
use std::time::{Duration, Instant};

use qgrid_core::{Execution, PageFetcher, Row, RowRange, WindowConfig};
use tracing::{debug, info};

use crate::cache::RowWindow;
use crate::coalescer::{DrainReport, EnsureReport, FetchCoalescer};
use crate::debounce::RangeDebouncer;
use crate::spawn::{TaskSpawner, ThreadSpawner};

/// What one [`QuerySession::pump`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Settlements applied before the debouncer was polled.
    pub settled: DrainReport,
    /// Range released by the debouncer, if its quiet period ended.
    pub fired: Option<RowRange>,
    /// Page offsets dispatched for the fired range.
    pub dispatched: Vec<usize>,
}

impl PumpReport {
    /// Whether nothing happened.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.settled.total() == 0 && self.fired.is_none() && self.dispatched.is_empty()
    }
}

/// Row window, fetch coalescer and range debouncer for the execution on
/// screen.
#[derive(Debug)]
pub struct QuerySession {
    config: WindowConfig,
    coalescer: FetchCoalescer,
    debouncer: RangeDebouncer,
    execution: Option<Execution>,
    primed: bool,
    disposed: bool,
}

impl QuerySession {
    /// Session whose page fetches each run on their own thread.
    ///
    /// # Panics
    ///
    /// Panics if `config.page_size` is 0.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: WindowConfig) -> Self {
        Self::with_spawner(fetcher, Arc::new(ThreadSpawner), config)
    }

    /// Session with an explicit task spawner.
    ///
    /// # Panics
    ///
    /// Panics if `config.page_size` is 0.
    #[must_use]
    pub fn with_spawner(
        fetcher: Arc<dyn PageFetcher>,
        spawner: Arc<dyn TaskSpawner>,
        config: WindowConfig,
    ) -> Self {
        let coalescer = FetchCoalescer::new(config.page_size, fetcher, spawner);
        let debouncer = RangeDebouncer::new(config.debounce);
        Self {
            config,
            coalescer,
            debouncer,
            execution: None,
            primed: false,
            disposed: false,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Execution currently on screen.
    #[must_use]
    pub const fn execution(&self) -> Option<&Execution> {
        self.execution.as_ref()
    }

    /// Result size, once the execution has reported it.
    #[must_use]
    pub fn total_rows(&self) -> Option<usize> {
        self.execution.as_ref().and_then(|e| e.total_rows)
    }

    #[must_use]
    pub const fn coalescer(&self) -> &FetchCoalescer {
        &self.coalescer
    }

    #[must_use]
    pub const fn window(&self) -> &RowWindow {
        self.coalescer.window()
    }

    #[must_use]
    pub const fn debouncer(&self) -> &RangeDebouncer {
        &self.debouncer
    }

    /// Rows currently cached.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.coalescer.window().len()
    }

    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Start showing `execution`, discarding whatever was shown before.
    ///
    /// Returns the pages dispatched if the execution is already complete and
    /// first-page priming is enabled.
    pub fn begin(&mut self, execution: Execution) -> EnsureReport {
        if self.disposed {
            debug!(execution_id = %execution.execution_id, "ignoring begin on disposed session");
            return EnsureReport::default();
        }
        info!(
            execution_id = %execution.execution_id,
            status = %execution.status,
            "session adopting execution"
        );
        self.debouncer.cancel();
        self.coalescer.reset();
        self.primed = false;
        self.execution = Some(execution);
        self.prime_if_ready()
    }

    /// Refresh status and total for the current execution.
    ///
    /// An execution with a different id is adopted as if by
    /// [`QuerySession::begin`]. A move to `failed` or `cancelled` drops the
    /// cache, in-flight fetches and any pending range.
    pub fn update_execution(&mut self, execution: Execution) -> EnsureReport {
        if self.disposed {
            return EnsureReport::default();
        }
        let previous = self
            .execution
            .as_ref()
            .filter(|current| current.execution_id == execution.execution_id)
            .map(|current| current.status);
        let Some(previous) = previous else {
            return self.begin(execution);
        };
        if previous != execution.status {
            debug!(
                execution_id = %execution.execution_id,
                from = %previous,
                to = %execution.status,
                "execution status changed"
            );
        }
        if execution.status.is_terminal() && !execution.is_ready() {
            self.discard_rows(&execution);
            self.execution = Some(execution);
            return EnsureReport::default();
        }
        self.execution = Some(execution);
        self.prime_if_ready()
    }

    /// Drop cached rows, in-flight fetches and any pending range of an
    /// execution that ended without completing.
    fn discard_rows(&mut self, execution: &Execution) {
        self.debouncer.cancel();
        if self.coalescer.owner().is_none() && self.coalescer.window().is_empty() {
            return;
        }
        info!(
            execution_id = %execution.execution_id,
            status = %execution.status,
            "execution ended without completing, discarding rows"
        );
        self.coalescer.reset();
        self.primed = false;
    }

    fn prime_if_ready(&mut self) -> EnsureReport {
        let Some(execution) = &self.execution else {
            return EnsureReport::default();
        };
        if self.primed || !self.config.prime_first_page || !execution.is_ready() {
            return EnsureReport::default();
        }
        if execution.known_total() == 0 {
            return EnsureReport::default();
        }
        self.primed = true;
        self.ensure_loaded(0, self.config.page_size - 1)
    }

    /// Drop the current execution together with its cache, in-flight
    /// fetches and any pending range.
    pub fn cancel(&mut self) {
        let execution_id = self.execution.take().map(|e| e.execution_id);
        self.debouncer.cancel();
        self.coalescer.reset();
        self.primed = false;
        info!(
            execution_id = execution_id.as_deref().unwrap_or("<none>"),
            "session cancelled"
        );
    }

    /// Load every row of `[start, end]`, clamped to the result set.
    ///
    /// No-op until the execution has completed.
    pub fn ensure_loaded(&mut self, start: usize, end: usize) -> EnsureReport {
        let Some(execution) = &self.execution else {
            return EnsureReport::default();
        };
        if !execution.is_ready() {
            debug!(
                execution_id = %execution.execution_id,
                status = %execution.status,
                "range requested before completion"
            );
            return EnsureReport::default();
        }
        let Some(range) = RowRange::clamp(start, end, execution.known_total()) else {
            return EnsureReport::default();
        };
        self.coalescer
            .ensure_loaded(range.start(), range.end(), execution)
    }

    /// Cached row at `index`, or `None` for a hole.
    #[must_use]
    pub fn get_row(&self, index: usize) -> Option<&Row> {
        self.coalescer.window().get(index)
    }

    /// Whether the page holding `index` is being fetched.
    #[must_use]
    pub fn is_loading(&self, index: usize) -> bool {
        self.coalescer.is_loading(index)
    }

    /// Every slot of `range` in order, with `None` for holes.
    pub fn rows(&self, range: RowRange) -> impl Iterator<Item = (usize, Option<&Row>)> {
        let window = self.coalescer.window();
        range.into_iter().map(move |index| (index, window.get(index)))
    }

    /// Record a new visible range. It is loaded once scrolling pauses.
    pub fn on_range_change(&mut self, start: usize, end: usize) -> bool {
        self.on_range_change_at(start, end, Instant::now())
    }

    /// [`QuerySession::on_range_change`] with an explicit clock.
    pub fn on_range_change_at(&mut self, start: usize, end: usize, now: Instant) -> bool {
        let Some(range) = RowRange::new(start, end) else {
            return false;
        };
        self.debouncer.call_at(range, now)
    }

    /// Apply finished fetches, then load the debounced range if it is due.
    pub fn pump(&mut self) -> PumpReport {
        self.pump_at(Instant::now())
    }

    /// [`QuerySession::pump`] with an explicit clock.
    pub fn pump_at(&mut self, now: Instant) -> PumpReport {
        let settled = self.coalescer.drain_settled();
        let fired = self.debouncer.poll_at(now);
        let dispatched = match fired {
            Some(range) => self.ensure_loaded(range.start(), range.end()).dispatched,
            None => Vec::new(),
        };
        PumpReport {
            settled,
            fired,
            dispatched,
        }
    }

    /// Block up to `timeout` for a fetch to finish, then apply what arrived.
    pub fn wait_settled(&mut self, timeout: Duration) -> DrainReport {
        self.coalescer.wait_settled(timeout)
    }

    /// When the pending range becomes due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    /// Stop the debounce timer and invalidate every in-flight fetch.
    ///
    /// Idempotent. Also runs on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.debouncer.dispose();
        self.coalescer.reset();
        self.execution = None;
        self.disposed = true;
        debug!("session disposed");
    }
}

impl Drop for QuerySession {
    fn drop(&mut self) {
        self.dispose();
    }
}
