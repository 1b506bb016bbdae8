#![forbid(unsafe_code)]

//! Missing-page computation and single-flight page fetching.
//!
//! # Design
//!
//! [`FetchCoalescer`] owns the [`RowWindow`] and [`PendingPageSet`] for one
//! execution at a time. A range request is split into fixed-size pages; a
//! page is dispatched only if it is neither in flight nor fully cached. Page
//! fetches run on a [`TaskSpawner`] and report back as [`PageSettlement`]s
//! over a channel, which the owner applies with [`FetchCoalescer::drain_settled`]
//! or [`FetchCoalescer::wait_settled`]. Only settlement application and
//! [`FetchCoalescer::reset`] mutate the cache and the pending set.
//!
//! # Invariants
//!
//! 1. At most one in-flight fetch per page offset.
//! 2. An offset leaves the pending set exactly once per dispatch, when its
//!    settlement is applied (or immediately, if the spawn itself failed).
//! 3. Every dispatch captures the current generation; `reset` bumps it, and
//!    a settlement whose generation differs is dropped unapplied.
//! 4. Rows merged for a page never extend past `total_rows - 1`.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Fetch fails | Offset released, page stays a hole, logged at `warn` |
//! | Fetch settles after reset | Dropped silently (logged at `debug`) |
//! | Spawner refuses the job | Offset released immediately, logged at `warn` |
//! | Server returns more rows than the page holds | Extra rows dropped |
//! | `start > end` | No-op |

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use qgrid_core::{Execution, PageFetcher, Row, ServiceResult};
use tracing::{debug, debug_span, info, warn};

use crate::cache::RowWindow;
use crate::pending::PendingPageSet;
use crate::spawn::{FetchJob, TaskSpawner};

/// Outcome of one page fetch, delivered back to the owner.
#[derive(Debug)]
pub struct PageSettlement {
    /// Generation captured when the fetch was dispatched.
    pub generation: u64,
    pub offset: usize,
    /// Rows the page can hold without passing the end of the result set.
    pub expected_len: usize,
    pub outcome: ServiceResult<Vec<Row>>,
}

/// What one `ensure_loaded` call decided, page by page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    /// Offsets dispatched by this call, ascending.
    pub dispatched: Vec<usize>,
    /// Pages skipped because a fetch was already in flight.
    pub in_flight: usize,
    /// Pages skipped because every row was already cached.
    pub cached: usize,
}

impl EnsureReport {
    /// Whether the call did nothing at all.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.dispatched.is_empty() && self.in_flight == 0 && self.cached == 0
    }
}

/// Counts from applying a batch of settlements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Pages merged into the cache.
    pub merged: usize,
    /// Pages that failed and remain holes.
    pub failed: usize,
    /// Settlements from a superseded generation.
    pub discarded: usize,
}

impl DrainReport {
    /// Total settlements processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.merged + self.failed + self.discarded
    }

    fn absorb(&mut self, other: Self) {
        self.merged += other.merged;
        self.failed += other.failed;
        self.discarded += other.discarded;
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub dispatched: u64,
    pub merged: u64,
    pub failed: u64,
    pub discarded: u64,
    pub resets: u64,
}

/// Page-level fetch scheduler for one session.
pub struct FetchCoalescer {
    page_size: usize,
    fetcher: Arc<dyn PageFetcher>,
    spawner: Arc<dyn TaskSpawner>,
    window: RowWindow,
    pending: PendingPageSet,
    /// Execution the cache currently belongs to.
    owner: Option<String>,
    generation: u64,
    settled_tx: Sender<PageSettlement>,
    settled_rx: Receiver<PageSettlement>,
    stats: CoalescerStats,
}

impl std::fmt::Debug for FetchCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoalescer")
            .field("page_size", &self.page_size)
            .field("owner", &self.owner)
            .field("generation", &self.generation)
            .field("loaded", &self.window.len())
            .field("pending", &self.pending)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl FetchCoalescer {
    /// Create a coalescer with a fixed page size.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is 0.
    #[must_use]
    pub fn new(
        page_size: usize,
        fetcher: Arc<dyn PageFetcher>,
        spawner: Arc<dyn TaskSpawner>,
    ) -> Self {
        assert!(page_size > 0, "page size must be greater than 0");
        let (settled_tx, settled_rx) = mpsc::channel();
        Self {
            page_size,
            fetcher,
            spawner,
            window: RowWindow::new(),
            pending: PendingPageSet::new(),
            owner: None,
            generation: 0,
            settled_tx,
            settled_rx,
            stats: CoalescerStats::default(),
        }
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Current cache generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Execution id the cache belongs to.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    #[must_use]
    pub const fn window(&self) -> &RowWindow {
        &self.window
    }

    #[must_use]
    pub const fn pending(&self) -> &PendingPageSet {
        &self.pending
    }

    #[must_use]
    pub const fn stats(&self) -> CoalescerStats {
        self.stats
    }

    /// Offset of the page holding `index`.
    #[must_use]
    pub const fn page_offset(&self, index: usize) -> usize {
        index - index % self.page_size
    }

    /// Whether the page holding `index` has a fetch in flight.
    #[must_use]
    pub fn is_loading(&self, index: usize) -> bool {
        self.pending.covers(index, self.page_size)
    }

    /// Discard the cache and every in-flight fetch.
    ///
    /// Settlements already dispatched will arrive later carrying the old
    /// generation and be dropped.
    pub fn reset(&mut self) {
        self.window.reset();
        self.pending.clear();
        self.owner = None;
        self.generation = self.generation.wrapping_add(1);
        self.stats.resets += 1;
        debug!(generation = self.generation, "row window reset");
    }

    /// Make `execution_id` the cache owner, resetting if it differs.
    ///
    /// Returns `true` when the owner changed.
    pub fn bind(&mut self, execution_id: &str) -> bool {
        if self.owner.as_deref() == Some(execution_id) {
            return false;
        }
        if self.owner.is_some() || !self.window.is_empty() || !self.pending.is_empty() {
            info!(
                from = self.owner.as_deref().unwrap_or("<none>"),
                to = execution_id,
                "switching row window to new execution"
            );
            self.reset();
        }
        self.owner = Some(execution_id.to_owned());
        true
    }

    /// Fetch every page of `[start, end]` that is neither cached nor in flight.
    ///
    /// The range is inclusive and expected to be clamped to
    /// `[0, total_rows - 1]` already. Fetches are dispatched concurrently and
    /// land later via [`FetchCoalescer::drain_settled`].
    pub fn ensure_loaded(&mut self, start: usize, end: usize, execution: &Execution) -> EnsureReport {
        let mut report = EnsureReport::default();
        if start > end {
            return report;
        }
        let _span = debug_span!("ensure_loaded", start, end, execution_id = %execution.execution_id)
            .entered();

        self.bind(&execution.execution_id);

        let total = execution.known_total();
        let start_page = start / self.page_size;
        let end_page = end / self.page_size;

        for page in start_page..=end_page {
            let Some(offset) = page.checked_mul(self.page_size) else {
                break;
            };
            let page_len = self.page_size.min(total.saturating_sub(offset));

            if self.pending.contains(offset) {
                report.in_flight += 1;
                continue;
            }
            if self.window.contains_all(offset..offset + page_len) {
                report.cached += 1;
                continue;
            }

            self.pending.insert(offset);
            if self.dispatch(&execution.execution_id, offset, page_len) {
                report.dispatched.push(offset);
            }
        }

        report
    }

    fn dispatch(&mut self, execution_id: &str, offset: usize, expected_len: usize) -> bool {
        let generation = self.generation;
        let limit = self.page_size;
        let fetcher = Arc::clone(&self.fetcher);
        let settled_tx = self.settled_tx.clone();
        let execution_id_owned = execution_id.to_owned();

        let job = FetchJob::new(offset, generation, move || {
            let outcome = fetcher.fetch_page(&execution_id_owned, offset, limit);
            // The receiver only disappears with the coalescer itself.
            let _ = settled_tx.send(PageSettlement {
                generation,
                offset,
                expected_len,
                outcome,
            });
        });

        match self.spawner.spawn(job) {
            Ok(()) => {
                self.stats.dispatched += 1;
                debug!(execution_id, offset, limit, generation, "page fetch dispatched");
                true
            }
            Err(error) => {
                self.pending.settle(offset);
                warn!(execution_id, offset, %error, "failed to spawn page fetch");
                false
            }
        }
    }

    /// Apply every settlement that has already arrived, without blocking.
    pub fn drain_settled(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            match self.settled_rx.try_recv() {
                Ok(settlement) => report.absorb(self.apply(settlement)),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        report
    }

    /// Block up to `timeout` for at least one settlement, then drain the rest.
    pub fn wait_settled(&mut self, timeout: Duration) -> DrainReport {
        let mut report = DrainReport::default();
        match self.settled_rx.recv_timeout(timeout) {
            Ok(settlement) => report.absorb(self.apply(settlement)),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return report,
        }
        report.absorb(self.drain_settled());
        report
    }

    /// Apply one settlement.
    pub fn apply(&mut self, settlement: PageSettlement) -> DrainReport {
        let mut report = DrainReport::default();
        let PageSettlement {
            generation,
            offset,
            expected_len,
            outcome,
        } = settlement;

        if generation != self.generation {
            self.stats.discarded += 1;
            report.discarded = 1;
            debug!(
                offset,
                settled_generation = generation,
                current_generation = self.generation,
                "discarding stale page settlement"
            );
            return report;
        }

        match outcome {
            Ok(mut rows) => {
                if rows.len() > expected_len {
                    debug!(
                        offset,
                        received = rows.len(),
                        expected_len,
                        "truncating page past end of result set"
                    );
                    rows.truncate(expected_len);
                }
                let written = self.window.merge(offset, rows);
                self.stats.merged += 1;
                report.merged = 1;
                debug!(offset, written, "page merged");
            }
            Err(error) => {
                self.stats.failed += 1;
                report.failed = 1;
                warn!(
                    execution_id = self.owner.as_deref().unwrap_or("<none>"),
                    offset,
                    transient = error.is_transient(),
                    %error,
                    "page fetch failed"
                );
            }
        }

        if !self.pending.settle(offset) {
            debug!(offset, "settled page was not marked pending");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::DeferredSpawner;
    use qgrid_core::ServiceError;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every request and serves `{"index": i}` rows, failing any
    /// offset listed in `fail`. Without a `total` every page is full.
    #[derive(Default)]
    struct ScriptedFetcher {
        calls: Mutex<Vec<(String, usize, usize)>>,
        fail: Mutex<HashSet<usize>>,
        total: Option<usize>,
    }

    impl ScriptedFetcher {
        fn calls(&self) -> Vec<(String, usize, usize)> {
            self.calls.lock().unwrap().clone()
        }

        fn fail_offset(&self, offset: usize) {
            self.fail.lock().unwrap().insert(offset);
        }

        fn heal_offset(&self, offset: usize) {
            self.fail.lock().unwrap().remove(&offset);
        }
    }

    impl PageFetcher for ScriptedFetcher {
        fn fetch_page(&self, execution_id: &str, offset: usize, limit: usize) -> ServiceResult<Vec<Row>> {
            self.calls
                .lock()
                .unwrap()
                .push((execution_id.to_owned(), offset, limit));
            if self.fail.lock().unwrap().contains(&offset) {
                return Err(ServiceError::Transport("connection reset".into()));
            }
            let end = match self.total {
                Some(total) => total.min(offset + limit),
                None => offset + limit,
            };
            Ok((offset..end)
                .map(|i| Row::from(json!({ "index": i, "exec": execution_id })))
                .collect())
        }
    }

    fn setup(fetcher: ScriptedFetcher) -> (FetchCoalescer, Arc<ScriptedFetcher>, DeferredSpawner) {
        let fetcher = Arc::new(fetcher);
        let spawner = DeferredSpawner::new();
        let coalescer = FetchCoalescer::new(
            50,
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::new(spawner.clone()),
        );
        (coalescer, fetcher, spawner)
    }

    #[test]
    #[should_panic(expected = "page size must be greater than 0")]
    fn zero_page_size_panics() {
        let _ = FetchCoalescer::new(
            0,
            Arc::new(ScriptedFetcher::default()),
            Arc::new(DeferredSpawner::new()),
        );
    }

    #[test]
    fn ensure_loaded_dispatches_each_missing_page() {
        let (mut c, fetcher, spawner) = setup(ScriptedFetcher::default());
        let exec = Execution::completed("e1", 120);

        let report = c.ensure_loaded(40, 70, &exec);
        assert_eq!(report.dispatched, vec![0, 50]);
        assert_eq!(spawner.queued_offsets(), vec![0, 50]);
        assert!(c.pending().contains(0));
        assert!(c.pending().contains(50));

        spawner.run_all();
        let drained = c.drain_settled();
        assert_eq!(drained.merged, 2);
        assert!(c.pending().is_empty());
        assert!(c.window().has(45));
        assert!(c.window().has(60));
        assert!(!c.window().has(110));

        let limits: Vec<_> = fetcher.calls().iter().map(|(_, o, l)| (*o, *l)).collect();
        assert_eq!(limits, vec![(0, 50), (50, 50)]);
    }

    #[test]
    fn overlapping_calls_share_in_flight_pages() {
        let (mut c, fetcher, spawner) = setup(ScriptedFetcher::default());
        let exec = Execution::completed("e1", 500);

        c.ensure_loaded(0, 60, &exec);
        let second = c.ensure_loaded(30, 140, &exec);
        assert_eq!(second.dispatched, vec![100]);
        assert_eq!(second.in_flight, 2);

        spawner.run_all();
        c.drain_settled();
        let offsets: Vec<_> = fetcher.calls().iter().map(|(_, o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 50, 100]);
    }

    #[test]
    fn fully_cached_page_is_skipped() {
        let (mut c, fetcher, spawner) = setup(ScriptedFetcher::default());
        let exec = Execution::completed("e1", 120);

        c.ensure_loaded(0, 10, &exec);
        spawner.run_all();
        c.drain_settled();

        let again = c.ensure_loaded(0, 49, &exec);
        assert!(again.dispatched.is_empty());
        assert_eq!(again.cached, 1);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[test]
    fn short_last_page_counts_as_cached_once_filled() {
        let (mut c, _fetcher, spawner) = setup(ScriptedFetcher {
            total: Some(120),
            ..ScriptedFetcher::default()
        });
        let exec = Execution::completed("e1", 120);

        c.ensure_loaded(100, 119, &exec);
        spawner.run_all();
        c.drain_settled();

        // Only 20 rows exist on the last page; all of them are present.
        assert_eq!(c.window().loaded_in(100..150), 20);
        let again = c.ensure_loaded(100, 119, &exec);
        assert_eq!(again.cached, 1);
    }

    #[test]
    fn oversized_page_is_truncated_to_total() {
        let (mut c, _fetcher, spawner) = setup(ScriptedFetcher::default());
        let exec = Execution::completed("e1", 120);

        c.ensure_loaded(100, 119, &exec);
        spawner.run_all();
        c.drain_settled();

        assert!(c.window().has(119));
        assert!(!c.window().has(120));
        assert_eq!(c.window().last_index(), Some(119));
    }

    #[test]
    fn inverted_range_is_noop() {
        let (mut c, fetcher, spawner) = setup(ScriptedFetcher::default());
        let report = c.ensure_loaded(70, 40, &Execution::completed("e1", 120));
        assert!(report.is_noop());
        assert!(spawner.is_empty());
        assert!(fetcher.calls().is_empty());
        assert_eq!(c.owner(), None);
    }

    #[test]
    fn failed_page_stays_hole_and_is_retried() {
        let (mut c, fetcher, spawner) = setup(ScriptedFetcher::default());
        fetcher.fail_offset(50);
        let exec = Execution::completed("e1", 120);

        c.ensure_loaded(40, 70, &exec);
        spawner.run_all();
        let drained = c.drain_settled();
        assert_eq!(drained.merged, 1);
        assert_eq!(drained.failed, 1);
        assert!(c.window().has(10));
        assert!(!c.window().has(60));
        assert!(c.pending().is_empty());

        fetcher.heal_offset(50);
        let retry = c.ensure_loaded(40, 70, &exec);
        assert_eq!(retry.dispatched, vec![50]);
        assert_eq!(retry.cached, 1);
    }

    #[test]
    fn out_of_order_settlement_is_safe() {
        let (mut c, _fetcher, spawner) = setup(ScriptedFetcher::default());
        let exec = Execution::completed("e1", 200);

        c.ensure_loaded(0, 199, &exec);
        assert!(spawner.run_offset(150));
        assert!(spawner.run_offset(0));
        c.drain_settled();
        assert!(spawner.run_offset(100));
        assert!(spawner.run_offset(50));
        c.drain_settled();

        assert_eq!(c.window().len(), 200);
        assert!(c.pending().is_empty());
    }

    #[test]
    fn settlement_after_reset_is_discarded() {
        let (mut c, _fetcher, spawner) = setup(ScriptedFetcher::default());
        c.ensure_loaded(0, 10, &Execution::completed("e1", 120));

        let e2 = Execution::completed("e2", 120);
        c.bind(&e2.execution_id);
        assert_eq!(c.owner(), Some("e2"));
        assert!(c.pending().is_empty());

        // The e1 page settles now, after the switch.
        spawner.run_all();
        let drained = c.drain_settled();
        assert_eq!(drained.discarded, 1);
        assert!(c.window().is_empty());

        // The e2 request for the same offset is not blocked by the stale one.
        let report = c.ensure_loaded(0, 10, &e2);
        assert_eq!(report.dispatched, vec![0]);
    }

    #[test]
    fn stale_failure_does_not_release_new_pending_entry() {
        let (mut c, fetcher, spawner) = setup(ScriptedFetcher::default());
        fetcher.fail_offset(0);
        c.ensure_loaded(0, 10, &Execution::completed("e1", 120));
        let stale = spawner.queued_offsets();
        assert_eq!(stale, vec![0]);

        let e2 = Execution::completed("e2", 120);
        c.ensure_loaded(0, 10, &e2);
        assert!(c.pending().contains(0));

        // Run the stale e1 job first; it fails and must not free e2's offset.
        assert_eq!(spawner.run_next(), Some(0));
        let drained = c.drain_settled();
        assert_eq!(drained.discarded, 1);
        assert!(c.pending().contains(0));
    }

    #[test]
    fn switching_execution_resets_cache() {
        let (mut c, _fetcher, spawner) = setup(ScriptedFetcher::default());
        c.ensure_loaded(0, 10, &Execution::completed("e1", 120));
        spawner.run_all();
        c.drain_settled();
        assert!(c.window().has(0));

        let before = c.generation();
        c.ensure_loaded(60, 70, &Execution::completed("e2", 120));
        assert!(c.generation() > before);
        assert!(!c.window().has(0));
        assert_eq!(c.owner(), Some("e2"));
    }

    #[test]
    fn first_bind_does_not_bump_generation() {
        let (mut c, _fetcher, _spawner) = setup(ScriptedFetcher::default());
        assert!(c.bind("e1"));
        assert_eq!(c.generation(), 0);
        assert!(!c.bind("e1"));
    }

    #[test]
    fn is_loading_tracks_pages_in_flight() {
        let (mut c, _fetcher, spawner) = setup(ScriptedFetcher::default());
        c.ensure_loaded(55, 60, &Execution::completed("e1", 120));
        assert!(c.is_loading(99));
        assert!(!c.is_loading(10));
        spawner.run_all();
        c.drain_settled();
        assert!(!c.is_loading(99));
    }

    #[test]
    fn spawn_failure_releases_offset() {
        struct RefusingSpawner;
        impl TaskSpawner for RefusingSpawner {
            fn spawn(&self, _job: FetchJob) -> std::io::Result<()> {
                Err(std::io::Error::other("thread limit reached"))
            }
        }

        let mut c = FetchCoalescer::new(
            50,
            Arc::new(ScriptedFetcher::default()),
            Arc::new(RefusingSpawner),
        );
        let report = c.ensure_loaded(0, 10, &Execution::completed("e1", 120));
        assert!(report.dispatched.is_empty());
        assert!(c.pending().is_empty());
    }

    #[test]
    fn wait_settled_times_out_without_work() {
        let (mut c, _fetcher, _spawner) = setup(ScriptedFetcher::default());
        let report = c.wait_settled(Duration::from_millis(10));
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn rows_carry_request_execution_id() {
        let (mut c, fetcher, spawner) = setup(ScriptedFetcher::default());
        c.ensure_loaded(0, 0, &Execution::completed("exec_9", 10));
        spawner.run_all();
        c.drain_settled();

        assert_eq!(fetcher.calls()[0].0, "exec_9");
        assert_eq!(c.window().get(0).unwrap().get("exec"), Some(&json!("exec_9")));
        // Only 10 rows exist.
        assert_eq!(c.window().len(), 10);
    }
}
