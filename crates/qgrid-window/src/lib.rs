#![forbid(unsafe_code)]

//! Row window: sparse caching and fetch coalescing for large result sets.
//!
//! # Role in qgrid
//! `qgrid-window` sits between a virtualized table and a paginated,
//! latency-bearing row API. Renderers ask for a visible index range; this
//! crate works out which fixed-size pages are missing, fetches exactly those,
//! and merges results into a sparse cache the renderer reads synchronously.
//!
//! # Primary responsibilities
//! - **RowWindow**: sparse index → row map with idempotent bulk overwrite.
//! - **PendingPageSet**: page offsets currently in flight.
//! - **FetchCoalescer**: missing-page computation, duplicate suppression,
//!   concurrent dispatch, and stale-settlement discard.
//! - **Debouncer**: trailing-edge collapse of rapid range changes.
//! - **QuerySession**: the single owner that glues the above together.
//!
//! # Data flow
//!
//! ```text
//! scroll ─► on_range_change ─► Debouncer ─(quiet period)─► ensure_loaded
//!                                                              │
//!             ┌──────────── missing pages ◄── RowWindow ◄──────┘
//!             ▼
//!      TaskSpawner ─► PageFetcher (per page, concurrent)
//!             │
//!             └─► PageSettlement ─(channel)─► pump ─► RowWindow::merge
//! ```
//!
//! # Invariants
//!
//! 1. At most one in-flight fetch per page offset.
//! 2. A pending offset is released exactly once, when its fetch settles.
//! 3. Settlements from a superseded execution are never merged.
//! 4. A page failure never affects sibling pages or propagates to callers.

pub mod cache;
pub mod coalescer;
pub mod debounce;
pub mod pending;
pub mod session;
pub mod spawn;

pub use cache::RowWindow;
pub use coalescer::{CoalescerStats, DrainReport, EnsureReport, FetchCoalescer, PageSettlement};
pub use debounce::{DebounceStats, Debouncer, RangeDebouncer};
pub use pending::PendingPageSet;
pub use session::{PumpReport, QuerySession};
pub use spawn::{DeferredSpawner, FetchJob, TaskSpawner, ThreadSpawner};
