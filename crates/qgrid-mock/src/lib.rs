#![forbid(unsafe_code)]

//! In-process stand-in for a remote query backend.
//!
//! [`MockBackend`] implements both [`QueryService`](qgrid_core::QueryService)
//! and [`PageFetcher`](qgrid_core::PageFetcher) against four built-in
//! [`SampleSource`]s. Execution progress is a pure function of elapsed time,
//! so every call has an `_at(now)` variant and tests never need to sleep.
//!
//! | Source | Rows | Runs for | Outcome |
//! |--------|------|----------|---------|
//! | `users` | 1 000 | 2 s | completed |
//! | `analytics` | 0 | 15 s | failed (timeout) |
//! | `products` | 25 000 | 3.5 s | completed, 15 columns |
//! | `transactions` | 100 000 | 4 s | completed |

pub mod service;
pub mod sources;

pub use service::{MockBackend, QUEUED_FOR, TIMEOUT_MESSAGE};
pub use sources::SampleSource;
