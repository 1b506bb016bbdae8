#![forbid(unsafe_code)]

//! Core: row model, execution lifecycle types, and collaborator traits.
//!
//! # Role in qgrid
//! `qgrid-core` is the vocabulary shared by every other crate. It defines what
//! a [`Row`] is, how an [`Execution`] reports its lifecycle, and the narrow
//! traits through which the window layer talks to the outside world
//! ([`PageFetcher`] for row pages, [`QueryService`] for execution control).
//!
//! # Primary responsibilities
//! - **Row / ColumnMetadata**: schema-less rows with descriptive column types.
//! - **Execution**: one server-side query run and its status.
//! - **RowRange**: inclusive index ranges and the clamping rules callers use.
//! - **ServiceError**: transport/server failures reported by collaborators.
//! - **WindowConfig**: page size and debounce settings, with env overrides.
//!
//! # How it fits in the system
//! `qgrid-window` owns the cache and fetch scheduling and depends only on
//! this crate. Backends (`qgrid-mock`, or a real HTTP client) implement the
//! traits defined here.

pub mod config;
pub mod error;
pub mod execution;
pub mod fetch;
pub mod range;
pub mod row;

pub use config::{ConfigError, ConfigParse, WindowConfig};
pub use error::{ServiceError, ServiceResult};
pub use execution::{Execution, ExecutionFailure, ExecutionStatus};
pub use fetch::{PageFetcher, QueryService};
pub use range::RowRange;
pub use row::{ColumnMetadata, ColumnType, Row};
