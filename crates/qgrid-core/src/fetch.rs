#![forbid(unsafe_code)]

//! Collaborator traits: page transport and execution control.
//!
//! Both traits are blocking. The window layer never calls a [`PageFetcher`]
//! on its owner thread; it hands each page fetch to a task spawner, so a
//! slow transport only delays its own page.

use crate::error::ServiceResult;
use crate::execution::Execution;
use crate::row::Row;

/// Fetches one page of rows for a completed execution.
///
/// Implementations return rows in server order for indices
/// `offset .. offset + limit`. A short page (fewer than `limit` rows) is
/// normal at the end of the result set.
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch_page(&self, execution_id: &str, offset: usize, limit: usize) -> ServiceResult<Vec<Row>>;
}

/// Submits, polls, and cancels executions.
///
/// This is the transport behind the status-polling producer; the window layer
/// itself only consumes the [`Execution`] snapshots it yields.
pub trait QueryService: Send + Sync + 'static {
    /// Submit `sql`, returning the new execution id.
    fn create_execution(&self, sql: &str) -> ServiceResult<String>;

    /// Current snapshot of an execution.
    fn get_execution(&self, execution_id: &str) -> ServiceResult<Execution>;

    /// Request cancellation. Terminal executions are left unchanged.
    fn cancel_execution(&self, execution_id: &str) -> ServiceResult<()>;
}

impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    fn fetch_page(&self, execution_id: &str, offset: usize, limit: usize) -> ServiceResult<Vec<Row>> {
        (**self).fetch_page(execution_id, offset, limit)
    }
}

impl<T: QueryService + ?Sized> QueryService for std::sync::Arc<T> {
    fn create_execution(&self, sql: &str) -> ServiceResult<String> {
        (**self).create_execution(sql)
    }

    fn get_execution(&self, execution_id: &str) -> ServiceResult<Execution> {
        (**self).get_execution(execution_id)
    }

    fn cancel_execution(&self, execution_id: &str) -> ServiceResult<()> {
        (**self).cancel_execution(execution_id)
    }
}
