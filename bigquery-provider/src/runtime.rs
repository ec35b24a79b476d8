//! Blocking entry points run their async counterpart to completion on a shared runtime.
//!
//! The HTTP client keeps its connection pool on the runtime that created it, so every blocking call
//! uses the same process-wide multi-thread runtime instead of a fresh one per call.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::Error;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> Result<&'static Runtime, Error> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_multi_thread()
        .thread_name("bigquery-provider")
        .enable_all()
        .build()
        .map_err(|e| Error::Remote {
            message: format!("failed to start runtime: {e}"),
            source: Some(Box::new(e)),
        })?;
    Ok(RUNTIME.get_or_init(|| runtime))
}

/// Blocks the current thread until `future` completes.
///
/// Fails with [`Error::BlockingInAsyncContext`] when called from inside a Tokio runtime, where
/// blocking a worker on its own pending work could deadlock.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, Error> {
    if Handle::try_current().is_ok() {
        return Err(Error::BlockingInAsyncContext);
    }
    Ok(runtime()?.block_on(future))
}
