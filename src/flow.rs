//! Run independent tasks concurrently and collect every result.
//!
//! Tasks never share mutable state: each one returns its own value and the
//! caller assembles the output after the barrier. No task is cancelled
//! because another one failed.

use std::future::Future;
use std::pin::Pin;

use futures::future::join_all;

use crate::error::{CleanupErrors, Error, StageError};

/// A boxed task producing `T`.
pub type Task<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Box a future into a [`Task`].
pub fn task<'a, T, F>(future: F) -> Task<'a, T>
where
    F: Future<Output = T> + Send + 'a,
{
    Box::pin(future)
}

/// Run all tasks concurrently; results are returned in task order.
pub async fn parallel<'a, T>(tasks: Vec<Task<'a, T>>) -> Vec<T> {
    join_all(tasks).await
}

/// Run named fallible tasks concurrently and fold their failures into one
/// error that names every failing task.
pub async fn parallel_named<'a>(
    tasks: Vec<(String, Task<'a, Result<(), Error>>)>,
) -> Result<(), CleanupErrors> {
    let (names, futures): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = join_all(futures).await;

    let failures: Vec<StageError> = names
        .into_iter()
        .zip(results)
        .filter_map(|(kind, result)| result.err().map(|error| StageError { kind, error }))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(CleanupErrors(failures))
    }
}
