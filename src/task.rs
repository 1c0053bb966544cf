use crate::error::PoolError;
use crate::handle::TaskHandle;

use std::any::Any;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use futures::channel::oneshot;
use tracing::warn;

lazy_static::lazy_static! {
  static ref NEXT_POOL_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// The uniform shape every queued unit of work is erased to.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Internal representation of a task managed by the pool.
pub(crate) struct ManagedTask {
  pub(crate) task_id: u64,
  pub(crate) job: Job,
}

impl fmt::Debug for ManagedTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManagedTask")
      .field("task_id", &self.task_id)
      .finish_non_exhaustive()
  }
}

impl ManagedTask {
  /// Wraps a closure whose outcome nobody observes.
  pub(crate) fn detached<F>(f: F) -> Self
  where
    F: FnOnce() + Send + 'static,
  {
    Self {
      task_id: next_task_id(),
      job: Box::new(f),
    }
  }

  /// Wraps a value-producing closure and returns the task together with the
  /// handle that will receive its outcome.
  ///
  /// A panic inside `f` is delivered to the handle as `PoolError::TaskPanicked`
  /// and then resumed so the executing worker still observes it.
  pub(crate) fn with_result<F, R>(f: F) -> (Self, TaskHandle<R>)
  where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
  {
    let task_id = next_task_id();
    let (result_tx, result_rx) = oneshot::channel::<Result<R, PoolError>>();

    let job: Job = Box::new(move || {
      let (outcome, payload) = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => (Ok(value), None),
        Err(payload) => (Err(PoolError::TaskPanicked(panic_message(&*payload))), Some(payload)),
      };

      if result_tx.send(outcome).is_err() {
        warn!(%task_id, "Result receiver for task was dropped. Task outcome was discarded.");
      }

      if let Some(payload) = payload {
        panic::resume_unwind(payload);
      }
    });

    (Self { task_id, job }, TaskHandle::new(task_id, result_rx))
  }
}

pub(crate) fn next_task_id() -> u64 {
  NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "Unknown panic".to_string()
  }
}

/// Drops a caught panic payload without letting a panicking `Drop` escape.
/// A payload raised by that nested panic is leaked instead of dropped.
pub(crate) fn discard_panic_payload(payload: Box<dyn Any + Send>) {
  if let Err(nested_payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(payload))) {
    warn!("Dropping a task's panic payload panicked. Leaking the nested payload.");
    mem::forget(nested_payload);
  }
}
