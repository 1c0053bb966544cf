use crate::error::PoolError;

use std::fmt;
use std::mem;

use futures::channel::oneshot;
use futures::executor;
use tracing;

/// Where a handle is in its single delivery.
enum ResultSlot<R> {
  Pending(oneshot::Receiver<Result<R, PoolError>>),
  Ready(Result<R, PoolError>),
  Taken,
}

/// A handle to a task submitted to the `ThreadPoolManager`.
///
/// Holds the read side of the task's one-shot result channel. The outcome is
/// written exactly once by the worker that executes the task and can be
/// retrieved exactly once, either blocking via [`TaskHandle::get`] or from an
/// async context via [`TaskHandle::await_result`].
pub struct TaskHandle<R: Send + 'static> {
  task_id: u64,
  slot: ResultSlot<R>,
}

impl<R: Send + 'static> fmt::Debug for TaskHandle<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match self.slot {
      ResultSlot::Pending(_) => "pending",
      ResultSlot::Ready(_) => "ready",
      ResultSlot::Taken => "taken",
    };
    f.debug_struct("TaskHandle")
      .field("task_id", &self.task_id)
      .field("state", &state)
      .finish()
  }
}

impl<R: Send + 'static> TaskHandle<R> {
  pub(crate) fn new(task_id: u64, result_receiver: oneshot::Receiver<Result<R, PoolError>>) -> Self {
    Self {
      task_id,
      slot: ResultSlot::Pending(result_receiver),
    }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Returns `true` once the task's outcome has been delivered (or its result
  /// was already taken). Never blocks and never consumes the outcome.
  pub fn is_finished(&mut self) -> bool {
    if let ResultSlot::Pending(rx) = &mut self.slot {
      match rx.try_recv() {
        Ok(Some(outcome)) => self.slot = ResultSlot::Ready(outcome),
        Ok(None) => return false,
        Err(canceled) => self.slot = ResultSlot::Ready(Err(self.channel_error(canceled))),
      }
    }
    true
  }

  /// Blocks the calling thread until the task's outcome is delivered.
  ///
  /// Calling this from inside a task running on the same pool can deadlock if
  /// every worker ends up waiting on work that is still queued.
  pub fn wait(&mut self) {
    if let ResultSlot::Pending(rx) = &mut self.slot {
      let outcome = executor::block_on(rx);
      self.slot = ResultSlot::Ready(self.flatten(outcome));
    }
  }

  /// Blocks until the task completes and returns its result of type `R`.
  ///
  /// # Errors
  /// Returns `PoolError::TaskPanicked` if the task panicked during execution.
  /// Returns `PoolError::ResultUnavailable` if the result has already been taken.
  /// Returns `PoolError::ResultChannelError` if the task was dropped without delivering a result.
  pub fn get(&mut self) -> Result<R, PoolError> {
    self.wait();
    self.take()
  }

  /// Awaits the completion of the task and returns its result of type `R`.
  ///
  /// Same contract as [`TaskHandle::get`], without blocking the executor thread.
  pub async fn await_result(&mut self) -> Result<R, PoolError> {
    if let ResultSlot::Pending(rx) = &mut self.slot {
      let outcome = rx.await;
      self.slot = ResultSlot::Ready(self.flatten(outcome));
    }
    self.take()
  }

  fn take(&mut self) -> Result<R, PoolError> {
    match mem::replace(&mut self.slot, ResultSlot::Taken) {
      ResultSlot::Ready(outcome) => outcome,
      ResultSlot::Taken => {
        tracing::debug!(task_id = %self.task_id, "TaskHandle: Result requested more than once.");
        Err(PoolError::ResultUnavailable)
      }
      ResultSlot::Pending(rx) => {
        // Only reachable if a caller skipped waiting; keep the receiver.
        self.slot = ResultSlot::Pending(rx);
        Err(PoolError::ResultUnavailable)
      }
    }
  }

  fn flatten(&self, outcome: Result<Result<R, PoolError>, oneshot::Canceled>) -> Result<R, PoolError> {
    match outcome {
      Ok(task_outcome_result) => task_outcome_result,
      Err(canceled) => Err(self.channel_error(canceled)),
    }
  }

  fn channel_error(&self, canceled: oneshot::Canceled) -> PoolError {
    tracing::warn!(task_id = %self.task_id, "Result channel receive error: {}", canceled);
    PoolError::ResultChannelError(format!(
      "Task (id: {}) result channel unexpectedly closed: {}",
      self.task_id, canceled
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;
  use std::time::Duration;

  #[test]
  fn test_get_returns_value_once() {
    let (tx, rx) = oneshot::channel();
    let mut handle = TaskHandle::<String>::new(1, rx);
    tx.send(Ok("done".to_string())).unwrap();

    assert_eq!(handle.get(), Ok("done".to_string()));
    assert_eq!(handle.get(), Err(PoolError::ResultUnavailable));
  }

  #[test]
  fn test_is_finished_buffers_outcome_without_consuming() {
    let (tx, rx) = oneshot::channel();
    let mut handle = TaskHandle::<u32>::new(2, rx);
    assert!(!handle.is_finished());

    tx.send(Ok(5)).unwrap();
    assert!(handle.is_finished());
    assert!(handle.is_finished());
    assert_eq!(handle.get(), Ok(5));
    assert!(handle.is_finished());
  }

  #[test]
  fn test_wait_blocks_until_delivery_from_other_thread() {
    let (tx, rx) = oneshot::channel();
    let mut handle = TaskHandle::<u32>::new(3, rx);

    let producer = thread::spawn(move || {
      thread::sleep(Duration::from_millis(50));
      tx.send(Ok(9)).unwrap();
    });

    handle.wait();
    assert!(handle.is_finished());
    assert_eq!(handle.get(), Ok(9));
    producer.join().unwrap();
  }

  #[test]
  fn test_dropped_sender_reports_channel_error() {
    let (tx, rx) = oneshot::channel::<Result<u32, PoolError>>();
    let mut handle = TaskHandle::new(4, rx);
    drop(tx);

    assert!(matches!(handle.get(), Err(PoolError::ResultChannelError(_))));
    assert_eq!(handle.get(), Err(PoolError::ResultUnavailable));
  }

  #[test]
  fn test_failure_is_delivered_once() {
    let (tx, rx) = oneshot::channel::<Result<u32, PoolError>>();
    let mut handle = TaskHandle::new(5, rx);
    tx.send(Err(PoolError::TaskPanicked("bad input".to_string()))).unwrap();

    assert_eq!(handle.get(), Err(PoolError::TaskPanicked("bad input".to_string())));
    assert_eq!(handle.get(), Err(PoolError::ResultUnavailable));
  }

  #[test]
  fn test_await_result_from_executor() {
    let (tx, rx) = oneshot::channel();
    let mut handle = TaskHandle::<&'static str>::new(6, rx);
    tx.send(Ok("async")).unwrap();

    assert_eq!(executor::block_on(handle.await_result()), Ok("async"));
    assert_eq!(executor::block_on(handle.await_result()), Err(PoolError::ResultUnavailable));
  }
}
