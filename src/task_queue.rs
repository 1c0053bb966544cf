use crate::error::PoolError;
use crate::task::ManagedTask;

use std::collections::VecDeque;
use std::fmt;

use parking_lot::{Condvar, Mutex};

/// Everything guarded by the queue lock.
struct QueueState {
  tasks: VecDeque<ManagedTask>,
  stopping: bool,
}

/// A FIFO, multi-producer, multi-consumer queue of pending tasks.
///
/// The pending tasks and the `stopping` flag live behind one mutex. Workers
/// sleep on `available` while the queue is empty and the pool is still
/// accepting work; every mutation that can satisfy a sleeper is followed by a
/// notification: `push` wakes one worker, `close` wakes all of them.
pub(crate) struct TaskQueue {
  state: Mutex<QueueState>,
  available: Condvar,
}

impl fmt::Debug for TaskQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("TaskQueue")
      .field("len", &state.tasks.len())
      .field("stopping", &state.stopping)
      .finish()
  }
}

impl TaskQueue {
  pub(crate) fn new() -> Self {
    Self {
      state: Mutex::new(QueueState {
        tasks: VecDeque::new(),
        stopping: false,
      }),
      available: Condvar::new(),
    }
  }

  /// Appends a task to the tail of the queue and wakes one waiting worker.
  ///
  /// Once the queue is closed the task is dropped unexecuted and
  /// `PoolError::PoolShuttingDown` is returned.
  pub(crate) fn push(&self, task: ManagedTask) -> Result<(), PoolError> {
    {
      let mut state = self.state.lock();
      if state.stopping {
        return Err(PoolError::PoolShuttingDown);
      }
      state.tasks.push_back(task);
    }
    self.available.notify_one();
    Ok(())
  }

  /// Removes the head task, blocking while the queue is empty and open.
  ///
  /// Returns `None` only when the queue is closed and fully drained, which is
  /// the worker's signal to terminate.
  pub(crate) fn pop_or_wait(&self) -> Option<ManagedTask> {
    let mut state = self.state.lock();
    loop {
      if let Some(task) = state.tasks.pop_front() {
        return Some(task);
      }
      if state.stopping {
        return None;
      }
      self.available.wait(&mut state);
    }
  }

  /// Stops accepting tasks and wakes every waiting worker so each can
  /// re-evaluate the terminate condition. Returns `true` for the call that
  /// actually closed the queue.
  pub(crate) fn close(&self) -> bool {
    let newly_closed = {
      let mut state = self.state.lock();
      !std::mem::replace(&mut state.stopping, true)
    };
    self.available.notify_all();
    newly_closed
  }

  /// Returns `true` once `close` has been called.
  pub(crate) fn is_closed(&self) -> bool {
    self.state.lock().stopping
  }

  /// Returns the number of tasks waiting to be claimed.
  pub(crate) fn len(&self) -> usize {
    self.state.lock().tasks.len()
  }
}
