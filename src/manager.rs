use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::TaskHandle;
use crate::task::ManagedTask;
use crate::worker::{PoolShared, Worker};

use std::fmt;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

/// A fixed-size pool of OS worker threads fed by a FIFO task queue.
///
/// Dropping the last reference performs a graceful [`shutdown`](Self::shutdown).
pub struct ThreadPoolManager {
  shared: Arc<PoolShared>,
  worker_count: usize,
  worker_thread_ids: Vec<ThreadId>,
  /// Emptied by the first shutdown. The lock is held for the whole join so
  /// concurrent shutdown calls wait for it to finish.
  worker_join_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for ThreadPoolManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ThreadPoolManager")
      .field("pool_name", &self.shared.pool_name)
      .field("worker_count", &self.worker_count)
      .field("queued", &self.shared.queue.len())
      .field("active", &self.shared.active_tasks.len())
      .field("shutting_down", &self.shared.queue.is_closed())
      .finish()
  }
}

impl ThreadPoolManager {
  /// Spawns `worker_count` worker threads.
  ///
  /// # Errors
  /// Returns `PoolError::InvalidConfig` if `worker_count` is zero.
  /// Returns `PoolError::WorkerSpawnFailed` if the OS refuses a thread.
  pub fn new(worker_count: usize, pool_name: &str) -> Result<Arc<Self>, PoolError> {
    Self::with_config(PoolConfig::new(worker_count).with_pool_name(pool_name))
  }

  pub fn with_config(config: PoolConfig) -> Result<Arc<Self>, PoolError> {
    let config = config.validate()?;
    let shared = Arc::new(PoolShared::new(&config.pool_name));
    let mut handles = Vec::with_capacity(config.worker_count);

    for index in 0..config.worker_count {
      let mut builder = thread::Builder::new().name(config.worker_thread_name(index));
      if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
      }

      let worker = Worker::new(index, shared.clone());
      match builder.spawn(move || worker.run()) {
        Ok(handle) => handles.push(handle),
        Err(spawn_error) => {
          error!(
            pool_name = %config.pool_name,
            worker = index,
            "Failed to spawn worker thread: {}. Stopping already spawned workers.",
            spawn_error
          );
          shared.queue.close();
          for handle in handles {
            if let Err(join_error) = handle.join() {
              error!(
                pool_name = %config.pool_name,
                "Error joining worker thread after failed spawn: {:?}",
                join_error
              );
            }
          }
          return Err(PoolError::WorkerSpawnFailed(spawn_error.to_string()));
        }
      }
    }

    info!(pool_name = %config.pool_name, workers = config.worker_count, "Thread pool started.");

    Ok(Arc::new(Self {
      shared,
      worker_count: config.worker_count,
      worker_thread_ids: handles.iter().map(|handle| handle.thread().id()).collect(),
      worker_join_handles: Mutex::new(handles),
    }))
  }

  pub fn name(&self) -> &str {
    &self.shared.pool_name
  }

  pub fn worker_count(&self) -> usize {
    self.worker_count
  }

  /// Returns the number of tasks currently being executed by workers.
  pub fn active_task_count(&self) -> usize {
    self.shared.active_tasks.len()
  }

  /// Returns the current number of tasks in the pending queue.
  pub fn queued_task_count(&self) -> usize {
    self.shared.queue.len()
  }

  /// Returns the number of tasks that finished executing, including panicked ones.
  pub fn completed_task_count(&self) -> u64 {
    self.shared.completed_tasks.load(AtomicOrdering::Relaxed)
  }

  pub fn panicked_task_count(&self) -> u64 {
    self.shared.panicked_tasks.load(AtomicOrdering::Relaxed)
  }

  pub fn is_shutting_down(&self) -> bool {
    self.shared.queue.is_closed()
  }

  /// Queues `task` and returns a handle to its eventual result.
  ///
  /// Never blocks on the task itself. Arguments are bound by capturing them in
  /// the closure.
  ///
  /// # Errors
  /// Returns `PoolError::PoolShuttingDown` once shutdown has begun; the task is
  /// not queued and will never run.
  pub fn submit<F, R>(&self, task: F) -> Result<TaskHandle<R>, PoolError>
  where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
  {
    let (managed_task, handle) = ManagedTask::with_result(task);
    self.enqueue(managed_task)?;
    Ok(handle)
  }

  /// Queues `task` without a result handle.
  ///
  /// A panic inside `task` is logged and counted by the worker and otherwise
  /// discarded.
  ///
  /// # Errors
  /// Returns `PoolError::PoolShuttingDown` once shutdown has begun.
  pub fn execute<F>(&self, task: F) -> Result<(), PoolError>
  where
    F: FnOnce() + Send + 'static,
  {
    self.enqueue(ManagedTask::detached(task))
  }

  fn enqueue(&self, managed_task: ManagedTask) -> Result<(), PoolError> {
    let task_id = managed_task.task_id;
    match self.shared.queue.push(managed_task) {
      Ok(()) => {
        debug!(pool_name = %*self.shared.pool_name, %task_id, "Submitted task to queue.");
        Ok(())
      }
      Err(e) => {
        warn!(
          pool_name = %*self.shared.pool_name,
          %task_id,
          "Submit: Attempted to submit task to a pool that is shutting down or closed."
        );
        Err(e)
      }
    }
  }

  /// Stops accepting tasks, lets the workers drain everything already queued,
  /// and joins every worker thread.
  ///
  /// Idempotent: a second or concurrent call blocks until the first one has
  /// finished joining and then returns `Ok(())`.
  ///
  /// Called from inside one of the pool's own tasks it only closes the queue,
  /// since a worker cannot wait for itself. In that case `Ok(())` means the
  /// queue is closed, not that the workers have exited; a later `shutdown` (or
  /// dropping the pool) from outside the pool joins them.
  ///
  /// # Errors
  /// Returns `PoolError::WorkerJoinFailed` if any worker thread terminated
  /// abnormally.
  pub fn shutdown(&self) -> Result<(), PoolError> {
    if self.shared.queue.close() {
      info!(pool_name = %*self.shared.pool_name, "Initiating pool shutdown. Draining queued tasks.");
    } else {
      trace!(pool_name = %*self.shared.pool_name, "Shutdown already in progress or completed.");
    }

    if self.worker_thread_ids.contains(&thread::current().id()) {
      warn!(
        pool_name = %*self.shared.pool_name,
        "Shutdown invoked from a pool worker. Queue closed; workers will be joined by the next shutdown from outside the pool."
      );
      return Ok(());
    }

    let mut guard = self.worker_join_handles.lock();
    if guard.is_empty() {
      return Ok(());
    }

    let mut failed_joins = 0;
    for handle in guard.drain(..) {
      if let Err(join_error) = handle.join() {
        failed_joins += 1;
        error!(
          pool_name = %*self.shared.pool_name,
          "Error joining worker thread during shutdown: {:?}",
          join_error
        );
      }
    }
    drop(guard);

    if failed_joins > 0 {
      return Err(PoolError::WorkerJoinFailed(failed_joins));
    }
    info!(
      pool_name = %*self.shared.pool_name,
      completed = self.completed_task_count(),
      "Pool shutdown completed."
    );
    Ok(())
  }
}

impl Drop for ThreadPoolManager {
  fn drop(&mut self) {
    if !self.shared.queue.is_closed() {
      info!(
        pool_name = %*self.shared.pool_name,
        "ThreadPoolManager dropped without explicit shutdown. Shutting down implicitly."
      );
    }
    if let Err(e) = self.shutdown() {
      error!(pool_name = %*self.shared.pool_name, "Implicit shutdown on drop failed: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_workers_fails_construction() {
    let result = ThreadPoolManager::new(0, "zero_pool");
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
  }

  #[test]
  fn test_workers_are_named_after_pool() {
    let manager = ThreadPoolManager::new(2, "named_pool").unwrap();
    let mut handle = manager
      .submit(|| thread::current().name().map(str::to_string))
      .unwrap();
    let name = handle.get().unwrap().unwrap();
    assert!(name.starts_with("named_pool-worker-"), "unexpected thread name {}", name);
    manager.shutdown().unwrap();
  }

  #[test]
  fn test_shutdown_from_inside_a_task_does_not_deadlock() {
    let manager = ThreadPoolManager::new(2, "self_shutdown_pool").unwrap();
    let inner = manager.clone();
    let mut handle = manager.submit(move || inner.shutdown()).unwrap();

    assert_eq!(handle.get(), Ok(Ok(())));
    assert!(manager.is_shutting_down());
    assert!(matches!(manager.submit(|| ()), Err(PoolError::PoolShuttingDown)));
    manager.shutdown().unwrap();
    assert_eq!(manager.completed_task_count(), 1);
  }
}
