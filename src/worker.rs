use crate::task::{discard_panic_payload, panic_message, ManagedTask};
use crate::task_queue::TaskQueue;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, info_span, trace};

/// State shared by the manager and every worker thread.
#[derive(Debug)]
pub(crate) struct PoolShared {
  pub(crate) pool_name: Arc<String>,
  pub(crate) queue: TaskQueue,
  /// In-flight task id -> index of the worker executing it.
  pub(crate) active_tasks: DashMap<u64, usize>,
  pub(crate) completed_tasks: AtomicU64,
  pub(crate) panicked_tasks: AtomicU64,
}

impl PoolShared {
  pub(crate) fn new(pool_name: &str) -> Self {
    Self {
      pool_name: Arc::new(pool_name.to_string()),
      queue: TaskQueue::new(),
      active_tasks: DashMap::new(),
      completed_tasks: AtomicU64::new(0),
      panicked_tasks: AtomicU64::new(0),
    }
  }
}

/// One long-lived execution context of the pool.
///
/// Runs on its own OS thread: claims tasks from the shared queue one at a time
/// until the queue is closed and drained.
pub(crate) struct Worker {
  index: usize,
  shared: Arc<PoolShared>,
}

impl Worker {
  pub(crate) fn new(index: usize, shared: Arc<PoolShared>) -> Self {
    Self { index, shared }
  }

  pub(crate) fn run(self) {
    let span = info_span!("pool_worker", pool_name = %*self.shared.pool_name, worker = self.index);
    let _entered = span.enter();
    debug!("Worker started.");

    while let Some(task) = self.shared.queue.pop_or_wait() {
      self.execute(task);
    }

    debug!("Task queue closed and drained. Worker terminating.");
  }

  fn execute(&self, task: ManagedTask) {
    let ManagedTask { task_id, job } = task;
    self.shared.active_tasks.insert(task_id, self.index);
    trace!(%task_id, "Executing task.");

    match panic::catch_unwind(AssertUnwindSafe(job)) {
      Ok(()) => {
        trace!(%task_id, "Task executed successfully.");
      }
      Err(panic_payload) => {
        self.shared.panicked_tasks.fetch_add(1, AtomicOrdering::Relaxed);
        error!(
          %task_id,
          panic = %panic_message(&*panic_payload),
          "Task panicked during execution."
        );
        discard_panic_payload(panic_payload);
      }
    }

    self.shared.active_tasks.remove(&task_id);
    self.shared.completed_tasks.fetch_add(1, AtomicOrdering::Relaxed);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::thread;

  #[test]
  fn test_worker_drains_queue_then_exits() {
    let shared = Arc::new(PoolShared::new("worker_test"));
    let executed = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
      let executed = executed.clone();
      shared
        .queue
        .push(ManagedTask::detached(move || {
          executed.fetch_add(1, AtomicOrdering::SeqCst);
        }))
        .unwrap();
    }
    shared.queue.close();

    let worker = Worker::new(0, shared.clone());
    thread::spawn(move || worker.run()).join().unwrap();

    assert_eq!(executed.load(AtomicOrdering::SeqCst), 10);
    assert_eq!(shared.completed_tasks.load(AtomicOrdering::SeqCst), 10);
    assert!(shared.active_tasks.is_empty());
  }

  #[test]
  fn test_worker_survives_panicking_task() {
    let shared = Arc::new(PoolShared::new("worker_panic_test"));
    let executed = Arc::new(AtomicUsize::new(0));

    shared
      .queue
      .push(ManagedTask::detached(|| panic!("task failure")))
      .unwrap();
    {
      let executed = executed.clone();
      shared
        .queue
        .push(ManagedTask::detached(move || {
          executed.fetch_add(1, AtomicOrdering::SeqCst);
        }))
        .unwrap();
    }
    shared.queue.close();

    let worker = Worker::new(0, shared.clone());
    thread::spawn(move || worker.run())
      .join()
      .expect("Worker thread must not die from a task panic");

    assert_eq!(executed.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(shared.panicked_tasks.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(shared.completed_tasks.load(AtomicOrdering::SeqCst), 2);
  }

  struct PanicOnDrop;

  impl Drop for PanicOnDrop {
    fn drop(&mut self) {
      panic!("panic payload dropped");
    }
  }

  #[test]
  fn test_worker_survives_payload_that_panics_on_drop() {
    let shared = Arc::new(PoolShared::new("worker_payload_drop_test"));
    let executed = Arc::new(AtomicUsize::new(0));

    shared
      .queue
      .push(ManagedTask::detached(|| panic::panic_any(PanicOnDrop)))
      .unwrap();
    let (submitted, mut handle) = ManagedTask::with_result(|| -> u32 { panic::panic_any(PanicOnDrop) });
    shared.queue.push(submitted).unwrap();
    {
      let executed = executed.clone();
      shared
        .queue
        .push(ManagedTask::detached(move || {
          executed.fetch_add(1, AtomicOrdering::SeqCst);
        }))
        .unwrap();
    }
    shared.queue.close();

    let worker = Worker::new(0, shared.clone());
    thread::spawn(move || worker.run())
      .join()
      .expect("Worker thread must survive a panic payload whose Drop panics");

    assert_eq!(executed.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(shared.panicked_tasks.load(AtomicOrdering::SeqCst), 2);
    assert_eq!(shared.completed_tasks.load(AtomicOrdering::SeqCst), 3);
    assert_eq!(handle.get(), Err(crate::error::PoolError::TaskPanicked("Unknown panic".to_string())));
  }

  #[test]
  fn test_active_task_is_tracked_while_running() {
    let shared = Arc::new(PoolShared::new("worker_active_test"));
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

    let task = ManagedTask::detached(move || {
      started_tx.send(()).unwrap();
      release_rx.recv().unwrap();
    });
    let task_id = task.task_id;
    shared.queue.push(task).unwrap();

    let worker = Worker::new(3, shared.clone());
    let join = thread::spawn(move || worker.run());

    started_rx.recv().unwrap();
    assert_eq!(shared.active_tasks.get(&task_id).map(|entry| *entry), Some(3));

    release_tx.send(()).unwrap();
    shared.queue.close();
    join.join().unwrap();
    assert!(shared.active_tasks.is_empty());
  }
}
