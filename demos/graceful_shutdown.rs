use std::thread;
use std::time::Duration;
use thread_orchestra::{TaskHandle, ThreadPoolManager};
use tracing::info;

fn work_task_fn(id: usize, duration_ms: u64) -> String {
  info!("Task {} starting (will run for {}ms)", id, duration_ms);
  thread::sleep(Duration::from_millis(duration_ms));
  let result = format!("Task {} finished after {}ms", id, duration_ms);
  info!("{}", result);
  result
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Shutdown Example ---");

  let manager = ThreadPoolManager::new(2, "graceful_shutdown_pool").expect("Failed to start pool");

  let mut handles: Vec<TaskHandle<String>> = Vec::new();

  // Submit 5 tasks, each takes 1 second.
  // With 2 workers: tasks 0, 1 start; tasks 2, 3, 4 are queued.
  for i in 0..5 {
    match manager.submit(move || work_task_fn(i, 1000)) {
      Ok(handle) => {
        info!("Submitted task {} (handle id {})", i, handle.id());
        handles.push(handle);
      }
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }

  thread::sleep(Duration::from_millis(100)); // Let some tasks start
  info!(
    "All 5 tasks submitted. Queue size: {}, Active: {}",
    manager.queued_task_count(),
    manager.active_task_count()
  );

  let manager_for_shutdown = manager.clone();
  let shutdown_jh = thread::spawn(move || {
    info!("Calling pool.shutdown()...");
    manager_for_shutdown.shutdown().expect("Graceful shutdown failed");
    info!("Pool shutdown call completed.");
  });

  // Try submitting another task after shutdown initiated (should fail)
  while !manager.is_shutting_down() {
    thread::yield_now();
  }
  info!("Attempting to submit task after shutdown initiated...");
  match manager.submit(|| work_task_fn(99, 100)) {
    Ok(_) => tracing::error!("LATE SUBMISSION SUCCEEDED (UNEXPECTED!)"),
    Err(e) => info!("Late submission correctly failed: {}", e),
  }

  info!("Collecting results. Queued tasks are drained, so every task completes.");
  for mut handle in handles {
    let task_id = handle.id();
    match handle.get() {
      Ok(result) => info!("Task {} result: {}", task_id, result),
      Err(e) => tracing::error!("Task {} error: {:?}", task_id, e),
    }
  }

  shutdown_jh.join().expect("Shutdown thread panicked");
  info!("--- Graceful Shutdown Example End ---");
}
