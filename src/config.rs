use crate::error::PoolError;

use std::thread;

const DEFAULT_POOL_NAME: &str = "thread_pool";

/// Construction parameters for a `ThreadPoolManager`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  /// Number of worker threads. Must be at least 1.
  pub worker_count: usize,
  /// Used in log fields and as the worker thread name prefix.
  pub pool_name: String,
  /// Stack size for each worker thread; `None` keeps the platform default.
  pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      worker_count: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
      pool_name: DEFAULT_POOL_NAME.to_string(),
      stack_size: None,
    }
  }
}

impl PoolConfig {
  pub fn new(worker_count: usize) -> Self {
    Self {
      worker_count,
      ..Self::default()
    }
  }

  pub fn with_pool_name(mut self, pool_name: &str) -> Self {
    self.pool_name = pool_name.to_string();
    self
  }

  pub fn with_stack_size(mut self, stack_size: usize) -> Self {
    self.stack_size = Some(stack_size);
    self
  }

  /// Checks the configuration, filling in the default name if it is blank.
  pub fn validate(mut self) -> Result<Self, PoolError> {
    if self.worker_count == 0 {
      return Err(PoolError::InvalidConfig(
        "worker_count must be at least 1".to_string(),
      ));
    }
    if self.stack_size == Some(0) {
      return Err(PoolError::InvalidConfig("stack_size must be non-zero".to_string()));
    }
    if self.pool_name.trim().is_empty() {
      self.pool_name = DEFAULT_POOL_NAME.to_string();
    }
    Ok(self)
  }

  pub(crate) fn worker_thread_name(&self, index: usize) -> String {
    format!("{}-worker-{}", self.pool_name, index)
  }
}
