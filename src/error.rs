use thiserror::Error;

/// Errors that can occur within the `thread_orchestra` pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Invalid pool configuration: {0}")]
  InvalidConfig(String),

  #[error("Failed to spawn worker thread: {0}")]
  WorkerSpawnFailed(String),

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,

  #[error("Submitted task panicked: {0}")]
  TaskPanicked(String),

  #[error("Task result already taken")]
  ResultUnavailable,

  #[error("Task result channel error (task was dropped before delivering a result): {0}")]
  ResultChannelError(String),

  #[error("{0} worker thread(s) terminated abnormally")]
  WorkerJoinFailed(usize),
}
