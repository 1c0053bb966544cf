//! A fixed-size pool of OS worker threads with a FIFO task queue, one-shot
//! result handles, and graceful, idempotent shutdown.

mod config;
mod error;
mod handle;
mod manager;
mod task;
mod task_queue;
mod worker;

pub use config::PoolConfig;
pub use error::PoolError;
pub use handle::TaskHandle;
pub use manager::ThreadPoolManager;
