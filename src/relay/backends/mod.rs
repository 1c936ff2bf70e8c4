// Upload backends

pub mod process;
pub mod worker;

pub use process::ProcessExecutor;
pub use worker::{run_job, LocalTaskQueue, WorkerPolicy};
