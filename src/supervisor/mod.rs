//! Worker pool supervision: launch N consumer processes, keep them alive,
//! stop them gracefully.

mod pool;
mod process;

pub use pool::{PoolStatus, RestartCeiling, SupervisorSettings, WorkerPool, WorkerStatus};
pub use process::{CONSUMER_NAME_ENV, ProcessLauncher, WORKER_NAME_ENV};

#[cfg(test)]
use mockall::automock;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to launch {name}: {source}")]
    Launch {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to signal worker {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Worker pool is already running")]
    AlreadyRunning,
}

/// Stable identity of one pool slot; a relaunch reuses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerIdentity {
    pub index: usize,
    /// Display name, `Worker-{i}`.
    pub name: String,
    /// Consumer name inside the consumer group, `worker-{i}`.
    pub consumer_name: String,
}

impl WorkerIdentity {
    /// Identities are 1-based.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            name: format!("Worker-{index}"),
            consumer_name: format!("worker-{index}"),
        }
    }
}

/// Handle to a running worker.
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check. Reaps the process once it exited.
    fn is_alive(&mut self) -> bool;

    /// Ask the worker to stop cooperatively.
    fn terminate(&mut self) -> Result<(), SupervisorError>;

    /// Force the worker down.
    fn kill(&mut self) -> Result<(), SupervisorError>;
}

#[cfg_attr(test, automock)]
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, identity: &WorkerIdentity) -> Result<Box<dyn WorkerProcess>, SupervisorError>;
}
