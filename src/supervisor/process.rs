use super::{SupervisorError, WorkerIdentity, WorkerLauncher, WorkerProcess};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use tokio::process::{Child, Command};
use tracing::debug;

/// Environment variable carrying the consumer identity to a worker.
pub const CONSUMER_NAME_ENV: &str = "CONSUMER_NAME";
pub const WORKER_NAME_ENV: &str = "WORKER_NAME";

/// Launches workers as child processes of `program`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Re-run the current executable with `args`.
    pub fn current_exe(args: impl IntoIterator<Item = impl Into<OsString>>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, identity: &WorkerIdentity) -> Result<Box<dyn WorkerProcess>, SupervisorError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(CONSUMER_NAME_ENV, &identity.consumer_name)
            .env(WORKER_NAME_ENV, &identity.name)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                name: identity.name.clone(),
                source,
            })?;
        debug!("Spawned {} with pid {:?}", identity.name, child.id());
        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

impl WorkerProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Sends SIGTERM through `kill` without waiting on it.
    #[cfg(unix)]
    fn terminate(&mut self) -> Result<(), SupervisorError> {
        let Some(pid) = self.pid() else {
            return Ok(());
        };
        Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .spawn()
            .map(drop)
            .map_err(|source| SupervisorError::Signal { pid, source })
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<(), SupervisorError> {
        self.kill()
    }

    fn kill(&mut self) -> Result<(), SupervisorError> {
        let pid = self.pid().unwrap_or_default();
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already exited and reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(source) => Err(SupervisorError::Signal { pid, source }),
        }
    }
}
