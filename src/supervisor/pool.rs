use super::{SupervisorError, WorkerIdentity, WorkerLauncher, WorkerProcess};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Restarts above `max_restarts` within `window` raise an error-level alert.
/// Restarting continues regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartCeiling {
    pub max_restarts: usize,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub num_workers: usize,
    pub check_interval: Duration,
    pub stop_grace: Duration,
    pub restart_ceiling: Option<RestartCeiling>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            num_workers: 3,
            check_interval: Duration::from_secs(5),
            stop_grace: Duration::from_secs(5),
            restart_ceiling: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub consumer_name: String,
    pub pid: Option<u32>,
    pub alive: bool,
    pub restarts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub running: usize,
    pub workers: Vec<WorkerStatus>,
}

struct WorkerSlot {
    identity: WorkerIdentity,
    process: Option<Box<dyn WorkerProcess>>,
    restarts: u32,
}

impl WorkerSlot {
    fn is_alive(&mut self) -> bool {
        self.process.as_mut().is_some_and(|p| p.is_alive())
    }
}

/// Supervisor owning one slot per worker identity.
pub struct WorkerPool {
    launcher: Arc<dyn WorkerLauncher>,
    settings: SupervisorSettings,
    slots: Mutex<Vec<WorkerSlot>>,
    recent_restarts: Mutex<VecDeque<Instant>>,
}

impl WorkerPool {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, settings: SupervisorSettings) -> Self {
        Self {
            launcher,
            settings,
            slots: Mutex::new(Vec::new()),
            recent_restarts: Mutex::new(VecDeque::new()),
        }
    }

    /// Launch every worker. Fails fast if any launch fails, leaving the
    /// already started ones to `stop()`.
    pub fn start(&self) -> Result<(), SupervisorError> {
        let mut slots = self.slots.lock();
        if !slots.is_empty() {
            return Err(SupervisorError::AlreadyRunning);
        }

        info!("Starting {} workers", self.settings.num_workers);
        for index in 1..=self.settings.num_workers {
            let identity = WorkerIdentity::new(index);
            let process = self.launcher.launch(&identity)?;
            info!("Started {} (pid {:?})", identity.name, process.pid());
            slots.push(WorkerSlot {
                identity,
                process: Some(process),
                restarts: 0,
            });
        }
        Ok(())
    }

    /// One supervision pass: relaunch every dead worker under its identity.
    /// Returns how many were relaunched.
    pub fn check_workers(&self) -> usize {
        let mut relaunched = 0;
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.is_alive() {
                continue;
            }
            warn!("{} is not running, restarting", slot.identity.name);
            // Drop the dead handle before creating its replacement.
            slot.process = None;

            match self.launcher.launch(&slot.identity) {
                Ok(process) => {
                    info!("Restarted {} (pid {:?})", slot.identity.name, process.pid());
                    slot.process = Some(process);
                    slot.restarts += 1;
                    relaunched += 1;
                    self.record_restart();
                }
                Err(e) => error!("Failed to restart {}: {}", slot.identity.name, e),
            }
        }
        relaunched
    }

    fn record_restart(&self) {
        let Some(ceiling) = self.settings.restart_ceiling else {
            return;
        };
        let now = Instant::now();
        let mut recent = self.recent_restarts.lock();
        recent.push_back(now);
        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) > ceiling.window)
        {
            recent.pop_front();
        }
        if recent.len() > ceiling.max_restarts {
            error!(
                restarts = recent.len(),
                window_secs = ceiling.window.as_secs(),
                "Worker restart rate above ceiling; workers may be failing systemically"
            );
        }
    }

    pub fn status(&self) -> PoolStatus {
        let mut slots = self.slots.lock();
        let workers: Vec<WorkerStatus> = slots
            .iter_mut()
            .map(|slot| {
                let alive = slot.is_alive();
                WorkerStatus {
                    name: slot.identity.name.clone(),
                    consumer_name: slot.identity.consumer_name.clone(),
                    pid: slot.process.as_ref().and_then(|p| p.pid()),
                    alive,
                    restarts: slot.restarts,
                }
            })
            .collect();
        PoolStatus {
            total: workers.len(),
            running: workers.iter().filter(|w| w.alive).count(),
            workers,
        }
    }

    /// Supervise until `shutdown` fires, then stop every worker.
    pub async fn supervise(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.check_workers();
                }
            }
        }

        self.stop().await;
    }

    /// Signal all workers, wait up to the grace period, then kill survivors.
    pub async fn stop(&self) {
        info!("Stopping worker pool");
        {
            let mut slots = self.slots.lock();
            for slot in slots.iter_mut() {
                if let Some(process) = slot.process.as_mut() {
                    if let Err(e) = process.terminate() {
                        warn!("Could not signal {}: {}", slot.identity.name, e);
                    }
                }
            }
        }

        let deadline = Instant::now() + self.settings.stop_grace;
        while Instant::now() < deadline && self.status().running > 0 {
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.is_alive() {
                warn!("{} did not stop in time, killing it", slot.identity.name);
                if let Some(process) = slot.process.as_mut() {
                    if let Err(e) = process.kill() {
                        error!("Failed to kill {}: {}", slot.identity.name, e);
                    }
                }
            }
        }
        slots.clear();
        info!("Worker pool stopped");
    }
}
