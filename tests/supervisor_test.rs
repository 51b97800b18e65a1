use parking_lot::Mutex;
use rask_log_pipeline::supervisor::{
    RestartCeiling, SupervisorError, SupervisorSettings, WorkerIdentity, WorkerLauncher, WorkerPool,
    WorkerProcess,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Launcher handing out processes whose liveness the test controls.
#[derive(Default)]
struct ScriptedLauncher {
    launches: Mutex<Vec<(String, Arc<AtomicBool>)>>,
    next_pid: AtomicU32,
}

impl ScriptedLauncher {
    fn crash(&self, consumer_name: &str) {
        for (name, alive) in self.launches.lock().iter() {
            if name == consumer_name {
                alive.store(false, Ordering::SeqCst);
            }
        }
    }

    fn launched(&self) -> Vec<String> {
        self.launches.lock().iter().map(|(name, _)| name.clone()).collect()
    }
}

struct ScriptedProcess {
    pid: u32,
    alive: Arc<AtomicBool>,
}

impl WorkerProcess for ScriptedProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn terminate(&mut self) -> Result<(), SupervisorError> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn kill(&mut self) -> Result<(), SupervisorError> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl WorkerLauncher for ScriptedLauncher {
    fn launch(&self, identity: &WorkerIdentity) -> Result<Box<dyn WorkerProcess>, SupervisorError> {
        let alive = Arc::new(AtomicBool::new(true));
        self.launches
            .lock()
            .push((identity.consumer_name.clone(), alive.clone()));
        Ok(Box::new(ScriptedProcess {
            pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            alive,
        }))
    }
}

fn settings(workers: usize) -> SupervisorSettings {
    SupervisorSettings {
        num_workers: workers,
        check_interval: Duration::from_millis(10),
        stop_grace: Duration::from_millis(200),
        restart_ceiling: Some(RestartCeiling {
            max_restarts: 1,
            window: Duration::from_secs(60),
        }),
    }
}

#[test]
fn test_pool_starts_named_workers() {
    let launcher = Arc::new(ScriptedLauncher::default());
    let pool = WorkerPool::new(launcher.clone(), settings(3));

    pool.start().unwrap();
    let status = pool.status();

    assert_eq!(status.total, 3);
    assert_eq!(status.running, 3);
    let names: Vec<&str> = status.workers.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["Worker-1", "Worker-2", "Worker-3"]);
    assert_eq!(launcher.launched(), vec!["worker-1", "worker-2", "worker-3"]);
    assert!(matches!(pool.start(), Err(SupervisorError::AlreadyRunning)));
}

#[test]
fn test_restart_ceiling_only_alerts() {
    let launcher = Arc::new(ScriptedLauncher::default());
    let pool = WorkerPool::new(launcher.clone(), settings(1));
    pool.start().unwrap();

    for _ in 0..3 {
        launcher.crash("worker-1");
        assert_eq!(pool.check_workers(), 1);
    }

    let status = pool.status();
    assert_eq!(status.running, 1);
    assert_eq!(status.workers[0].restarts, 3);
    assert_eq!(launcher.launched().len(), 4);
}

#[tokio::test]
async fn test_supervision_heals_crashed_worker_with_same_identity() {
    let launcher = Arc::new(ScriptedLauncher::default());
    let pool = Arc::new(WorkerPool::new(launcher.clone(), settings(2)));
    pool.start().unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        async move { pool.supervise(shutdown).await }
    });

    launcher.crash("worker-2");
    for _ in 0..100 {
        if launcher.launched().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(launcher.launched(), vec!["worker-1", "worker-2", "worker-2"]);
    assert_eq!(pool.status().running, 2);

    shutdown.cancel();
    task.await.unwrap();
    assert_eq!(pool.status().total, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_real_processes_are_stopped_gracefully() {
    use rask_log_pipeline::supervisor::ProcessLauncher;

    let launcher = ProcessLauncher::new("sleep", ["30"]);
    let pool = WorkerPool::new(Arc::new(launcher), settings(2));

    pool.start().unwrap();
    let status = pool.status();
    assert_eq!(status.running, 2);
    assert!(status.workers.iter().all(|w| w.pid.is_some()));

    pool.stop().await;

    assert_eq!(pool.status().total, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_exited_process_is_relaunched() {
    use rask_log_pipeline::supervisor::ProcessLauncher;

    let launcher = ProcessLauncher::new("true", std::iter::empty::<&str>());
    let pool = WorkerPool::new(Arc::new(launcher), settings(1));
    pool.start().unwrap();

    let mut relaunched = 0;
    for _ in 0..100 {
        relaunched += pool.check_workers();
        if relaunched > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(relaunched > 0);
    assert_eq!(pool.status().workers[0].name, "Worker-1");
    pool.stop().await;
}
