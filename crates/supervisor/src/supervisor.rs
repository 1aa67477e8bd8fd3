use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, instrument, warn};

use weatherbox_models::{RuntimeConfig, SupervisorError};

use crate::policy::{Backoff, RestartPolicy};

/// Lifecycle of the supervised application process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Exited,
    Restarting,
}

const TERM_GRACE: Duration = Duration::from_secs(10);
const PROBE_WINDOW: Duration = Duration::from_secs(30);
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Runs exactly one supervised child: the application entry script under the
/// image's interpreter. Stays in the foreground for the life of the
/// container; on child exit it logs the status and restarts per policy, so
/// the service is never silently down while the container keeps running.
pub struct Supervisor {
    config: RuntimeConfig,
    restart_count: Arc<AtomicU64>,
    state_tx: watch::Sender<SupervisorState>,
    shutdown_tx: watch::Sender<bool>,
}

/// Observation and control surface: restart counter, current state, and a
/// shutdown trigger. Cheap to clone out of the supervisor before `run`.
pub struct SupervisorHandle {
    restart_count: Arc<AtomicU64>,
    state_rx: watch::Receiver<SupervisorState>,
    shutdown_tx: watch::Sender<bool>,
}

impl SupervisorHandle {
    pub fn restart_count(&self) -> u64 {
        self.restart_count.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_rx.borrow()
    }

    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Supervisor {
    pub fn new(config: RuntimeConfig) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Stopped);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            restart_count: Arc::new(AtomicU64::new(0)),
            state_tx,
            shutdown_tx,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            restart_count: self.restart_count.clone(),
            state_rx: self.state_tx.subscribe(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    #[instrument(skip(self, policy))]
    pub async fn run(&self, policy: RestartPolicy) -> Result<(), SupervisorError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut backoff = Backoff::new(policy);

        info!(
            "Supervising {} {} (listen {}:{})",
            self.config.interpreter_path().display(),
            self.config.entry_script_path().display(),
            self.config.listen_host,
            self.config.listen_port
        );

        loop {
            if *shutdown_rx.borrow() {
                self.set_state(SupervisorState::Stopped);
                return Ok(());
            }

            self.set_state(SupervisorState::Starting);
            let mut child = self.spawn_child()?;
            let started = Instant::now();
            info!("Child started (pid {:?})", child.id());
            self.set_state(SupervisorState::Running);

            let probe = tokio::spawn(probe_ready(
                self.config.listen_host.clone(),
                self.config.listen_port,
            ));

            let exit = tokio::select! {
                status = child.wait() => Some(status),
                _ = shutdown_rx.changed() => None,
            };
            probe.abort();

            let Some(status) = exit else {
                info!("Shutdown requested, terminating child");
                self.terminate(&mut child).await;
                self.set_state(SupervisorState::Stopped);
                return Ok(());
            };

            let uptime = started.elapsed();
            match status {
                Ok(status) => warn!(
                    "Child exited after {:.1}s: {}",
                    uptime.as_secs_f64(),
                    describe_exit(&status)
                ),
                Err(e) => error!("Failed waiting on child: {}", e),
            }
            self.set_state(SupervisorState::Exited);

            let delay = backoff.record_exit(uptime);
            let attempt = self.restart_count.fetch_add(1, Ordering::SeqCst) + 1;
            info!("Restart #{} in {:.1}s", attempt, delay.as_secs_f64());
            self.set_state(SupervisorState::Restarting);

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    info!("Shutdown requested during backoff");
                    self.set_state(SupervisorState::Stopped);
                    return Ok(());
                }
            }
        }
    }

    fn spawn_child(&self) -> Result<Child, SupervisorError> {
        let interpreter = self.config.interpreter_path();
        let entry = self.config.entry_script_path();

        let mut command = Command::new(&interpreter);
        command
            .arg(&entry)
            .current_dir(&self.config.app_root)
            .kill_on_drop(true);
        for (key, value) in child_env(&self.config) {
            command.env(key, value);
        }

        command.spawn().map_err(|e| SupervisorError::SpawnFailed {
            reason: format!("{} {}: {}", interpreter.display(), entry.display(), e),
        })
    }

    async fn terminate(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            let _ = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await;
            match timeout(TERM_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    info!("Child stopped: {}", describe_exit(&status));
                    return;
                }
                Ok(Err(e)) => error!("Failed waiting on child: {}", e),
                Err(_) => warn!("Child ignored TERM after {:?}", TERM_GRACE),
            }
        }
        if let Err(e) = child.kill().await {
            error!("Failed to kill child: {}", e);
        }
    }

    fn set_state(&self, state: SupervisorState) {
        self.state_tx.send_replace(state);
    }
}

/// Environment handed to the child process. The supervisor is the only thing
/// that reads the container environment; the child gets this explicit set.
pub fn child_env(config: &RuntimeConfig) -> Vec<(String, String)> {
    let mut env = vec![
        ("APP_ROOT".to_string(), config.app_root.display().to_string()),
        ("APP_LISTEN_HOST".to_string(), config.listen_host.clone()),
        ("APP_LISTEN_PORT".to_string(), config.listen_port.to_string()),
        ("APP_GEO_DB".to_string(), config.geo_db.display().to_string()),
        (
            "APP_CACHE_DIR".to_string(),
            config.cache_dir.display().to_string(),
        ),
        (
            "APP_LOG_DIR".to_string(),
            config.log_dir.display().to_string(),
        ),
    ];
    if let Some(helper) = &config.helper_bin {
        env.push((
            "APP_HELPER_BIN".to_string(),
            helper.display().to_string(),
        ));
    }
    for (name, value) in &config.api_keys {
        env.push((format!("APP_KEY_{}", name.to_uppercase()), value.clone()));
    }

    // The venv's executables shadow system ones for the child.
    let venv_bin = config.app_root.join("venv/bin");
    let path = match std::env::var("PATH") {
        Ok(current) => format!("{}:{}", venv_bin.display(), current),
        Err(_) => venv_bin.display().to_string(),
    };
    env.push(("PATH".to_string(), path));
    env
}

fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }
    "unknown exit status".to_string()
}

/// Log-only readiness probe: report when the child starts accepting TCP
/// connections, or that it never did within the window. Failure here is not
/// fatal — the child owns its own listening behavior.
async fn probe_ready(host: String, port: u16) {
    let deadline = Instant::now() + PROBE_WINDOW;
    loop {
        match TcpStream::connect((host.as_str(), port)).await {
            Ok(_) => {
                info!("Child accepting connections on {}:{}", host, port);
                return;
            }
            Err(e) => {
                if Instant::now() >= deadline {
                    warn!(
                        "Child not accepting connections on {}:{} within {:?}: {}",
                        host, port, PROBE_WINDOW, e
                    );
                    return;
                }
                sleep(PROBE_INTERVAL).await;
            }
        }
    }
}
