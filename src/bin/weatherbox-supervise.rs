use anyhow::Result;
use tracing::{info, warn};

use weatherbox_models::RuntimeConfig;
use weatherbox_supervisor::{RestartPolicy, Supervisor};

/// Container entry point: construct the runtime configuration from the
/// environment once, then supervise the application in the foreground. The
/// container stays up exactly as long as this process does.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = RuntimeConfig::from_env()?;
    info!("Runtime configuration: {:?}", config);

    let supervisor = Supervisor::new(config);
    let handle = supervisor.handle();

    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Termination signal received");
        handle.shutdown();
    });

    supervisor.run(RestartPolicy::default()).await?;
    info!("Supervisor stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Unable to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
