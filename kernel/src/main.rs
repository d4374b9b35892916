//! Keel kernel binary entry point.

use anyhow::Context;
use keel_kernel::host::KeelHost;
use keel_kernel::infrastructure::{audit, config::Settings, server, telemetry::TelemetryBuilder};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Settings::new().context("Failed to load configuration")?;

    TelemetryBuilder::from_settings(&config.telemetry)
        .init()
        .context("Failed to initialize telemetry")?;
    let metrics = server::install_metrics()?;

    info!("Keel Kernel Starting...");
    audit::log_audit(&audit::AuditEvent::SystemStartup {
        component: "Kernel".into(),
    });

    let host = KeelHost::connect(&config.database, &config.orchestration).await?;
    let recovery = host.recover().await?;
    info!(
        decisions_restored = recovery.decisions_restored,
        reconciled = recovery.reconcile.is_some(),
        "Startup recovery complete"
    );

    let pool = host.pool().clone();
    let server_config = config.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_config, pool, metrics).await {
            error!("Control Plane failed: {:?}", e);
        }
    });

    info!("Keel Kernel Initialized. Waiting for shutdown signal...");

    shutdown_signal().await;

    info!("Shutdown signal received, cleaning up...");
    audit::log_audit(&audit::AuditEvent::SystemShutdown {
        reason: "Signal received".into(),
    });
    host.pool().close().await;

    info!("Keel Kernel Shutdown Complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
