//! Run command - build the pipeline graph and run it until interrupted

use std::path::Path;

use anyhow::{Context, Result};
use conduit_config::Config;
use conduit_pipeline::{PipelineGraph, PluginRegistries};
use tokio::signal;
use tracing::{error, info};

/// Run the pipelines of the configuration at `path`
pub async fn run(path: &Path) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        config = %path.display(),
        "conduit starting"
    );

    let config = Config::from_file(path).context("failed to load configuration")?;
    let graph = PipelineGraph::from_config(&config, &PluginRegistries::with_defaults())
        .context("failed to build pipelines")?;

    if let Err(e) = graph.start().await {
        error!(error = %e, "startup failed");
        return Err(e.into());
    }

    let failure = tokio::select! {
        _ = wait_for_shutdown() => {
            info!("shutdown requested");
            None
        }
        err = graph.failed() => {
            error!(error = %err, "pipelines stopped after a fatal failure");
            Some(err)
        }
    };

    graph.stop().await;
    for (name, m) in graph.metrics() {
        info!(
            pipeline = %name,
            records_read = m.records_read,
            records_written = m.records_written,
            records_dropped = m.records_dropped,
            sink_failures = m.sink_failures,
            "final pipeline metrics"
        );
    }

    if let Some(err) = failure {
        return Err(err.into());
    }
    info!("conduit shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
