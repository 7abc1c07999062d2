// src/main.rs

mod analytics;
mod config;
mod control;
mod dispatch;
mod geometry;
mod pipeline;
mod source;
mod tracker;
mod types;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use config::EngineConfig;
use control::{ControlPlane, ControlRequest, ControlSender};
use dispatch::LogSink;
use source::JsonlSourceFactory;

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        EngineConfig::load(&config_path)?
    } else {
        EngineConfig::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("vigil={}", config.logging.level))
        .init();

    info!("📹 Video Analytics Engine Starting");

    // One worker per monitored stream plus headroom for the control plane
    // and dispatch, sized from the persisted registry.
    let registry = config::RegistryDocument::load(&config.registry_path)?;
    let workers = (registry.streams.len() + config.runtime.worker_headroom).max(2);
    info!(
        streams = registry.streams.len(),
        workers, "building runtime"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: EngineConfig) -> Result<()> {
    let plane = Arc::new(ControlPlane::new(
        config,
        Arc::new(JsonlSourceFactory),
        Arc::new(LogSink),
    ));

    let resumed = plane.resume().await?;
    info!(streams = resumed, "✓ Engine ready");

    let (tx, rx) = mpsc::channel(16);
    let serve_plane = plane.clone();
    let server = tokio::spawn(async move { serve_plane.serve(rx).await });
    let stdin_pump = tokio::spawn(pump_stdin(tx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    stdin_pump.abort();
    server.abort();
    let snapshots = plane.shutdown().await;
    for (stream_id, summary) in snapshots {
        info!(
            stream_id = %stream_id,
            frames = summary.frames_processed,
            alerts = summary.alerts_emitted,
            "final stream counters"
        );
    }
    info!("engine stopped");
    Ok(())
}

/// Control transport: one JSON request per stdin line, one JSON response per
/// stdout line.
async fn pump_stdin(tx: ControlSender) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("control input closed");
                return;
            }
            Err(e) => {
                error!(error = %e, "control input failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: ControlRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed control request");
                println!(
                    r#"{{"status":"error","message":"malformed request: {}"}}"#,
                    e.to_string().replace('"', "'")
                );
                continue;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send((request, reply_tx)).await.is_err() {
            return;
        }
        match reply_rx.await {
            Ok(response) => match serde_json::to_string(&response) {
                Ok(encoded) => println!("{encoded}"),
                Err(e) => error!(error = %e, "cannot encode control response"),
            },
            Err(_) => warn!("control request dropped during shutdown"),
        }
    }
}
