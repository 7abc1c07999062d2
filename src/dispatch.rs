// src/dispatch.rs
//
// Seam to the alerting collaborators (pub/sub fan-out, alert store). Delivery
// is fire-and-forget from the runner's point of view: a failed dispatch is
// logged and counted, never retried, and never blocks frame processing.

use async_trait::async_trait;
use tracing::info;

use crate::types::AlertEvent;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &AlertEvent) -> anyhow::Result<()>;
}

/// Default sink: structured log output only. Production deployments swap in
/// a transport-backed implementation.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: &AlertEvent) -> anyhow::Result<()> {
        info!(
            stream_id = %alert.stream_id,
            kind = %alert.kind,
            event = alert.event,
            remark = alert.remark.as_deref().unwrap_or(""),
            frame_id = alert.frame.frame_id,
            "🚨 alert"
        );
        Ok(())
    }
}
