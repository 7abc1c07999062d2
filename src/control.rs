// src/control.rs
//
// Live control plane over the stream registry. Requests are serialized: one
// request mutates the registry, persists it, and adjusts running streams
// before the next is looked at. A request that fails validation leaves both
// the registry document and the running streams untouched.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use crate::config::{AnalyticConfig, AnalyticKind, EngineConfig, RegistryDocument, StreamConfig};
use crate::dispatch::AlertSink;
use crate::pipeline::{MetricsSummary, StreamRuntime};
use crate::source::SourceFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    AddDevice,
    DeleteDevice,
    UpdateDevice,
    DeleteAll,
    AddAnalytic,
    DeleteAnalytic,
    UpdateAnalytic,
    GetAll,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ControlResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            data: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            data: None,
        }
    }

    fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Reference to one analytic on one stream, as carried by the analytic
/// mutation actions.
#[derive(Debug, Deserialize)]
struct AnalyticRef {
    id: String,
    #[serde(rename = "type")]
    kind: AnalyticKind,
}

#[derive(Debug, Deserialize)]
struct AnalyticPayload {
    id: String,
    analytic: AnalyticConfig,
}

struct Inner {
    registry: RegistryDocument,
    runtimes: HashMap<String, StreamRuntime>,
}

pub struct ControlPlane {
    engine: EngineConfig,
    factory: Arc<dyn SourceFactory>,
    sink: Arc<dyn AlertSink>,
    inner: Mutex<Inner>,
}

pub type ControlReply = oneshot::Sender<ControlResponse>;
pub type ControlSender = mpsc::Sender<(ControlRequest, ControlReply)>;

impl ControlPlane {
    pub fn new(
        engine: EngineConfig,
        factory: Arc<dyn SourceFactory>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            engine,
            factory,
            sink,
            inner: Mutex::new(Inner {
                registry: RegistryDocument::default(),
                runtimes: HashMap::new(),
            }),
        }
    }

    /// Load the persisted registry and start a runtime per stream.
    pub async fn resume(&self) -> anyhow::Result<usize> {
        let registry = RegistryDocument::load(&self.engine.registry_path)?;
        let mut inner = self.inner.lock().await;
        for stream in &registry.streams {
            let runtime = self.spawn(stream.clone());
            inner.runtimes.insert(stream.id.clone(), runtime);
        }
        let count = registry.streams.len();
        inner.registry = registry;
        if count > 0 {
            info!(streams = count, "resumed persisted streams");
        }
        Ok(count)
    }

    /// Serve requests until the channel closes.
    pub async fn serve(&self, mut rx: mpsc::Receiver<(ControlRequest, ControlReply)>) {
        while let Some((request, reply)) = rx.recv().await {
            let response = self.handle(request).await;
            let _ = reply.send(response);
        }
    }

    /// Stop every running stream and return final metric snapshots.
    pub async fn shutdown(&self) -> HashMap<String, MetricsSummary> {
        let mut inner = self.inner.lock().await;
        let mut snapshots = HashMap::new();
        for (id, runtime) in inner.runtimes.drain() {
            snapshots.insert(id, runtime.metrics.summary());
            runtime.stop().await;
        }
        snapshots
    }

    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        let mut inner = self.inner.lock().await;
        match request.action {
            ControlAction::AddDevice => self.add_device(&mut inner, &request.data).await,
            ControlAction::DeleteDevice => self.delete_device(&mut inner, &request.data).await,
            ControlAction::UpdateDevice => self.update_device(&mut inner, &request.data).await,
            ControlAction::DeleteAll => self.delete_all(&mut inner).await,
            ControlAction::AddAnalytic => self.add_analytic(&mut inner, &request.data).await,
            ControlAction::DeleteAnalytic => self.delete_analytic(&mut inner, &request.data).await,
            ControlAction::UpdateAnalytic => self.update_analytic(&mut inner, &request.data).await,
            ControlAction::GetAll => self.get_all(&inner),
        }
    }

    fn spawn(&self, stream: StreamConfig) -> StreamRuntime {
        StreamRuntime::spawn(
            stream,
            &self.engine,
            self.factory.clone(),
            self.sink.clone(),
        )
    }

    /// Persist the candidate registry, then swap it in and restart the
    /// affected streams. Validation happened before this point.
    async fn commit(
        &self,
        inner: &mut Inner,
        candidate: RegistryDocument,
        restart: &[String],
        remove: &[String],
    ) -> Result<(), ControlResponse> {
        if let Err(e) = candidate.save(&self.engine.registry_path) {
            warn!(error = %e, "registry persist failed, discarding change");
            return Err(ControlResponse::error(format!(
                "failed to persist stream registry: {e}"
            )));
        }

        for id in remove.iter().chain(restart) {
            if let Some(runtime) = inner.runtimes.remove(id) {
                runtime.stop().await;
            }
        }
        for id in restart {
            if let Some(stream) = candidate.streams.iter().find(|s| &s.id == id) {
                let runtime = self.spawn(stream.clone());
                inner.runtimes.insert(id.clone(), runtime);
            }
        }
        inner.registry = candidate;
        Ok(())
    }

    async fn add_device(&self, inner: &mut Inner, data: &[serde_json::Value]) -> ControlResponse {
        let streams: Vec<StreamConfig> = match parse_items(data) {
            Ok(streams) => streams,
            Err(e) => return e,
        };
        let mut candidate = inner.registry.clone();
        let mut added = Vec::new();
        for stream in streams {
            if candidate.streams.iter().any(|s| s.id == stream.id) {
                return ControlResponse::error(format!("device already exists: {}", stream.id));
            }
            added.push(stream.id.clone());
            candidate.streams.push(stream);
        }
        if added.is_empty() {
            return ControlResponse::error("no devices in request");
        }
        if let Err(e) = self.commit(inner, candidate, &added, &[]).await {
            return e;
        }
        info!(devices = ?added, "devices added");
        ControlResponse::success(format!("added {} device(s)", added.len()))
    }

    async fn delete_device(
        &self,
        inner: &mut Inner,
        data: &[serde_json::Value],
    ) -> ControlResponse {
        let ids = match parse_ids(data) {
            Ok(ids) => ids,
            Err(e) => return e,
        };
        let mut candidate = inner.registry.clone();
        for id in &ids {
            let before = candidate.streams.len();
            candidate.streams.retain(|s| &s.id != id);
            if candidate.streams.len() == before {
                return ControlResponse::error(format!("no such device: {id}"));
            }
        }
        if let Err(e) = self.commit(inner, candidate, &[], &ids).await {
            return e;
        }
        info!(devices = ?ids, "devices deleted");
        ControlResponse::success(format!("deleted {} device(s)", ids.len()))
    }

    async fn update_device(
        &self,
        inner: &mut Inner,
        data: &[serde_json::Value],
    ) -> ControlResponse {
        let streams: Vec<StreamConfig> = match parse_items(data) {
            Ok(streams) => streams,
            Err(e) => return e,
        };
        let mut candidate = inner.registry.clone();
        let mut updated = Vec::new();
        for stream in streams {
            let Some(slot) = candidate.streams.iter_mut().find(|s| s.id == stream.id) else {
                return ControlResponse::error(format!("no such device: {}", stream.id));
            };
            updated.push(stream.id.clone());
            *slot = stream;
        }
        if updated.is_empty() {
            return ControlResponse::error("no devices in request");
        }
        if let Err(e) = self.commit(inner, candidate, &updated, &[]).await {
            return e;
        }
        info!(devices = ?updated, "devices updated");
        ControlResponse::success(format!("updated {} device(s)", updated.len()))
    }

    async fn delete_all(&self, inner: &mut Inner) -> ControlResponse {
        let ids: Vec<String> = inner.registry.streams.iter().map(|s| s.id.clone()).collect();
        let candidate = RegistryDocument::default();
        if let Err(e) = self.commit(inner, candidate, &[], &ids).await {
            return e;
        }
        info!("all devices deleted");
        ControlResponse::success("deleted all devices")
    }

    async fn add_analytic(&self, inner: &mut Inner, data: &[serde_json::Value]) -> ControlResponse {
        let payloads: Vec<AnalyticPayload> = match parse_items(data) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let mut candidate = inner.registry.clone();
        let mut touched = Vec::new();
        for payload in payloads {
            let Some(stream) = candidate.streams.iter_mut().find(|s| s.id == payload.id) else {
                return ControlResponse::error(format!("no such device: {}", payload.id));
            };
            if stream.analytics.iter().any(|a| a.kind == payload.analytic.kind) {
                return ControlResponse::error(format!(
                    "analytic already configured on {}: {:?}",
                    payload.id, payload.analytic.kind
                ));
            }
            stream.analytics.push(payload.analytic);
            touched.push(payload.id);
        }
        if touched.is_empty() {
            return ControlResponse::error("no analytics in request");
        }
        if let Err(e) = self.commit(inner, candidate, &touched, &[]).await {
            return e;
        }
        ControlResponse::success("analytic(s) added")
    }

    async fn delete_analytic(
        &self,
        inner: &mut Inner,
        data: &[serde_json::Value],
    ) -> ControlResponse {
        let refs: Vec<AnalyticRef> = match parse_items(data) {
            Ok(r) => r,
            Err(e) => return e,
        };
        let mut candidate = inner.registry.clone();
        let mut touched = Vec::new();
        for r in refs {
            let Some(stream) = candidate.streams.iter_mut().find(|s| s.id == r.id) else {
                return ControlResponse::error(format!("no such device: {}", r.id));
            };
            let before = stream.analytics.len();
            stream.analytics.retain(|a| a.kind != r.kind);
            if stream.analytics.len() == before {
                return ControlResponse::error(format!(
                    "analytic not configured on {}: {:?}",
                    r.id, r.kind
                ));
            }
            touched.push(r.id);
        }
        if touched.is_empty() {
            return ControlResponse::error("no analytics in request");
        }
        if let Err(e) = self.commit(inner, candidate, &touched, &[]).await {
            return e;
        }
        ControlResponse::success("analytic(s) deleted")
    }

    async fn update_analytic(
        &self,
        inner: &mut Inner,
        data: &[serde_json::Value],
    ) -> ControlResponse {
        let payloads: Vec<AnalyticPayload> = match parse_items(data) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let mut candidate = inner.registry.clone();
        let mut touched = Vec::new();
        for payload in payloads {
            let Some(stream) = candidate.streams.iter_mut().find(|s| s.id == payload.id) else {
                return ControlResponse::error(format!("no such device: {}", payload.id));
            };
            let Some(slot) = stream
                .analytics
                .iter_mut()
                .find(|a| a.kind == payload.analytic.kind)
            else {
                return ControlResponse::error(format!(
                    "analytic not configured on {}: {:?}",
                    payload.id, payload.analytic.kind
                ));
            };
            *slot = payload.analytic;
            touched.push(payload.id);
        }
        if touched.is_empty() {
            return ControlResponse::error("no analytics in request");
        }
        if let Err(e) = self.commit(inner, candidate, &touched, &[]).await {
            return e;
        }
        ControlResponse::success("analytic(s) updated")
    }

    fn get_all(&self, inner: &Inner) -> ControlResponse {
        let data = serde_json::to_value(&inner.registry.streams)
            .unwrap_or_else(|_| json!([]));
        ControlResponse::success(format!("{} device(s)", inner.registry.streams.len()))
            .with_data(data)
    }

    /// Snapshot of per-stream counters for every running stream.
    pub async fn metrics_snapshot(&self) -> HashMap<String, MetricsSummary> {
        let inner = self.inner.lock().await;
        inner
            .runtimes
            .iter()
            .map(|(id, rt)| (id.clone(), rt.metrics.summary()))
            .collect()
    }
}

fn parse_items<T: serde::de::DeserializeOwned>(
    data: &[serde_json::Value],
) -> Result<Vec<T>, ControlResponse> {
    data.iter()
        .map(|item| {
            serde_json::from_value(item.clone())
                .map_err(|e| ControlResponse::error(format!("malformed request item: {e}")))
        })
        .collect()
}

/// Accepts both `{"id": "cam-01"}` objects and bare `"cam-01"` strings.
fn parse_ids(data: &[serde_json::Value]) -> Result<Vec<String>, ControlResponse> {
    data.iter()
        .map(|item| match item {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Object(map) => map
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| ControlResponse::error("request item missing id")),
            _ => Err(ControlResponse::error("request item missing id")),
        })
        .collect()
}
