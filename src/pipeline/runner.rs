// src/pipeline/runner.rs
//
// One runtime per monitored stream. The task owns the evaluator set and the
// alert bus; each evaluator carries its own tracker, so identities and track
// histories are never shared between analytics or streams. Lifecycle:
// Stopped -> Starting -> Running -> Stopping -> Stopped. A stop request
// drains the in-flight frame within a bounded window, after which the task is
// aborted.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::analytics::{build_evaluators, Evaluator, FrameContext, TrackedPerson};
use crate::config::{EngineConfig, StreamConfig, TrackerConfig};
use crate::dispatch::AlertSink;
use crate::pipeline::{AlertBus, StreamMetrics};
use crate::source::{SourceError, SourceFactory};
use crate::tracker::TrackStore;
use crate::types::{AlertKind, BBox, FrameObservations, FrameRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl StreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Handle to a running stream task.
pub struct StreamRuntime {
    stream_id: String,
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    drain_timeout: Duration,
    pub metrics: StreamMetrics,
}

impl StreamRuntime {
    pub fn spawn(
        stream: StreamConfig,
        engine: &EngineConfig,
        factory: Arc<dyn SourceFactory>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(StreamState::Starting as u8));
        let metrics = StreamMetrics::new();
        let stream_id = stream.id.clone();

        let worker = StreamWorker {
            stream,
            tracker_config: engine.tracker.clone(),
            cooldown_secs: engine.alerts.cooldown_secs,
            max_pending: engine.alerts.max_pending,
            frame_wait: Duration::from_millis(engine.runtime.frame_wait_ms),
            retry_pause: Duration::from_millis(engine.runtime.retry_pause_ms),
            factory,
            sink,
            stop: stop.clone(),
            state: state.clone(),
            metrics: metrics.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            stream_id,
            handle,
            stop,
            state,
            drain_timeout: Duration::from_millis(engine.runtime.drain_timeout_ms),
            metrics,
        }
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Request a stop and wait for the task to drain. A task that does not
    /// drain within the window is aborted.
    pub async fn stop(self) {
        self.state
            .store(StreamState::Stopping as u8, Ordering::Release);
        self.stop.store(true, Ordering::Release);
        let abort = self.handle.abort_handle();
        match timeout(self.drain_timeout, self.handle).await {
            Ok(_) => info!(stream_id = %self.stream_id, "stream stopped"),
            Err(_) => {
                warn!(
                    stream_id = %self.stream_id,
                    "stream did not drain in time, aborting task"
                );
                abort.abort();
            }
        }
        self.state
            .store(StreamState::Stopped as u8, Ordering::Release);
    }
}

/// One analytic with its own tracking domain. Track ids are meaningful only
/// within the owning evaluator.
struct EvaluatorSlot {
    evaluator: Box<dyn Evaluator>,
    tracker: TrackStore,
}

fn build_slots(
    stream: &StreamConfig,
    tracker_config: &TrackerConfig,
    cooldown_secs: f64,
) -> Vec<EvaluatorSlot> {
    build_evaluators(stream, cooldown_secs)
        .into_iter()
        .map(|evaluator| EvaluatorSlot {
            evaluator,
            tracker: TrackStore::new(
                tracker_config.max_age,
                tracker_config.match_distance,
                tracker_config.history_len,
            ),
        })
        .collect()
}

struct StreamWorker {
    stream: StreamConfig,
    tracker_config: TrackerConfig,
    cooldown_secs: f64,
    max_pending: usize,
    frame_wait: Duration,
    retry_pause: Duration,
    factory: Arc<dyn SourceFactory>,
    sink: Arc<dyn AlertSink>,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    metrics: StreamMetrics,
}

impl StreamWorker {
    async fn run(self) {
        let stream_id = self.stream.id.clone();
        info!(stream_id = %stream_id, url = %self.stream.url, "starting stream");

        let mut source = match self.factory.open(&self.stream).await {
            Ok(source) => source,
            Err(e) => {
                error!(stream_id = %stream_id, error = %e, "cannot open stream source");
                self.state
                    .store(StreamState::Stopped as u8, Ordering::Release);
                return;
            }
        };

        let mut slots = build_slots(&self.stream, &self.tracker_config, self.cooldown_secs);
        let mut bus = AlertBus::new(self.max_pending);
        self.state
            .store(StreamState::Running as u8, Ordering::Release);

        while !self.stop.load(Ordering::Acquire) {
            let observations = match timeout(self.frame_wait, source.next_frame()).await {
                Ok(Ok(observations)) => observations,
                Ok(Err(SourceError::EndOfStream)) => {
                    info!(stream_id = %stream_id, "stream ended");
                    break;
                }
                Ok(Err(SourceError::Fatal(reason))) => {
                    error!(stream_id = %stream_id, %reason, "fatal source failure");
                    break;
                }
                Ok(Err(SourceError::Transient(reason))) => {
                    warn!(stream_id = %stream_id, %reason, "transient source failure, reopening");
                    self.metrics.inc(&self.metrics.source_retries);
                    sleep(self.retry_pause).await;
                    match self.factory.open(&self.stream).await {
                        Ok(reopened) => source = reopened,
                        Err(e) => {
                            error!(stream_id = %stream_id, error = %e, "reopen failed");
                            break;
                        }
                    }
                    continue;
                }
                Err(_) => {
                    warn!(stream_id = %stream_id, "no frame within wait window");
                    self.metrics.inc(&self.metrics.source_retries);
                    continue;
                }
            };

            self.process_frame(&observations, &mut slots, &mut bus).await;
        }

        info!(stream_id = %stream_id, "stream task finished");
        self.state
            .store(StreamState::Stopped as u8, Ordering::Release);
    }

    async fn process_frame(
        &self,
        observations: &FrameObservations,
        slots: &mut [EvaluatorSlot],
        bus: &mut AlertBus,
    ) {
        self.metrics.inc(&self.metrics.frames_processed);
        if !observations.detections.is_empty() {
            self.metrics.inc(&self.metrics.frames_with_detections);
        }

        // Only person detections feed the trackers; other classes are still
        // visible to the evaluators through the raw observations.
        let person_boxes: Vec<(usize, BBox)> = observations
            .detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.class == "person")
            .map(|(i, d)| (i, d.bbox))
            .collect();
        let boxes: Vec<BBox> = person_boxes.iter().map(|(_, b)| *b).collect();
        let frame = FrameRef {
            frame_id: observations.frame_id,
            timestamp_ms: observations.timestamp_ms,
        };

        let mut produced = Vec::new();
        for slot in slots.iter_mut() {
            let assignments = slot.tracker.update(&boxes);
            let persons: Vec<TrackedPerson> = person_boxes
                .iter()
                .zip(assignments.iter())
                .map(|((det_index, _), a)| TrackedPerson {
                    det_index: *det_index,
                    track_id: a.track_id,
                    bbox: a.bbox,
                })
                .collect();
            let ctx = FrameContext {
                stream_id: &self.stream.id,
                frame,
                observations,
                persons: &persons,
                tracks: &slot.tracker,
            };
            slot.evaluator.evaluate(&ctx, &mut produced);
        }
        debug!(
            stream_id = %self.stream.id,
            frame_id = observations.frame_id,
            persons = boxes.len(),
            alerts = produced.len(),
            "frame processed"
        );
        self.metrics
            .add(&self.metrics.alerts_emitted, produced.len() as u64);
        for alert in &produced {
            if alert.kind == AlertKind::EntryExitCount {
                self.record_counts(alert);
            }
        }
        bus.publish_all(produced);

        for alert in bus.drain() {
            match self.sink.deliver(&alert).await {
                Ok(()) => self.metrics.inc(&self.metrics.alerts_dispatched),
                Err(e) => {
                    warn!(
                        stream_id = %self.stream.id,
                        kind = %alert.kind,
                        error = %e,
                        "alert dispatch failed, dropping"
                    );
                    self.metrics.inc(&self.metrics.dispatch_failures);
                }
            }
        }
    }

    fn record_counts(&self, alert: &crate::types::AlertEvent) {
        let Some(params) = alert.parameters.as_ref() else {
            return;
        };
        if let Some(n) = params["entry_count"].as_u64() {
            self.metrics.entry_count.store(n, Ordering::Relaxed);
        }
        if let Some(n) = params["exit_count"].as_u64() {
            self.metrics.exit_count.store(n, Ordering::Relaxed);
        }
    }
}
