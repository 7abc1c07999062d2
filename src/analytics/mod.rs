// src/analytics/mod.rs
//
// Analytic evaluators. Each evaluator instance belongs to exactly one stream
// and one analytic kind; per-track state lives inside the instance, so there
// is no shared state between streams or kinds. Evaluators receive a fully
// tracked frame and push alerts into the caller's buffer.

pub mod crowd;
pub mod gesture;
pub mod intrusion;
pub mod line_count;
pub mod loitering;
pub mod motion;
pub mod smoothed;
pub mod waiting;

use tracing::warn;

use crate::config::{AnalyticConfig, AnalyticKind, StreamConfig};
use crate::geometry::polygon_contains;
use crate::tracker::{TrackId, TrackStore};
use crate::types::{AlertEvent, AlertKind, BBox, FrameObservations, FrameRef, Point};

/// One tracked person detection in the current frame. `det_index` points back
/// into `FrameObservations::detections` (and the aligned keypoint list).
#[derive(Debug, Clone, Copy)]
pub struct TrackedPerson {
    pub det_index: usize,
    pub track_id: TrackId,
    pub bbox: BBox,
}

/// Everything an evaluator may look at for one frame. Time always comes from
/// the frame, never from the wall clock, so evaluators are deterministic
/// under test.
pub struct FrameContext<'a> {
    pub stream_id: &'a str,
    pub frame: FrameRef,
    pub observations: &'a FrameObservations,
    pub persons: &'a [TrackedPerson],
    pub tracks: &'a TrackStore,
}

impl FrameContext<'_> {
    pub fn now_ms(&self) -> f64 {
        self.frame.timestamp_ms
    }
}

pub trait Evaluator: Send {
    fn kind(&self) -> AlertKind;
    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>);
}

/// Minimum-interval gate between alerts of one kind on one stream.
#[derive(Debug, Clone)]
pub struct Debounce {
    cooldown_ms: f64,
    last_fired_ms: Option<f64>,
}

impl Debounce {
    pub fn new(cooldown_secs: f64) -> Self {
        Self {
            cooldown_ms: cooldown_secs * 1000.0,
            last_fired_ms: None,
        }
    }

    pub fn ready(&self, now_ms: f64) -> bool {
        match self.last_fired_ms {
            None => true,
            Some(last) => now_ms - last >= self.cooldown_ms,
        }
    }

    pub fn mark(&mut self, now_ms: f64) {
        self.last_fired_ms = Some(now_ms);
    }

    /// Forget the last alert, so the next qualifying frame fires immediately.
    pub fn reset(&mut self) {
        self.last_fired_ms = None;
    }
}

/// Region gate: an analytic with no configured region watches the full frame.
pub(crate) fn in_region(roi: &[Point], p: Point) -> bool {
    roi.is_empty() || polygon_contains(roi, p)
}

/// Build the evaluator set for one stream. Unusable analytic entries (e.g. an
/// entry/exit counter with no lines) are skipped with a warning rather than
/// failing the stream.
pub fn build_evaluators(
    stream: &StreamConfig,
    cooldown_secs: f64,
) -> Vec<Box<dyn Evaluator>> {
    let mut set: Vec<Box<dyn Evaluator>> = Vec::with_capacity(stream.analytics.len());
    for analytic in &stream.analytics {
        match build_one(analytic, cooldown_secs) {
            Some(evaluator) => set.push(evaluator),
            None => warn!(
                stream_id = %stream.id,
                kind = ?analytic.kind,
                "skipping analytic with unusable configuration"
            ),
        }
    }
    set
}

fn build_one(analytic: &AnalyticConfig, cooldown_secs: f64) -> Option<Box<dyn Evaluator>> {
    let evaluator: Box<dyn Evaluator> = match analytic.kind {
        AnalyticKind::Intrusion => {
            Box::new(intrusion::IntrusionEvaluator::new(analytic, cooldown_secs, false))
        }
        AnalyticKind::IntrusionWithAttributes => {
            Box::new(intrusion::IntrusionEvaluator::new(analytic, cooldown_secs, true))
        }
        AnalyticKind::Loitering => {
            Box::new(loitering::LoiteringEvaluator::new(analytic, cooldown_secs))
        }
        AnalyticKind::DirectionArrow => {
            Box::new(motion::DirectionArrowEvaluator::new(analytic, cooldown_secs))
        }
        AnalyticKind::WrongDirection => {
            Box::new(motion::WrongDirectionEvaluator::new(analytic, cooldown_secs))
        }
        AnalyticKind::CrowdFormation => Box::new(crowd::CrowdEvaluator::formation(
            analytic,
            cooldown_secs,
        )),
        AnalyticKind::CrowdDispersion => Box::new(crowd::CrowdEvaluator::dispersion(
            analytic,
            cooldown_secs,
        )),
        AnalyticKind::CrowdEstimation => Box::new(crowd::CrowdEvaluator::estimation(
            analytic,
            cooldown_secs,
        )),
        AnalyticKind::Fall => Box::new(smoothed::SmoothedClassEvaluator::fall(
            analytic,
            cooldown_secs,
        )),
        AnalyticKind::FireAndSmoke => Box::new(smoothed::SmoothedClassEvaluator::fire_and_smoke(
            analytic,
            cooldown_secs,
        )),
        AnalyticKind::WavingHand => Box::new(gesture::WavingEvaluator::new(analytic)),
        AnalyticKind::WaitingTime => {
            Box::new(waiting::WaitingTimeEvaluator::new(analytic, cooldown_secs))
        }
        AnalyticKind::EntryExitCount => {
            Box::new(line_count::EntryExitEvaluator::new(analytic)?)
        }
    };
    Some(evaluator)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::types::Detection;

    /// Drive a frame of person boxes through a tracker and an evaluator,
    /// returning the alerts it produced.
    pub fn run_frame(
        evaluator: &mut dyn Evaluator,
        tracks: &mut TrackStore,
        frame_id: u64,
        timestamp_ms: f64,
        boxes: &[BBox],
    ) -> Vec<AlertEvent> {
        let observations = FrameObservations {
            frame_id,
            timestamp_ms,
            detections: boxes
                .iter()
                .map(|b| Detection {
                    bbox: *b,
                    class: "person".to_string(),
                    confidence: 0.9,
                    attributes: None,
                })
                .collect(),
            keypoints: Vec::new(),
            crowd: None,
        };
        run_observations(evaluator, tracks, &observations)
    }

    pub fn run_observations(
        evaluator: &mut dyn Evaluator,
        tracks: &mut TrackStore,
        observations: &FrameObservations,
    ) -> Vec<AlertEvent> {
        let person_boxes: Vec<(usize, BBox)> = observations
            .detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.class == "person")
            .map(|(i, d)| (i, d.bbox))
            .collect();
        let assignments =
            tracks.update(&person_boxes.iter().map(|(_, b)| *b).collect::<Vec<_>>());
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
            stream_id: "test-stream",
            frame: FrameRef {
                frame_id: observations.frame_id,
                timestamp_ms: observations.timestamp_ms,
            },
            observations,
            persons: &persons,
            tracks,
        };
        let mut out = Vec::new();
        evaluator.evaluate(&ctx, &mut out);
        out
    }

    pub fn square_roi(size: i32) -> Vec<Point> {
        vec![
            Point::new(0, 0),
            Point::new(size, 0),
            Point::new(size, size),
            Point::new(0, size),
        ]
    }

    pub fn bbox_at(cx: i32, cy: i32) -> BBox {
        BBox::new(cx - 10, cy - 10, cx + 10, cy + 10)
    }
}
