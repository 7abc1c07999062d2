// src/analytics/gesture.rs
//
// Waving-hand detection from pose keypoints. A wave is lateral wrist motion
// (wide x-range over a rolling sample window) with at least one elbow raised
// above its shoulder, held for a minimum duration. Alerting is per track:
// each track alerts at most once, and one person's alert never delays
// another's.

use std::collections::HashMap;

use super::{in_region, Evaluator, FrameContext};
use crate::config::AnalyticConfig;
use crate::tracker::TrackId;
use crate::types::{
    AlertEvent, AlertKind, KeypointSet, Point, KP_LEFT_ELBOW, KP_LEFT_SHOULDER, KP_LEFT_WRIST,
    KP_RIGHT_ELBOW, KP_RIGHT_SHOULDER, KP_RIGHT_WRIST,
};

const SAMPLE_WINDOW: usize = 30;
const MIN_SAMPLES: usize = 20;
const MIN_X_RANGE: f32 = 50.0;
const SUSTAIN_MS: f64 = 2_000.0;

#[derive(Debug, Default)]
struct WaveState {
    wrist_xs: Vec<f32>,
    sustained_since_ms: Option<f64>,
    alerted: bool,
}

pub struct WavingEvaluator {
    roi: Vec<Point>,
    states: HashMap<TrackId, WaveState>,
}

impl WavingEvaluator {
    pub fn new(analytic: &AnalyticConfig) -> Self {
        Self {
            roi: analytic.roi.clone(),
            states: HashMap::new(),
        }
    }
}

fn elbow_above_shoulder(kp: &KeypointSet) -> bool {
    let left = matches!(
        (kp.get(KP_LEFT_ELBOW), kp.get(KP_LEFT_SHOULDER)),
        (Some(elbow), Some(shoulder)) if elbow.1 < shoulder.1
    );
    let right = matches!(
        (kp.get(KP_RIGHT_ELBOW), kp.get(KP_RIGHT_SHOULDER)),
        (Some(elbow), Some(shoulder)) if elbow.1 < shoulder.1
    );
    left || right
}

impl Evaluator for WavingEvaluator {
    fn kind(&self) -> AlertKind {
        AlertKind::WavingHand
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let now = ctx.now_ms();

        for person in ctx.persons {
            if !in_region(&self.roi, person.bbox.centroid()) {
                continue;
            }
            let Some(Some(kp)) = ctx.observations.keypoints.get(person.det_index) else {
                continue;
            };

            let state = self.states.entry(person.track_id).or_default();
            if let Some((x, _)) = kp.get(KP_LEFT_WRIST) {
                state.wrist_xs.push(x);
            }
            if let Some((x, _)) = kp.get(KP_RIGHT_WRIST) {
                state.wrist_xs.push(x);
            }
            let excess = state.wrist_xs.len().saturating_sub(SAMPLE_WINDOW);
            if excess > 0 {
                state.wrist_xs.drain(..excess);
            }
            if state.wrist_xs.len() < MIN_SAMPLES {
                continue;
            }

            let min = state.wrist_xs.iter().copied().fold(f32::INFINITY, f32::min);
            let max = state
                .wrist_xs
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
            let waving = max - min > MIN_X_RANGE && elbow_above_shoulder(kp);

            if !waving {
                state.sustained_since_ms = None;
                continue;
            }

            let since = *state.sustained_since_ms.get_or_insert(now);
            if now - since >= SUSTAIN_MS && !state.alerted {
                out.push(
                    AlertEvent::new(ctx.stream_id, AlertKind::WavingHand, ctx.frame).with_remark(
                        format!("Person ID {} waving hand", person.track_id),
                    ),
                );
                state.alerted = true;
                state.wrist_xs.clear();
                state.sustained_since_ms = None;
            }
        }

        self.states.retain(|id, _| ctx.tracks.contains(*id));
    }
}
