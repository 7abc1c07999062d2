// src/analytics/waiting.rs
//
// Waiting time in a region. Entry is stamped on the first in-region frame;
// the dwell is reported when the person leaves (or their track is lost). The
// entry record is removed after reporting whether or not the stream debounce
// let the alert through, so a dwell is never double-reported.

use std::collections::HashMap;

use serde_json::json;

use super::{in_region, Debounce, Evaluator, FrameContext};
use crate::config::AnalyticConfig;
use crate::tracker::TrackId;
use crate::types::{AlertEvent, AlertKind, Point};

pub struct WaitingTimeEvaluator {
    roi: Vec<Point>,
    debounce: Debounce,
    entered_at: HashMap<TrackId, f64>,
}

impl WaitingTimeEvaluator {
    pub fn new(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            roi: analytic.roi.clone(),
            debounce: Debounce::new(cooldown_secs),
            entered_at: HashMap::new(),
        }
    }

    fn report(
        &mut self,
        ctx: &FrameContext<'_>,
        track_id: TrackId,
        entered_ms: f64,
        out: &mut Vec<AlertEvent>,
    ) {
        let now = ctx.now_ms();
        let waited_secs = (now - entered_ms) / 1000.0;
        if self.debounce.ready(now) {
            out.push(
                AlertEvent::new(ctx.stream_id, self.kind(), ctx.frame)
                    .with_remark(format!(
                        "Person ID {} waited for {:.2} seconds",
                        track_id, waited_secs
                    ))
                    .with_parameters(json!({ "waiting_time_seconds": round2(waited_secs) })),
            );
            self.debounce.mark(now);
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl Evaluator for WaitingTimeEvaluator {
    fn kind(&self) -> AlertKind {
        AlertKind::WaitingTime
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let now = ctx.now_ms();

        for person in ctx.persons {
            if in_region(&self.roi, person.bbox.centroid()) {
                self.entered_at.entry(person.track_id).or_insert(now);
            } else if let Some(entered) = self.entered_at.remove(&person.track_id) {
                self.report(ctx, person.track_id, entered, out);
            }
        }

        // Lost tracks end their dwell at this frame.
        let ended: Vec<(TrackId, f64)> = self
            .entered_at
            .iter()
            .filter(|(id, _)| !ctx.tracks.contains(**id))
            .map(|(id, entered)| (*id, *entered))
            .collect();
        for (id, entered) in ended {
            self.entered_at.remove(&id);
            self.report(ctx, id, entered, out);
        }
    }
}
