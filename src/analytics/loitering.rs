// src/analytics/loitering.rs
//
// Loitering: a tracked person who stays inside the region past the threshold
// raises an alert, repeated on the stream cooldown while they remain. The
// dwell timer resets the moment the person leaves the region or the track is
// lost.

use std::collections::HashMap;

use super::{in_region, Debounce, Evaluator, FrameContext};
use crate::config::AnalyticConfig;
use crate::tracker::TrackId;
use crate::types::{AlertEvent, AlertKind, Point};

pub struct LoiteringEvaluator {
    roi: Vec<Point>,
    threshold_ms: f64,
    debounce: Debounce,
    entered_at: HashMap<TrackId, f64>,
}

impl LoiteringEvaluator {
    pub fn new(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            roi: analytic.roi.clone(),
            threshold_ms: analytic.loiter_secs * 1000.0,
            debounce: Debounce::new(cooldown_secs),
            entered_at: HashMap::new(),
        }
    }
}

impl Evaluator for LoiteringEvaluator {
    fn kind(&self) -> AlertKind {
        AlertKind::Loitering
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let now = ctx.now_ms();

        for person in ctx.persons {
            if in_region(&self.roi, person.bbox.centroid()) {
                let entered = *self.entered_at.entry(person.track_id).or_insert(now);
                if now - entered >= self.threshold_ms && self.debounce.ready(now) {
                    let dwell_secs = (now - entered) / 1000.0;
                    out.push(
                        AlertEvent::new(ctx.stream_id, self.kind(), ctx.frame).with_remark(
                            format!(
                                "Person ID {} loitering for {:.0} seconds",
                                person.track_id, dwell_secs
                            ),
                        ),
                    );
                    self.debounce.mark(now);
                }
            } else {
                self.entered_at.remove(&person.track_id);
            }
        }

        // Lost tracks take their dwell timers with them.
        self.entered_at.retain(|id, _| ctx.tracks.contains(*id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testutil::{bbox_at, run_frame, square_roi};
    use crate::config::{AnalyticConfig, AnalyticKind};
    use crate::tracker::TrackStore;

    fn evaluator(loiter_secs: f64) -> LoiteringEvaluator {
        let mut analytic = AnalyticConfig::new(AnalyticKind::Loitering);
        analytic.roi = square_roi(200);
        analytic.loiter_secs = loiter_secs;
        LoiteringEvaluator::new(&analytic, 5.0)
    }

    #[test]
    fn test_no_alert_below_threshold() {
        let mut eval = evaluator(30.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);
        for i in 0..30u64 {
            let alerts = run_frame(
                &mut eval,
                &mut tracks,
                i,
                i as f64 * 500.0, // 15 seconds total
                &[bbox_at(100, 100)],
            );
            assert!(alerts.is_empty());
        }
    }

    #[test]
    fn test_alerts_once_threshold_reached() {
        let mut eval = evaluator(3.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);
        let mut fired_at = None;
        for i in 0..10u64 {
            let ts = i as f64 * 500.0;
            let alerts = run_frame(&mut eval, &mut tracks, i, ts, &[bbox_at(100, 100)]);
            if !alerts.is_empty() && fired_at.is_none() {
                fired_at = Some(ts);
                assert!(alerts[0].remark.as_ref().unwrap().contains("Person ID"));
            }
        }
        assert_eq!(fired_at, Some(3_000.0));
    }

    #[test]
    fn test_leaving_region_resets_dwell() {
        let mut eval = evaluator(3.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        // 2.5 s inside, then one frame outside, then back in.
        for i in 0..5u64 {
            run_frame(&mut eval, &mut tracks, i, i as f64 * 500.0, &[bbox_at(100, 100)]);
        }
        run_frame(&mut eval, &mut tracks, 5, 2_500.0, &[bbox_at(160, 100)]);
        run_frame(&mut eval, &mut tracks, 6, 3_000.0, &[bbox_at(230, 100)]); // outside
        // Back inside: the dwell clock starts over.
        let alerts = run_frame(&mut eval, &mut tracks, 7, 3_500.0, &[bbox_at(180, 100)]);
        assert!(alerts.is_empty());
        let alerts = run_frame(&mut eval, &mut tracks, 8, 6_000.0, &[bbox_at(180, 100)]);
        assert!(alerts.is_empty()); // only 2.5 s since re-entry
        let alerts = run_frame(&mut eval, &mut tracks, 9, 6_500.0, &[bbox_at(180, 100)]);
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_repeats_on_cooldown_while_still_inside() {
        let mut eval = evaluator(2.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);
        let mut fired = Vec::new();
        for i in 0..20u64 {
            let ts = i as f64 * 1_000.0;
            if !run_frame(&mut eval, &mut tracks, i, ts, &[bbox_at(100, 100)]).is_empty() {
                fired.push(ts);
            }
        }
        assert_eq!(fired, vec![2_000.0, 7_000.0, 12_000.0, 17_000.0]);
    }
}
