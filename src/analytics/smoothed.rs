// src/analytics/smoothed.rs
//
// Class-presence analytics smoothed over consecutive frames. A single frame
// with a fall (or fire/smoke) detection is treated as model noise; the alert
// needs an unbroken run of qualifying frames. The run counter clears on any
// clean frame and after every alert.

use super::{in_region, Debounce, Evaluator, FrameContext};
use crate::config::AnalyticConfig;
use crate::types::{AlertEvent, AlertKind, Point};

pub struct SmoothedClassEvaluator {
    kind: AlertKind,
    roi: Vec<Point>,
    watched_classes: Vec<String>,
    needed_frames: u32,
    consecutive: u32,
    debounce: Debounce,
}

impl SmoothedClassEvaluator {
    pub fn fall(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            kind: AlertKind::Fall,
            roi: analytic.roi.clone(),
            watched_classes: vec!["fall".to_string()],
            needed_frames: 2,
            consecutive: 0,
            debounce: Debounce::new(cooldown_secs),
        }
    }

    pub fn fire_and_smoke(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            kind: AlertKind::FireAndSmoke,
            roi: analytic.roi.clone(),
            watched_classes: vec!["fire".to_string(), "smoke".to_string()],
            needed_frames: 4,
            consecutive: 0,
            debounce: Debounce::new(cooldown_secs),
        }
    }
}

impl Evaluator for SmoothedClassEvaluator {
    fn kind(&self) -> AlertKind {
        self.kind
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let hit = ctx
            .observations
            .detections
            .iter()
            .filter(|d| self.watched_classes.iter().any(|c| c == &d.class))
            .find(|d| in_region(&self.roi, d.bbox.centroid()));

        let Some(detection) = hit else {
            self.consecutive = 0;
            return;
        };

        self.consecutive += 1;
        if self.consecutive >= self.needed_frames && self.debounce.ready(ctx.now_ms()) {
            out.push(
                AlertEvent::new(ctx.stream_id, self.kind, ctx.frame).with_remark(format!(
                    "{} detected for {} consecutive frames",
                    detection.class, self.consecutive
                )),
            );
            self.debounce.mark(ctx.now_ms());
            self.consecutive = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testutil::{bbox_at, run_observations, square_roi};
    use crate::config::{AnalyticConfig, AnalyticKind};
    use crate::tracker::TrackStore;
    use crate::types::{Detection, FrameObservations};

    fn frame_with(frame_id: u64, ts: f64, classes: &[&str]) -> FrameObservations {
        FrameObservations {
            frame_id,
            timestamp_ms: ts,
            detections: classes
                .iter()
                .map(|c| Detection {
                    bbox: bbox_at(50, 50),
                    class: c.to_string(),
                    confidence: 0.8,
                    attributes: None,
                })
                .collect(),
            keypoints: Vec::new(),
            crowd: None,
        }
    }

    fn fall_eval() -> SmoothedClassEvaluator {
        let mut analytic = AnalyticConfig::new(AnalyticKind::Fall);
        analytic.roi = square_roi(100);
        SmoothedClassEvaluator::fall(&analytic, 5.0)
    }

    #[test]
    fn test_single_frame_is_noise() {
        let mut eval = fall_eval();
        let mut tracks = TrackStore::new(10, 80.0, 10);
        let alerts = run_observations(&mut eval, &mut tracks, &frame_with(0, 0.0, &["fall"]));
        assert!(alerts.is_empty());
        // Clean frame in between resets the run.
        run_observations(&mut eval, &mut tracks, &frame_with(1, 500.0, &[]));
        let alerts = run_observations(&mut eval, &mut tracks, &frame_with(2, 1_000.0, &["fall"]));
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_fall_fires_on_second_consecutive_frame() {
        let mut eval = fall_eval();
        let mut tracks = TrackStore::new(10, 80.0, 10);
        run_observations(&mut eval, &mut tracks, &frame_with(0, 0.0, &["fall"]));
        let alerts = run_observations(&mut eval, &mut tracks, &frame_with(1, 500.0, &["fall"]));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Fall);
    }

    #[test]
    fn test_counter_resets_after_alert() {
        let mut eval = fall_eval();
        let mut tracks = TrackStore::new(10, 80.0, 10);
        let mut fired = Vec::new();
        for i in 0..16u64 {
            let ts = i as f64 * 500.0;
            if !run_observations(&mut eval, &mut tracks, &frame_with(i, ts, &["fall"])).is_empty() {
                fired.push(ts);
            }
        }
        // Fires on the second frame, then on the debounce cadence.
        assert_eq!(fired, vec![500.0, 5_500.0]);
    }

    #[test]
    fn test_fire_needs_four_frames() {
        let mut analytic = AnalyticConfig::new(AnalyticKind::FireAndSmoke);
        analytic.roi = square_roi(100);
        let mut eval = SmoothedClassEvaluator::fire_and_smoke(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        for i in 0..3u64 {
            let alerts = run_observations(
                &mut eval,
                &mut tracks,
                &frame_with(i, i as f64 * 500.0, &["smoke"]),
            );
            assert!(alerts.is_empty());
        }
        let alerts = run_observations(&mut eval, &mut tracks, &frame_with(3, 1_500.0, &["smoke"]));
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].remark.as_ref().unwrap().starts_with("smoke"));
    }

    #[test]
    fn test_outside_region_does_not_count() {
        let mut analytic = AnalyticConfig::new(AnalyticKind::Fall);
        analytic.roi = square_roi(100);
        let mut eval = SmoothedClassEvaluator::fall(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        for i in 0..5u64 {
            let mut obs = frame_with(i, i as f64 * 500.0, &["fall"]);
            obs.detections[0].bbox = bbox_at(500, 500);
            assert!(run_observations(&mut eval, &mut tracks, &obs).is_empty());
        }
    }
}
