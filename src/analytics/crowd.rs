// src/analytics/crowd.rs
//
// Crowd analytics. Formation, dispersion and estimation share one sustained-
// condition machine: the condition must hold continuously for the configured
// duration before the first alert, repeats on the stream cooldown while it
// keeps holding, and resets completely the moment it breaks. Dispersion
// watches the inverse condition (too few people), estimation watches the
// density-model head count instead of tracked boxes.

use super::{in_region, Debounce, Evaluator, FrameContext};
use crate::config::AnalyticConfig;
use crate::types::{AlertEvent, AlertKind, Point};

/// Condition-held-for-duration machine shared by the three crowd kinds.
#[derive(Debug)]
pub(crate) struct SustainedCondition {
    duration_ms: f64,
    started_ms: Option<f64>,
    debounce: Debounce,
}

impl SustainedCondition {
    pub(crate) fn new(duration_secs: f64, cooldown_secs: f64) -> Self {
        Self {
            duration_ms: duration_secs * 1000.0,
            started_ms: None,
            debounce: Debounce::new(cooldown_secs),
        }
    }

    /// Feed one observation; returns true when an alert should fire now.
    pub(crate) fn step(&mut self, met: bool, now_ms: f64) -> bool {
        if !met {
            self.started_ms = None;
            self.debounce.reset();
            return false;
        }
        let started = *self.started_ms.get_or_insert(now_ms);
        if now_ms - started >= self.duration_ms && self.debounce.ready(now_ms) {
            self.debounce.mark(now_ms);
            return true;
        }
        false
    }
}

enum CrowdMode {
    /// Tracked people in region strictly above threshold.
    Formation { threshold: usize },
    /// Tracked people in region strictly below threshold.
    Dispersion { threshold: usize },
    /// Density-model head count strictly above threshold.
    Estimation { threshold: f64 },
}

pub struct CrowdEvaluator {
    roi: Vec<Point>,
    mode: CrowdMode,
    condition: SustainedCondition,
}

impl CrowdEvaluator {
    pub fn formation(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            roi: analytic.roi.clone(),
            mode: CrowdMode::Formation {
                threshold: analytic.formation_threshold,
            },
            condition: SustainedCondition::new(analytic.formation_duration_secs, cooldown_secs),
        }
    }

    pub fn dispersion(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            roi: analytic.roi.clone(),
            mode: CrowdMode::Dispersion {
                threshold: analytic.dispersion_threshold,
            },
            condition: SustainedCondition::new(analytic.dispersion_duration_secs, cooldown_secs),
        }
    }

    pub fn estimation(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            roi: analytic.roi.clone(),
            mode: CrowdMode::Estimation {
                threshold: analytic.estimation_threshold,
            },
            condition: SustainedCondition::new(analytic.estimation_duration_secs, cooldown_secs),
        }
    }

    fn people_in_region(&self, ctx: &FrameContext<'_>) -> usize {
        ctx.persons
            .iter()
            .filter(|p| in_region(&self.roi, p.bbox.centroid()))
            .count()
    }
}

impl Evaluator for CrowdEvaluator {
    fn kind(&self) -> AlertKind {
        match self.mode {
            CrowdMode::Formation { .. } => AlertKind::CrowdFormation,
            CrowdMode::Dispersion { .. } => AlertKind::CrowdDispersion,
            CrowdMode::Estimation { .. } => AlertKind::CrowdEstimation,
        }
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let (met, remark) = match self.mode {
            CrowdMode::Formation { threshold } => {
                let count = self.people_in_region(ctx);
                (
                    count > threshold,
                    format!("Crowd of {} persons in region", count),
                )
            }
            CrowdMode::Dispersion { threshold } => {
                let count = self.people_in_region(ctx);
                (
                    count < threshold,
                    format!("Crowd dispersed to {} persons in region", count),
                )
            }
            CrowdMode::Estimation { threshold } => {
                let count = ctx.observations.crowd.as_ref().map_or(0.0, |c| c.count);
                (
                    count > threshold,
                    format!("Estimated crowd of {:.0} persons", count),
                )
            }
        };
        if self.condition.step(met, ctx.now_ms()) {
            out.push(AlertEvent::new(ctx.stream_id, self.kind(), ctx.frame).with_remark(remark));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testutil::{bbox_at, run_frame, run_observations, square_roi};
    use crate::config::{AnalyticConfig, AnalyticKind};
    use crate::tracker::TrackStore;
    use crate::types::{BBox, CrowdEstimate, FrameObservations};

    fn group(n: usize) -> Vec<BBox> {
        (0..n).map(|i| bbox_at(50 + i as i32 * 200, 100)).collect()
    }

    fn formation_eval(threshold: usize, duration: f64) -> CrowdEvaluator {
        let mut analytic = AnalyticConfig::new(AnalyticKind::CrowdFormation);
        analytic.roi = square_roi(2_000);
        analytic.formation_threshold = threshold;
        analytic.formation_duration_secs = duration;
        CrowdEvaluator::formation(&analytic, 5.0)
    }

    #[test]
    fn test_sustained_condition_fires_after_duration() {
        let mut c = SustainedCondition::new(10.0, 5.0);
        for s in 0..10 {
            assert!(!c.step(true, s as f64 * 1_000.0));
        }
        assert!(c.step(true, 10_000.0));
        // Repeats on the cooldown while held.
        assert!(!c.step(true, 12_000.0));
        assert!(c.step(true, 15_000.0));
    }

    #[test]
    fn test_sustained_condition_resets_on_break() {
        let mut c = SustainedCondition::new(3.0, 5.0);
        c.step(true, 0.0);
        c.step(true, 2_000.0);
        c.step(false, 2_500.0);
        // Held again from 3 s; duration counts from there.
        assert!(!c.step(true, 3_000.0));
        assert!(!c.step(true, 5_900.0));
        assert!(c.step(true, 6_000.0));
    }

    #[test]
    fn test_formation_threshold_is_strict() {
        let mut eval = formation_eval(3, 2.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);
        // Exactly at the threshold never fires.
        for i in 0..10u64 {
            let alerts = run_frame(&mut eval, &mut tracks, i, i as f64 * 1_000.0, &group(3));
            assert!(alerts.is_empty());
        }
    }

    #[test]
    fn test_formation_fires_and_repeats() {
        let mut eval = formation_eval(3, 2.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);
        let mut fired = Vec::new();
        for i in 0..12u64 {
            let ts = i as f64 * 1_000.0;
            if !run_frame(&mut eval, &mut tracks, i, ts, &group(4)).is_empty() {
                fired.push(ts);
            }
        }
        assert_eq!(fired, vec![2_000.0, 7_000.0]);
    }

    #[test]
    fn test_dispersion_is_inverse_of_formation() {
        let mut analytic = AnalyticConfig::new(AnalyticKind::CrowdDispersion);
        analytic.roi = square_roi(2_000);
        analytic.dispersion_threshold = 3;
        analytic.dispersion_duration_secs = 2.0;
        let mut eval = CrowdEvaluator::dispersion(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        // A full crowd holds the condition off.
        for i in 0..5u64 {
            assert!(run_frame(&mut eval, &mut tracks, i, i as f64 * 1_000.0, &group(4)).is_empty());
        }
        // Crowd thins out; fires once the low count has held for 2 s.
        let mut fired = Vec::new();
        for i in 5..13u64 {
            let ts = i as f64 * 1_000.0;
            if !run_frame(&mut eval, &mut tracks, i, ts, &group(1)).is_empty() {
                fired.push(ts);
            }
        }
        assert_eq!(fired, vec![7_000.0, 12_000.0]);
    }

    #[test]
    fn test_estimation_uses_density_count() {
        let mut analytic = AnalyticConfig::new(AnalyticKind::CrowdEstimation);
        analytic.estimation_threshold = 15.0;
        analytic.estimation_duration_secs = 2.0;
        let mut eval = CrowdEvaluator::estimation(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        let mut fired = 0;
        for i in 0..4u64 {
            let obs = FrameObservations {
                frame_id: i,
                timestamp_ms: i as f64 * 1_000.0,
                detections: Vec::new(),
                keypoints: Vec::new(),
                crowd: Some(CrowdEstimate {
                    count: 22.5,
                    density: Vec::new(),
                }),
            };
            fired += run_observations(&mut eval, &mut tracks, &obs).len();
        }
        assert_eq!(fired, 1);

        // A frame without a density estimate breaks the condition.
        let obs = FrameObservations {
            frame_id: 4,
            timestamp_ms: 4_000.0,
            detections: Vec::new(),
            keypoints: Vec::new(),
            crowd: None,
        };
        assert!(run_observations(&mut eval, &mut tracks, &obs).is_empty());
    }
}
