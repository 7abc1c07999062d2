// src/analytics/motion.rs
//
// Motion-direction analytics. The directional arrow labels each person's
// instantaneous heading from their last two positions; wrong-direction
// compares net movement over a longer window against the configured expected
// flow.

use std::collections::{HashMap, VecDeque};

use super::{in_region, Debounce, Evaluator, FrameContext};
use crate::config::{AnalyticConfig, FlowDirection};
use crate::tracker::TrackId;
use crate::types::{AlertEvent, AlertKind, Point};

/// Minimum step magnitude before a heading label is assigned.
const STEP_NOISE_FLOOR: f32 = 2.0;

/// Window and warm-up for wrong-direction judgement.
const DIRECTION_WINDOW: usize = 30;
const DIRECTION_MIN_SAMPLES: usize = 10;

fn heading_label(dx: i32, dy: i32) -> Option<&'static str> {
    if ((dx * dx + dy * dy) as f32).sqrt() <= STEP_NOISE_FLOOR {
        return None;
    }
    Some(if dx.abs() > dy.abs() {
        if dx > 0 {
            "Right"
        } else {
            "Left"
        }
    } else if dy > 0 {
        "Down"
    } else {
        "Up"
    })
}

pub struct DirectionArrowEvaluator {
    roi: Vec<Point>,
    debounce: Debounce,
}

impl DirectionArrowEvaluator {
    pub fn new(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            roi: analytic.roi.clone(),
            debounce: Debounce::new(cooldown_secs),
        }
    }
}

impl Evaluator for DirectionArrowEvaluator {
    fn kind(&self) -> AlertKind {
        AlertKind::DirectionArrow
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let now = ctx.now_ms();
        for person in ctx.persons {
            if !in_region(&self.roi, person.bbox.centroid()) {
                continue;
            }
            let Some((dx, dy)) = ctx.tracks.last_step(person.track_id) else {
                continue;
            };
            // A stationary person never alerts.
            let Some(direction) = heading_label(dx, dy) else {
                continue;
            };
            if self.debounce.ready(now) {
                out.push(
                    AlertEvent::new(ctx.stream_id, self.kind(), ctx.frame).with_remark(format!(
                        "Person ID {} moving in direction: {}",
                        person.track_id, direction
                    )),
                );
                self.debounce.mark(now);
            }
        }
    }
}

pub struct WrongDirectionEvaluator {
    roi: Vec<Point>,
    expected: FlowDirection,
    debounce: Debounce,
    samples: HashMap<TrackId, VecDeque<i32>>,
}

impl WrongDirectionEvaluator {
    pub fn new(analytic: &AnalyticConfig, cooldown_secs: f64) -> Self {
        Self {
            roi: analytic.roi.clone(),
            expected: analytic.expected_direction,
            debounce: Debounce::new(cooldown_secs),
            samples: HashMap::new(),
        }
    }

    /// Observed flow label for a net movement along the watched axis.
    fn observed(&self, movement: i32) -> FlowDirection {
        match self.expected {
            FlowDirection::LeftToRight | FlowDirection::RightToLeft => {
                if movement < 0 {
                    FlowDirection::RightToLeft
                } else {
                    FlowDirection::LeftToRight
                }
            }
            FlowDirection::TopToBottom | FlowDirection::BottomToTop => {
                if movement < 0 {
                    FlowDirection::BottomToTop
                } else {
                    FlowDirection::TopToBottom
                }
            }
        }
    }

    fn watched_coordinate(&self, centroid: Point) -> i32 {
        match self.expected {
            FlowDirection::LeftToRight | FlowDirection::RightToLeft => centroid.x,
            FlowDirection::TopToBottom | FlowDirection::BottomToTop => centroid.y,
        }
    }
}

impl Evaluator for WrongDirectionEvaluator {
    fn kind(&self) -> AlertKind {
        AlertKind::WrongDirection
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let now = ctx.now_ms();
        for person in ctx.persons {
            let centroid = person.bbox.centroid();
            if !in_region(&self.roi, centroid) {
                continue;
            }
            let coordinate = self.watched_coordinate(centroid);
            let samples = self
                .samples
                .entry(person.track_id)
                .or_insert_with(|| VecDeque::with_capacity(DIRECTION_WINDOW));
            samples.push_back(coordinate);
            if samples.len() > DIRECTION_WINDOW {
                samples.pop_front();
            }
            if samples.len() < DIRECTION_MIN_SAMPLES {
                continue;
            }

            let movement = samples.back().unwrap() - samples.front().unwrap();
            let observed = self.observed(movement);
            if observed != self.expected && self.debounce.ready(now) {
                out.push(
                    AlertEvent::new(ctx.stream_id, self.kind(), ctx.frame).with_remark(format!(
                        "Moving in wrong direction: {}",
                        observed.label()
                    )),
                );
                self.debounce.mark(now);
            }
        }

        self.samples.retain(|id, _| ctx.tracks.contains(*id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testutil::{bbox_at, run_frame};
    use crate::config::{AnalyticConfig, AnalyticKind};
    use crate::tracker::TrackStore;

    #[test]
    fn test_heading_labels() {
        assert_eq!(heading_label(10, 2), Some("Right"));
        assert_eq!(heading_label(-10, 2), Some("Left"));
        assert_eq!(heading_label(2, 10), Some("Down"));
        assert_eq!(heading_label(2, -10), Some("Up"));
        assert_eq!(heading_label(1, 1), None);
        assert_eq!(heading_label(0, 0), None);
    }

    #[test]
    fn test_arrow_alerts_on_movement_and_debounces() {
        let analytic = AnalyticConfig::new(AnalyticKind::DirectionArrow);
        let mut eval = DirectionArrowEvaluator::new(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        let mut fired = 0;
        for i in 0..8u64 {
            let alerts = run_frame(
                &mut eval,
                &mut tracks,
                i,
                i as f64 * 1_000.0,
                &[bbox_at(100 + i as i32 * 20, 100)],
            );
            fired += alerts.len();
            if let Some(alert) = alerts.first() {
                assert!(alert.remark.as_ref().unwrap().contains("Right"));
            }
        }
        // First heading is available on the second frame (t=1s); the next
        // alert is at t=6s.
        assert_eq!(fired, 2);
    }

    #[test]
    fn test_arrow_fires_for_slow_mover_without_delay() {
        // 8 px per frame is well above the step floor; the first heading is
        // available on the second frame and must alert right there.
        let analytic = AnalyticConfig::new(AnalyticKind::DirectionArrow);
        let mut eval = DirectionArrowEvaluator::new(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        let mut first_alert = None;
        for i in 0..6u64 {
            let alerts = run_frame(
                &mut eval,
                &mut tracks,
                i,
                i as f64 * 1_000.0,
                &[bbox_at(100 + i as i32 * 8, 100)],
            );
            if !alerts.is_empty() && first_alert.is_none() {
                first_alert = Some(i);
            }
        }
        assert_eq!(first_alert, Some(1));
    }

    #[test]
    fn test_arrow_stationary_never_alerts() {
        let analytic = AnalyticConfig::new(AnalyticKind::DirectionArrow);
        let mut eval = DirectionArrowEvaluator::new(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        for i in 0..10u64 {
            let alerts = run_frame(
                &mut eval,
                &mut tracks,
                i,
                i as f64 * 1_000.0,
                &[bbox_at(100 + (i as i32 % 2), 100)],
            );
            assert!(alerts.is_empty());
        }
    }

    #[test]
    fn test_wrong_direction_needs_warmup() {
        let analytic = AnalyticConfig::new(AnalyticKind::WrongDirection);
        let mut eval = WrongDirectionEvaluator::new(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        // Moving right-to-left against an expected left-to-right flow.
        let mut first_alert = None;
        for i in 0..12u64 {
            let alerts = run_frame(
                &mut eval,
                &mut tracks,
                i,
                i as f64 * 1_000.0,
                &[bbox_at(600 - i as i32 * 15, 100)],
            );
            if !alerts.is_empty() && first_alert.is_none() {
                first_alert = Some(i);
                assert_eq!(
                    alerts[0].remark.as_deref(),
                    Some("Moving in wrong direction: Right to Left")
                );
            }
        }
        // Tenth sample arrives on frame index 9.
        assert_eq!(first_alert, Some(9));
    }

    #[test]
    fn test_expected_flow_never_alerts() {
        let analytic = AnalyticConfig::new(AnalyticKind::WrongDirection);
        let mut eval = WrongDirectionEvaluator::new(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        for i in 0..20u64 {
            let alerts = run_frame(
                &mut eval,
                &mut tracks,
                i,
                i as f64 * 1_000.0,
                &[bbox_at(100 + i as i32 * 15, 100)],
            );
            assert!(alerts.is_empty());
        }
    }

    #[test]
    fn test_vertical_flow_watches_y_axis() {
        let mut analytic = AnalyticConfig::new(AnalyticKind::WrongDirection);
        analytic.expected_direction = FlowDirection::TopToBottom;
        let mut eval = WrongDirectionEvaluator::new(&analytic, 5.0);
        let mut tracks = TrackStore::new(10, 80.0, 10);

        let mut fired = 0;
        for i in 0..12u64 {
            fired += run_frame(
                &mut eval,
                &mut tracks,
                i,
                i as f64 * 1_000.0,
                &[bbox_at(100, 600 - i as i32 * 15)],
            )
            .len();
        }
        assert!(fired >= 1);
    }
}
