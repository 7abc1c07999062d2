// src/analytics/intrusion.rs
//
// Intrusion: any watched-class detection whose centroid falls inside the
// region raises an alert, debounced per stream. The attribute variant
// additionally forwards the upstream attribute map for each matched
// detection.

use serde_json::json;

use super::{in_region, Debounce, Evaluator, FrameContext};
use crate::config::AnalyticConfig;
use crate::types::{AlertEvent, AlertKind, Point};

pub struct IntrusionEvaluator {
    roi: Vec<Point>,
    classes: Vec<String>,
    debounce: Debounce,
    with_attributes: bool,
}

impl IntrusionEvaluator {
    pub fn new(analytic: &AnalyticConfig, cooldown_secs: f64, with_attributes: bool) -> Self {
        Self {
            roi: analytic.roi.clone(),
            classes: analytic.classes.clone(),
            debounce: Debounce::new(cooldown_secs),
            with_attributes,
        }
    }
}

impl Evaluator for IntrusionEvaluator {
    fn kind(&self) -> AlertKind {
        if self.with_attributes {
            AlertKind::IntrusionWithAttributes
        } else {
            AlertKind::Intrusion
        }
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let matched: Vec<&crate::types::Detection> = ctx
            .observations
            .detections
            .iter()
            .filter(|d| self.classes.iter().any(|c| c == &d.class))
            .filter(|d| in_region(&self.roi, d.bbox.centroid()))
            .collect();
        if matched.is_empty() || !self.debounce.ready(ctx.now_ms()) {
            return;
        }

        let mut alert = AlertEvent::new(ctx.stream_id, self.kind(), ctx.frame).with_remark(
            format!("{} object(s) detected in restricted area", matched.len()),
        );
        if self.with_attributes {
            let objects: Vec<serde_json::Value> = matched
                .iter()
                .map(|d| {
                    json!({
                        "type": d.class,
                        "attributes": d.attributes.clone().unwrap_or_else(|| json!({})),
                    })
                })
                .collect();
            alert = alert.with_parameters(json!(objects));
        }
        out.push(alert);
        self.debounce.mark(ctx.now_ms());
    }
}
