// src/pipeline/alert_bus.rs
//
// Bounded in-process alert queue between the per-frame evaluation step and
// the dispatch step. Evaluators publish; the runner drains once per frame.
// Alerts are ephemeral: if dispatch cannot keep up, the oldest are dropped.

use std::collections::VecDeque;
use tracing::warn;

use crate::types::AlertEvent;

pub struct AlertBus {
    alerts: VecDeque<AlertEvent>,
    max_pending: usize,
}

impl AlertBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, alert: AlertEvent) {
        if self.alerts.len() >= self.max_pending {
            warn!(
                "Alert bus full ({} alerts), dropping oldest",
                self.max_pending
            );
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    pub fn publish_all(&mut self, alerts: impl IntoIterator<Item = AlertEvent>) {
        for alert in alerts {
            self.publish(alert);
        }
    }

    pub fn drain(&mut self) -> Vec<AlertEvent> {
        self.alerts.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.alerts.len()
    }
}
