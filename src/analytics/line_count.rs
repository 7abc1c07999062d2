// src/analytics/line_count.rs
//
// Entry/exit counting against crossing lines. A track counts as crossed once
// its centroid is past the line's reference value (above a horizontal line,
// left of a vertical one), latched once per track per line. Counters only
// grow while the stream runs; an alert goes out whenever either changes.

use std::collections::HashSet;

use serde_json::json;

use super::{Evaluator, FrameContext};
use crate::config::{AnalyticConfig, LineOrientation};
use crate::geometry::line_reference;
use crate::tracker::TrackId;
use crate::types::{AlertEvent, AlertKind, Point};

struct CountingLine {
    reference: i32,
    orientation: LineOrientation,
    crossed: HashSet<TrackId>,
    count: u64,
}

impl CountingLine {
    fn new(line: &[Point; 2], orientation: LineOrientation) -> Self {
        Self {
            reference: line_reference(line, orientation),
            orientation,
            crossed: HashSet::new(),
            count: 0,
        }
    }

    /// Returns true when this track crosses for the first time.
    fn observe(&mut self, track_id: TrackId, centroid: Point) -> bool {
        let past = match self.orientation {
            LineOrientation::Horizontal => centroid.y < self.reference,
            LineOrientation::Vertical => centroid.x < self.reference,
        };
        if past && self.crossed.insert(track_id) {
            self.count += 1;
            return true;
        }
        false
    }
}

pub struct EntryExitEvaluator {
    entry: Option<CountingLine>,
    exit: Option<CountingLine>,
}

impl EntryExitEvaluator {
    /// Returns `None` when neither line is configured.
    pub fn new(analytic: &AnalyticConfig) -> Option<Self> {
        let entry = analytic
            .entry_line
            .as_ref()
            .map(|line| CountingLine::new(line, analytic.line_orientation));
        let exit = analytic
            .exit_line
            .as_ref()
            .map(|line| CountingLine::new(line, analytic.line_orientation));
        if entry.is_none() && exit.is_none() {
            return None;
        }
        Some(Self { entry, exit })
    }

    pub fn counts(&self) -> (u64, u64) {
        (
            self.entry.as_ref().map_or(0, |l| l.count),
            self.exit.as_ref().map_or(0, |l| l.count),
        )
    }
}

impl Evaluator for EntryExitEvaluator {
    fn kind(&self) -> AlertKind {
        AlertKind::EntryExitCount
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>, out: &mut Vec<AlertEvent>) {
        let mut changed = false;
        for person in ctx.persons {
            let centroid = person.bbox.centroid();
            if let Some(entry) = self.entry.as_mut() {
                changed |= entry.observe(person.track_id, centroid);
            }
            if let Some(exit) = self.exit.as_mut() {
                changed |= exit.observe(person.track_id, centroid);
            }
        }

        if changed {
            let (entry_count, exit_count) = self.counts();
            out.push(
                AlertEvent::new(ctx.stream_id, self.kind(), ctx.frame)
                    .with_remark(format!("Entered: {} | Exited: {}", entry_count, exit_count))
                    .with_parameters(json!({
                        "entry_count": entry_count,
                        "exit_count": exit_count,
                    })),
            );
        }

        // Dead track ids never come back, so their latches can go.
        if let Some(entry) = self.entry.as_mut() {
            entry.crossed.retain(|id| ctx.tracks.contains(*id));
        }
        if let Some(exit) = self.exit.as_mut() {
            exit.crossed.retain(|id| ctx.tracks.contains(*id));
        }
    }
}
