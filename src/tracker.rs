// src/tracker.rs
//
// Centroid multi-object tracker. Detections are matched to existing tracks by
// nearest-centroid within a distance gate; each detection claims its track so
// two detections can never share an identity within one frame. Unmatched
// tracks age out after `max_age` consecutive missed frames.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use crate::types::{BBox, Point};

pub type TrackId = u32;

/// One detection from the current frame with the identity assigned to it.
#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    pub track_id: TrackId,
    pub bbox: BBox,
}

#[derive(Debug, Clone)]
struct Track {
    centroid: Point,
    history: VecDeque<Point>,
    age: u32,
}

pub struct TrackStore {
    tracks: BTreeMap<TrackId, Track>,
    next_id: TrackId,
    max_age: u32,
    match_distance: f32,
    history_len: usize,
}

impl TrackStore {
    pub fn new(max_age: u32, match_distance: f32, history_len: usize) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 0,
            max_age,
            match_distance: match_distance.max(0.0),
            history_len: history_len.max(2),
        }
    }

    /// Number of live tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Ingest one frame of detections. Returns one assignment per input
    /// detection, in input order.
    pub fn update(&mut self, detections: &[BBox]) -> Vec<Assignment> {
        let mut assignments = Vec::with_capacity(detections.len());
        let mut claimed: Vec<TrackId> = Vec::new();

        for bbox in detections {
            let centroid = bbox.centroid();
            let best = self
                .tracks
                .iter()
                .filter(|(id, _)| !claimed.contains(id))
                .map(|(id, t)| (*id, t.centroid.distance_to(centroid)))
                .filter(|(_, d)| *d <= self.match_distance)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            let id = if let Some((id, _)) = best {
                if let Some(track) = self.tracks.get_mut(&id) {
                    track.centroid = centroid;
                    track.age = 0;
                    track.history.push_back(centroid);
                    if track.history.len() > self.history_len {
                        track.history.pop_front();
                    }
                }
                id
            } else {
                self.spawn(centroid)
            };
            claimed.push(id);
            assignments.push(Assignment {
                track_id: id,
                bbox: *bbox,
            });
        }

        // Tracks that got no detection this frame age toward removal.
        self.tracks.retain(|id, track| {
            if claimed.contains(id) {
                return true;
            }
            track.age += 1;
            track.age <= self.max_age
        });

        assignments
    }

    fn spawn(&mut self, centroid: Point) -> TrackId {
        let id = self.next_id;
        self.next_id += 1;
        let mut history = VecDeque::with_capacity(self.history_len);
        history.push_back(centroid);
        self.tracks.insert(
            id,
            Track {
                centroid,
                history,
                age: 0,
            },
        );
        id
    }

    /// Net displacement over the track's history, or `None` while the track
    /// is too new or has moved less than the 20-unit noise floor.
    pub fn direction_of(&self, id: TrackId) -> Option<(i32, i32)> {
        let track = self.tracks.get(&id)?;
        let oldest = *track.history.front()?;
        let newest = *track.history.back()?;
        let dx = newest.x - oldest.x;
        let dy = newest.y - oldest.y;
        if ((dx * dx + dy * dy) as f32).sqrt() < 20.0 {
            return None;
        }
        Some((dx, dy))
    }

    /// Displacement between the last two recorded positions.
    pub fn last_step(&self, id: TrackId) -> Option<(i32, i32)> {
        let track = self.tracks.get(&id)?;
        let n = track.history.len();
        if n < 2 {
            return None;
        }
        let prev = track.history[n - 2];
        let curr = track.history[n - 1];
        Some((curr.x - prev.x, curr.y - prev.y))
    }
}
