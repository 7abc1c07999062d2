// src/types.rs
//
// Core data model shared by the tracker, the analytics evaluators and the
// stream runtime. Everything here is plain data; behavior lives elsewhere.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates, `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer midpoint of the box.
    pub fn centroid(&self) -> Point {
        Point {
            x: (self.x1 + self.x2) / 2,
            y: (self.y1 + self.y2) / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        dx.hypot(dy)
    }
}

/// One object reported by the perception collaborator for a single frame.
/// Confidence filtering for the watched classes happens upstream; the engine
/// only filters by class membership and region geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub class: String,
    pub confidence: f32,
    /// Attribute map derived upstream (person attributes, dominant color).
    /// Forwarded verbatim by intrusion-with-attributes alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
}

/// 17-point pose skeleton aligned to one detection. COCO keypoint order;
/// entries the pose model could not resolve are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeypointSet {
    pub points: Vec<Option<(f32, f32)>>,
}

// COCO keypoint indices used by the waving-hand evaluator.
pub const KP_LEFT_SHOULDER: usize = 5;
pub const KP_RIGHT_SHOULDER: usize = 6;
pub const KP_LEFT_ELBOW: usize = 7;
pub const KP_RIGHT_ELBOW: usize = 8;
pub const KP_LEFT_WRIST: usize = 9;
pub const KP_RIGHT_WRIST: usize = 10;

impl KeypointSet {
    pub fn get(&self, idx: usize) -> Option<(f32, f32)> {
        self.points.get(idx).copied().flatten()
    }
}

/// Density-model output for one frame: scalar head count plus a coarse grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdEstimate {
    pub count: f64,
    #[serde(default)]
    pub density: Vec<Vec<f32>>,
}

/// Everything the perception collaborator delivers for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameObservations {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// Aligned to `detections` by index when present.
    #[serde(default)]
    pub keypoints: Vec<Option<KeypointSet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crowd: Option<CrowdEstimate>,
}

/// Reference to the frame an alert was raised on. The frame pixels stay with
/// the acquisition collaborator; the engine only hands back the identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrameRef {
    pub frame_id: u64,
    pub timestamp_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Intrusion,
    IntrusionWithAttributes,
    Loitering,
    DirectionArrow,
    WrongDirection,
    CrowdFormation,
    CrowdDispersion,
    CrowdEstimation,
    Fall,
    FireAndSmoke,
    WavingHand,
    WaitingTime,
    EntryExitCount,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intrusion => "intrusion",
            Self::IntrusionWithAttributes => "intrusion_with_attributes",
            Self::Loitering => "loitering",
            Self::DirectionArrow => "direction_arrow",
            Self::WrongDirection => "wrong_direction",
            Self::CrowdFormation => "crowd_formation",
            Self::CrowdDispersion => "crowd_dispersion",
            Self::CrowdEstimation => "crowd_estimation",
            Self::Fall => "fall",
            Self::FireAndSmoke => "fire_and_smoke",
            Self::WavingHand => "waving_hand",
            Self::WaitingTime => "waiting_time",
            Self::EntryExitCount => "entry_exit_count",
        }
    }

    /// Event label used in outbound payloads.
    pub fn event_label(&self) -> &'static str {
        match self {
            Self::Intrusion => "Intrusion Detected",
            Self::IntrusionWithAttributes => "Intrusion Detected",
            Self::Loitering => "Loitering Detected",
            Self::DirectionArrow => "Directional Alarms Detected",
            Self::WrongDirection => "Wrong Direction Detected",
            Self::CrowdFormation => "Crowd Formation Detected",
            Self::CrowdDispersion => "Crowd Dispersion Detected",
            Self::CrowdEstimation => "Crowd Estimation Detected",
            Self::Fall => "Fall Detected",
            Self::FireAndSmoke => "Fire Smoke Detected",
            Self::WavingHand => "Waving Detected",
            Self::WaitingTime => "Waiting Time Detected",
            Self::EntryExitCount => "Person In Out Detected",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert produced by an evaluator. Ephemeral: the engine does not retain
/// alerts after handing them to the dispatch collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub stream_id: String,
    pub kind: AlertKind,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    pub timestamp_ms: f64,
    pub frame: FrameRef,
}

impl AlertEvent {
    pub fn new(stream_id: &str, kind: AlertKind, frame: FrameRef) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            kind,
            event: kind.event_label(),
            remark: None,
            parameters: None,
            timestamp_ms: frame.timestamp_ms,
            frame,
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_parameters(mut self, params: serde_json::Value) -> Self {
        self.parameters = Some(params);
        self
    }
}
