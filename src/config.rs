// src/config.rs
//
// Two configuration surfaces: the process-wide engine config loaded once from
// YAML at startup, and the stream registry document (JSON) that the control
// plane mutates and persists across restarts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::Point;

// ---------------------------------------------------------------------------
// Engine config (config.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtime: RuntimeConfig,
    pub tracker: TrackerConfig,
    pub alerts: AlertConfig,
    pub logging: LoggingConfig,
    /// Path of the persisted stream registry document.
    pub registry_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            tracker: TrackerConfig::default(),
            alerts: AlertConfig::default(),
            logging: LoggingConfig::default(),
            registry_path: "streams.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads beyond one-per-stream.
    pub worker_headroom: usize,
    /// How long to wait for the next frame before treating the source as
    /// stalled.
    pub frame_wait_ms: u64,
    /// Pause before reopening a source after a transient failure.
    pub retry_pause_ms: u64,
    /// How long a stop request waits for the stream task to drain before the
    /// task is aborted.
    pub drain_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_headroom: 2,
            frame_wait_ms: 5_000,
            retry_pause_ms: 1_000,
            drain_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_age: u32,
    pub match_distance: f32,
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 10,
            match_distance: 80.0,
            history_len: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Per-stream per-kind debounce floor.
    pub cooldown_secs: f64,
    /// Alert bus capacity; oldest alerts are dropped past this.
    pub max_pending: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 5.0,
            max_pending: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path))?;
        let config: EngineConfig =
            serde_yaml::from_str(&contents).context("failed to parse config file")?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Stream registry (streams.json)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticKind {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOrientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl FlowDirection {
    /// Direction label in outbound alert phrasing.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LeftToRight => "Left to Right",
            Self::RightToLeft => "Right to Left",
            Self::TopToBottom => "Top to Bottom",
            Self::BottomToTop => "Bottom to Top",
        }
    }
}

/// One analytic attached to a stream. Tunables the analytic does not use are
/// simply ignored, so a single shape covers all kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticConfig {
    #[serde(rename = "type")]
    pub kind: AnalyticKind,
    /// Closed region of interest, where the analytic takes one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roi: Vec<Point>,
    /// Crossing lines for entry/exit counting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_line: Option<[Point; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_line: Option<[Point; 2]>,
    #[serde(default = "default_line_orientation")]
    pub line_orientation: LineOrientation,
    /// Object classes the intrusion analytics watch.
    #[serde(default = "default_intrusion_classes")]
    pub classes: Vec<String>,
    #[serde(default = "default_loiter_secs")]
    pub loiter_secs: f64,
    #[serde(default = "default_formation_threshold")]
    pub formation_threshold: usize,
    #[serde(default = "default_crowd_duration_secs")]
    pub formation_duration_secs: f64,
    #[serde(default = "default_dispersion_threshold")]
    pub dispersion_threshold: usize,
    #[serde(default = "default_crowd_duration_secs")]
    pub dispersion_duration_secs: f64,
    #[serde(default = "default_estimation_threshold")]
    pub estimation_threshold: f64,
    #[serde(default = "default_crowd_duration_secs")]
    pub estimation_duration_secs: f64,
    #[serde(default = "default_flow_direction")]
    pub expected_direction: FlowDirection,
}

fn default_line_orientation() -> LineOrientation {
    LineOrientation::Horizontal
}

fn default_intrusion_classes() -> Vec<String> {
    vec!["person".to_string()]
}

fn default_loiter_secs() -> f64 {
    30.0
}

fn default_formation_threshold() -> usize {
    5
}

fn default_dispersion_threshold() -> usize {
    10
}

fn default_estimation_threshold() -> f64 {
    15.0
}

fn default_crowd_duration_secs() -> f64 {
    10.0
}

fn default_flow_direction() -> FlowDirection {
    FlowDirection::LeftToRight
}

impl AnalyticConfig {
    pub fn new(kind: AnalyticKind) -> Self {
        Self {
            kind,
            roi: Vec::new(),
            entry_line: None,
            exit_line: None,
            line_orientation: default_line_orientation(),
            classes: default_intrusion_classes(),
            loiter_secs: default_loiter_secs(),
            formation_threshold: default_formation_threshold(),
            formation_duration_secs: default_crowd_duration_secs(),
            dispersion_threshold: default_dispersion_threshold(),
            dispersion_duration_secs: default_crowd_duration_secs(),
            estimation_threshold: default_estimation_threshold(),
            estimation_duration_secs: default_crowd_duration_secs(),
            expected_direction: default_flow_direction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub analytics: Vec<AnalyticConfig>,
}

fn default_fps() -> f64 {
    2.0
}

/// On-disk shape of the stream registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

impl RegistryDocument {
    /// Load the persisted registry; a missing file is an empty registry.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stream registry: {}", path))?;
        let doc: RegistryDocument =
            serde_json::from_str(&contents).context("failed to parse stream registry")?;
        Ok(doc)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write stream registry: {}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config: EngineConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.tracker.max_age, 10);
        assert_eq!(config.tracker.match_distance, 80.0);
        assert_eq!(config.alerts.cooldown_secs, 5.0);
        assert_eq!(config.registry_path, "streams.json");
    }

    #[test]
    fn test_engine_config_partial_override() {
        let yaml = "tracker:\n  max_age: 25\nlogging:\n  level: debug\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tracker.max_age, 25);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.alerts.cooldown_secs, 5.0);
    }

    #[test]
    fn test_analytic_config_defaults_from_minimal_json() {
        let json = r#"{"type": "loitering"}"#;
        let analytic: AnalyticConfig = serde_json::from_str(json).unwrap();
        assert_eq!(analytic.kind, AnalyticKind::Loitering);
        assert_eq!(analytic.loiter_secs, 30.0);
        assert_eq!(analytic.formation_threshold, 5);
        assert_eq!(analytic.estimation_threshold, 15.0);
        assert_eq!(analytic.expected_direction, FlowDirection::LeftToRight);
        assert_eq!(analytic.classes, vec!["person".to_string()]);
    }

    #[test]
    fn test_stream_config_round_trip() {
        let json = r#"{
            "id": "cam-01",
            "url": "rtsp://example/stream",
            "name": "Lobby",
            "fps": 4.0,
            "analytics": [
                {"type": "intrusion", "roi": [{"x":0,"y":0},{"x":100,"y":0},{"x":100,"y":100}]},
                {"type": "entry_exit_count", "entry_line": [{"x":0,"y":50},{"x":100,"y":50}]}
            ]
        }"#;
        let stream: StreamConfig = serde_json::from_str(json).unwrap();
        assert_eq!(stream.analytics.len(), 2);
        assert_eq!(stream.analytics[0].roi.len(), 3);
        assert!(stream.analytics[1].entry_line.is_some());

        let back = serde_json::to_string(&stream).unwrap();
        let again: StreamConfig = serde_json::from_str(&back).unwrap();
        assert_eq!(again.id, "cam-01");
        assert_eq!(again.fps, 4.0);
    }

    #[test]
    fn test_registry_missing_file_is_empty() {
        let doc = RegistryDocument::load("/nonexistent/streams.json").unwrap();
        assert!(doc.streams.is_empty());
    }
}
