// src/pipeline/mod.rs

pub mod alert_bus;
pub mod metrics;
pub mod runner;

pub use alert_bus::AlertBus;
pub use metrics::{MetricsSummary, StreamMetrics};
pub use runner::StreamRuntime;
