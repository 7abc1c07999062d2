// src/source.rs
//
// Seam to the perception collaborator: something that yields per-frame
// observations for one stream. The runner only cares about the error
// taxonomy, which tells it whether to retry, finish, or give up.

use async_trait::async_trait;
use serde_json::Deserializer;
use thiserror::Error;
use tokio::time::{sleep, Duration, Instant};

use crate::types::FrameObservations;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Worth retrying after a pause (decoder hiccup, network stall).
    #[error("transient source failure: {0}")]
    Transient(String),
    /// The stream is over; the runtime winds down cleanly.
    #[error("end of stream")]
    EndOfStream,
    /// No point retrying (bad URL, unsupported format).
    #[error("fatal source failure: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait FrameSource: Send {
    /// Yield the next frame's observations, honoring the stream's frame rate.
    async fn next_frame(&mut self) -> Result<FrameObservations, SourceError>;
}

/// Opens a `FrameSource` for a stream. The runtime goes back through the
/// factory when recovering from a transient failure, and the control plane
/// uses it when starting streams after a registry change.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, stream: &crate::config::StreamConfig)
        -> Result<Box<dyn FrameSource>, SourceError>;
}

/// Factory for [`JsonlSource`], treating the stream URL as a file path.
pub struct JsonlSourceFactory;

#[async_trait]
impl SourceFactory for JsonlSourceFactory {
    async fn open(
        &self,
        stream: &crate::config::StreamConfig,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        let path = stream.url.strip_prefix("file://").unwrap_or(&stream.url);
        Ok(Box::new(JsonlSource::open(path, stream.fps).await?))
    }
}

/// File-backed source: one JSON observation record per line, replayed at the
/// configured frame rate. Stands in for a live perception feed during
/// development and in end-to-end tests.
pub struct JsonlSource {
    records: std::vec::IntoIter<FrameObservations>,
    frame_interval: Duration,
    last_frame_at: Option<Instant>,
}

impl JsonlSource {
    pub async fn open(path: &str, fps: f64) -> Result<Self, SourceError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SourceError::Fatal(format!("cannot open {}: {}", path, e)))?;
        let records: Vec<FrameObservations> = Deserializer::from_str(&contents)
            .into_iter()
            .collect::<Result<_, _>>()
            .map_err(|e| SourceError::Fatal(format!("malformed observation record: {}", e)))?;
        let frame_interval = if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        };
        Ok(Self {
            records: records.into_iter(),
            frame_interval,
            last_frame_at: None,
        })
    }
}

#[async_trait]
impl FrameSource for JsonlSource {
    async fn next_frame(&mut self) -> Result<FrameObservations, SourceError> {
        if let Some(last) = self.last_frame_at {
            let due = last + self.frame_interval;
            let now = Instant::now();
            if due > now {
                sleep(due - now).await;
            }
        }
        self.last_frame_at = Some(Instant::now());
        self.records.next().ok_or(SourceError::EndOfStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jsonl_source_replays_records_then_ends() {
        let dir = std::env::temp_dir().join("vigil-jsonl-source-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frames.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"frame_id":1,"timestamp_ms":0.0,"detections":[]}"#,
                "\n",
                r#"{"frame_id":2,"timestamp_ms":500.0,"detections":[{"bbox":{"x1":0,"y1":0,"x2":20,"y2":20},"class":"person","confidence":0.9}]}"#,
                "\n",
            ),
        )
        .unwrap();

        let mut source = JsonlSource::open(path.to_str().unwrap(), 1_000.0)
            .await
            .unwrap();
        let first = source.next_frame().await.unwrap();
        assert_eq!(first.frame_id, 1);
        let second = source.next_frame().await.unwrap();
        assert_eq!(second.detections.len(), 1);
        assert!(matches!(
            source.next_frame().await,
            Err(SourceError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let result = JsonlSource::open("/nonexistent/frames.jsonl", 2.0).await;
        assert!(matches!(result, Err(SourceError::Fatal(_))));
    }
}
