use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub window: WindowConfig,
}

/// Tuning for the producer/consumer frame pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of queued slices before the producer's pushes are
    /// dropped.
    pub capacity: usize,
    /// Lag in milliseconds past which queued slices are considered stale
    /// and skipped over.
    pub skip_threshold_ms: u64,
    /// Minimum spacing in milliseconds between slice timestamps, to keep
    /// burst deliveries from looking stale.
    pub slice_stride_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            skip_threshold_ms: 100,
            slice_stride_ms: 15,
        }
    }
}

impl PipelineConfig {
    pub fn skip_threshold(&self) -> Duration {
        Duration::from_millis(self.skip_threshold_ms)
    }

    pub fn slice_stride(&self) -> Duration {
        Duration::from_millis(self.slice_stride_ms)
    }
}

/// Initial output window geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "WaveScene".to_string(),
        }
    }
}
