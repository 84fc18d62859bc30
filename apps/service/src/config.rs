// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Service configuration loaded from environment variables.

use depthscape_reconstruction::ReconstructionConfig;
use std::time::Duration;

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human readable output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Parse a format name; anything but `json` falls back to pretty.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Number of jobs processed in parallel.
    pub worker_threads: usize,
    /// Hours a job is kept before the sweeper purges it.
    pub retention_hours: i64,
    /// Seconds between sweeper runs.
    pub sweep_interval_secs: u64,
    /// Maximum image size in MB.
    pub max_image_size_mb: usize,
    /// Maximum image width or height in pixels.
    pub max_image_dimension: u32,
    /// Longer image side after downscaling, before depth estimation.
    pub working_resolution: u32,
    /// Remote depth service endpoint. Unset selects the local heuristic source.
    pub depth_service_url: Option<String>,
    /// Timeout for a single depth request in seconds.
    pub depth_timeout_secs: u64,
    /// Delay before the single depth retry in milliseconds.
    pub depth_retry_backoff_ms: u64,
    /// Export formats produced for every completed job.
    pub export_formats: Vec<String>,
    /// Reconstruction thresholds.
    pub reconstruction: ReconstructionConfig,
    /// Log output format.
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = ReconstructionConfig::default();
        Self {
            worker_threads: std::env::var("WORKER_THREADS")
                .unwrap_or_else(|_| num_cpus::get().to_string())
                .parse()
                .unwrap_or_else(|_| num_cpus::get())
                .max(1),
            retention_hours: std::env::var("JOB_RETENTION_HOURS")
                .unwrap_or_else(|_| "24".into())
                .parse()
                .unwrap_or(24),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".into())
                .parse()
                .unwrap_or(3600),
            max_image_size_mb: std::env::var("MAX_IMAGE_SIZE_MB")
                .unwrap_or_else(|_| "16".into())
                .parse()
                .unwrap_or(16),
            max_image_dimension: std::env::var("MAX_IMAGE_DIMENSION")
                .unwrap_or_else(|_| "8192".into())
                .parse()
                .unwrap_or(8192),
            working_resolution: std::env::var("WORKING_RESOLUTION")
                .unwrap_or_else(|_| "256".into())
                .parse()
                .unwrap_or(256),
            depth_service_url: std::env::var("DEPTH_SERVICE_URL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            depth_timeout_secs: std::env::var("DEPTH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .unwrap_or(30),
            depth_retry_backoff_ms: std::env::var("DEPTH_RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "500".into())
                .parse()
                .unwrap_or(500),
            export_formats: std::env::var("EXPORT_FORMATS")
                .unwrap_or_else(|_| "json".into())
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            reconstruction: ReconstructionConfig {
                confidence_threshold: std::env::var("CONFIDENCE_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.confidence_threshold),
                discontinuity_threshold: std::env::var("DISCONTINUITY_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.discontinuity_threshold),
                focal_length_factor: std::env::var("FOCAL_LENGTH_FACTOR")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.focal_length_factor),
                min_classification_confidence: std::env::var("MIN_CLASSIFICATION_CONFIDENCE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.min_classification_confidence),
            },
            log_format: std::env::var("LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
        }
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_size_mb * 1024 * 1024
    }

    pub fn depth_timeout(&self) -> Duration {
        Duration::from_secs(self.depth_timeout_secs)
    }

    pub fn depth_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.depth_retry_backoff_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
    }

    #[test]
    fn test_derived_durations() {
        let config = ServiceConfig {
            max_image_size_mb: 2,
            depth_timeout_secs: 7,
            depth_retry_backoff_ms: 250,
            retention_hours: 3,
            ..ServiceConfig::from_env()
        };
        assert_eq!(config.max_image_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.depth_timeout(), Duration::from_secs(7));
        assert_eq!(config.depth_retry_backoff(), Duration::from_millis(250));
        assert_eq!(config.retention(), chrono::Duration::hours(3));
    }
}
