// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Depth sources: a remote estimation service or the local heuristic.

use crate::error::JobError;
use async_trait::async_trait;
use depthscape_reconstruction::{estimate_depth, DepthGrid};
use image::{ImageFormat, RgbImage};
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Per-pixel depth estimator.
#[async_trait]
pub trait DepthSource: Send + Sync {
    /// Estimate depth for every pixel of `image`.
    async fn estimate(&self, image: Arc<RgbImage>) -> Result<DepthGrid, JobError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Local monocular estimator built from perspective and atmospheric cues.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDepthSource;

#[async_trait]
impl DepthSource for HeuristicDepthSource {
    async fn estimate(&self, image: Arc<RgbImage>) -> Result<DepthGrid, JobError> {
        let depth = tokio::task::spawn_blocking(move || estimate_depth(&image)).await?;
        Ok(depth)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Response body of the remote depth service.
#[derive(Debug, Deserialize)]
struct DepthResponse {
    width: u32,
    height: u32,
    depth: Vec<f32>,
    confidence: Vec<f32>,
}

impl DepthResponse {
    fn into_grid(self) -> Result<DepthGrid, JobError> {
        DepthGrid::from_planes(self.width, self.height, &self.depth, &self.confidence)
            .map_err(|e| JobError::DependencyUnavailable(format!("Malformed depth response: {e}")))
    }
}

/// Remote depth estimation over HTTP.
///
/// POSTs the PNG-encoded image and expects
/// `{width, height, depth: [f32], confidence: [f32]}` back.
pub struct HttpDepthSource {
    url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpDepthSource {
    /// Create a new client for the service at `url`.
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> JobError {
        if err.is_timeout() {
            JobError::DependencyTimeout(self.timeout.as_secs())
        } else {
            JobError::DependencyUnavailable(format!("Depth request failed: {err}"))
        }
    }
}

#[async_trait]
impl DepthSource for HttpDepthSource {
    async fn estimate(&self, image: Arc<RgbImage>) -> Result<DepthGrid, JobError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| JobError::InvalidImage(format!("PNG encoding failed: {e}")))?;

        let resp = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(png)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            return Err(JobError::DependencyUnavailable(format!(
                "Depth service returned status {}",
                resp.status()
            )));
        }

        let body: DepthResponse = resp
            .json()
            .await
            .map_err(|e| self.map_send_error(e))?;

        body.into_grid()
    }

    fn name(&self) -> &str {
        "http"
    }
}
