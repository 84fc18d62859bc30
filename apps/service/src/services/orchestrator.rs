// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Job orchestration: intake, FIFO dispatch to a bounded worker pool, and
//! retention sweeping.

use super::depth::DepthSource;
use super::export::Exporter;
use super::pipeline;
use super::registry::{JobRegistry, Transition};
use crate::config::ServiceConfig;
use crate::error::JobError;
use crate::types::{GenerationRequest, JobSnapshot, JobStatus};
use chrono::Utc;
use depthscape_reconstruction::{downscale_to, CombinedMesh};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

const SUPPORTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// State shared by the orchestrator, the dispatcher and the workers.
pub(crate) struct Shared {
    pub config: ServiceConfig,
    pub registry: Arc<JobRegistry>,
    pub depth: Arc<dyn DepthSource>,
    pub exporter: Option<Arc<dyn Exporter>>,
}

/// Aborts the background tasks once the last orchestrator handle is dropped.
struct BackgroundTasks(Vec<JoinHandle<()>>);

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Handle to the job orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<Uuid>,
    _tasks: Arc<BackgroundTasks>,
}

impl Orchestrator {
    /// Start the dispatcher and the sweeper. Must be called within a tokio runtime.
    pub fn start(
        config: ServiceConfig,
        depth: Arc<dyn DepthSource>,
        exporter: Option<Arc<dyn Exporter>>,
    ) -> Self {
        let pool_size = config.worker_threads.max(1);
        let sweep_interval = Duration::from_secs(config.sweep_interval_secs.max(1));
        let shared = Arc::new(Shared {
            config,
            registry: Arc::new(JobRegistry::new()),
            depth,
            exporter,
        });

        let (queue, receiver) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&shared),
            receiver,
            Arc::new(Semaphore::new(pool_size)),
        ));
        let sweeper = tokio::spawn(sweep(Arc::clone(&shared.registry), sweep_interval));

        tracing::info!(
            pool_size,
            depth_source = shared.depth.name(),
            exporter = shared.exporter.is_some(),
            "Started job orchestrator"
        );

        Self {
            shared,
            queue,
            _tasks: Arc::new(BackgroundTasks(vec![dispatcher, sweeper])),
        }
    }

    /// Accept an encoded image, returning the new job id.
    pub fn submit(&self, bytes: &[u8]) -> Result<Uuid, JobError> {
        let config = &self.shared.config;
        if bytes.is_empty() {
            return Err(JobError::InvalidImage("image is empty".into()));
        }
        if bytes.len() > config.max_image_bytes() {
            return Err(JobError::InvalidImage(format!(
                "image is {} bytes, maximum size is {} MB",
                bytes.len(),
                config.max_image_size_mb
            )));
        }

        let format = image::guess_format(bytes)?;
        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(JobError::InvalidImage(format!(
                "unsupported format {:?}",
                format
            )));
        }

        let (width, height) =
            ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;
        if width == 0 || height == 0 {
            return Err(JobError::InvalidImage("image has no pixels".into()));
        }
        if width.max(height) > config.max_image_dimension {
            return Err(JobError::InvalidImage(format!(
                "image is {}x{}, maximum dimension is {}",
                width, height, config.max_image_dimension
            )));
        }

        let image = image::load_from_memory_with_format(bytes, format)?.to_rgb8();
        let working = downscale_to(&image, config.working_resolution);

        let id = self.shared.registry.create(Utc::now(), config.retention());
        self.shared
            .registry
            .apply(id, Transition::ImageAccepted(Arc::new(working)))?;

        tracing::info!(
            job_id = %id,
            width,
            height,
            format = ?format,
            "Accepted image"
        );
        Ok(id)
    }

    /// Queue a job for generation. The job must be UPLOADED.
    pub fn enqueue(&self, id: Uuid, request: &GenerationRequest) -> Result<JobSnapshot, JobError> {
        let options = request.validate()?;
        let snapshot = self
            .shared
            .registry
            .apply(id, Transition::Enqueued(options))?;

        if self.queue.send(id).is_err() {
            let err = JobError::InvalidState("orchestrator is shut down".into());
            self.shared.registry.apply(id, Transition::Failed(err.clone()))?;
            return Err(err);
        }

        tracing::info!(
            job_id = %id,
            complexity = %options.room_complexity,
            hallucinate = options.hallucinate_unseen,
            interiors = options.generate_interiors,
            "Queued job"
        );
        Ok(snapshot)
    }

    pub fn status(&self, id: Uuid) -> Result<JobSnapshot, JobError> {
        self.shared.registry.snapshot(id)
    }

    /// Combined mesh of a COMPLETED job.
    pub fn result(&self, id: Uuid) -> Result<Arc<CombinedMesh>, JobError> {
        self.shared.registry.result(id)
    }

    /// Exported artifact of a COMPLETED job.
    pub fn artifact(&self, id: Uuid, format: &str) -> Result<Arc<Vec<u8>>, JobError> {
        self.shared.registry.artifact(id, format)
    }

    /// Purge expired jobs now, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        purge(&self.shared.registry)
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait_for(&self, id: Uuid, poll: Duration) -> Result<JobSnapshot, JobError> {
        loop {
            let snapshot = self.status(id)?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.shared.config
    }
}

/// Pull queued jobs in FIFO order; each waits for a pool permit before it
/// moves to PROCESSING.
async fn dispatch(
    shared: Arc<Shared>,
    mut receiver: mpsc::UnboundedReceiver<Uuid>,
    permits: Arc<Semaphore>,
) {
    while let Some(id) = receiver.recv().await {
        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        match shared.registry.apply(id, Transition::WorkerAcquired) {
            Ok(snapshot) if snapshot.status == JobStatus::Processing => {}
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(job_id = %id, error = %err, "Skipping dequeued job");
                continue;
            }
        }

        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            pipeline::run(shared, id).await;
            drop(permit);
        });
    }
    tracing::debug!("Dispatcher stopped");
}

async fn sweep(registry: Arc<JobRegistry>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        purge(&registry);
    }
}

fn purge(registry: &JobRegistry) -> usize {
    let purged = registry.purge_expired(Utc::now());
    if !purged.is_empty() {
        tracing::info!(count = purged.len(), remaining = registry.len(), "Purged expired jobs");
    }
    purged.len()
}
