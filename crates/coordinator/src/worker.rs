//! CaptureWorker - serialized capture-and-tag execution
//!
//! One worker task drains an unbounded queue of `CaptureRequest`s in arrival
//! order, so at most one capture runs at a time and no trigger is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{CaptureDevice, CaptureOutcome, CaptureRequest, CaptureStatus, Geotagger};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::sequence::SequenceCounter;
use crate::stats::CaptureStats;

/// Per-capture policy
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub capture_timeout: Duration,
    pub geotag_enabled: bool,
    pub stale_position_after: Duration,
}

/// Shared state the worker publishes into
#[derive(Clone)]
pub struct WorkerContext {
    pub counter: Arc<SequenceCounter>,
    pub stats: Arc<CaptureStats>,
    pub outcomes: broadcast::Sender<CaptureOutcome>,
}

/// Cloneable sender side of the capture queue
#[derive(Clone)]
pub struct CaptureQueue {
    tx: mpsc::UnboundedSender<CaptureRequest>,
}

impl CaptureQueue {
    /// Queue a capture
    ///
    /// Returns false once the worker has shut down.
    pub fn enqueue(&self, request: CaptureRequest) -> bool {
        match self.tx.send(request) {
            Ok(()) => true,
            Err(mpsc::error::SendError(request)) => {
                error!(source = %request.source, "capture worker closed, trigger lost");
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<CaptureRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Handle to a running capture worker
pub struct CaptureWorker {
    queue: CaptureQueue,
    worker_handle: JoinHandle<()>,
}

impl CaptureWorker {
    /// Spawn the worker task writing into `storage_root`
    pub fn spawn<C, G>(
        camera: C,
        geotagger: G,
        storage_root: PathBuf,
        settings: WorkerSettings,
        context: WorkerContext,
    ) -> Self
    where
        C: CaptureDevice + Send + Sync + 'static,
        G: Geotagger + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker_handle = tokio::spawn(async move {
            capture_worker(camera, geotagger, storage_root, settings, context, rx).await;
        });

        Self {
            queue: CaptureQueue { tx },
            worker_handle,
        }
    }

    /// Sender for the router
    pub fn queue(&self) -> CaptureQueue {
        self.queue.clone()
    }

    /// Finish every queued capture, then stop
    ///
    /// Other `CaptureQueue` clones must be dropped first.
    #[instrument(name = "capture_worker_shutdown", skip(self))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.queue);
        if let Err(e) = self.worker_handle.await {
            error!(error = ?e, "capture worker panicked");
        }
        debug!("capture worker shutdown complete");
    }
}

#[instrument(
    name = "capture_worker_loop",
    skip_all,
    fields(storage_root = %storage_root.display())
)]
async fn capture_worker<C, G>(
    camera: C,
    geotagger: G,
    storage_root: PathBuf,
    settings: WorkerSettings,
    context: WorkerContext,
    mut rx: mpsc::UnboundedReceiver<CaptureRequest>,
) where
    C: CaptureDevice + Send + Sync,
    G: Geotagger + Send + Sync,
{
    debug!(camera = camera.name(), geotagger = geotagger.name(), "capture worker started");

    while let Some(request) = rx.recv().await {
        let outcome = handle_request(&camera, &geotagger, &storage_root, &settings, &context, request).await;

        context.stats.record(&outcome);
        observability::record_capture_outcome(&outcome);
        // No subscriber is fine
        let _ = context.outcomes.send(outcome);
    }

    debug!("capture worker stopped");
}

/// Capture, tag, advance the counter (exactly once)
async fn handle_request<C, G>(
    camera: &C,
    geotagger: &G,
    storage_root: &Path,
    settings: &WorkerSettings,
    context: &WorkerContext,
    request: CaptureRequest,
) -> CaptureOutcome
where
    C: CaptureDevice + Send + Sync,
    G: Geotagger + Send + Sync,
{
    let started = Instant::now();
    let sequence = context.counter.current();
    let identifier = sequence.to_string();
    let position = request.tag_position();
    let position_known = request.position.is_some();
    let position_age = request.position_age();

    match position_age {
        Some(age) if age > settings.stale_position_after => warn!(
            sequence,
            age_ms = age.as_millis() as u64,
            "position is stale, tagging anyway"
        ),
        None => warn!(sequence, "no position received yet, tagging with zeros"),
        _ => {}
    }

    let captured =
        tokio::time::timeout(settings.capture_timeout, camera.capture(storage_root, &identifier)).await;

    let (image_path, status) = match captured {
        Ok(Ok(path)) => {
            let status = if !settings.geotag_enabled {
                CaptureStatus::TagSkipped
            } else {
                match geotagger.tag(&path, &position).await {
                    Ok(()) => CaptureStatus::Tagged,
                    Err(e) => {
                        warn!(sequence, path = %path.display(), error = %e, "geotag failed");
                        CaptureStatus::TagFailed(e.to_string())
                    }
                }
            };
            (Some(path), status)
        }
        Ok(Err(e)) => {
            warn!(sequence, error = %e, "capture failed");
            (None, CaptureStatus::CaptureFailed(e.to_string()))
        }
        Err(_) => {
            let reason = format!(
                "capture timed out after {} ms",
                settings.capture_timeout.as_millis()
            );
            warn!(sequence, "{reason}");
            (None, CaptureStatus::CaptureFailed(reason))
        }
    };

    let next = context.counter.advance();
    debug!(sequence, next, "sequence advanced");

    let outcome = CaptureOutcome {
        sequence,
        source: request.source,
        image_path,
        position,
        position_known,
        position_age,
        status,
        duration: started.elapsed(),
    };

    if let Some(path) = &outcome.image_path {
        info!(
            sequence,
            source = %outcome.source,
            path = %path.display(),
            lat = position.latitude_deg,
            lon = position.longitude_deg,
            alt = position.relative_altitude_m,
            status = outcome.status.label(),
            "image captured"
        );
    }
    outcome
}
