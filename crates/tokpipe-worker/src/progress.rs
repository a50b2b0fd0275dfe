//! Render progress persisted onto the job record.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use tokpipe_media::ProgressSink;
use tokpipe_models::{Clock, JobId};
use tokpipe_store::Store;

/// Forwards render checkpoints to a writer task without blocking the render.
///
/// The renderer reports 0-100; the sink rescales that into the job-level
/// band `[floor, ceiling]` so the overall bar never moves backwards.
pub struct StoreProgressSink {
    tx: mpsc::UnboundedSender<(u8, String)>,
    floor: u8,
    ceiling: u8,
}

/// Writes checkpoints in the order they were reported.
pub struct ProgressWriter {
    handle: JoinHandle<()>,
}

impl StoreProgressSink {
    pub fn spawn(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        job_id: JobId,
        floor: u8,
        ceiling: u8,
    ) -> (Self, ProgressWriter) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(u8, String)>();

        let handle = tokio::spawn(async move {
            while let Some((progress, step)) = rx.recv().await {
                if let Err(e) = store
                    .set_job_progress(&job_id, progress, &step, clock.now())
                    .await
                {
                    debug!(job_id = %job_id, "Progress write failed: {}", e);
                }
            }
        });

        let sink = Self {
            tx,
            floor: floor.min(ceiling),
            ceiling,
        };
        (sink, ProgressWriter { handle })
    }

    pub fn scale(&self, percent: u8) -> u8 {
        let span = (self.ceiling - self.floor) as u32;
        self.floor + (span * percent.min(100) as u32 / 100) as u8
    }
}

impl ProgressSink for StoreProgressSink {
    fn report(&self, percent: u8, step: &str) {
        let _ = self.tx.send((self.scale(percent), step.to_string()));
    }
}

impl ProgressWriter {
    /// Close the sink and wait until every queued checkpoint is written.
    pub async fn finish(self, sink: StoreProgressSink) {
        drop(sink);
        if let Err(e) = self.handle.await {
            debug!("Progress writer ended abnormally: {}", e);
        }
    }
}
