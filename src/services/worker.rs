use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::models::MissionResult;
use crate::services::pipeline::MissionPipeline;
use crate::services::queue::{JobQueue, QueueError};

/// Pause after a failed iteration before popping again.
pub const WORKER_BACKOFF: Duration = Duration::from_secs(5);

/// Pop a mission, run it, push its result; repeat.
///
/// There is no acknowledgment: a mission whose iteration fails is logged and
/// dropped, and the loop moves on to the next queue item.
pub struct Worker {
    id: usize,
    queue: Arc<JobQueue>,
    pipeline: Arc<MissionPipeline>,
    backoff: Duration,
}

impl Worker {
    pub fn new(id: usize, queue: Arc<JobQueue>, pipeline: Arc<MissionPipeline>) -> Self {
        Self {
            id,
            queue,
            pipeline,
            backoff: WORKER_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn run(self) {
        info!(worker = self.id, "Worker loop started");
        loop {
            match self.process_next().await {
                Ok(result) => {
                    debug!(worker = self.id, task_serial = %result.task_serial, state = "IDLE", "Ready for next mission");
                }
                Err(e) => {
                    error!(worker = self.id, error = %e, "Worker iteration failed, backing off");
                    sleep(self.backoff).await;
                }
            }
        }
    }

    /// One IDLE -> RUNNING -> PUSH_RESULT cycle.
    pub async fn process_next(&self) -> Result<MissionResult, QueueError> {
        let mission = self.queue.next_mission().await?;
        debug!(worker = self.id, task_serial = %mission.task_serial, state = "RUNNING", "Mission popped");

        let result = self.pipeline.run(&mission).await;

        debug!(worker = self.id, task_serial = %result.task_serial, state = "PUSH_RESULT", "Pushing result");
        self.queue.push_result(&result).await?;
        metrics::counter!("missions_processed_total").increment(1);

        info!(worker = self.id, task_serial = %result.task_serial, "Mission done");
        Ok(result)
    }
}
