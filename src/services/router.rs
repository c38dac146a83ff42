use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::db::{MissionStore, StoreError};
use crate::models::{CallbackStatus, MissionResult};
use crate::services::callback::CallbackForwarder;
use crate::services::queue::{JobQueue, QueueError};

pub const ROUTER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Drains the result queue: persist, then hand off to the callback forwarder.
pub struct ResultRouter {
    queue: Arc<JobQueue>,
    store: Arc<dyn MissionStore>,
    forwarder: Arc<CallbackForwarder>,
    retry_delay: Duration,
}

/// What happened to one popped result.
#[derive(Debug)]
pub enum Routed {
    /// Persisted; the callback is in flight on this task.
    Forwarding(JoinHandle<CallbackStatus>),
    /// Mission unknown or already completed; nothing forwarded.
    Skipped,
    /// Persisted, but there is nowhere to send it.
    NoCallbackUrl,
}

impl ResultRouter {
    pub fn new(
        queue: Arc<JobQueue>,
        store: Arc<dyn MissionStore>,
        forwarder: Arc<CallbackForwarder>,
    ) -> Self {
        Self {
            queue,
            store,
            forwarder,
            retry_delay: ROUTER_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Route results forever.
    pub async fn run(self) {
        info!("Result router started");
        loop {
            if let Err(e) = self.route_next().await {
                error!(error = %e, "Result routing failed");
                sleep(self.retry_delay).await;
            }
        }
    }

    /// Block for the next result and route it.
    ///
    /// A store failure puts the result back on the queue, leaving the
    /// mission PENDING.
    pub async fn route_next(&self) -> Result<Routed, RouterError> {
        let result = self.queue.next_result().await?;
        info!(task_serial = %result.task_serial, pictures = result.data.len(), "Received result");
        metrics::counter!("results_routed_total").increment(1);

        let callback_url = match self.store.callback_url(&result.task_serial).await {
            Ok(url) => url,
            Err(e) => return Err(self.requeue(&result, e).await),
        };

        match self.store.complete_mission(&result).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(task_serial = %result.task_serial, "Mission unknown or already completed, not forwarding");
                return Ok(Routed::Skipped);
            }
            Err(e) => return Err(self.requeue(&result, e).await),
        }

        match callback_url {
            Some(url) => Ok(Routed::Forwarding(self.forwarder.dispatch(url, result))),
            None => {
                warn!(task_serial = %result.task_serial, "No callback URL found");
                Ok(Routed::NoCallbackUrl)
            }
        }
    }

    async fn requeue(&self, result: &MissionResult, cause: StoreError) -> RouterError {
        if let Err(e) = self.queue.push_result(result).await {
            error!(task_serial = %result.task_serial, error = %e, "Failed to requeue result, dropping it");
        } else {
            warn!(task_serial = %result.task_serial, error = %cause, "Store unavailable, result requeued");
        }
        RouterError::Store(cause)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
