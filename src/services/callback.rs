use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::MissionStore;
use crate::models::{CallbackStatus, MissionResult};
use crate::services::limiter::ConcurrencyLimiter;

pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts finished missions to their requesters' webhooks.
///
/// One attempt per result; HTTP 200 is the only success. The outcome is
/// written to the store as the mission's callback status.
pub struct CallbackForwarder {
    http: Client,
    limiter: Arc<ConcurrencyLimiter>,
    store: Arc<dyn MissionStore>,
}

impl CallbackForwarder {
    pub fn new(
        limiter: Arc<ConcurrencyLimiter>,
        store: Arc<dyn MissionStore>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(CALLBACK_TIMEOUT).build()?;
        Ok(Self {
            http,
            limiter,
            store,
        })
    }

    /// Deliver in the background so a slow webhook never stalls the caller.
    pub fn dispatch(self: &Arc<Self>, url: String, payload: MissionResult) -> JoinHandle<CallbackStatus> {
        let forwarder = self.clone();
        tokio::spawn(async move { forwarder.forward(&url, &payload).await })
    }

    /// Deliver once and record the outcome.
    pub async fn forward(&self, url: &str, payload: &MissionResult) -> CallbackStatus {
        info!(task_serial = %payload.task_serial, url, "Posting callback");
        let status = self.deliver(url, payload).await;

        metrics::counter!("callbacks_total", "status" => status.to_string()).increment(1);

        if let Err(e) = self
            .store
            .update_callback_status(&payload.task_serial, status)
            .await
        {
            error!(task_serial = %payload.task_serial, error = %e, "Failed to record callback status");
        }
        status
    }

    /// Single POST attempt; no retry.
    pub async fn deliver(&self, url: &str, payload: &MissionResult) -> CallbackStatus {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(task_serial = %payload.task_serial, error = %e, "Callback limiter closed");
                return CallbackStatus::Failed;
            }
        };

        match self.http.post(url).json(payload).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                info!(task_serial = %payload.task_serial, "Callback delivered");
                CallbackStatus::Success
            }
            Ok(response) => {
                warn!(
                    task_serial = %payload.task_serial,
                    status = response.status().as_u16(),
                    "Callback target rejected result"
                );
                CallbackStatus::Failed
            }
            Err(e) => {
                error!(task_serial = %payload.task_serial, error = %e, "Callback failed");
                CallbackStatus::Failed
            }
        }
    }
}
