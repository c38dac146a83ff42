use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::models::PictureRef;
use crate::services::limiter::ConcurrencyLimiter;

pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// One fetched (or failed) picture, handed from the download stage to the
/// inference consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub pic_id: String,
    /// Local artifact; `None` when the picture could not be fetched.
    pub local_path: Option<PathBuf>,
}

impl QueueItem {
    fn fetched(pic_id: &str, path: PathBuf) -> Self {
        Self {
            pic_id: pic_id.to_string(),
            local_path: Some(path),
        }
    }

    fn failed(pic_id: &str) -> Self {
        Self {
            pic_id: pic_id.to_string(),
            local_path: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.local_path.is_some()
    }
}

/// What the download stage writes to a mission's channel.
#[derive(Debug)]
pub enum StageEvent {
    Item(QueueItem),
    /// Written once, after every picture has produced its item.
    EndOfStream,
}

/// Fetches mission pictures into a scratch directory.
///
/// All pictures of a mission are fetched concurrently; the shared limiter
/// bounds how many fetches run at once across every mission in the process.
pub struct DownloadStage {
    http: Client,
    limiter: Arc<ConcurrencyLimiter>,
    image_dir: PathBuf,
}

impl DownloadStage {
    pub fn new(
        limiter: Arc<ConcurrencyLimiter>,
        image_dir: impl Into<PathBuf>,
        accept_invalid_certs: bool,
    ) -> Result<Self, DownloadError> {
        let image_dir = image_dir.into();
        std::fs::create_dir_all(&image_dir)?;

        let http = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            limiter,
            image_dir,
        })
    }

    /// Where the artifact for `(task_serial, pic_id)` lives.
    pub fn artifact_path(&self, task_serial: &str, pic_id: &str) -> PathBuf {
        self.image_dir.join(format!(
            "{}_{}.jpg",
            sanitize_component(task_serial),
            sanitize_component(pic_id)
        ))
    }

    /// Produce one item per picture, then the end-of-stream marker.
    ///
    /// Stops early only if the receiver is gone.
    pub async fn run(
        &self,
        task_serial: &str,
        pictures: &[PictureRef],
        tx: mpsc::Sender<StageEvent>,
    ) {
        let fetches = pictures.iter().map(|picture| {
            let tx = tx.clone();
            async move {
                let item = self.fetch_one(task_serial, picture).await;
                if tx.send(StageEvent::Item(item)).await.is_err() {
                    debug!(task_serial, pic_id = %picture.pic_id, "Consumer gone, dropping item");
                }
            }
        });
        join_all(fetches).await;

        if tx.send(StageEvent::EndOfStream).await.is_err() {
            debug!(task_serial, "Consumer gone before end of stream");
        }
    }

    /// Fetch a single picture. Never fails; problems yield a failed item.
    pub async fn fetch_one(&self, task_serial: &str, picture: &PictureRef) -> QueueItem {
        let Some(url) = picture.resolved_url() else {
            warn!(task_serial, pic_id = %picture.pic_id, "Picture has no download URL");
            return QueueItem::failed(&picture.pic_id);
        };

        let path = self.artifact_path(task_serial, &picture.pic_id);

        // Re-delivered missions reuse what an earlier attempt already fetched.
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(task_serial, pic_id = %picture.pic_id, "Artifact already on disk, skipping fetch");
            return QueueItem::fetched(&picture.pic_id, path);
        }

        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(task_serial, pic_id = %picture.pic_id, error = %e, "Download limiter closed");
                return QueueItem::failed(&picture.pic_id);
            }
        };

        match self.fetch_to(url, &path).await {
            Ok(()) => QueueItem::fetched(&picture.pic_id, path),
            Err(e) => {
                error!(task_serial, pic_id = %picture.pic_id, url, error = %e, "Download failed");
                QueueItem::failed(&picture.pic_id)
            }
        }
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> Result<(), DownloadError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;

        // Write aside and rename so a crash never leaves a partial artifact
        // that the skip-if-present check would trust.
        let partial = path.with_extension("jpg.part");
        let written = async {
            tokio::fs::write(&partial, &body).await?;
            tokio::fs::rename(&partial, path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Keep a serial or picture id usable as part of a file name.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}
