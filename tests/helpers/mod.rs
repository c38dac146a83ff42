//! Shared test doubles: in-memory store, scripted vision model and local
//! HTTP servers standing in for image hosts and callback targets.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use mission_dispatch::db::{MissionStore, StoreError};
use mission_dispatch::models::{
    CallbackStatus, Mission, MissionRecord, MissionResult, MissionStatus, PictureRecord,
};
use mission_dispatch::services::inference::{GenerateRequest, InferenceError, VisionModel};

/// Tracks how many operations overlap.
#[derive(Default)]
pub struct Overlap {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl Overlap {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Vision model that answers every request with the same text.
pub struct MockModel {
    reply: String,
    delay: Duration,
    pub calls: Overlap,
}

impl MockModel {
    pub fn new(reply: &str) -> Self {
        Self::with_delay(reply, Duration::ZERO)
    }

    pub fn with_delay(reply: &str, delay: Duration) -> Self {
        Self {
            reply: reply.to_string(),
            delay,
            calls: Overlap::default(),
        }
    }
}

#[async_trait]
impl VisionModel for MockModel {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, InferenceError> {
        assert_eq!(request.images.len(), 1);
        self.calls.enter();
        tokio::time::sleep(self.delay).await;
        self.calls.exit();
        Ok(self.reply.clone())
    }
}

/// `MissionStore` kept in a map.
#[derive(Default)]
pub struct MemoryStore {
    missions: Mutex<HashMap<String, MissionRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task_serial: &str) -> Option<MissionRecord> {
        self.missions.lock().unwrap().get(task_serial).cloned()
    }

    /// While set, result bookkeeping fails as if the pool were exhausted.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn save_mission(&self, mission: &Mission) -> Result<(), StoreError> {
        let now = Utc::now();
        let record = MissionRecord {
            task_serial: mission.task_serial.clone(),
            mission_type: mission.mission_type.clone(),
            callback_url: mission.callback_url.clone(),
            status: MissionStatus::Pending,
            callback_status: CallbackStatus::Waiting,
            created_at: now,
            updated_at: now,
            pictures: mission
                .picture_list
                .iter()
                .map(|p| PictureRecord {
                    pic_id: p.pic_id.clone(),
                    download_url: p.resolved_url().map(str::to_string),
                    result: None,
                    reason: None,
                })
                .collect(),
        };
        self.missions
            .lock()
            .unwrap()
            .insert(mission.task_serial.clone(), record);
        Ok(())
    }

    async fn complete_mission(&self, result: &MissionResult) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut missions = self.missions.lock().unwrap();
        let Some(record) = missions.get_mut(&result.task_serial) else {
            return Ok(false);
        };
        if record.status != MissionStatus::Pending {
            return Ok(false);
        }
        record.status = MissionStatus::Completed;
        record.updated_at = Utc::now();
        for outcome in &result.data {
            for picture in record.pictures.iter_mut().filter(|p| p.pic_id == outcome.pic_id) {
                picture.result = Some(outcome.verdict);
                picture.reason = Some(outcome.reason.clone());
            }
        }
        Ok(true)
    }

    async fn callback_url(&self, task_serial: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self
            .missions
            .lock()
            .unwrap()
            .get(task_serial)
            .map(|r| r.callback_url.clone()))
    }

    async fn update_callback_status(
        &self,
        task_serial: &str,
        status: CallbackStatus,
    ) -> Result<(), StoreError> {
        if let Some(record) = self.missions.lock().unwrap().get_mut(task_serial) {
            record.callback_status = status;
        }
        Ok(())
    }

    async fn get_mission(&self, task_serial: &str) -> Result<Option<MissionRecord>, StoreError> {
        Ok(self.record(task_serial))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Encoded PNG of a solid colour.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 90, 160]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Bind an axum router on an ephemeral localhost port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Image host: `/img/{name}` serves a PNG, `/garbage` serves non-image bytes,
/// anything else is 404.
pub struct ImageHost {
    pub base_url: String,
    pub fetches: Arc<Overlap>,
}

struct ImageHostState {
    fetches: Arc<Overlap>,
    delay: Duration,
    png: Vec<u8>,
}

impl ImageHost {
    pub async fn start(delay: Duration) -> Self {
        let fetches = Arc::new(Overlap::default());
        let state = Arc::new(ImageHostState {
            fetches: fetches.clone(),
            delay,
            png: png_bytes(1024, 768),
        });
        let router = Router::new()
            .route("/img/{name}", get(serve_image))
            .route("/garbage", get(|| async { "this is not an image" }))
            .with_state(state);
        let addr = serve(router).await;
        Self {
            base_url: format!("http://{addr}"),
            fetches,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn serve_image(State(state): State<Arc<ImageHostState>>) -> impl IntoResponse {
    state.fetches.enter();
    tokio::time::sleep(state.delay).await;
    state.fetches.exit();
    ([(header::CONTENT_TYPE, "image/png")], state.png.clone())
}

/// Webhook target answering every POST to `/hook` with a fixed status.
pub struct CallbackTarget {
    pub url: String,
    pub received: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl CallbackTarget {
    pub async fn start(status: StatusCode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/hook",
                post(
                    |State((status, received)): State<(StatusCode, Arc<Mutex<Vec<serde_json::Value>>>)>,
                     Json(body): Json<serde_json::Value>| async move {
                        received.lock().unwrap().push(body);
                        status
                    },
                ),
            )
            .with_state((status, received.clone()));
        let addr = serve(router).await;
        Self {
            url: format!("http://{addr}/hook"),
            received,
        }
    }

    pub fn hits(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}
