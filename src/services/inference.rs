use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::services::parser::{self, Verdict};

/// Budget for one generate call, including model load time.
pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Fixed user turn. The two labels are what the output parser looks for.
pub const USER_INSTRUCTION: &str = "请分析图像，必须严格使用以下两行格式回答，中文或英文标签均可。\n\
Analyze the image and answer in exactly two lines, with either the Chinese or the English labels.\n\
理由：[原因] / Reason: [why]\n\
结果：[TRUE或FALSE] / Result: [TRUE or FALSE]";

/// Decoding options pinned for format compliance.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DecodingOptions {
    pub temperature: f64,
    /// Context window in tokens.
    pub num_ctx: u32,
    pub top_p: f64,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            num_ctx: 6140,
            top_p: 0.01,
        }
    }
}

/// Body of a non-streaming generate request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub images: Vec<String>,
    pub stream: bool,
    pub options: DecodingOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

/// The vision model: image plus instructions in, free text out.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, InferenceError>;
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaClient {
    http: Client,
    url: String,
}

impl OllamaClient {
    pub fn new(url: impl Into<String>) -> Result<Self, InferenceError> {
        let http = Client::builder()
            .timeout(INFERENCE_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::Other(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl VisionModel for OllamaClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, InferenceError> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(InferenceError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Inference service returned an error status");
            return Err(InferenceError::Http(status.as_u16()));
        }

        let body = response.bytes().await.map_err(InferenceError::from_transport)?;
        let parsed: GenerateResponse =
            serde_json::from_slice(&body).map_err(|_| InferenceError::Protocol)?;
        parsed.response.ok_or(InferenceError::Protocol)
    }
}

/// Turns an image and a system instruction into a verdict.
///
/// Calls are serialized through `accelerator`: only one request is ever in
/// flight per lock, however many missions share the adapter. Every failure
/// is reported as `verdict = false` with a diagnostic reason.
pub struct InferenceAdapter {
    model: Arc<dyn VisionModel>,
    model_name: String,
    options: DecodingOptions,
    accelerator: Arc<Mutex<()>>,
}

impl InferenceAdapter {
    pub fn new(
        model: Arc<dyn VisionModel>,
        model_name: impl Into<String>,
        accelerator: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            options: DecodingOptions::default(),
            accelerator,
        }
    }

    pub fn build_request(&self, image_base64: &str, system_instruction: &str) -> GenerateRequest {
        GenerateRequest {
            model: self.model_name.clone(),
            system: system_instruction.to_string(),
            prompt: USER_INSTRUCTION.to_string(),
            images: vec![image_base64.to_string()],
            stream: false,
            options: self.options.clone(),
        }
    }

    pub async fn infer(&self, image_base64: &str, system_instruction: &str) -> Verdict {
        match self.try_infer(image_base64, system_instruction).await {
            Ok(verdict) => verdict,
            Err(e) => Verdict {
                verdict: false,
                reason: e.to_string(),
            },
        }
    }

    async fn try_infer(
        &self,
        image_base64: &str,
        system_instruction: &str,
    ) -> Result<Verdict, InferenceError> {
        if image_base64.is_empty() {
            error!("Aborting inference: image data is empty");
            return Err(InferenceError::EmptyImage);
        }

        let request = self.build_request(image_base64, system_instruction);

        let raw = {
            let _accelerator = self.accelerator.lock().await;
            let start = Instant::now();
            let outcome = self.model.generate(&request).await;
            metrics::histogram!("inference_seconds").record(start.elapsed().as_secs_f64());
            outcome?
        };

        info!(output = %raw.trim(), "Model output");

        parser::parse_output(&raw).map_err(|e| {
            warn!(excerpt = %e.excerpt, "Could not find a verdict in model output");
            InferenceError::Parse(e)
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("HTTP Error {0}")]
    Http(u16),

    #[error("Connection Refused")]
    ConnectionRefused,

    #[error("Timeout")]
    Timeout,

    #[error("Protocol Error")]
    Protocol,

    #[error("Image Error: No base64 data")]
    EmptyImage,

    #[error(transparent)]
    Parse(#[from] parser::ParseError),

    #[error("Exception: {0}")]
    Other(String),
}

impl InferenceError {
    /// Classify a reqwest failure.
    pub fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::ConnectionRefused
        } else if e.is_decode() {
            Self::Protocol
        } else {
            Self::Other(e.to_string())
        }
    }
}
