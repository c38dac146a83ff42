use serde::Deserialize;

pub mod instructions;

pub use instructions::InstructionSet;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Dispatch server bind address (e.g., "0.0.0.0:8000"). Unused by workers.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Only the dispatch server needs it.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection string for the mission and result queues
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_task_queue")]
    pub task_queue: String,

    #[serde(default = "default_result_queue")]
    pub result_queue: String,

    /// Generate endpoint of the vision inference service
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    /// Scratch directory for downloaded pictures
    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    /// TOML file mapping mission type to system instruction
    #[serde(default = "default_instructions_path")]
    pub instructions_path: String,

    /// Instruction key used when a mission type is unknown
    #[serde(default = "default_fallback_instruction")]
    pub fallback_instruction: String,

    /// Process-wide ceiling on simultaneous picture fetches
    #[serde(default = "default_download_permits")]
    pub download_permits: usize,

    /// Process-wide ceiling on simultaneous callback posts
    #[serde(default = "default_callback_permits")]
    pub callback_permits: usize,

    /// Number of worker loops sharing one pipeline in a worker process
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,

    /// Skip TLS certificate verification when fetching pictures
    #[serde(default)]
    pub download_accept_invalid_certs: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6380".to_string()
}

fn default_task_queue() -> String {
    "queue:missions".to_string()
}

fn default_result_queue() -> String {
    "queue:results".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_ollama_model() -> String {
    "qwen3-vl:latest".to_string()
}

fn default_image_dir() -> String {
    "./workspace/images".to_string()
}

fn default_instructions_path() -> String {
    "./prompts/instructions.toml".to_string()
}

fn default_fallback_instruction() -> String {
    "is_spill".to_string()
}

fn default_download_permits() -> usize {
    10
}

fn default_callback_permits() -> usize {
    50
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build from explicit key/value pairs, applying the same defaults as `from_env`.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Failed to read instruction file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid instruction file: {0}")]
    Toml(#[from] toml::de::Error),
}
