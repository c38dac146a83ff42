use serde::{Deserialize, Serialize};

/// Envelope returned by the ingress endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct StandardResponse {
    pub status: u16,
    pub error_msg: String,
    pub data: serde_json::Value,
}

impl StandardResponse {
    pub fn accepted() -> Self {
        Self {
            status: 200,
            error_msg: String::new(),
            data: serde_json::Value::String("request accepted".to_string()),
        }
    }

    pub fn error(status: u16, error_msg: impl Into<String>) -> Self {
        Self {
            status,
            error_msg: error_msg.into(),
            data: serde_json::Value::String("server error".to_string()),
        }
    }
}
