use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle of a persisted mission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    Pending,
    Completed,
}

/// Outcome of the single callback delivery attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    Waiting,
    Success,
    Failed,
}

/// A mission row together with its pictures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionRecord {
    pub task_serial: String,
    pub mission_type: String,
    pub callback_url: String,
    pub status: MissionStatus,
    pub callback_status: CallbackStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pictures: Vec<PictureRecord>,
}

/// A picture row. `result`/`reason` stay empty until the mission completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PictureRecord {
    pub pic_id: String,
    pub download_url: Option<String>,
    pub result: Option<bool>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_text_matches_schema() {
        assert_eq!(MissionStatus::Pending.to_string(), "PENDING");
        assert_eq!(CallbackStatus::Success.to_string(), "SUCCESS");
        assert_eq!(CallbackStatus::from_str("FAILED").unwrap(), CallbackStatus::Failed);
        assert!(MissionStatus::from_str("RUNNING").is_err());
    }
}
