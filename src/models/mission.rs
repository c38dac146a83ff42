use garde::Validate;
use serde::{Deserialize, Serialize};

/// One batch analysis request, as accepted by the dispatch server and
/// carried on the task queue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    #[garde(length(min = 1, max = 128))]
    pub task_serial: String,

    /// Selects the instruction template.
    #[serde(rename = "type")]
    #[garde(length(min = 1, max = 64))]
    pub mission_type: String,

    #[serde(alias = "callbackurl")]
    #[garde(length(min = 1, max = 2048))]
    pub callback_url: String,

    #[garde(dive)]
    pub picture_list: Vec<PictureRef>,
}

/// Identifier and source URL of one picture within a mission.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PictureRef {
    #[garde(length(min = 1, max = 128))]
    pub pic_id: String,

    #[serde(default, alias = "downloadUrl", alias = "dowmloadUrl")]
    #[garde(skip)]
    pub url: Option<String>,
}

impl PictureRef {
    pub fn new(pic_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            pic_id: pic_id.into(),
            url: Some(url.into()),
        }
    }

    /// The fetchable URL, if one was supplied and is not blank.
    pub fn resolved_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Verdict for one picture. Serialized in the callback wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PictureResult {
    pub pic_id: String,

    #[serde(rename = "result")]
    pub verdict: bool,

    pub reason: String,
}

impl PictureResult {
    pub fn new(pic_id: impl Into<String>, verdict: bool, reason: impl Into<String>) -> Self {
        Self {
            pic_id: pic_id.into(),
            verdict,
            reason: reason.into(),
        }
    }
}

/// Complete result set of one mission. Doubles as the callback payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MissionResult {
    pub task_serial: String,

    #[serde(rename = "type")]
    pub mission_type: String,

    pub data: Vec<PictureResult>,
}
