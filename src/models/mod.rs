pub mod api;
pub mod mission;
pub mod record;

pub use mission::{Mission, MissionResult, PictureRef, PictureResult};
pub use record::{CallbackStatus, MissionRecord, MissionStatus, PictureRecord};
