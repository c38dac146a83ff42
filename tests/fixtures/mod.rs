//! Missions and model transcripts used across test suites.
#![allow(dead_code)]

use mission_dispatch::models::{Mission, MissionResult, PictureRef, PictureResult};

pub fn mission(task_serial: &str, pictures: Vec<PictureRef>) -> Mission {
    Mission {
        task_serial: task_serial.to_string(),
        mission_type: "is_spill".to_string(),
        callback_url: "http://callback.invalid/hook".to_string(),
        picture_list: pictures,
    }
}

pub fn mission_with_callback(task_serial: &str, callback_url: &str, pictures: Vec<PictureRef>) -> Mission {
    Mission {
        callback_url: callback_url.to_string(),
        ..mission(task_serial, pictures)
    }
}

pub fn result_for(mission: &Mission, verdict: bool, reason: &str) -> MissionResult {
    MissionResult {
        task_serial: mission.task_serial.clone(),
        mission_type: mission.mission_type.clone(),
        data: mission
            .picture_list
            .iter()
            .map(|p| PictureResult::new(p.pic_id.clone(), verdict, reason))
            .collect(),
    }
}

/// Model transcript with its expected verdict and reason.
pub struct Transcript {
    pub raw: &'static str,
    pub verdict: bool,
    pub reason: &'static str,
}

pub const TRANSCRIPTS: &[Transcript] = &[
    Transcript {
        raw: "<think>地面反光，但像不像水？可能是TRUE。</think>\n理由：地面只有灯光反射，没有液体\n结果：FALSE",
        verdict: false,
        reason: "地面只有灯光反射，没有液体",
    },
    Transcript {
        raw: "理由：货架前方有明显的液体泼洒痕迹\n结果：TRUE",
        verdict: true,
        reason: "货架前方有明显的液体泼洒痕迹",
    },
    Transcript {
        raw: "Reason: a puddle of milk next to the fridge.\nResult: TRUE",
        verdict: true,
        reason: "a puddle of milk next to the fridge.",
    },
    Transcript {
        raw: "理由：通道干净。\n结果：false",
        verdict: false,
        reason: "通道干净。",
    },
];
