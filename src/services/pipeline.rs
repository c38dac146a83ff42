use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::InstructionSet;
use crate::models::{Mission, MissionResult, PictureResult};
use crate::services::download::{DownloadStage, QueueItem, StageEvent};
use crate::services::imaging;
use crate::services::inference::InferenceAdapter;

/// Bound on fetched-but-not-yet-inferred items per mission.
pub const CHANNEL_CAPACITY: usize = 100;

/// Reason recorded for pictures that never reached the model.
pub const DOWNLOAD_FAILED: &str = "Download Failed";

/// Runs one mission: download stage feeding a sequential inference consumer.
///
/// The download limiter and inference lock inside the stages are shared by
/// every mission this pipeline runs.
pub struct MissionPipeline {
    download: Arc<DownloadStage>,
    inference: Arc<InferenceAdapter>,
    instructions: Arc<InstructionSet>,
}

impl MissionPipeline {
    pub fn new(
        download: Arc<DownloadStage>,
        inference: Arc<InferenceAdapter>,
        instructions: Arc<InstructionSet>,
    ) -> Self {
        Self {
            download,
            inference,
            instructions,
        }
    }

    /// Produce exactly one `PictureResult` per requested picture, in
    /// completion order.
    pub async fn run(&self, mission: &Mission) -> MissionResult {
        let start = Instant::now();
        let expected = mission.picture_list.len();
        let instruction = self.instructions.for_type(&mission.mission_type);

        info!(
            task_serial = %mission.task_serial,
            mission_type = %mission.mission_type,
            pictures = expected,
            "Processing mission"
        );

        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let producer = {
            let stage = self.download.clone();
            let task_serial = mission.task_serial.clone();
            let pictures = mission.picture_list.clone();
            tokio::spawn(async move { stage.run(&task_serial, &pictures, tx).await })
        };

        let mut data = Vec::with_capacity(expected);
        while data.len() < expected {
            match rx.recv().await {
                Some(StageEvent::Item(item)) => {
                    data.push(self.evaluate(&mission.task_serial, item, instruction).await);
                }
                Some(StageEvent::EndOfStream) | None => break,
            }
        }
        drop(rx);

        if let Err(e) = producer.await {
            error!(task_serial = %mission.task_serial, error = %e, "Download stage aborted");
        }

        if data.len() < expected {
            warn!(
                task_serial = %mission.task_serial,
                produced = data.len(),
                expected,
                "Stream ended early, backfilling missing pictures"
            );
            backfill_missing(mission, &mut data);
        }

        let elapsed = start.elapsed();
        metrics::histogram!("mission_processing_seconds").record(elapsed.as_secs_f64());
        info!(
            task_serial = %mission.task_serial,
            duration_ms = elapsed.as_millis() as u64,
            positives = data.iter().filter(|r| r.verdict).count(),
            "Mission pipeline finished"
        );

        MissionResult {
            task_serial: mission.task_serial.clone(),
            mission_type: mission.mission_type.clone(),
            data,
        }
    }

    async fn evaluate(&self, task_serial: &str, item: QueueItem, instruction: &str) -> PictureResult {
        let Some(path) = item.local_path else {
            metrics::counter!("pictures_processed_total", "outcome" => "download_failed").increment(1);
            return PictureResult::new(item.pic_id, false, DOWNLOAD_FAILED);
        };

        let encoded = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || imaging::normalize_file(&path)).await
        };
        let encoded = match encoded {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(e)) => {
                error!(task_serial, pic_id = %item.pic_id, error = %e, "Image normalization failed");
                String::new()
            }
            Err(e) => {
                error!(task_serial, pic_id = %item.pic_id, error = %e, "Image normalization task panicked");
                String::new()
            }
        };

        info!(task_serial, pic_id = %item.pic_id, "Inference");
        let verdict = self.inference.infer(&encoded, instruction).await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "Could not remove artifact");
        }

        let outcome = if verdict.verdict { "positive" } else { "negative" };
        metrics::counter!("pictures_processed_total", "outcome" => outcome).increment(1);

        PictureResult::new(item.pic_id, verdict.verdict, verdict.reason)
    }
}

/// Add a `Download Failed` result for every requested picture without one.
fn backfill_missing(mission: &Mission, data: &mut Vec<PictureResult>) {
    let mut produced: HashMap<String, usize> = HashMap::new();
    for result in data.iter() {
        *produced.entry(result.pic_id.clone()).or_default() += 1;
    }
    for picture in &mission.picture_list {
        match produced.get_mut(&picture.pic_id) {
            Some(count) if *count > 0 => *count -= 1,
            _ => data.push(PictureResult::new(picture.pic_id.clone(), false, DOWNLOAD_FAILED)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PictureRef;

    #[test]
    fn test_backfill_completes_result_set() {
        let mission = Mission {
            task_serial: "T1".to_string(),
            mission_type: "is_spill".to_string(),
            callback_url: "http://cb".to_string(),
            picture_list: vec![
                PictureRef::new("P1", "http://a"),
                PictureRef::new("P2", "http://b"),
                PictureRef::new("P2", "http://b"),
            ],
        };
        let mut data = vec![PictureResult::new("P2", true, "wet")];
        backfill_missing(&mission, &mut data);

        assert_eq!(data.len(), 3);
        assert_eq!(data[0], PictureResult::new("P2", true, "wet"));
        assert!(data[1..].iter().all(|r| !r.verdict && r.reason == DOWNLOAD_FAILED));
        let mut ids: Vec<_> = data.iter().map(|r| r.pic_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["P1", "P2", "P2"]);
    }
}
