use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::PublishError;

/// Everything one publish attempt needs. `extra` is adapter-defined and
/// opaque to the pipeline (e.g. douyin location, shipinhao draft flag).
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub media_path: PathBuf,
    pub title: String,
    pub description: String,
    /// Order matters: platforms render tags in insertion order.
    pub tags: Vec<String>,
    pub cover_path: Option<PathBuf>,
    pub scheduled_at: Option<DateTime<Local>>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PublishRequest {
    pub fn new(media_path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            media_path: media_path.into(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            cover_path: None,
            scheduled_at: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn validate(&self, now: DateTime<Local>) -> Result<(), PublishError> {
        if !self.media_path.exists() {
            return Err(PublishError::InvalidRequest(format!(
                "media file not found: {}",
                self.media_path.display()
            )));
        }
        if let Some(at) = self.scheduled_at {
            if at <= now {
                return Err(PublishError::InvalidRequest(format!(
                    "scheduled time {at} is not in the future"
                )));
            }
        }
        Ok(())
    }
}

/// Linear pipeline progress marker; `stage` on the result records how far a
/// run got, which is what you want in the logs when a platform misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStage {
    Init,
    MediaSubmitted,
    MediaProcessed,
    MetadataApplied,
    CoverApplied,
    ScheduleApplied,
    Submitted,
    Confirmed,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PublishStage::Init => "init",
            PublishStage::MediaSubmitted => "media_submitted",
            PublishStage::MediaProcessed => "media_processed",
            PublishStage::MetadataApplied => "metadata_applied",
            PublishStage::CoverApplied => "cover_applied",
            PublishStage::ScheduleApplied => "schedule_applied",
            PublishStage::Submitted => "submitted",
            PublishStage::Confirmed => "confirmed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub run_id: Uuid,
    pub platform: String,
    pub succeeded: bool,
    pub stage: PublishStage,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last page URL observed, kept for diagnostics — on an optimistic
    /// success this is the only evidence of where the run ended up.
    pub last_url: Option<String>,
    pub warnings: Vec<String>,
    pub failure: Option<String>,
}

impl PublishResult {
    pub(crate) fn begin(platform: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            platform: platform.to_string(),
            succeeded: false,
            stage: PublishStage::Init,
            started_at: Utc::now(),
            finished_at: None,
            last_url: None,
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub(crate) fn advance(&mut self, stage: PublishStage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub(crate) fn finish_success(&mut self) {
        self.succeeded = true;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn finish_failure(&mut self, reason: impl ToString) {
        self.succeeded = false;
        self.failure = Some(reason.to_string());
        self.finished_at = Some(Utc::now());
    }
}
