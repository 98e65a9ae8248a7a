//! Training run bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Training run lifecycle state.
///
/// A run is created in `Processing` and moves to exactly one terminal state;
/// no transition ever goes backward and a run is never reopened. A retry is
/// a new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Processing,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Processing => "processing",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(RunStatus::Processing),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }
}

/// One invocation of the external trainer. Append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRun {
    pub guid: Uuid,
    pub model_name: String,
    pub epochs: u32,
    /// Images seen by the trainer across all classes (multi-class retrain)
    pub image_count: Option<i64>,
    /// Final-epoch validation accuracy
    pub accuracy: Option<f64>,
    /// Final-epoch training loss
    pub loss: Option<f64>,
    pub status: RunStatus,
    /// Failure description when `status == Failed`
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TrainingRun {
    /// New run in the `Processing` state, stamped now
    pub fn begin(model_name: String, epochs: u32) -> Self {
        Self {
            guid: Uuid::new_v4(),
            model_name,
            epochs,
            image_count: None,
            accuracy: None,
            loss: None,
            status: RunStatus::Processing,
            message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
