//! Training-run coordination
//!
//! State machine around one trainer invocation: the run row is created in
//! `processing` before any work, and always lands in exactly one terminal
//! state, even when the trainer blows up. Note the trainer's documented
//! scope: it reads the *entire* corpus directory and retrains a multi-class
//! model, so "train this landmark" means "retrain everything, making sure
//! this landmark is represented".
//!
//! Callers are responsible for not running acquisition or deduplication
//! against a corpus a training run is actively reading; no lock is taken
//! here.

use crate::db::training_runs;
use crate::models::TrainingRun;
use crate::services::trainer::{Trainer, TrainerStatus};
use crate::{Error, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Extensions the image indexer recognizes (the trainer ignores anything else)
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// What the image indexer sees on disk: one entry per class folder that
/// contributes at least one usable image.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    pub classes: Vec<String>,
    pub total_images: usize,
}

impl CorpusIndex {
    pub fn has_class(&self, class_name: &str) -> bool {
        self.classes.iter().any(|c| c == class_name)
    }
}

/// Count a class folder's usable images: nonempty files with a recognized
/// extension. Folder presence alone does not make a class.
fn count_usable_images(class_folder: &Path) -> usize {
    WalkDir::new(class_folder)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter(|entry| entry.metadata().map(|m| m.len() > 0).unwrap_or(false))
        .count()
}

/// Enumerate the classes the trainer will recognize
pub fn index_corpus(data_root: &Path) -> Result<CorpusIndex> {
    let mut classes = Vec::new();
    let mut total_images = 0;

    for entry in std::fs::read_dir(data_root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };

        let usable = count_usable_images(&entry.path());
        if usable > 0 {
            classes.push(name);
            total_images += usable;
        }
    }

    classes.sort();
    Ok(CorpusIndex {
        classes,
        total_images,
    })
}

pub struct TrainingCoordinator {
    pool: SqlitePool,
    trainer: Arc<dyn Trainer>,
    data_root: PathBuf,
    model_name: String,
}

impl TrainingCoordinator {
    pub fn new(
        pool: SqlitePool,
        trainer: Arc<dyn Trainer>,
        data_root: PathBuf,
        model_name: String,
    ) -> Self {
        Self {
            pool,
            trainer,
            data_root,
            model_name,
        }
    }

    /// Drive one training run for a landmark. The returned row is always in
    /// a terminal state; an `Err` return means the trainer raised (or the
    /// host failed), and the run was still finalized as `failed` first.
    pub async fn train(&self, landmark_name: &str, epochs: u32) -> Result<TrainingRun> {
        let run = TrainingRun::begin(self.model_name.clone(), epochs);
        training_runs::insert(&self.pool, &run).await?;

        tracing::info!(
            run = %run.guid,
            landmark = %landmark_name,
            epochs,
            "Training run started"
        );

        // Dataset-sufficiency validation, before the trainer sees anything
        let index = match index_corpus(&self.data_root) {
            Ok(index) => index,
            Err(e) => {
                let message = format!("Corpus indexing failed: {}", e);
                training_runs::mark_failed(&self.pool, run.guid, &message).await?;
                return Err(Error::Validation(message));
            }
        };

        if !index.has_class(landmark_name) {
            let message = format!(
                "Landmark \"{}\" has no usable images in the corpus. \
                 Check that its folder contains nonempty .jpg files.",
                landmark_name
            );
            tracing::warn!(run = %run.guid, "{}", message);
            training_runs::mark_failed(&self.pool, run.guid, &message).await?;
            return self.reload(run.guid).await;
        }

        if index.total_images < 2 {
            let message = format!(
                "Insufficient image data: {} image(s) across all landmarks; \
                 at least 2 are needed for a train/validation split.",
                index.total_images
            );
            tracing::warn!(run = %run.guid, "{}", message);
            training_runs::mark_failed(&self.pool, run.guid, &message).await?;
            return self.reload(run.guid).await;
        }

        let report = match self
            .trainer
            .train(&self.data_root, landmark_name, epochs)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                // Unexpected trainer failure: finalize the run, then let the
                // caller see the error.
                training_runs::mark_failed(&self.pool, run.guid, &e.to_string()).await?;
                return Err(Error::Trainer(e.to_string()));
            }
        };

        if report.status != TrainerStatus::Complete {
            let message = report
                .message
                .unwrap_or_else(|| "Trainer did not report completion".to_string());
            tracing::warn!(run = %run.guid, message = %message, "Trainer reported failure");
            training_runs::mark_failed(&self.pool, run.guid, &message).await?;
            return self.reload(run.guid).await;
        }

        let image_count = report
            .total_images_processed
            .unwrap_or(index.total_images as i64);
        training_runs::mark_success(
            &self.pool,
            run.guid,
            image_count,
            report.final_accuracy.unwrap_or(0.0),
            report.final_loss.unwrap_or(0.0),
        )
        .await?;

        tracing::info!(
            run = %run.guid,
            image_count,
            accuracy = report.final_accuracy.unwrap_or(0.0),
            "Training run succeeded"
        );
        self.reload(run.guid).await
    }

    async fn reload(&self, guid: uuid::Uuid) -> Result<TrainingRun> {
        training_runs::get(&self.pool, guid)
            .await?
            .ok_or_else(|| Error::Internal(format!("Run {} vanished", guid)))
    }
}
