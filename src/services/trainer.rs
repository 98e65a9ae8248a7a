//! External trainer and classifier collaborators
//!
//! Both stay outside this crate: the trainer is a subprocess that prints a
//! JSON report on stdout, the classifier an HTTP inference service. This
//! module owns their contracts and the production adapters.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("Failed to launch trainer: {0}")]
    Launch(String),

    #[error("Trainer crashed: {0}")]
    Crashed(String),

    #[error("Unparseable trainer report: {0}")]
    Parse(String),
}

/// Trainer completion marker. Anything other than `Complete` means the run
/// failed, whatever the process exit code said.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TrainerStatus {
    Complete,
    #[serde(rename = "error")]
    Error,
}

/// Structured trainer result. Metrics are final-epoch values; the image
/// count spans the whole corpus because the trainer reads every class
/// folder, not just the requested one.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainerReport {
    pub status: TrainerStatus,
    #[serde(default)]
    pub final_accuracy: Option<f64>,
    #[serde(default)]
    pub final_loss: Option<f64>,
    #[serde(default)]
    pub total_images_processed: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait Trainer: Send + Sync {
    async fn train(
        &self,
        dataset_root: &Path,
        class_name: &str,
        epochs: u32,
    ) -> Result<TrainerReport, TrainerError>;
}

/// Runs the training routine as a subprocess and parses its JSON report
/// from stdout.
pub struct ProcessTrainer {
    command: Vec<String>,
}

impl ProcessTrainer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Trainer for ProcessTrainer {
    async fn train(
        &self,
        dataset_root: &Path,
        class_name: &str,
        epochs: u32,
    ) -> Result<TrainerReport, TrainerError> {
        let (program, base_args) = self
            .command
            .split_first()
            .ok_or_else(|| TrainerError::Launch("empty trainer command".to_string()))?;

        tracing::info!(
            program = %program,
            class = %class_name,
            epochs,
            "Invoking external trainer"
        );

        let output = Command::new(program)
            .args(base_args)
            .arg("--data-root")
            .arg(dataset_root)
            .arg("--class")
            .arg(class_name)
            .arg("--epochs")
            .arg(epochs.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TrainerError::Launch(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrainerError::Crashed(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        // Progress lines may precede the report; the JSON object is the
        // last non-empty line.
        let report_line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| TrainerError::Parse("empty trainer output".to_string()))?;

        serde_json::from_str(report_line).map_err(|e| TrainerError::Parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Classifier output: predicted catalog key plus confidence in [0, 1]
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(alias = "prediction", alias = "label")]
    pub predicted_landmark: String,
    pub confidence: f64,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(&self, image_bytes: Vec<u8>) -> Result<Prediction, ClassifierError>;
}

/// HTTP inference service adapter (`POST /predict`, multipart image file)
pub struct HttpClassifier {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn predict(&self, image_bytes: Vec<u8>) -> Result<Prediction, ClassifierError> {
        let part = reqwest::multipart::Part::bytes(image_bytes).file_name("upload.jpg");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(format!("{}/predict", self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))
    }
}
