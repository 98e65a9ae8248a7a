//! landmark-finder - catalog and training-corpus pipeline CLI
//!
//! One subcommand per pipeline operation: catalog seeding and enrichment,
//! image acquisition and deduplication, training runs, travel estimates,
//! and the chat/identify flows. Each command prints a JSON payload on
//! success and a `{"error": ...}` payload on reportable failures.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use landmark_finder::config::Config;
use landmark_finder::db;
use landmark_finder::models::Coordinates;
use landmark_finder::services::enrichment::LandmarkEnricher;
use landmark_finder::services::facts::WikipediaClient;
use landmark_finder::services::geo_resolver::GeoResolver;
use landmark_finder::services::image_search::DuckDuckGoClient;
use landmark_finder::services::knowledge_base::WikidataClient;
use landmark_finder::services::summary::GeminiClient;
use landmark_finder::services::trainer::{HttpClassifier, ProcessTrainer};
use landmark_finder::services::travel::travel_estimate;
use landmark_finder::services::{Deduplicator, ImageAcquirer, TrainingCoordinator};
use landmark_finder::Error;

#[derive(Parser)]
#[command(name = "landmark-finder", version, about = "Landmark catalog and training-corpus pipeline")]
struct Cli {
    /// Image corpus root (overrides config/env)
    #[arg(long, global = true)]
    data_root: Option<String>,

    /// SQLite database path (overrides config/env)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bootstrap the catalog from a {name: {lat, lon}} JSON mapping
    Seed {
        /// Seed mapping file
        file: PathBuf,
    },
    /// Resolve a landmark name to coordinates (no persistence)
    Resolve { name: String },
    /// Get or create a landmark, enriching it with a summary
    Enrich { name: String },
    /// List cataloged landmarks
    List,
    /// Acquire training images for a landmark
    Scrape {
        name: String,
        /// Page URL or extra search keyword
        #[arg(long)]
        source: Option<String>,
        /// Target number of new images
        #[arg(long)]
        count: Option<usize>,
    },
    /// Copy local images into a landmark's corpus folder
    Upload {
        name: String,
        /// Image files to import
        files: Vec<PathBuf>,
    },
    /// Remove perceptual duplicates from a landmark's folder
    Dedup { name: String },
    /// Run the external trainer for a landmark
    Train {
        name: String,
        #[arg(long)]
        epochs: Option<u32>,
    },
    /// Show training-run history
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Distance and travel-cost estimate from an origin to a landmark
    Distance {
        name: String,
        #[arg(long)]
        from_lat: f64,
        #[arg(long)]
        from_lon: f64,
    },
    /// Classify a photo and enrich the predicted landmark
    Identify {
        image: PathBuf,
        #[arg(long)]
        from_lat: Option<f64>,
        #[arg(long)]
        from_lon: Option<f64>,
    },
    /// Ask a question about a cataloged landmark
    Chat { name: String, question: String },
    /// Re-generate a landmark's summary (the only overwrite path)
    RefreshSummary { name: String },
}

fn print_payload(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::resolve(cli.data_root.as_deref(), cli.database.as_deref())?;

    info!(
        data_root = %config.data_root.display(),
        database = %config.database_path.display(),
        "Starting landmark-finder"
    );

    match run(cli.command, config).await {
        Ok(payload) => {
            print_payload(&payload);
            Ok(())
        }
        // Reportable conditions become a structured failure payload
        Err(e @ (Error::NotFound(_) | Error::Validation(_) | Error::InvalidInput(_))) => {
            print_payload(&json!({ "error": e.to_string() }));
            std::process::exit(1);
        }
        Err(e) => Err(e).context("pipeline operation failed"),
    }
}

fn build_enricher(config: &Config, pool: sqlx::SqlitePool) -> landmark_finder::Result<LandmarkEnricher> {
    let kb = WikidataClient::new(
        &config.knowledge_base_endpoint,
        &config.user_agent,
        config.api_timeout_secs,
    )
    .map_err(|e| Error::Config(e.to_string()))?;

    let facts = WikipediaClient::new(
        &config.facts_endpoint,
        &config.user_agent,
        config.api_timeout_secs,
    )
    .map_err(|e| Error::Config(e.to_string()))?;

    let summary = GeminiClient::new(
        &config.summary_endpoint,
        &config.summary_model,
        config.summary_api_key.clone(),
        config.api_timeout_secs,
    )
    .map_err(|e| Error::Config(e.to_string()))?;

    Ok(LandmarkEnricher::new(
        pool,
        GeoResolver::new(Arc::new(kb)),
        Arc::new(facts),
        Arc::new(summary),
    ))
}

fn build_acquirer(config: &Config, pool: sqlx::SqlitePool) -> landmark_finder::Result<ImageAcquirer> {
    let search = DuckDuckGoClient::new(
        &config.image_search_endpoint,
        &config.user_agent,
        config.download_timeout_secs,
    )
    .map_err(|e| Error::Config(e.to_string()))?;

    ImageAcquirer::new(
        Arc::new(search),
        Some(pool),
        config.data_root.clone(),
        &config.user_agent,
        config.download_timeout_secs,
        config.min_image_edge,
    )
}

async fn run(command: Command, config: Config) -> landmark_finder::Result<serde_json::Value> {
    let pool = db::init_database_pool(&config.database_path).await?;

    match command {
        Command::Seed { file } => {
            let created = db::seed::seed_catalog(&pool, &file).await?;
            Ok(json!({ "landmarks_created": created }))
        }

        Command::Resolve { name } => {
            let kb = WikidataClient::new(
                &config.knowledge_base_endpoint,
                &config.user_agent,
                config.api_timeout_secs,
            )
            .map_err(|e| Error::Config(e.to_string()))?;
            let resolver = GeoResolver::new(Arc::new(kb));

            match resolver.resolve(&name).await {
                Some(result) => Ok(json!({
                    "name": name,
                    "latitude": result.coordinates.latitude,
                    "longitude": result.coordinates.longitude,
                    "external_id": result.external_id,
                })),
                None => Err(Error::NotFound(format!(
                    "Could not find coordinates for \"{}\"",
                    name
                ))),
            }
        }

        Command::Enrich { name } => {
            let enricher = build_enricher(&config, pool)?;
            let landmark = enricher.get_or_create(&name).await?;
            Ok(serde_json::to_value(landmark).map_err(|e| Error::Internal(e.to_string()))?)
        }

        Command::List => {
            let landmarks = db::landmarks::list_all(&pool).await?;
            Ok(serde_json::to_value(landmarks).map_err(|e| Error::Internal(e.to_string()))?)
        }

        Command::Scrape { name, source, count } => {
            let acquirer = build_acquirer(&config, pool)?;
            let target = count.unwrap_or(config.images_per_class_target);
            let saved = acquirer.acquire(&name, source.as_deref(), target).await?;
            Ok(json!({ "landmark": name, "acquired": saved.len(), "files": saved }))
        }

        Command::Upload { name, files } => {
            if files.is_empty() {
                return Err(Error::InvalidInput("no files supplied".to_string()));
            }
            let acquirer = build_acquirer(&config, pool)?;
            let saved = acquirer.import_files(&name, &files).await?;
            Ok(json!({ "landmark": name, "imported": saved.len(), "files": saved }))
        }

        Command::Dedup { name } => {
            let folder = config.landmark_folder(&name);
            if !folder.is_dir() {
                return Err(Error::NotFound(format!(
                    "No corpus folder for \"{}\"",
                    name
                )));
            }
            let deduplicator = Deduplicator::new(Some(pool));
            let removed = deduplicator.run(&name, &folder).await?;
            Ok(json!({ "landmark": name, "removed": removed }))
        }

        Command::Train { name, epochs } => {
            let trainer = ProcessTrainer::new(config.trainer_command.clone());
            let coordinator = TrainingCoordinator::new(
                pool,
                Arc::new(trainer),
                config.data_root.clone(),
                config.model_name.clone(),
            );
            let run = coordinator
                .train(&name, epochs.unwrap_or(config.epochs))
                .await?;
            Ok(serde_json::to_value(run).map_err(|e| Error::Internal(e.to_string()))?)
        }

        Command::History { limit } => {
            let runs = db::training_runs::history(&pool, limit).await?;
            Ok(serde_json::to_value(runs).map_err(|e| Error::Internal(e.to_string()))?)
        }

        Command::Distance { name, from_lat, from_lon } => {
            let landmark = db::landmarks::get_by_name(&pool, &landmark_finder::models::normalize_name(&name))
                .await?
                .ok_or_else(|| Error::NotFound(format!("No landmark named \"{}\"", name)))?;

            let estimate = travel_estimate(from_lat, from_lon, landmark.latitude, landmark.longitude);
            Ok(json!({
                "landmark": landmark.name,
                "distance_km": estimate.distance_km,
                "estimated_cost": estimate.estimated_cost,
            }))
        }

        Command::Identify { image, from_lat, from_lon } => {
            let image_bytes = std::fs::read(&image)?;
            let origin = match (from_lat, from_lon) {
                (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
                (None, None) => None,
                _ => {
                    return Err(Error::InvalidInput(
                        "--from-lat and --from-lon must be given together".to_string(),
                    ))
                }
            };

            let classifier = HttpClassifier::new(&config.classifier_endpoint, config.api_timeout_secs)
                .map_err(|e| Error::Config(e.to_string()))?;
            let enricher = build_enricher(&config, pool)?;

            let report = enricher.identify(&classifier, image_bytes, origin).await?;
            Ok(serde_json::to_value(report).map_err(|e| Error::Internal(e.to_string()))?)
        }

        Command::Chat { name, question } => {
            let enricher = build_enricher(&config, pool)?;
            let answer = enricher.chat_about(&name, &question, &[]).await?;
            Ok(json!({ "landmark": name, "question": question, "answer": answer }))
        }

        Command::RefreshSummary { name } => {
            let enricher = build_enricher(&config, pool)?;
            match enricher.refresh_summary(&name).await? {
                Some(summary) => Ok(json!({ "landmark": name, "summary": summary })),
                None => Ok(json!({
                    "landmark": name,
                    "summary": null,
                    "detail": "no facts or summary available",
                })),
            }
        }
    }
}
