//! Landmark enrichment orchestration
//!
//! `get_or_create` ties the geo-resolver and the facts/summary collaborators
//! together: look up, resolve on miss, enrich best-effort, persist once
//! coordinates are confirmed. Existing records are returned untouched;
//! coordinates and summaries are never re-fetched or overwritten on the
//! fast path.

use crate::db::landmarks;
use crate::models::{normalize_name, Coordinates, Landmark};
use crate::services::facts::FactsProvider;
use crate::services::geo_resolver::GeoResolver;
use crate::services::summary::{ChatTurn, SummaryProvider};
use crate::services::trainer::Classifier;
use crate::services::travel::{travel_estimate, TravelEstimate};
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Identification payload: prediction plus catalog enrichment
#[derive(Debug, Serialize)]
pub struct IdentifyReport {
    pub predicted_landmark: String,
    pub confidence: f64,
    pub landmark: Landmark,
    /// Present when the caller supplied an origin
    pub travel: Option<TravelEstimate>,
}

pub struct LandmarkEnricher {
    pool: SqlitePool,
    resolver: GeoResolver,
    facts: Arc<dyn FactsProvider>,
    summary: Arc<dyn SummaryProvider>,
}

impl LandmarkEnricher {
    pub fn new(
        pool: SqlitePool,
        resolver: GeoResolver,
        facts: Arc<dyn FactsProvider>,
        summary: Arc<dyn SummaryProvider>,
    ) -> Self {
        Self {
            pool,
            resolver,
            facts,
            summary,
        }
    }

    /// Fetch a landmark by name, creating it from the knowledge base on
    /// first reference. Idempotent: repeated calls return the same record
    /// and only the first miss touches the resolver.
    pub async fn get_or_create(&self, name: &str) -> Result<Landmark> {
        let key = normalize_name(name);

        if let Some(existing) = landmarks::get_by_name(&self.pool, &key).await? {
            return Ok(existing);
        }

        tracing::info!(name = %key, "Landmark not in catalog; resolving");

        let resolution = self
            .resolver
            .resolve(&key)
            .await
            .ok_or_else(|| Error::NotFound(format!("Could not find coordinates for \"{}\"", key)))?;

        // Summary is best-effort; the landmark is created either way
        let summary = self.build_summary(&key).await;

        let landmark = Landmark {
            guid: Uuid::new_v4(),
            name: key,
            latitude: resolution.coordinates.latitude,
            longitude: resolution.coordinates.longitude,
            summary,
            external_id: Some(resolution.external_id),
            created_at: Utc::now(),
        };

        persist_or_reread(&self.pool, landmark).await
    }

    /// Facts then summary, each failure downgraded to "no summary"
    async fn build_summary(&self, key: &str) -> Option<String> {
        let facts = match self.facts.facts(key).await {
            Ok(Some(facts)) => facts,
            Ok(None) => {
                tracing::debug!(name = %key, "No background facts available");
                return None;
            }
            Err(e) => {
                tracing::warn!(name = %key, error = %e, "Facts lookup failed; continuing without summary");
                return None;
            }
        };

        match self.summary.generate_summary(key, &facts).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(name = %key, error = %e, "Summary generation failed; continuing without summary");
                None
            }
        }
    }

    /// Explicit summary refresh: the only operation allowed to overwrite an
    /// existing summary. Returns the new summary, or `None` when no facts
    /// or summary could be produced.
    pub async fn refresh_summary(&self, name: &str) -> Result<Option<String>> {
        let key = normalize_name(name);
        if landmarks::get_by_name(&self.pool, &key).await?.is_none() {
            return Err(Error::NotFound(format!("No landmark named \"{}\"", key)));
        }

        match self.build_summary(&key).await {
            Some(summary) => {
                landmarks::overwrite_summary(&self.pool, &key, &summary).await?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    /// Classify an uploaded photo, enrich the predicted landmark, and
    /// attach a travel estimate from the supplied origin.
    pub async fn identify(
        &self,
        classifier: &dyn Classifier,
        image_bytes: Vec<u8>,
        origin: Option<Coordinates>,
    ) -> Result<IdentifyReport> {
        let prediction = classifier
            .predict(image_bytes)
            .await
            .map_err(|e| Error::Fetch(format!("Classifier call failed: {}", e)))?;

        let landmark = self.get_or_create(&prediction.predicted_landmark).await?;

        let travel = origin.map(|o| {
            let destination = landmark.coordinates();
            travel_estimate(
                o.latitude,
                o.longitude,
                destination.latitude,
                destination.longitude,
            )
        });

        Ok(IdentifyReport {
            predicted_landmark: prediction.predicted_landmark,
            confidence: prediction.confidence,
            landmark,
            travel,
        })
    }

    /// Chat about a cataloged landmark, feeding the stored summary to the
    /// model as context.
    pub async fn chat_about(
        &self,
        name: &str,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        let key = normalize_name(name);
        let landmark = landmarks::get_by_name(&self.pool, &key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No landmark named \"{}\"", key)))?;

        let message = match &landmark.summary {
            Some(summary) => format!(
                "You are a travel assistant answering questions about {}.\n\
                 Known background: {}\n\nQuestion: {}",
                key.replace('_', " "),
                summary,
                question
            ),
            None => format!(
                "You are a travel assistant answering questions about {}.\n\nQuestion: {}",
                key.replace('_', " "),
                question
            ),
        };

        self.summary
            .chat(&message, history)
            .await
            .map_err(|e| Error::Fetch(format!("Chat call failed: {}", e)))
    }
}

/// Persist a new landmark, treating a unique-name violation as "someone
/// else created it first" and resolving by re-reading. Any other database
/// error propagates.
pub async fn persist_or_reread(pool: &SqlitePool, landmark: Landmark) -> Result<Landmark> {
    let name = landmark.name.clone();
    match landmarks::insert(pool, &landmark).await {
        Ok(()) => {
            tracing::info!(name = %name, "Created new landmark");
            Ok(landmark)
        }
        Err(e) if crate::db::is_unique_violation(&e) => {
            tracing::info!(name = %name, "Lost create race; re-reading existing landmark");
            landmarks::get_by_name(pool, &name)
                .await?
                .ok_or_else(|| Error::Internal(format!("Landmark \"{}\" vanished after race", name)))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::ResolutionResult;
    use crate::services::facts::FactsError;
    use crate::services::geo_resolver::GeoResolver;
    use crate::services::knowledge_base::{EntityHit, KbError, KnowledgeBase};
    use crate::services::summary::SummaryError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubKb {
        coordinates: Coordinates,
        search_calls: AtomicUsize,
    }

    #[async_trait]
    impl KnowledgeBase for StubKb {
        async fn search(&self, query: &str) -> std::result::Result<Vec<EntityHit>, KbError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![EntityHit {
                id: "Q243".to_string(),
                label: query.to_string(),
            }])
        }

        async fn coordinates(
            &self,
            _entity_id: &str,
        ) -> std::result::Result<Option<Coordinates>, KbError> {
            Ok(Some(self.coordinates))
        }
    }

    struct EmptyKb;

    #[async_trait]
    impl KnowledgeBase for EmptyKb {
        async fn search(&self, _query: &str) -> std::result::Result<Vec<EntityHit>, KbError> {
            Ok(Vec::new())
        }
        async fn coordinates(
            &self,
            _entity_id: &str,
        ) -> std::result::Result<Option<Coordinates>, KbError> {
            Ok(None)
        }
    }

    struct StubFacts {
        facts: Option<String>,
    }

    #[async_trait]
    impl FactsProvider for StubFacts {
        async fn facts(&self, _topic: &str) -> std::result::Result<Option<String>, FactsError> {
            Ok(self.facts.clone())
        }
    }

    struct StubSummary {
        fail: bool,
    }

    #[async_trait]
    impl SummaryProvider for StubSummary {
        async fn generate_summary(
            &self,
            topic: &str,
            _facts: &str,
        ) -> std::result::Result<String, SummaryError> {
            if self.fail {
                Err(SummaryError::Network("timeout".into()))
            } else {
                Ok(format!("{} is famous.", topic))
            }
        }

        async fn chat(
            &self,
            _message: &str,
            _history: &[ChatTurn],
        ) -> std::result::Result<String, SummaryError> {
            Ok("It opened in 1889.".to_string())
        }
    }

    const EIFFEL: Coordinates = Coordinates {
        latitude: 48.8584,
        longitude: 2.2945,
    };

    fn enricher_with(
        pool: SqlitePool,
        kb: Arc<dyn KnowledgeBase>,
        facts: Option<String>,
        summary_fails: bool,
    ) -> LandmarkEnricher {
        LandmarkEnricher::new(
            pool,
            GeoResolver::new(kb),
            Arc::new(StubFacts { facts }),
            Arc::new(StubSummary {
                fail: summary_fails,
            }),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_resolves_once() {
        let pool = test_pool().await;
        let kb = Arc::new(StubKb {
            coordinates: EIFFEL,
            search_calls: AtomicUsize::new(0),
        });
        let enricher = enricher_with(pool, kb.clone(), Some("Iron tower.".into()), false);

        let first = enricher.get_or_create("Eiffel Tower").await.unwrap();
        let second = enricher.get_or_create("eiffel_tower").await.unwrap();

        assert_eq!(first.guid, second.guid);
        assert_eq!(first.name, "eiffel_tower");
        assert_eq!(first.latitude, EIFFEL.latitude);
        assert_eq!(first.summary.as_deref(), Some("eiffel_tower is famous."));
        assert_eq!(first.external_id.as_deref(), Some("Q243"));
        // The second call hit the fast path; the resolver ran at most once
        assert_eq!(kb.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_summary_failure_does_not_block_creation() {
        let pool = test_pool().await;
        let kb = Arc::new(StubKb {
            coordinates: EIFFEL,
            search_calls: AtomicUsize::new(0),
        });
        let enricher = enricher_with(pool, kb, Some("facts".into()), true);

        let landmark = enricher.get_or_create("big_ben").await.unwrap();
        assert!(landmark.summary.is_none());
    }

    #[tokio::test]
    async fn test_missing_facts_leave_summary_null() {
        let pool = test_pool().await;
        let kb = Arc::new(StubKb {
            coordinates: EIFFEL,
            search_calls: AtomicUsize::new(0),
        });
        let enricher = enricher_with(pool, kb, None, false);

        let landmark = enricher.get_or_create("colosseum").await.unwrap();
        assert!(landmark.summary.is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_name_is_not_found() {
        let pool = test_pool().await;
        let enricher = enricher_with(pool.clone(), Arc::new(EmptyKb), None, false);

        let err = enricher.get_or_create("atlantis").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        // Nothing was persisted on the failure path
        assert_eq!(landmarks::count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persist_or_reread_resolves_create_race() {
        let pool = test_pool().await;

        let existing = Landmark {
            guid: Uuid::new_v4(),
            name: "taj_mahal".into(),
            latitude: 27.1751,
            longitude: 78.0421,
            summary: None,
            external_id: None,
            created_at: Utc::now(),
        };
        landmarks::insert(&pool, &existing).await.unwrap();

        // A second create for the same name must resolve to the first row
        let loser = Landmark {
            guid: Uuid::new_v4(),
            name: "taj_mahal".into(),
            latitude: 27.1751,
            longitude: 78.0421,
            summary: Some("late arrival".into()),
            external_id: None,
            created_at: Utc::now(),
        };
        let resolved = persist_or_reread(&pool, loser).await.unwrap();

        assert_eq!(resolved.guid, existing.guid);
        assert!(resolved.summary.is_none());
    }

    #[tokio::test]
    async fn test_refresh_summary_overwrites() {
        let pool = test_pool().await;
        let kb = Arc::new(StubKb {
            coordinates: EIFFEL,
            search_calls: AtomicUsize::new(0),
        });
        let enricher = enricher_with(pool.clone(), kb, Some("facts".into()), false);

        enricher.get_or_create("eiffel_tower").await.unwrap();
        let refreshed = enricher.refresh_summary("eiffel_tower").await.unwrap();
        assert_eq!(refreshed.as_deref(), Some("eiffel_tower is famous."));

        let err = enricher.refresh_summary("atlantis").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_chat_about_requires_cataloged_landmark() {
        let pool = test_pool().await;
        let kb = Arc::new(StubKb {
            coordinates: EIFFEL,
            search_calls: AtomicUsize::new(0),
        });
        let enricher = enricher_with(pool, kb, Some("facts".into()), false);

        let err = enricher.chat_about("atlantis", "when?", &[]).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        enricher.get_or_create("eiffel_tower").await.unwrap();
        let answer = enricher
            .chat_about("eiffel_tower", "When did it open?", &[])
            .await
            .unwrap();
        assert_eq!(answer, "It opened in 1889.");
    }

    #[tokio::test]
    async fn test_identify_attaches_travel_estimate() {
        let pool = test_pool().await;
        let kb = Arc::new(StubKb {
            coordinates: EIFFEL,
            search_calls: AtomicUsize::new(0),
        });
        let enricher = enricher_with(pool, kb, None, false);

        struct StubClassifier;
        #[async_trait]
        impl Classifier for StubClassifier {
            async fn predict(
                &self,
                _image_bytes: Vec<u8>,
            ) -> std::result::Result<
                crate::services::trainer::Prediction,
                crate::services::trainer::ClassifierError,
            > {
                serde_json::from_str(
                    r#"{"predicted_landmark": "eiffel_tower", "confidence": 0.97}"#,
                )
                .map_err(|e| crate::services::trainer::ClassifierError::Parse(e.to_string()))
            }
        }

        let report = enricher
            .identify(
                &StubClassifier,
                vec![0u8; 16],
                Some(Coordinates {
                    latitude: 40.7128,
                    longitude: -74.0060,
                }),
            )
            .await
            .unwrap();

        assert_eq!(report.predicted_landmark, "eiffel_tower");
        assert_eq!(report.landmark.name, "eiffel_tower");
        let travel = report.travel.unwrap();
        assert!((travel.distance_km - 5837.0).abs() < 10.0);
        assert!(travel.estimated_cost > 50);
    }
}
