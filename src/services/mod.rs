//! Pipeline services and external-collaborator clients

pub mod acquirer;
pub mod dedup;
pub mod enrichment;
pub mod facts;
pub mod geo_resolver;
pub mod image_search;
pub mod knowledge_base;
pub mod summary;
pub mod trainer;
pub mod training;
pub mod travel;

pub use acquirer::ImageAcquirer;
pub use dedup::Deduplicator;
pub use enrichment::LandmarkEnricher;
pub use geo_resolver::GeoResolver;
pub use training::TrainingCoordinator;
