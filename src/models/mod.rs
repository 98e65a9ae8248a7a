//! Persistent and transient data models

pub mod image;
pub mod landmark;
pub mod training_run;

pub use image::{ImageSource, LandmarkImage};
pub use landmark::{name_to_query, normalize_name, Coordinates, Landmark, ResolutionResult};
pub use training_run::{RunStatus, TrainingRun};
