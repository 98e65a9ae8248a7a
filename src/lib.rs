//! landmark-finder library interface
//!
//! The data-acquisition and resolution pipeline behind the landmark
//! recognition service: name resolution against an external knowledge base,
//! training-corpus acquisition and hygiene, travel estimation, and
//! training-run bookkeeping. The web surface and the neural network itself
//! live elsewhere; this crate talks to them through the collaborator traits
//! in `services`.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
