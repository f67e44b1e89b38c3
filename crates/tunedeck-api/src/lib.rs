//! Shared data model and server API for tunedeck.
//!
//! This crate owns everything both halves of the application agree on: the
//! catalog types (`Criterion`, `Song`), the `CatalogClient` boundary trait
//! with its HTTP implementation, the API error taxonomy, and configuration.

pub mod client;
pub mod config;
pub mod error;
pub mod models;

pub use client::{CatalogClient, HttpCatalogClient};
pub use config::Config;
pub use error::ApiError;
pub use models::{Criterion, ServerInfo, Song};
