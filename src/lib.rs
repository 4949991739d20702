//! coursefetch - course material discovery for learning-management portals.
//!
//! Lists courses, enumerates candidate materials and fetches their bytes from
//! portals that either expose a REST API or only render HTML pages behind a
//! login. Scrape-backed portals go through a layered pipeline: session
//! login, portal crawl, page snapshot, material identification, download URL
//! resolution and deduplication.

pub mod auth;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod identify;
pub mod ids;
pub mod models;
pub mod providers;
pub mod resolve;
pub mod snapshot;
pub mod utils;

pub use config::{EngineConfig, ProviderConfig, ProviderKind};
pub use engine::DiscoveryEngine;
pub use error::{LoginFailureReason, ProviderError, ProviderResult};
pub use models::{
    ExternalCourse, ExternalEnrollment, ExternalMaterial, ExtractedMaterial, MaterialSource,
};
pub use providers::{Provider, ProviderRegistry};
