//! Provider implementations and the registry that builds them from config.

pub mod canvas;
pub mod download;
pub mod portal;

pub use canvas::CanvasProvider;
pub use download::{fetch_file, resolve_content_type, DownloadedFile};
pub use portal::PortalProvider;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EngineConfig, ProviderKind};
use crate::engine::DiscoveryEngine;
use crate::error::ProviderResult;
use crate::models::{ExternalCourse, ExternalEnrollment, ExternalMaterial};

/// A source of courses, materials and enrollments.
///
/// API-backed and scrape-backed portals expose the same capabilities.
/// Network operations fail with a typed error rather than returning
/// partial results.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured name, e.g. `campus`.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Whether enough configuration exists to talk to the portal.
    /// Never performs network I/O.
    fn is_configured(&self) -> bool;

    async fn list_courses(&self) -> ProviderResult<Vec<ExternalCourse>>;

    async fn list_materials(&self, course_external_id: &str)
        -> ProviderResult<Vec<ExternalMaterial>>;

    /// Fetch one material's bytes. Fails with `Empty` on a zero-length payload.
    async fn download_material(
        &self,
        material_external_id: &str,
    ) -> ProviderResult<(Vec<u8>, ExternalMaterial)>;

    async fn list_enrollments(
        &self,
        course_external_id: &str,
    ) -> ProviderResult<Vec<ExternalEnrollment>>;
}

/// Every configured provider, sharing one discovery engine.
pub struct ProviderRegistry {
    engine: Arc<DiscoveryEngine>,
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Build one provider per config entry according to its `kind`.
    pub fn from_config(config: EngineConfig) -> Self {
        let engine = Arc::new(DiscoveryEngine::new(config.clone()));
        let providers = config
            .providers
            .into_iter()
            .map(|(name, cfg)| {
                let provider = create_provider(&name, cfg, engine.clone());
                (name, provider)
            })
            .collect();
        Self { engine, providers }
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Provider names in sorted order.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    pub fn engine(&self) -> &Arc<DiscoveryEngine> {
        &self.engine
    }

    /// Release the shared browser.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

/// Helper to create a provider from its config entry.
pub fn create_provider(
    name: &str,
    config: crate::config::ProviderConfig,
    engine: Arc<DiscoveryEngine>,
) -> Arc<dyn Provider> {
    match config.kind {
        ProviderKind::Canvas => Arc::new(CanvasProvider::new(name, config)),
        ProviderKind::Portal => Arc::new(PortalProvider::new(name, config, engine)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_by_kind() {
        let config = EngineConfig::from_toml_str(
            r#"
[providers.canvas]
kind = "canvas"
base_url = "https://canvas.example.edu"
token = "abc"

[providers.campus]
kind = "portal"
base_url = "https://campus.example.edu"
"#,
        )
        .unwrap();
        let registry = ProviderRegistry::from_config(config);

        assert_eq!(registry.list(), vec!["campus", "canvas"]);
        let canvas = registry.get("canvas").unwrap();
        assert_eq!(canvas.kind(), ProviderKind::Canvas);
        assert!(canvas.is_configured());

        let campus = registry.get("campus").unwrap();
        assert_eq!(campus.kind(), ProviderKind::Portal);
        assert!(!campus.is_configured());
        assert!(registry.get("missing").is_none());
    }
}
