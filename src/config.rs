//! Configuration for the discovery engine and its providers.
//!
//! Loaded from TOML, then overlaid with environment variables so secrets
//! can stay out of the file:
//!
//! ```toml
//! [providers.campus]
//! kind = "portal"
//! base_url = "https://campus.example.edu"
//! username = "student"
//!
//! [providers.campus.paths]
//! login = "/Login.asp"
//!
//! [providers.canvas]
//! kind = "canvas"
//! base_url = "https://canvas.example.edu"
//! ```

mod browser;
mod llm;
mod portal;
mod snapshot;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

pub use browser::{default_headless, BrowserEngineConfig};
pub use llm::{LlmConfig, LlmProvider};
pub use portal::{PathTemplates, PortalSignatures};
pub use snapshot::SnapshotConfig;

/// Which provider implementation backs a config entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Canvas-style REST API with bearer tokens and `Link` pagination.
    Canvas,
    /// HTML portal behind a form login; everything is scraped.
    #[default]
    Portal,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canvas => "canvas",
            Self::Portal => "portal",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy used to turn a page snapshot into candidate materials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    #[default]
    Rules,
    Llm,
}

/// One configured provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Portal root; relative path templates are resolved against it.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token (API providers) or pre-issued session token (portals).
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Render pages in a headless browser. When false (or when the crate is
    /// built without the `browser` feature) pages are fetched over HTTP and
    /// parsed statically.
    #[serde(default = "default_true")]
    pub use_browser: bool,

    #[serde(default)]
    pub identifier: IdentifierKind,

    /// User-Agent for HTTP requests: unset for the crate's own, `"browser"`
    /// for a desktop Chrome agent, or a literal string.
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub paths: PathTemplates,

    #[serde(default)]
    pub signatures: PortalSignatures,
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: Some(base_url.into()),
            timeout: default_timeout(),
            use_browser: true,
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Base URL with any trailing slash removed, if set and non-empty.
    pub fn base(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
    }

    /// Apply `COURSEFETCH_<NAME>_*` environment overrides.
    ///
    /// - `COURSEFETCH_<NAME>_BASE_URL`
    /// - `COURSEFETCH_<NAME>_TOKEN`
    /// - `COURSEFETCH_<NAME>_USERNAME`
    /// - `COURSEFETCH_<NAME>_PASSWORD`
    /// - `COURSEFETCH_<NAME>_TIMEOUT` (seconds)
    pub fn with_env_overrides(mut self, name: &str) -> Self {
        let prefix = env_prefix(name);
        let var = |suffix: &str| {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .filter(|v| !v.is_empty())
        };

        if let Some(val) = var("BASE_URL") {
            self.base_url = Some(val);
        }
        if let Some(val) = var("TOKEN") {
            self.token = Some(val);
        }
        if let Some(val) = var("USERNAME") {
            self.username = Some(val);
        }
        if let Some(val) = var("PASSWORD") {
            self.password = Some(val);
        }
        if let Some(secs) = var("TIMEOUT").and_then(|v| v.parse().ok()) {
            self.timeout = secs;
        }
        self
    }
}

/// `campus-east` becomes `COURSEFETCH_CAMPUS_EAST`.
fn env_prefix(name: &str) -> String {
    let upper: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("COURSEFETCH_{}", upper)
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub browser: BrowserEngineConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

impl EngineConfig {
    /// Parse a TOML document. No environment overrides are applied.
    pub fn from_toml_str(contents: &str) -> ProviderResult<Self> {
        toml::from_str(contents)
            .map_err(|e| ProviderError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Load configuration from a TOML file and apply environment overrides.
    pub async fn load_from_path(path: &Path) -> ProviderResult<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProviderError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::from_toml_str(&contents)?.with_env_overrides())
    }

    /// Apply environment overrides to every section.
    pub fn with_env_overrides(mut self) -> Self {
        self.providers = std::mem::take(&mut self.providers)
            .into_iter()
            .map(|(name, cfg)| {
                let cfg = cfg.with_env_overrides(&name);
                (name, cfg)
            })
            .collect();
        self.browser = self.browser.with_env_overrides();
        self.llm = self.llm.with_env_overrides();
        self
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[providers.campus]
kind = "portal"
base_url = "https://campus.example.edu/"
username = "student"
password = "hunter2"
use_browser = false

[providers.campus.paths]
login = "/Login.asp"
materials = "/Curso.asp?idCurso={course_id}"

[providers.canvas]
kind = "canvas"
base_url = "https://canvas.example.edu"
token = "abc"
timeout = 10

[snapshot]
max_click_resolutions = 1
infer_from_clicks = false
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();

        let campus = config.provider("campus").unwrap();
        assert_eq!(campus.kind, ProviderKind::Portal);
        assert_eq!(campus.base(), Some("https://campus.example.edu"));
        assert!(campus.has_credentials());
        assert!(!campus.use_browser);
        assert_eq!(campus.timeout, 30);
        assert_eq!(campus.paths.login, "/Login.asp");
        assert_eq!(campus.paths.seed, "/");
        assert!(!campus.signatures.course_params.is_empty());

        let canvas = config.provider("canvas").unwrap();
        assert_eq!(canvas.kind, ProviderKind::Canvas);
        assert!(canvas.has_token());
        assert_eq!(canvas.timeout, 10);

        assert_eq!(config.snapshot.max_click_resolutions, 1);
        assert!(!config.snapshot.infer_from_clicks);
        assert_eq!(config.snapshot.max_accordion_clicks, 20);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("providers = 3").unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix("campus-east"), "COURSEFETCH_CAMPUS_EAST");
        assert_eq!(env_prefix("canvas"), "COURSEFETCH_CANVAS");
    }

    #[test]
    fn test_provider_env_overrides() {
        std::env::set_var("COURSEFETCH_ENVTEST_TOKEN", "from-env");
        std::env::set_var("COURSEFETCH_ENVTEST_TIMEOUT", "7");
        let cfg = ProviderConfig::new(ProviderKind::Canvas, "https://x.edu")
            .with_env_overrides("envtest");
        std::env::remove_var("COURSEFETCH_ENVTEST_TOKEN");
        std::env::remove_var("COURSEFETCH_ENVTEST_TIMEOUT");

        assert_eq!(cfg.token.as_deref(), Some("from-env"));
        assert_eq!(cfg.timeout, 7);
    }

    #[test]
    fn test_blank_token_is_not_a_token() {
        let cfg = ProviderConfig::new(ProviderKind::Canvas, "https://x.edu").with_token("  ");
        assert!(!cfg.has_token());
    }
}
