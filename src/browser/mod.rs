//! Owned headless-browser handle.
//!
//! One [`BrowserEngine`] is held by the long-lived engine object and
//! launched lazily. Every logical operation opens its own isolated browser
//! context through [`BrowserEngine::new_session`] and closes it when done;
//! contexts are never pooled.

#[cfg(feature = "browser")]
mod page;

#[cfg(feature = "browser")]
pub use page::BrowserSession;

use crate::auth::AuthSession;
use crate::config::BrowserEngineConfig;
use crate::error::{ProviderError, ProviderResult};

#[cfg(feature = "browser")]
use std::sync::Arc;
#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use anyhow::Context;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info};

#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig};
#[cfg(feature = "browser")]
use futures::StreamExt;

/// Shared browser process (or remote connection).
#[cfg(feature = "browser")]
pub struct BrowserEngine {
    config: BrowserEngineConfig,
    browser: Option<Arc<Mutex<Browser>>>,
    handler: Option<JoinHandle<()>>,
}

#[cfg(feature = "browser")]
impl BrowserEngine {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    pub fn new(config: BrowserEngineConfig) -> Self {
        Self {
            config,
            browser: None,
            handler: None,
        }
    }

    /// Whether this build can drive a browser at all.
    pub fn is_supported() -> bool {
        true
    }

    pub fn is_open(&self) -> bool {
        self.browser.is_some()
    }

    fn find_chrome(&self) -> anyhow::Result<std::path::PathBuf> {
        if let Some(path) = &self.config.chrome_path {
            if path.exists() {
                return Ok(path.clone());
            }
            anyhow::bail!("configured chrome_path {:?} does not exist", path);
        }

        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                debug!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Install it, set browser.chrome_path, \
             or point BROWSER_URL at a running DevTools endpoint"
        ))
    }

    /// Launch or connect if not already running.
    pub async fn open(&mut self) -> ProviderResult<()> {
        if self.browser.is_some() {
            return Ok(());
        }
        let timeout = Duration::from_secs(self.config.launch_timeout);
        let started = tokio::time::timeout(timeout, self.start())
            .await
            .map_err(|_| {
                ProviderError::Browser(format!(
                    "browser did not start within {}s",
                    self.config.launch_timeout
                ))
            })?;
        started.map_err(|e| ProviderError::Browser(format!("{:#}", e)))
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        let (browser, mut handler) = match self.config.remote_url.clone().filter(|u| !u.is_empty()) {
            Some(remote_url) => {
                let ws_url = Self::resolve_ws_url(&remote_url).await?;
                info!("Connecting to remote browser at {}", ws_url);
                Browser::connect(ws_url)
                    .await
                    .context("Failed to connect to remote browser")?
            }
            None => {
                info!("Launching browser (headless={})", self.config.headless);
                let mut builder = BrowserConfig::builder().chrome_executable(self.find_chrome()?);
                if !self.config.headless {
                    builder = builder.with_head();
                }
                if let Some(ref proxy) = self.config.proxy {
                    builder = builder.arg(format!("--proxy-server={}", proxy));
                }
                builder = builder
                    .arg("--disable-dev-shm-usage")
                    .arg("--no-first-run")
                    .arg("--no-default-browser-check")
                    .arg("--disable-background-networking")
                    .arg("--disable-sync")
                    .arg("--no-sandbox")
                    .arg("--disable-gpu");
                for arg in &self.config.chrome_args {
                    builder = builder.arg(arg);
                }
                let config = builder
                    .build()
                    .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;
                Browser::launch(config)
                    .await
                    .context("Failed to launch browser")?
            }
        };

        self.handler = Some(tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        }));
        self.browser = Some(Arc::new(Mutex::new(browser)));
        Ok(())
    }

    /// `ws://` endpoints are used as-is; `http://` ones are asked for
    /// their debugger URL via `/json/version`.
    async fn resolve_ws_url(remote_url: &str) -> anyhow::Result<String> {
        if remote_url.starts_with("ws://") || remote_url.starts_with("wss://") {
            return Ok(remote_url.to_string());
        }
        let version_url = format!("{}/json/version", remote_url.trim_end_matches('/'));
        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;
        resp.get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))
    }

    /// Open an isolated context with the session's cookies and token applied.
    pub async fn new_session(
        &mut self,
        auth: &AuthSession,
        base_url: &str,
        max_body_bytes: usize,
    ) -> ProviderResult<BrowserSession> {
        self.open().await?;
        let browser = self
            .browser
            .clone()
            .ok_or_else(|| ProviderError::Browser("browser is not running".to_string()))?;
        BrowserSession::open(browser, auth, base_url, max_body_bytes)
            .await
            .map_err(|e| ProviderError::Browser(format!("{:#}", e)))
    }

    /// Shut the browser down. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(browser) = self.browser.take() {
            // A remote browser belongs to someone else; only disconnect.
            if !self.config.is_remote() {
                let mut browser = browser.lock().await;
                if let Err(e) = browser.close().await {
                    debug!("Browser close reported: {}", e);
                }
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

/// Stand-in when the crate is built without the `browser` feature: every
/// session request fails and callers fall back to static snapshots.
#[cfg(not(feature = "browser"))]
pub struct BrowserEngine {
    #[allow(dead_code)]
    config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserEngine {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    pub fn is_supported() -> bool {
        false
    }

    pub fn is_open(&self) -> bool {
        false
    }

    pub async fn open(&mut self) -> ProviderResult<()> {
        Err(ProviderError::Browser(
            "browser support not compiled; rebuild with --features browser".to_string(),
        ))
    }

    pub async fn new_session(
        &mut self,
        _auth: &AuthSession,
        _base_url: &str,
        _max_body_bytes: usize,
    ) -> ProviderResult<BrowserSession> {
        Err(ProviderError::Browser(
            "browser support not compiled; rebuild with --features browser".to_string(),
        ))
    }

    pub async fn close(&mut self) {}
}

/// Never constructed without the `browser` feature.
#[cfg(not(feature = "browser"))]
pub struct BrowserSession {
    _private: (),
}

#[cfg(not(feature = "browser"))]
impl BrowserSession {
    pub async fn close(self) {}
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl crate::snapshot::PageDriver for BrowserSession {
    async fn navigate(&mut self, _url: &str) -> anyhow::Result<()> {
        anyhow::bail!("browser support not compiled")
    }

    async fn current_url(&mut self) -> anyhow::Result<String> {
        anyhow::bail!("browser support not compiled")
    }

    async fn evaluate(&mut self, _script: &str) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("browser support not compiled")
    }

    async fn drain_network(&mut self) -> Vec<crate::snapshot::NetworkExchange> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_without_open_is_noop() {
        let mut engine = BrowserEngine::new(BrowserEngineConfig::default());
        assert!(!engine.is_open());
        engine.close().await;
        engine.close().await;
        assert!(!engine.is_open());
    }

    #[cfg(feature = "browser")]
    #[tokio::test]
    async fn test_missing_chrome_path_is_browser_error() {
        let mut engine = BrowserEngine::new(BrowserEngineConfig {
            chrome_path: Some("/nonexistent/chrome".into()),
            launch_timeout: 5,
            ..Default::default()
        });
        let err = engine.open().await.unwrap_err();
        assert!(matches!(err, ProviderError::Browser(_)));
        assert!(!engine.is_open());
    }
}
