//! Browser engine configuration.
//!
//! Always compiled (not behind `#[cfg(feature = "browser")]`) so config files
//! parse the same way with or without the browser feature.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserEngineConfig {
    /// Allow providers to render pages in a browser at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Explicit Chrome/Chromium binary. Searched on common paths when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222" or
    /// "http://localhost:9222"). If set, connects to an existing browser
    /// instead of launching one. Can also be set via `BROWSER_URL`.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Seconds to wait for launch or remote connection.
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout: u64,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            headless: default_headless(),
            chrome_path: None,
            chrome_args: Vec::new(),
            proxy: None,
            remote_url: None,
            launch_timeout: default_launch_timeout(),
        }
    }
}

impl BrowserEngineConfig {
    /// Apply environment variable overrides.
    ///
    /// - `BROWSER_URL` - Remote Chrome DevTools URL
    /// - `BROWSER_HEADLESS` - `false`/`0` to show the browser window
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("BROWSER_URL") {
            if !val.is_empty() {
                self.remote_url = Some(val);
            }
        }

        if let Ok(val) = std::env::var("BROWSER_HEADLESS") {
            match val.to_lowercase().as_str() {
                "0" | "false" | "no" | "off" => self.headless = false,
                "1" | "true" | "yes" | "on" => self.headless = true,
                _ => {}
            }
        }

        self
    }

    pub fn is_remote(&self) -> bool {
        self.remote_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

fn default_enabled() -> bool {
    true
}

pub fn default_headless() -> bool {
    true
}

fn default_launch_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg: BrowserEngineConfig = toml::from_str("").unwrap();
        assert!(cfg.enabled);
        assert!(cfg.headless);
        assert!(!cfg.is_remote());
        assert_eq!(cfg.launch_timeout, 30);
    }

    #[test]
    fn test_remote_url_from_toml() {
        let cfg: BrowserEngineConfig =
            toml::from_str(r#"remote_url = "ws://localhost:9222""#).unwrap();
        assert!(cfg.is_remote());
    }
}
