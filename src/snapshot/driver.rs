//! The page-automation seam.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::scripts;

/// One network response observed while the page was open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkExchange {
    pub url: String,
    pub mime_type: String,
    pub status: u16,
    /// Only kept for small JSON bodies of API-like endpoints.
    pub body: Option<String>,
}

/// A single open page that can be navigated and scripted.
///
/// Implemented over a CDP page for real runs and by scripted fakes in tests.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> anyhow::Result<()>;

    async fn current_url(&mut self) -> anyhow::Result<String>;

    /// Evaluate a script and return its JSON result.
    async fn evaluate(&mut self, script: &str) -> anyhow::Result<serde_json::Value>;

    /// Resolve once the page stops loading resources. Callers bound this
    /// with their own timeout.
    async fn wait_for_quiescence(&mut self) -> anyhow::Result<()> {
        let mut last: Option<u64> = None;
        let mut stable_polls = 0;
        loop {
            let state = self.evaluate(scripts::QUIESCENCE_PROBE).await?;
            let ready = state.get("ready").and_then(|v| v.as_str()) == Some("complete");
            let resources = state.get("resources").and_then(|v| v.as_u64()).unwrap_or(0);

            if ready && last == Some(resources) {
                stable_polls += 1;
                if stable_polls >= 2 {
                    return Ok(());
                }
            } else {
                stable_polls = 0;
            }
            last = Some(resources);
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Take every network response recorded since the last call.
    async fn drain_network(&mut self) -> Vec<NetworkExchange>;
}
