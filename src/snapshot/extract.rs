//! Browser-driven snapshot capture.

use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    extract_url_templates, ingest_exchanges, scripts, FileItem, PageDriver, PageLink,
    PageSnapshot,
};
use crate::config::SnapshotConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::resolve::click_resolve;

const LOGIN_MARKERS: &[&str] = &[
    "login", "signin", "sign-in", "logon", "iniciar", "acceso", "/auth/", "/sso/",
];

/// Whether a URL looks like a login page the portal redirected to.
pub fn looks_like_login_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    LOGIN_MARKERS.iter().any(|m| lower.contains(m))
}

/// Result of the in-page extraction script.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExtraction {
    url: String,
    title: String,
    links: Vec<PageLink>,
    iframes: Vec<String>,
    file_items: Vec<FileItem>,
    material_names: Vec<String>,
    scripts: Vec<String>,
}

/// Drives one page through navigation, expansion and extraction.
pub struct SnapshotExtractor<'a> {
    config: &'a SnapshotConfig,
}

impl<'a> SnapshotExtractor<'a> {
    pub fn new(config: &'a SnapshotConfig) -> Self {
        Self { config }
    }

    /// Capture a snapshot of `url`.
    ///
    /// Navigation and quiescence timeouts are tolerated; only a failed
    /// extraction script fails the page.
    pub async fn capture<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        url: &str,
    ) -> ProviderResult<PageSnapshot> {
        match tokio::time::timeout(self.config.navigation_timeout(), driver.navigate(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Navigation to {} reported an error, continuing: {}", url, e),
            Err(_) => warn!(
                "Navigation to {} timed out after {}ms, continuing with what loaded",
                url, self.config.navigation_timeout_ms
            ),
        }

        if let Ok(current) = driver.current_url().await {
            if looks_like_login_url(&current) && !looks_like_login_url(url) {
                warn!(
                    "{} redirected to {} which looks like a login page; session may have expired",
                    url, current
                );
            }
        }

        if tokio::time::timeout(self.config.quiescence_timeout(), driver.wait_for_quiescence())
            .await
            .is_err()
        {
            debug!(
                "Network did not settle within {}ms on {}, extracting anyway",
                self.config.quiescence_timeout_ms, url
            );
        }

        let expanded = self.expand_sections(driver).await;
        if expanded > 0 {
            debug!("Expanded {} collapsed section(s) on {}", expanded, url);
        }

        let raw = self.run_extraction(driver, url).await?;

        let mut snapshot = PageSnapshot {
            url: if raw.url.is_empty() { url.to_string() } else { raw.url },
            title: raw.title,
            links: raw.links,
            iframes: raw.iframes,
            file_items: raw.file_items,
            material_names: raw.material_names,
            download_url_patterns: extract_url_templates(&raw.scripts),
            ..Default::default()
        };

        snapshot.network_requests = driver.drain_network().await;
        ingest_exchanges(
            &snapshot.network_requests,
            &mut snapshot.file_url_map,
            &mut snapshot.file_title_map,
        );

        click_resolve(driver, &mut snapshot, self.config).await;

        info!(
            "Snapshot of {}: {} link(s), {} iframe(s), {} file row(s), {} response(s), {} template(s)",
            snapshot.url,
            snapshot.links.len(),
            snapshot.iframes.len(),
            snapshot.file_items.len(),
            snapshot.network_requests.len(),
            snapshot.download_url_patterns.len()
        );
        Ok(snapshot)
    }

    /// Click collapsed sections open, bounded by count and total time.
    async fn expand_sections<D: PageDriver + ?Sized>(&self, driver: &mut D) -> usize {
        let started = Instant::now();
        let mut clicked = 0;
        while clicked < self.config.max_accordion_clicks
            && started.elapsed() < self.config.accordion_budget()
        {
            let remaining = self.config.accordion_budget().saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining, driver.evaluate(scripts::EXPAND_NEXT)).await {
                Ok(Ok(serde_json::Value::Bool(true))) => {
                    clicked += 1;
                    tokio::time::sleep(self.config.accordion_settle()).await;
                }
                Ok(Ok(_)) => break,
                Ok(Err(e)) => {
                    debug!("Accordion expansion stopped: {}", e);
                    break;
                }
                Err(_) => break,
            }
        }
        clicked
    }

    async fn run_extraction<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        url: &str,
    ) -> ProviderResult<RawExtraction> {
        let value = tokio::time::timeout(
            self.config.evaluation_timeout(),
            driver.evaluate(scripts::EXTRACT),
        )
        .await
        .map_err(|_| {
            ProviderError::DiscoveryFailed(format!(
                "extraction on {} timed out after {}ms",
                url, self.config.evaluation_timeout_ms
            ))
        })?
        .map_err(|e| ProviderError::DiscoveryFailed(format!("extraction on {} failed: {}", url, e)))?;

        serde_json::from_value(value).map_err(|e| {
            ProviderError::DiscoveryFailed(format!("unexpected extraction result on {}: {}", url, e))
        })
    }
}
