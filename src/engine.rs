//! The long-lived discovery engine.
//!
//! Owns the shared browser handle and runs one material extraction per
//! call: snapshot each page (browser or static), identify candidates, then
//! dedup and rank across pages.

use std::collections::{HashSet, VecDeque};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::AuthSession;
use crate::browser::{BrowserEngine, BrowserSession};
use crate::config::{EngineConfig, IdentifierKind, PortalSignatures};
use crate::crawler::{is_material_section_link, CrawlLink};
use crate::dedup::rank_materials;
use crate::error::{ProviderError, ProviderResult};
use crate::http_client::HttpClient;
use crate::identify::{identifier_for, identify_snapshot, MaterialIdentifier};
use crate::models::ExtractedMaterial;
use crate::snapshot::{looks_like_login_url, snapshot_from_html, PageSnapshot, SnapshotExtractor};
use crate::utils::normalize_url_key;

/// Everything one extraction needs from its provider.
pub struct ExtractionRequest<'a> {
    pub provider: &'a str,
    /// The course page; sub-pages are discovered from it.
    pub page_url: &'a str,
    pub auth: &'a AuthSession,
    /// Carries the same session for the static path.
    pub http: &'a HttpClient,
    pub use_browser: bool,
    pub identifier: IdentifierKind,
    pub signatures: &'a PortalSignatures,
}

/// Engine handle shared by every provider built from one configuration.
pub struct DiscoveryEngine {
    config: EngineConfig,
    browser: Mutex<BrowserEngine>,
}

impl DiscoveryEngine {
    pub fn new(config: EngineConfig) -> Self {
        let browser = BrowserEngine::new(config.browser.clone());
        Self {
            config,
            browser: Mutex::new(browser),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Close the shared browser, if one was started.
    pub async fn shutdown(&self) {
        self.browser.lock().await.close().await;
    }

    fn browser_wanted(&self, request: &ExtractionRequest<'_>) -> bool {
        request.use_browser && self.config.browser.enabled && BrowserEngine::is_supported()
    }

    /// Candidate materials for one course, ranked by confidence.
    ///
    /// Fails with `DiscoveryFailed` only when every visited page failed.
    pub async fn extract_materials(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> ProviderResult<Vec<ExtractedMaterial>> {
        let identifier = identifier_for(request.identifier, &self.config);

        let candidates = if self.browser_wanted(request) {
            match self.open_session(request).await {
                Ok(mut session) => {
                    let result = self
                        .extract_pages(request, identifier.as_ref(), &mut session)
                        .await;
                    session.close().await;
                    result?
                }
                Err(e) => {
                    warn!(
                        "{}: browser unavailable ({}), falling back to static pages",
                        request.provider, e
                    );
                    self.extract_pages(request, identifier.as_ref(), &mut StaticPages)
                        .await?
                }
            }
        } else {
            self.extract_pages(request, identifier.as_ref(), &mut StaticPages)
                .await?
        };

        let total = candidates.len();
        let ranked = rank_materials(candidates);
        info!(
            "{}: {} material(s) from {} candidate(s) for {}",
            request.provider,
            ranked.len(),
            total,
            request.page_url
        );
        Ok(ranked)
    }

    async fn open_session(&self, request: &ExtractionRequest<'_>) -> ProviderResult<BrowserSession> {
        let mut browser = self.browser.lock().await;
        browser
            .new_session(
                request.auth,
                request.page_url,
                self.config.snapshot.max_intercept_body_bytes,
            )
            .await
    }

    /// Visit the course page and its material sections sequentially.
    async fn extract_pages<S: SnapshotSource + ?Sized>(
        &self,
        request: &ExtractionRequest<'_>,
        identifier: &dyn MaterialIdentifier,
        source: &mut S,
    ) -> ProviderResult<Vec<ExtractedMaterial>> {
        let max_pages = self.config.snapshot.max_pages.max(1);
        let mut queue: VecDeque<String> = VecDeque::from([request.page_url.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();
        let mut succeeded = 0usize;
        let mut last_error: Option<ProviderError> = None;

        while let Some(url) = queue.pop_front() {
            if visited.len() >= max_pages {
                debug!("{}: page limit {} reached", request.provider, max_pages);
                break;
            }
            if !visited.insert(normalize_url_key(&url)) {
                continue;
            }

            let snapshot = match source.snapshot(self, request, &url).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("{}: skipping {}: {}", request.provider, url, e);
                    last_error = Some(e);
                    continue;
                }
            };
            succeeded += 1;

            // Only the course page itself fans out.
            if visited.len() == 1 {
                for link in section_links(&snapshot, request.page_url, request.signatures) {
                    queue.push_back(link);
                }
                if !queue.is_empty() {
                    debug!(
                        "{}: {} material section(s) linked from {}",
                        request.provider,
                        queue.len(),
                        url
                    );
                }
            }

            candidates.extend(identify_snapshot(identifier, &snapshot).await);
        }

        if succeeded == 0 {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no page could be loaded".to_string());
            return Err(ProviderError::DiscoveryFailed(format!(
                "{}: {}",
                request.page_url, reason
            )));
        }
        Ok(candidates)
    }
}

fn section_links(
    snapshot: &PageSnapshot,
    course_url: &str,
    signatures: &PortalSignatures,
) -> Vec<String> {
    let mut seen = HashSet::new();
    snapshot
        .links
        .iter()
        .map(|l| CrawlLink {
            href: l.href.clone(),
            text: l.text.clone(),
        })
        .filter(|l| is_material_section_link(l, course_url, signatures))
        .filter(|l| seen.insert(normalize_url_key(&l.href)))
        .map(|l| l.href)
        .collect()
}

/// Where page snapshots come from.
#[async_trait::async_trait]
trait SnapshotSource: Send {
    async fn snapshot(
        &mut self,
        engine: &DiscoveryEngine,
        request: &ExtractionRequest<'_>,
        url: &str,
    ) -> ProviderResult<PageSnapshot>;
}

/// Pages fetched over HTTP with the session cookies and parsed statically.
struct StaticPages;

#[async_trait::async_trait]
impl SnapshotSource for StaticPages {
    async fn snapshot(
        &mut self,
        _engine: &DiscoveryEngine,
        request: &ExtractionRequest<'_>,
        url: &str,
    ) -> ProviderResult<PageSnapshot> {
        let (final_url, html) = request.http.get_page(url).await?;
        if looks_like_login_url(&final_url) && !looks_like_login_url(url) {
            warn!(
                "{} redirected to {} which looks like a login page; session may have expired",
                url, final_url
            );
        }
        let snapshot = snapshot_from_html(&html, &final_url);
        debug!(
            "Static snapshot of {}: {} link(s), {} iframe(s), {} file row(s)",
            final_url,
            snapshot.links.len(),
            snapshot.iframes.len(),
            snapshot.file_items.len()
        );
        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl SnapshotSource for BrowserSession {
    async fn snapshot(
        &mut self,
        engine: &DiscoveryEngine,
        _request: &ExtractionRequest<'_>,
        url: &str,
    ) -> ProviderResult<PageSnapshot> {
        SnapshotExtractor::new(&engine.config.snapshot)
            .capture(self, url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::PageLink;

    #[test]
    fn test_section_links_stay_in_course() {
        let mut snap = PageSnapshot::new("https://p.edu/Curso.asp?idCurso=1");
        snap.links = vec![
            PageLink {
                href: "https://p.edu/Materiales.asp?idCurso=1".to_string(),
                text: "Material de estudio".to_string(),
                ..Default::default()
            },
            PageLink {
                href: "https://p.edu/Materiales.asp?idCurso=1#top".to_string(),
                text: "Materiales".to_string(),
                ..Default::default()
            },
            PageLink {
                href: "https://other.edu/material".to_string(),
                text: "Material".to_string(),
                ..Default::default()
            },
            PageLink {
                href: "https://p.edu/Salir.asp".to_string(),
                text: "Cerrar sesión".to_string(),
                ..Default::default()
            },
        ];
        let links = section_links(
            &snap,
            "https://p.edu/Curso.asp?idCurso=1",
            &PortalSignatures::default(),
        );
        assert_eq!(links, vec!["https://p.edu/Materiales.asp?idCurso=1".to_string()]);
    }
}
