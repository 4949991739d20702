//! Filling in download URLs for file rows identified only by an opaque id.
//!
//! Tiers, first hit wins: intercepted JSON, a link inside the row, a script
//! template, the URL discovered by clicking the row, and finally a URL
//! inferred from another row's click. Rows no tier resolves are dropped.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SnapshotConfig;
use crate::identify::heuristics::{is_downloadable_url, is_portal_page};
use crate::models::MaterialSource;
use crate::snapshot::{build_from_template, scripts, FileItem, PageDriver, PageSnapshot};
use crate::utils::{normalize_url_key, resolve_url};

/// How long a clicked preview gets to open.
const PREVIEW_SETTLE: Duration = Duration::from_millis(800);

/// Which strategy resolved a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    Intercepted,
    RowLink,
    Template,
    Clicked,
    Inferred,
}

impl ResolutionTier {
    pub fn confidence(&self) -> f32 {
        match self {
            Self::Intercepted => 0.95,
            Self::RowLink => 0.85,
            Self::Template => 0.75,
            Self::Clicked => 0.85,
            Self::Inferred => 0.6,
        }
    }

    pub fn source(&self) -> MaterialSource {
        match self {
            Self::Intercepted | Self::Clicked => MaterialSource::PreviewExtract,
            Self::RowLink | Self::Template | Self::Inferred => MaterialSource::DataId,
        }
    }
}

/// A resolved row URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUrl {
    pub url: String,
    pub tier: ResolutionTier,
}

/// First downloadable link inside the row, else the first link that is
/// not a portal page or script call.
pub fn row_link(item: &FileItem) -> Option<String> {
    let usable = |href: &str| {
        !href.is_empty() && !href.to_lowercase().starts_with("javascript:") && !href.starts_with('#')
    };
    item.links
        .iter()
        .map(|l| l.href.as_str())
        .filter(|h| usable(h))
        .find(|h| is_downloadable_url(h))
        .or_else(|| {
            item.links
                .iter()
                .map(|l| l.href.as_str())
                .filter(|h| usable(h))
                .find(|h| !is_portal_page(h))
        })
        .map(str::to_string)
}

/// Replace the clicked row's id inside its URL with `target_id`.
///
/// Only ids that appear as a whole path segment or query value are
/// replaced; `None` when the clicked URL does not carry its id.
pub fn infer_from_click(clicked_id: &str, clicked_url: &str, target_id: &str) -> Option<String> {
    if clicked_id.is_empty() {
        return None;
    }
    let bytes = clicked_url.as_bytes();
    let is_boundary = |idx: Option<usize>| match idx {
        None => true,
        Some(i) => !bytes[i].is_ascii_alphanumeric(),
    };

    let mut search_end = clicked_url.len();
    while let Some(pos) = clicked_url[..search_end].rfind(clicked_id) {
        let end = pos + clicked_id.len();
        let before = pos.checked_sub(1);
        let after = (end < bytes.len()).then_some(end);
        if is_boundary(before) && is_boundary(after) && pos > 0 {
            let encoded = urlencoding::encode(target_id);
            return Some(format!("{}{}{}", &clicked_url[..pos], encoded, &clicked_url[end..]));
        }
        if pos == 0 {
            break;
        }
        search_end = pos;
    }
    None
}

/// Resolve one file row against the snapshot.
pub fn resolve_file_item(
    item: &FileItem,
    snapshot: &PageSnapshot,
    infer_from_clicks: bool,
) -> Option<ResolvedUrl> {
    let id = item.data_id.as_deref().filter(|id| !id.is_empty());

    if let Some(url) = id.and_then(|id| snapshot.file_url_map.get(id)) {
        return Some(ResolvedUrl {
            url: url.clone(),
            tier: ResolutionTier::Intercepted,
        });
    }

    if let Some(url) = row_link(item) {
        return Some(ResolvedUrl {
            url: resolve_url(&snapshot.url, &url),
            tier: ResolutionTier::RowLink,
        });
    }

    let id = id?;

    if let Some(template) = snapshot.download_url_patterns.first() {
        return Some(ResolvedUrl {
            url: build_from_template(template, id, &snapshot.url),
            tier: ResolutionTier::Template,
        });
    }

    if let Some(url) = snapshot.clicked_urls.get(id) {
        return Some(ResolvedUrl {
            url: url.clone(),
            tier: ResolutionTier::Clicked,
        });
    }

    if infer_from_clicks {
        let mut clicked: Vec<(&String, &String)> = snapshot.clicked_urls.iter().collect();
        clicked.sort();
        if let Some(url) = clicked
            .into_iter()
            .find_map(|(cid, curl)| infer_from_click(cid, curl, id))
        {
            return Some(ResolvedUrl {
                url,
                tier: ResolutionTier::Inferred,
            });
        }
    }

    None
}

/// Rows with an id that no passive tier can resolve.
fn ambiguous_rows(snapshot: &PageSnapshot) -> Vec<String> {
    if !snapshot.download_url_patterns.is_empty() {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    snapshot
        .file_items
        .iter()
        .filter(|item| row_link(item).is_none())
        .filter_map(|item| item.data_id.clone())
        .filter(|id| !id.is_empty() && !snapshot.file_url_map.contains_key(id))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn string_list(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Frame sources currently open on the page.
async fn preview_sources<D: PageDriver + ?Sized>(driver: &mut D, eval_timeout: Duration) -> Vec<String> {
    match tokio::time::timeout(eval_timeout, driver.evaluate(scripts::PREVIEW_SOURCE)).await {
        Ok(Ok(value)) => string_list(value),
        _ => Vec::new(),
    }
}

/// Click the preview control of up to `max_click_resolutions` ambiguous
/// rows and record the URL each one exposes: a new frame source, or the
/// page it navigated to (after which the page is navigated back).
pub async fn click_resolve<D: PageDriver + ?Sized>(
    driver: &mut D,
    snapshot: &mut PageSnapshot,
    config: &SnapshotConfig,
) {
    let ambiguous = ambiguous_rows(snapshot);
    if ambiguous.is_empty() || config.max_click_resolutions == 0 {
        return;
    }

    let eval_timeout = config.evaluation_timeout();
    let mut known: HashSet<String> = snapshot
        .iframes
        .iter()
        .map(|s| normalize_url_key(s))
        .collect();

    for id in ambiguous.iter().take(config.max_click_resolutions) {
        // Frames left over from earlier previews never belong to this row.
        known.extend(
            preview_sources(driver, eval_timeout)
                .await
                .iter()
                .map(|s| normalize_url_key(s)),
        );

        let clicked = tokio::time::timeout(eval_timeout, driver.evaluate(&scripts::click_preview(id))).await;
        if !matches!(clicked, Ok(Ok(serde_json::Value::Bool(true)))) {
            debug!("Preview click for row {} did nothing", id);
            continue;
        }
        tokio::time::sleep(PREVIEW_SETTLE).await;

        let current = driver.current_url().await.unwrap_or_default();
        if !current.is_empty() && normalize_url_key(&current) != normalize_url_key(&snapshot.url) {
            debug!("Row {} navigated to {}", id, current);
            snapshot.clicked_urls.insert(id.clone(), current);
            if let Err(e) = tokio::time::timeout(config.navigation_timeout(), driver.navigate(&snapshot.url))
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out")))
            {
                warn!("Could not navigate back to {}: {}", snapshot.url, e);
                break;
            }
            continue;
        }

        if let Some(src) = preview_sources(driver, eval_timeout)
            .await
            .into_iter()
            .find(|s| !known.contains(&normalize_url_key(s)))
        {
            debug!("Row {} previewed {}", id, src);
            known.insert(normalize_url_key(&src));
            snapshot
                .clicked_urls
                .insert(id.clone(), resolve_url(&snapshot.url, &src));
        }

        let _ = tokio::time::timeout(eval_timeout, driver.evaluate(scripts::CLOSE_PREVIEW)).await;
    }

    let network = driver.drain_network().await;
    if !network.is_empty() {
        crate::snapshot::ingest_exchanges(
            &network,
            &mut snapshot.file_url_map,
            &mut snapshot.file_title_map,
        );
        snapshot.network_requests.extend(network);
    }
}
