//! Turning a page snapshot into ranked candidate materials.
//!
//! [`RuleBasedIdentifier`] is the default strategy and the fallback for
//! [`LlmIdentifier`]. Network-observed documents and media streams are
//! folded in by [`identify_snapshot`] whichever strategy ran.

pub mod heuristics;
mod llm;

pub use llm::{parse_llm_materials, LlmError, LlmIdentifier};

use async_trait::async_trait;
use tracing::debug;

use crate::config::{EngineConfig, IdentifierKind};
use crate::error::ProviderError;
use crate::models::{ExtractedMaterial, MaterialSource};
use crate::resolve::{resolve_file_item, ResolutionTier};
use crate::snapshot::PageSnapshot;
use crate::utils::resolve_url;
use heuristics::{
    file_type_of, is_downloadable_url, is_material_response, is_placeholder_text, is_portal_page,
    title_from_url, unwrap_viewer_url,
};

const IFRAME_CONFIDENCE: f32 = 0.9;
const LINK_CONFIDENCE: f32 = 0.8;
const NETWORK_CONFIDENCE: f32 = 0.9;

/// A strategy that picks materials out of a snapshot.
#[async_trait]
pub trait MaterialIdentifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Candidate materials on the page. Never fails: strategies degrade to
    /// fewer candidates instead.
    async fn identify(&self, snapshot: &PageSnapshot) -> Vec<ExtractedMaterial>;
}

/// Build the identifier the configuration asks for.
pub fn identifier_for(kind: IdentifierKind, config: &EngineConfig) -> Box<dyn MaterialIdentifier> {
    let rules = RuleBasedIdentifier::new(config.snapshot.infer_from_clicks);
    match kind {
        IdentifierKind::Rules => Box::new(rules),
        IdentifierKind::Llm => Box::new(LlmIdentifier::new(config.llm.clone(), rules)),
    }
}

/// Heuristic identification over iframes, file rows and anchors.
#[derive(Debug, Clone, Copy)]
pub struct RuleBasedIdentifier {
    infer_from_clicks: bool,
}

impl Default for RuleBasedIdentifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RuleBasedIdentifier {
    pub fn new(infer_from_clicks: bool) -> Self {
        Self { infer_from_clicks }
    }

    pub fn identify_sync(&self, snapshot: &PageSnapshot) -> Vec<ExtractedMaterial> {
        let mut materials = Vec::new();
        materials.extend(iframe_materials(snapshot));
        materials.extend(self.row_materials(snapshot));
        materials.extend(anchor_materials(snapshot));
        materials
    }

    fn row_materials(&self, snapshot: &PageSnapshot) -> Vec<ExtractedMaterial> {
        // Labels pair with rows by index; rows past the last label fall back.
        let names = &snapshot.material_names;

        let mut materials = Vec::new();
        for (idx, item) in snapshot.file_items.iter().enumerate() {
            let Some(resolved) = resolve_file_item(item, snapshot, self.infer_from_clicks) else {
                if let Some(id) = item.data_id.as_deref().filter(|id| !id.is_empty()) {
                    debug!("{}", ProviderError::ResolutionIncomplete(id.to_string()));
                }
                continue;
            };

            let intercepted_title = item
                .data_id
                .as_deref()
                .and_then(|id| snapshot.file_title_map.get(id))
                .filter(|t| !t.trim().is_empty());
            let positional = names.get(idx).filter(|n| !n.trim().is_empty());
            let row_text = Some(&item.text).filter(|t| !is_placeholder_text(t));

            // The portal's own record wins for rows it resolved.
            let title = if resolved.tier == ResolutionTier::Intercepted {
                intercepted_title.or(positional).or(row_text)
            } else {
                positional.or(intercepted_title).or(row_text)
            }
            .cloned()
            .unwrap_or_else(|| title_from_url(&resolved.url));

            materials.push(ExtractedMaterial::new(
                resolved.url.clone(),
                title,
                file_type_of(&resolved.url),
                resolved.tier.confidence(),
                resolved.tier.source(),
            ));
        }
        materials
    }
}

#[async_trait]
impl MaterialIdentifier for RuleBasedIdentifier {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn identify(&self, snapshot: &PageSnapshot) -> Vec<ExtractedMaterial> {
        self.identify_sync(snapshot)
    }
}

fn iframe_materials(snapshot: &PageSnapshot) -> Vec<ExtractedMaterial> {
    snapshot
        .iframes
        .iter()
        .map(|src| unwrap_viewer_url(&resolve_url(&snapshot.url, src)))
        .filter(|url| is_downloadable_url(url) && !is_portal_page(url))
        .map(|url| {
            ExtractedMaterial::new(
                url.clone(),
                title_from_url(&url),
                file_type_of(&url),
                IFRAME_CONFIDENCE,
                MaterialSource::Iframe,
            )
        })
        .collect()
}

fn anchor_materials(snapshot: &PageSnapshot) -> Vec<ExtractedMaterial> {
    snapshot
        .links
        .iter()
        .filter(|link| is_downloadable_url(&link.href) && !is_portal_page(&link.href))
        .map(|link| {
            let url = resolve_url(&snapshot.url, &link.href);
            let title = if is_placeholder_text(&link.text) {
                title_from_url(&url)
            } else {
                link.text.clone()
            };
            ExtractedMaterial::new(
                url.clone(),
                title,
                file_type_of(&url),
                LINK_CONFIDENCE,
                MaterialSource::Link,
            )
        })
        .collect()
}

/// Documents and media streams the page itself loaded.
pub fn network_materials(snapshot: &PageSnapshot) -> Vec<ExtractedMaterial> {
    snapshot
        .network_requests
        .iter()
        .filter(|exchange| is_material_response(exchange))
        .map(|exchange| {
            ExtractedMaterial::new(
                exchange.url.clone(),
                title_from_url(&exchange.url),
                file_type_of(&exchange.url),
                NETWORK_CONFIDENCE,
                MaterialSource::Network,
            )
        })
        .collect()
}

/// Run `identifier` and fold in network-observed materials.
pub async fn identify_snapshot(
    identifier: &dyn MaterialIdentifier,
    snapshot: &PageSnapshot,
) -> Vec<ExtractedMaterial> {
    let mut materials = identifier.identify(snapshot).await;
    let network = network_materials(snapshot);
    debug!(
        "{} identified {} candidate(s) on {} (+{} from network)",
        identifier.name(),
        materials.len(),
        snapshot.url,
        network.len()
    );
    materials.extend(network);
    materials
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FileButton, FileItem, NetworkExchange, PageLink};

    fn link(href: &str, text: &str) -> PageLink {
        PageLink {
            href: href.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn course_snapshot() -> PageSnapshot {
        let mut snap = PageSnapshot::new("https://p.edu/Curso.asp?idCurso=1");
        snap.iframes.push("https://p.edu/viewer/doc.pdf".to_string());
        snap.file_items.push(FileItem {
            data_id: Some("7".to_string()),
            text: "Lecture 1".to_string(),
            class_name: "file-item".to_string(),
            buttons: vec![FileButton {
                action: "preview(7)".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        snap.file_url_map
            .insert("7".to_string(), "https://p.edu/books/lec1.pdf".to_string());
        snap.file_title_map
            .insert("7".to_string(), "Lecture 1 Slides".to_string());
        snap
    }

    #[test]
    fn test_iframe_and_intercepted_row() {
        let materials = RuleBasedIdentifier::default().identify_sync(&course_snapshot());
        assert_eq!(materials.len(), 2);

        assert_eq!(materials[0].url, "https://p.edu/viewer/doc.pdf");
        assert_eq!(materials[0].source, MaterialSource::Iframe);
        assert!((materials[0].confidence - 0.9).abs() < f32::EPSILON);

        assert_eq!(materials[1].url, "https://p.edu/books/lec1.pdf");
        assert_eq!(materials[1].title, "Lecture 1 Slides");
        assert_eq!(materials[1].source, MaterialSource::PreviewExtract);
        assert!((materials[1].confidence - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn test_positional_names_and_placeholders() {
        let mut snap = PageSnapshot::new("https://p.edu/Curso.asp?idCurso=1");
        snap.download_url_patterns.push("/Descarga.asp?id=".to_string());
        for (id, text) in [("1", "0"), ("2", "Ver enlace")] {
            snap.file_items.push(FileItem {
                data_id: Some(id.to_string()),
                text: text.to_string(),
                ..Default::default()
            });
        }
        let materials = RuleBasedIdentifier::default().identify_sync(&snap);
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[0].title, "Descarga.asp");
        assert_eq!(materials[0].source, MaterialSource::DataId);

        snap.material_names = vec!["Guía 1".to_string(), "Guía 2".to_string()];
        let materials = RuleBasedIdentifier::default().identify_sync(&snap);
        assert_eq!(materials[0].title, "Guía 1");
        assert_eq!(materials[1].title, "Guía 2");
        assert_eq!(materials[1].url, "https://p.edu/Descarga.asp?id=2");

        // One label short: the first row keeps its label, the second falls back.
        snap.material_names = vec!["Guía 1".to_string()];
        let materials = RuleBasedIdentifier::default().identify_sync(&snap);
        assert_eq!(materials[0].title, "Guía 1");
        assert_eq!(materials[1].title, "Descarga.asp");
    }

    #[test]
    fn test_unresolved_rows_are_dropped() {
        let mut snap = PageSnapshot::new("https://p.edu/Curso.asp?idCurso=1");
        snap.file_items.push(FileItem {
            data_id: Some("3".to_string()),
            text: "Sin enlace".to_string(),
            ..Default::default()
        });
        assert!(RuleBasedIdentifier::default().identify_sync(&snap).is_empty());
    }

    #[test]
    fn test_anchor_rules() {
        let mut snap = PageSnapshot::new("https://p.edu/Curso.asp?idCurso=1");
        snap.links = vec![
            link("https://p.edu/files/guia.pdf", "Guía práctica"),
            link("https://p.edu/Inicio.asp", "Inicio"),
            link("https://p.edu/Materiales.asp?idCurso=1", "Materiales"),
            link("https://p.edu/get?f=${name}.pdf", "broken"),
            link("https://p.edu/Descarga.asp?idArchivo=4", "link"),
        ];
        let materials = RuleBasedIdentifier::default().identify_sync(&snap);
        let urls: Vec<&str> = materials.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://p.edu/files/guia.pdf",
                "https://p.edu/Descarga.asp?idArchivo=4"
            ]
        );
        assert_eq!(materials[0].title, "Guía práctica");
        assert_eq!(materials[1].title, "Descarga.asp");
        assert!(materials.iter().all(|m| m.source == MaterialSource::Link));
    }

    #[tokio::test]
    async fn test_network_materials_are_folded_in() {
        let mut snap = PageSnapshot::new("https://p.edu/Curso.asp?idCurso=1");
        snap.network_requests.push(NetworkExchange {
            url: "https://cdn.p.edu/hls/clase1.m3u8".to_string(),
            mime_type: "application/vnd.apple.mpegurl".to_string(),
            status: 200,
            body: None,
        });
        let rules = RuleBasedIdentifier::default();
        let materials = identify_snapshot(&rules, &snap).await;
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].source, MaterialSource::Network);
        assert_eq!(materials[0].file_type, "m3u8");
    }
}
