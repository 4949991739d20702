//! Page snapshots: a structured, one-shot view of a rendered course page.
//!
//! A snapshot is taken either by driving a browser page through
//! [`PageDriver`] (see [`SnapshotExtractor`]) or by parsing fetched HTML
//! ([`snapshot_from_html`]). Both produce the same [`PageSnapshot`], which
//! the identifier consumes immediately and then drops.

mod driver;
mod extract;
mod intercept;
pub mod scripts;
mod static_html;
mod templates;

pub use driver::{NetworkExchange, PageDriver};
pub use extract::{looks_like_login_url, SnapshotExtractor};
pub use intercept::{ingest_exchanges, is_api_like_url};
pub use static_html::snapshot_from_html;
pub use templates::{build_from_template, extract_url_templates};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An anchor on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLink {
    /// Absolute URL (or the raw attribute for `javascript:` links).
    pub href: String,
    pub text: String,
    /// Text of the surrounding block, trimmed.
    pub context: String,
    pub onclick: Option<String>,
    pub data_id: Option<String>,
}

/// A clickable control inside a file row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileButton {
    /// `onclick` or `data-action` contents.
    pub action: String,
    pub id: Option<String>,
    pub text: String,
}

/// An element that looks like one file entry in a material list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileItem {
    pub data_id: Option<String>,
    pub text: String,
    pub class_name: String,
    pub links: Vec<PageLink>,
    pub buttons: Vec<FileButton>,
}

/// Everything extracted from one page visit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub links: Vec<PageLink>,
    pub iframes: Vec<String>,
    pub file_items: Vec<FileItem>,
    pub network_requests: Vec<NetworkExchange>,
    /// Download URL templates found in inline scripts.
    pub download_url_patterns: Vec<String>,
    /// Material id to URL, from intercepted JSON.
    pub file_url_map: HashMap<String, String>,
    /// Material id to title, from intercepted JSON.
    pub file_title_map: HashMap<String, String>,
    /// Clean material-name labels in document order.
    pub material_names: Vec<String>,
    /// Material id to URL, discovered by clicking a row's preview control.
    pub clicked_urls: HashMap<String, String>,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
            && self.iframes.is_empty()
            && self.file_items.is_empty()
            && self.network_requests.is_empty()
    }
}

/// Row classes that mark a file entry: a class token mentioning
/// file/material/download that is not a name/icon/size/... sub-part.
pub fn is_file_row_class(class_name: &str) -> bool {
    const MARKERS: &[&str] = &["file", "material", "download", "archivo", "adjunto"];
    const SUBPARTS: &[&str] = &[
        "name", "title", "label", "icon", "size", "date", "type", "input", "upload", "nombre",
        "titulo",
    ];
    class_name.split_whitespace().any(|token| {
        let token = token.to_lowercase();
        MARKERS.iter().any(|m| token.contains(m)) && !SUBPARTS.iter().any(|s| token.contains(s))
    })
}

/// Class tokens of a clean material-name label (`file-name`, `material-title`).
pub fn is_material_name_class(class_name: &str) -> bool {
    class_name.split_whitespace().any(|token| {
        let token = token.to_lowercase();
        (token.contains("file") || token.contains("material") || token.contains("archivo"))
            && (token.contains("name") || token.contains("title") || token.contains("nombre"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_row_class() {
        assert!(is_file_row_class("row file-item"));
        assert!(is_file_row_class("materialRow"));
        assert!(is_file_row_class("btn-download"));
        assert!(!is_file_row_class("file-name"));
        assert!(!is_file_row_class("file-icon fa"));
        assert!(!is_file_row_class("file-upload-input"));
        assert!(!is_file_row_class("card"));
    }

    #[test]
    fn test_material_name_class() {
        assert!(is_material_name_class("file-name"));
        assert!(is_material_name_class("x materialTitle"));
        assert!(!is_material_name_class("file-item"));
    }

    #[test]
    fn test_page_link_deserializes_partial_json() {
        let link: PageLink =
            serde_json::from_value(serde_json::json!({"href": "https://x.edu/a.pdf"})).unwrap();
        assert_eq!(link.href, "https://x.edu/a.pdf");
        assert!(link.onclick.is_none());
    }
}
