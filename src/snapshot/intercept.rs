//! Mining intercepted JSON responses for material ids, URLs and titles.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::NetworkExchange;
use crate::utils::resolve_url;

const API_KEYWORDS: &[&str] = &[
    "filemanager",
    "file-manager",
    "file_manager",
    "material",
    "preview",
    "archivo",
    "/files",
    "/api/",
    "recurso",
];

const ID_KEYS: &[&str] = &["id", "fileid", "materialid"];
const URL_KEYS: &[&str] = &["fileurl", "filepath", "url", "src"];
const TITLE_KEYS: &[&str] = &["title", "name", "label"];

/// Endpoints whose JSON is worth recording.
pub fn is_api_like_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    API_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Fold every recorded JSON body into the id maps.
///
/// Relative URLs are resolved against the endpoint that returned them.
pub fn ingest_exchanges(
    exchanges: &[NetworkExchange],
    url_map: &mut HashMap<String, String>,
    title_map: &mut HashMap<String, String>,
) {
    for exchange in exchanges {
        let Some(body) = exchange.body.as_deref() else {
            continue;
        };
        if !is_api_like_url(&exchange.url) {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            continue;
        };
        let before = url_map.len();
        walk(&value, &exchange.url, url_map, title_map);
        debug!(
            "Intercepted {} material url(s) from {}",
            url_map.len() - before,
            exchange.url
        );
    }
}

fn walk(
    value: &Value,
    base: &str,
    url_map: &mut HashMap<String, String>,
    title_map: &mut HashMap<String, String>,
) {
    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, base, url_map, title_map);
            }
        }
        Value::Object(obj) => {
            if let Some(id) = first_field(obj, ID_KEYS).and_then(scalar_string) {
                if let Some(url) = first_field(obj, URL_KEYS).and_then(scalar_string) {
                    url_map
                        .entry(id.clone())
                        .or_insert_with(|| resolve_url(base, &url));
                }
                if let Some(title) = first_field(obj, TITLE_KEYS).and_then(scalar_string) {
                    title_map.entry(id).or_insert(title);
                }
            }
            for child in obj.values() {
                if child.is_array() || child.is_object() {
                    walk(child, base, url_map, title_map);
                }
            }
        }
        _ => {}
    }
}

/// First present key in priority order, compared case-insensitively.
fn first_field<'v>(obj: &'v serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().find_map(|wanted| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(wanted))
            .map(|(_, v)| v)
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(url: &str, body: &str) -> NetworkExchange {
        NetworkExchange {
            url: url.to_string(),
            mime_type: "application/json".to_string(),
            status: 200,
            body: Some(body.to_string()),
        }
    }

    #[test]
    fn test_ingest_nested_json() {
        let exchanges = vec![exchange(
            "https://p.edu/api/filemanager/list",
            r#"{"data": {"items": [
                {"id": "7", "fileUrl": "/books/lec1.pdf", "title": "Lecture 1 Slides"},
                {"fileId": 8, "src": "https://cdn.p.edu/x.mp4", "name": "Clase 2"},
                {"id": "9", "label": "No url"}
            ]}}"#,
        )];
        let mut urls = HashMap::new();
        let mut titles = HashMap::new();
        ingest_exchanges(&exchanges, &mut urls, &mut titles);

        assert_eq!(urls.get("7").map(String::as_str), Some("https://p.edu/books/lec1.pdf"));
        assert_eq!(urls.get("8").map(String::as_str), Some("https://cdn.p.edu/x.mp4"));
        assert!(!urls.contains_key("9"));
        assert_eq!(titles.get("7").map(String::as_str), Some("Lecture 1 Slides"));
        assert_eq!(titles.get("9").map(String::as_str), Some("No url"));
    }

    #[test]
    fn test_non_api_urls_are_ignored() {
        let exchanges = vec![exchange(
            "https://p.edu/analytics/collect",
            r#"{"id": "1", "url": "/a.pdf"}"#,
        )];
        let mut urls = HashMap::new();
        let mut titles = HashMap::new();
        ingest_exchanges(&exchanges, &mut urls, &mut titles);
        assert!(urls.is_empty());
    }
}
