//! Pure URL and label heuristics used by every identification tier.

use std::sync::LazyLock;

use regex::Regex;

use crate::snapshot::NetworkExchange;
use crate::utils::mime::{has_material_extension, is_material_mimetype, url_path_extension};
use crate::utils::url::{query_param_names, query_param_value};
use crate::utils::{filename_from_url, resolve_url};

/// Template delimiters and templating calls that never survive rendering.
const SCRIPT_ARTIFACTS: &[&str] = &["${", "{{", "}}", "encodeuricomponent(", "function("];

/// String concatenation (`'...' + id`) and member access at the start of an
/// expression (`this.url`).
static SCRIPT_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"`]\s*\+|\+\s*['"`]|(?:^|['"`])this\."#).unwrap());

/// Path keywords of download endpoints.
const DOWNLOAD_KEYWORDS: &[&str] = &[
    "download",
    "descarga",
    "getfile",
    "/files/",
    "/file/",
    "material",
    "/content/",
    "archivo",
    "attachment",
    "adjunto",
    "pluginfile",
];

const PORTAL_EXTENSIONS: &[&str] = &["asp", "aspx", "php", "html", "htm", "jsp", "cfm"];

/// Script names that serve files even though they look like pages.
const DOWNLOAD_ENDPOINT_STEMS: &[&str] = &[
    "download",
    "descarga",
    "getfile",
    "bajar",
    "pluginfile",
    "verarchivo",
    "attachment",
];

/// Query parameters that turn a page script into a file endpoint.
const DOWNLOAD_PARAMS: &[&str] = &[
    "download",
    "descarga",
    "file",
    "fileid",
    "archivo",
    "idarchivo",
    "attachment",
    "dl",
];

/// Query parameters document viewers use to point at the real file.
const VIEWER_PARAMS: &[&str] = &["file", "url", "src", "doc", "document"];

const PLACEHOLDER_WORDS: &[&str] = &["enlace", "link"];

static FILENAME_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[^/\\]+\.[a-z][a-z0-9]{1,4}$").unwrap());

/// Whether a URL still carries template or script syntax.
pub fn is_script_artifact(url: &str) -> bool {
    let lower = url.to_lowercase();
    SCRIPT_ARTIFACTS.iter().any(|a| lower.contains(a)) || SCRIPT_SYNTAX.is_match(url)
}

/// Known material extension on the URL path.
pub fn has_download_extension(url: &str) -> bool {
    has_material_extension(url)
}

/// Whether a URL plausibly serves a file.
pub fn is_downloadable_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() || is_script_artifact(url) {
        return false;
    }
    let lower = url.to_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with('#') {
        return false;
    }
    has_download_extension(url) || DOWNLOAD_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Whether a URL is a server-rendered portal page rather than a file.
///
/// `.asp`/`.php`/`.html` scripts count as pages unless the script name is
/// a known download endpoint or the query carries an explicit file parameter.
pub fn is_portal_page(url: &str) -> bool {
    let Some(ext) = url_path_extension(url) else {
        return false;
    };
    if !PORTAL_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }

    let stem = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if DOWNLOAD_ENDPOINT_STEMS.iter().any(|s| stem.contains(s)) {
        return false;
    }

    !query_param_names(url)
        .iter()
        .any(|p| DOWNLOAD_PARAMS.contains(&p.as_str()))
}

/// Labels like `apuntes.pdf`.
pub fn looks_like_filename(title: &str) -> bool {
    FILENAME_LIKE.is_match(title.trim())
}

/// Row text that says nothing about the material ("0", "enlace", "link").
pub fn is_placeholder_text(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.is_empty() || lower == "0" || PLACEHOLDER_WORDS.iter().any(|w| lower.contains(w))
}

/// The file a viewer frame displays, e.g. `viewer.html?file=/a.pdf`.
/// Returns the frame URL itself when it does not wrap another file.
pub fn unwrap_viewer_url(url: &str) -> String {
    let names: Vec<String> = VIEWER_PARAMS.iter().map(|s| s.to_string()).collect();
    match query_param_value(url, &names) {
        Some(inner) if is_downloadable_url(&inner) && !is_portal_page(&inner) => {
            resolve_url(url, &inner)
        }
        _ => url.to_string(),
    }
}

/// A recorded response that is itself a document or media stream.
pub fn is_material_response(exchange: &NetworkExchange) -> bool {
    if exchange.status >= 400 || is_script_artifact(&exchange.url) {
        return false;
    }
    let mime = exchange.mime_type.to_lowercase();
    if mime.contains("json") || mime.starts_with("text/html") || mime.contains("javascript") {
        return false;
    }
    is_material_mimetype(&mime) || has_download_extension(&exchange.url)
}

/// Short file type label: the URL extension, or `file` for script endpoints.
pub fn file_type_of(url: &str) -> String {
    url_path_extension(url)
        .filter(|ext| !PORTAL_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "file".to_string())
}

/// Title derived from the URL when nothing better exists.
pub fn title_from_url(url: &str) -> String {
    filename_from_url(url).unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_portal_page() {
        assert!(is_portal_page("foo.asp?x=1"));
        assert!(!is_portal_page("download.asp?id=5"));
        assert!(!is_portal_page("page.asp?download=1"));
        assert!(is_portal_page("https://p.edu/Curso.aspx?idCurso=3"));
        assert!(!is_portal_page("https://p.edu/VerArchivo.asp?id=3"));
        assert!(!is_portal_page("https://p.edu/files/a.pdf"));
        assert!(!is_portal_page("https://p.edu/api/material/3"));
    }

    #[test]
    fn test_script_artifacts_are_never_downloadable() {
        assert!(!is_downloadable_url("https://p.edu/download?id=${variable}"));
        assert!(!is_downloadable_url("/files/{{ file.path }}.pdf"));
        assert!(!is_downloadable_url("'/Descarga.asp?id='+id"));
        assert!(is_script_artifact("/get?f=encodeURIComponent(x)"));
        assert!(is_script_artifact("/viewer.html?file=' + id + '"));
        assert!(is_script_artifact("this.fileUrl"));
        assert!(!is_script_artifact("https://p.edu/files/this.is.notes.pdf"));
    }

    #[test]
    fn test_is_downloadable_url() {
        assert!(is_downloadable_url("https://p.edu/a/b/Guia.PDF"));
        assert!(is_downloadable_url("https://p.edu/Descarga.asp?idArchivo=4"));
        assert!(is_downloadable_url("https://moodle.p.edu/pluginfile.php/12/mod_resource/x"));
        assert!(is_downloadable_url("https://p.edu/files/about_this.pdf"));
        assert!(is_downloadable_url("https://p.edu/files/undefined_behavior.pdf"));
        assert!(!is_downloadable_url("https://p.edu/Inicio.asp"));
        assert!(!is_downloadable_url("javascript:void(0)"));
        assert!(!is_downloadable_url("mailto:prof@p.edu"));
    }

    #[test]
    fn test_filename_and_placeholder_labels() {
        assert!(looks_like_filename("apuntes.pdf"));
        assert!(looks_like_filename("Clase 3.pptx"));
        assert!(!looks_like_filename("Lecture 1 Slides"));
        assert!(!looks_like_filename("files/a.pdf"));

        assert!(is_placeholder_text("0"));
        assert!(is_placeholder_text("  "));
        assert!(is_placeholder_text("Ver enlace"));
        assert!(is_placeholder_text("Open link"));
        assert!(!is_placeholder_text("Lecture 1"));
    }

    #[test]
    fn test_unwrap_viewer_url() {
        assert_eq!(
            unwrap_viewer_url("https://p.edu/pdfjs/web/viewer.html?file=/books/a.pdf"),
            "https://p.edu/books/a.pdf"
        );
        assert_eq!(
            unwrap_viewer_url("https://p.edu/viewer/doc.pdf"),
            "https://p.edu/viewer/doc.pdf"
        );
    }

    #[test]
    fn test_is_material_response() {
        let mut exchange = NetworkExchange {
            url: "https://cdn.p.edu/hls/lecture.m3u8".to_string(),
            mime_type: "application/vnd.apple.mpegurl".to_string(),
            status: 200,
            body: None,
        };
        assert!(is_material_response(&exchange));

        exchange.url = "https://p.edu/api/filemanager/list".to_string();
        exchange.mime_type = "application/json".to_string();
        assert!(!is_material_response(&exchange));

        exchange.url = "https://p.edu/files/a.pdf".to_string();
        exchange.mime_type = "application/pdf".to_string();
        exchange.status = 404;
        assert!(!is_material_response(&exchange));
    }

    #[test]
    fn test_file_type_of() {
        assert_eq!(file_type_of("https://p.edu/a.PDF?x=1"), "pdf");
        assert_eq!(file_type_of("https://p.edu/Descarga.asp?id=1"), "file");
        assert_eq!(file_type_of("https://p.edu/d/123"), "file");
    }
}
