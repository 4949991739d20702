//! Download URL templates recovered from inline page scripts.
//!
//! Portals often build download links in JavaScript, e.g.
//! `window.open('/Descarga.asp?idArchivo=' + id)`. The string literal up to
//! the concatenation point is a usable template: append the row id.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::resolve_url;

static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["'`]([^"'`\s<>]{3,300})["'`]"#).unwrap());

static ENDPOINT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(download|descarga|getfile|file|archivo|preview|visor|viewer|material)")
        .unwrap()
});

/// Collect template-like string literals from script sources.
///
/// A literal qualifies when it references a download/file/preview endpoint
/// and is open-ended (ends with `=` or `/`, or carries an `{id}`
/// placeholder). Literals holding unresolved template syntax are rejected.
pub fn extract_url_templates<S: AsRef<str>>(scripts: &[S]) -> Vec<String> {
    let mut templates: Vec<String> = Vec::new();
    for script in scripts {
        for cap in STRING_LITERAL.captures_iter(script.as_ref()) {
            let literal = &cap[1];
            if !is_template_literal(literal) {
                continue;
            }
            if !templates.iter().any(|t| t == literal) {
                templates.push(literal.to_string());
            }
        }
    }
    templates
}

fn is_template_literal(literal: &str) -> bool {
    if literal.contains("${") || literal.contains("{{") || literal.contains("}}") {
        return false;
    }
    if !ENDPOINT_KEYWORD.is_match(literal) {
        return false;
    }
    // Must look like a URL or path, not a CSS class or event name.
    let url_like = literal.starts_with('/')
        || literal.starts_with("http://")
        || literal.starts_with("https://")
        || literal.contains('?')
        || literal.contains('.');
    let open_ended = literal.ends_with('=') || literal.ends_with('/') || literal.contains("{id}");
    url_like && open_ended
}

/// Fill a template with a row id and resolve it against the page URL.
pub fn build_from_template(template: &str, id: &str, page_url: &str) -> String {
    let encoded = urlencoding::encode(id);
    let filled = if template.contains("{id}") {
        template.replace("{id}", &encoded)
    } else {
        format!("{}{}", template, encoded)
    };
    resolve_url(page_url, &filled)
}
