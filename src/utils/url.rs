//! URL helpers.

use url::Url;

/// Resolve a path to a full URL, handling both absolute and relative paths.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    let path = path.trim();
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    if let Ok(base) = Url::parse(base_url) {
        if let Ok(resolved) = base.join(path) {
            return resolved.to_string();
        }
    }

    // Fallback: manual joining with proper slash handling
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Key used to merge candidates that point at the same resource.
///
/// Drops the fragment and any trailing slash; query strings are kept because
/// portals often carry the file id there.
pub fn normalize_url_key(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);
    url.trim_end_matches('/').to_string()
}

/// Last path segment of a URL, percent-decoded. `None` for bare hosts.
pub fn filename_from_url(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };
    let last = path.trim_end_matches('/').rsplit('/').next()?.trim();
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string());
    Some(decoded)
}

/// Lowercased names of every query parameter in the URL.
pub fn query_param_names(url: &str) -> Vec<String> {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .query_pairs()
            .map(|(k, _)| k.to_lowercase())
            .collect(),
        Err(_) => url
            .split_once('?')
            .map(|(_, q)| {
                q.split('&')
                    .filter_map(|pair| pair.split('=').next())
                    .filter(|k| !k.is_empty())
                    .map(|k| k.to_lowercase())
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Value of the first query parameter whose name matches (case-insensitive).
pub fn query_param_value(url: &str, names: &[String]) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| names.iter().any(|n| n.eq_ignore_ascii_case(k)))
        .map(|(_, v)| v.into_owned())
}

/// Host of a URL, lowercased.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}
