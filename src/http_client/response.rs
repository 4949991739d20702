//! HTTP response wrapper.

use std::collections::HashMap;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{ProviderError, ProviderResult};

/// Response with headers already lowercased into a map and the URL reached
/// after redirects.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub final_url: String,
    pub(crate) response: Response,
}

impl HttpResponse {
    pub(crate) fn from_response(response: Response) -> Self {
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                // Keep every Set-Cookie visible to login diagnosis.
                headers
                    .entry(name.as_str().to_lowercase())
                    .and_modify(|existing: &mut String| {
                        existing.push_str(", ");
                        existing.push_str(v);
                    })
                    .or_insert_with(|| v.to_string());
            }
        }
        Self {
            status: response.status(),
            final_url: response.url().to_string(),
            headers,
            response,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Fail with the taxonomy error for a non-2xx status.
    pub fn error_for_status(self, what: &str) -> ProviderResult<Self> {
        match ProviderError::from_status(self.status, what) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Content-Type without parameters, lowercased.
    pub fn mime_type(&self) -> Option<String> {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_lowercase())
            .filter(|ct| !ct.is_empty())
    }

    /// Get the filename from Content-Disposition header.
    pub fn content_disposition_filename(&self) -> Option<String> {
        self.headers
            .get("content-disposition")
            .and_then(|h| parse_content_disposition_filename(h))
    }

    /// Target of a `Link: <...>; rel="next"` header.
    pub fn next_link(&self) -> Option<String> {
        self.headers.get("link").and_then(|h| parse_link_next(h))
    }

    pub async fn bytes(self) -> ProviderResult<Vec<u8>> {
        Ok(self.response.bytes().await.map(|b| b.to_vec())?)
    }

    pub async fn text(self) -> ProviderResult<String> {
        Ok(self.response.text().await?)
    }

    pub async fn json<T: DeserializeOwned>(self) -> ProviderResult<T> {
        let body = self.response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::UpstreamError(format!("invalid JSON response: {}", e)))
    }
}

/// Filename carried by a `Content-Disposition` value.
///
/// `filename*` (RFC 5987, UTF-8 or ISO-8859-1) wins over `filename`. A
/// directory part some portals leak (`C:\Docs\guia.pdf`) is dropped.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for param in split_params(header) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" if extended.is_none() => extended = decode_ext_value(value.trim()),
            "filename" if plain.is_none() => plain = Some(unquote(value.trim())),
            _ => {}
        }
    }

    let name = extended.or(plain)?;
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Split on `;` outside quoted strings.
fn split_params(header: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in header.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&header[start..]);
    params
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}

/// Decode `charset'lang'percent-encoded`.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut parts = value.trim_matches('"').splitn(3, '\'');
    let charset = parts.next()?.to_ascii_lowercase();
    let _language = parts.next()?;
    let bytes = urlencoding::decode_binary(parts.next()?.as_bytes());
    match charset.as_str() {
        "utf-8" => String::from_utf8(bytes.into_owned()).ok(),
        "iso-8859-1" | "latin1" => Some(bytes.iter().map(|&b| b as char).collect()),
        _ => None,
    }
}

/// Parse an RFC 8288 `Link` header and return the `rel="next"` target.
pub fn parse_link_next(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = pieces.any(|param| {
            let param = param.trim().to_lowercase();
            param == "rel=\"next\"" || param == "rel=next"
        });
        is_next.then(|| target.to_string())
    })
}
