//! Fetching one material's bytes and naming them.

use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::http_client::HttpClient;
use crate::utils::{filename_from_url, guess_mime_from_filename, sniff_mime};

const GENERIC_MIME_TYPES: &[&str] = &[
    "application/octet-stream",
    "binary/octet-stream",
    "application/force-download",
    "application/download",
    "application/x-download",
];

/// Bytes plus the metadata derived from the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
    /// URL after redirects.
    pub final_url: String,
}

impl DownloadedFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Content type from the header, else magic bytes, else the filename.
pub fn resolve_content_type(header_mime: Option<&str>, bytes: &[u8], filename: &str) -> String {
    if let Some(mime) = header_mime.filter(|m| !GENERIC_MIME_TYPES.contains(m)) {
        return mime.to_string();
    }
    if let Some(sniffed) = sniff_mime(bytes) {
        return sniffed.to_string();
    }
    guess_mime_from_filename(filename).to_string()
}

/// GET `url` and fail with `Empty` on a zero-length payload.
pub async fn fetch_file(http: &HttpClient, url: &str, fallback_name: &str) -> ProviderResult<DownloadedFile> {
    let response = http.get_checked(url, url).await?;
    let final_url = response.final_url.clone();
    let header_mime = response.mime_type();
    let filename = response
        .content_disposition_filename()
        .or_else(|| filename_from_url(&final_url).filter(|n| n.contains('.')))
        .or_else(|| filename_from_url(url))
        .unwrap_or_else(|| fallback_name.to_string());

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(ProviderError::Empty(url.to_string()));
    }

    let content_type = resolve_content_type(header_mime.as_deref(), &bytes, &filename);
    if content_type == "text/html" {
        warn!(
            "{} returned an HTML page instead of a file; the session may have expired",
            url
        );
    }
    debug!(
        "Downloaded {} ({} bytes, {})",
        filename,
        bytes.len(),
        content_type
    );

    Ok(DownloadedFile {
        bytes,
        content_type,
        filename,
        final_url,
    })
}
