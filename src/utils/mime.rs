//! MIME type guessing for course materials.

/// Extensions that mark a URL as a downloadable material.
pub const MATERIAL_EXTENSIONS: &[&str] = &[
    // Documents
    "pdf", "doc", "docx", "odt", "rtf", "txt", "epub",
    // Slides
    "ppt", "pptx", "pps", "ppsx", "odp", "key",
    // Spreadsheets
    "xls", "xlsx", "ods", "csv",
    // Archives
    "zip", "rar", "7z",
    // Media
    "mp4", "webm", "mov", "avi", "mkv", "mp3", "wav", "m4a", "ogg",
    // Stream manifests
    "m3u8", "mpd",
];

/// Extensions the registry lacks or maps to something players reject.
const MIME_OVERRIDES: &[(&str, &str)] = &[
    ("m3u8", "application/vnd.apple.mpegurl"),
    ("mpd", "application/dash+xml"),
];

/// Guess MIME type from a filename's extension.
pub fn guess_mime_from_filename(name: &str) -> &'static str {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return "application/octet-stream";
    };
    let ext = ext.to_lowercase();
    MIME_OVERRIDES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .or_else(|| mime_guess::from_ext(&ext).first_raw())
        .unwrap_or("application/octet-stream")
}

/// Guess MIME type from a URL, stripping query params and fragments first.
pub fn guess_mime_from_url(url: &str) -> &'static str {
    guess_mime_from_filename(url_path(url))
}

fn url_path(url: &str) -> &str {
    let path = url.split('?').next().unwrap_or(url);
    path.split('#').next().unwrap_or(path)
}

/// Lowercased extension of the last path segment, if it has one.
pub fn url_path_extension(url: &str) -> Option<String> {
    let last = url_path(url).rsplit('/').next().unwrap_or_default();
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Check if a URL path ends with a known material extension.
pub fn has_material_extension(url: &str) -> bool {
    url_path_extension(url)
        .map(|ext| MATERIAL_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Whether a MIME type is a document or media payload worth keeping.
pub fn is_material_mimetype(mime: &str) -> bool {
    let mime = mime.split(';').next().unwrap_or(mime).trim().to_lowercase();
    mime.starts_with("video/")
        || mime.starts_with("audio/")
        || matches!(
            mime.as_str(),
            "application/pdf"
                | "application/msword"
                | "application/vnd.ms-powerpoint"
                | "application/vnd.ms-excel"
                | "application/zip"
                | "application/epub+zip"
                | "application/vnd.apple.mpegurl"
                | "application/x-mpegurl"
                | "application/dash+xml"
        )
        || mime.starts_with("application/vnd.openxmlformats-officedocument")
        || mime.starts_with("application/vnd.oasis.opendocument")
}

/// Detect the MIME type of a payload from its magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}
