//! Synthesized external ids.
//!
//! Portals without stable ids get a reversible, URL-safe encoding of the full
//! URL instead, tagged with a prefix so a later call can tell the id apart
//! from a native one and navigate back to the same page or file.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

pub const COURSE_URL_PREFIX: &str = "courseurl:";
pub const MATERIAL_URL_PREFIX: &str = "materialurl:";

/// Encode a URL under the given prefix.
pub fn encode_url_id(prefix: &str, url: &str) -> String {
    format!("{}{}", prefix, URL_SAFE_NO_PAD.encode(url.as_bytes()))
}

/// Decode an id produced by [`encode_url_id`] with the same prefix.
///
/// Returns `None` for native ids and for malformed payloads.
pub fn decode_url_id(prefix: &str, id: &str) -> Option<String> {
    let payload = id.strip_prefix(prefix)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

pub fn encode_course_url(url: &str) -> String {
    encode_url_id(COURSE_URL_PREFIX, url)
}

pub fn decode_course_url(id: &str) -> Option<String> {
    decode_url_id(COURSE_URL_PREFIX, id)
}

pub fn encode_material_url(url: &str) -> String {
    encode_url_id(MATERIAL_URL_PREFIX, url)
}

pub fn decode_material_url(id: &str) -> Option<String> {
    decode_url_id(MATERIAL_URL_PREFIX, id)
}
