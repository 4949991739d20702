//! Shared utility functions.
//!
//! - `mime`: file extension tables, MIME guessing and content sniffing
//! - `url`: URL resolution, normalization and query inspection
//! - `text`: label and whitespace normalization

pub mod mime;
pub mod text;
pub mod url;

pub use mime::{guess_mime_from_filename, guess_mime_from_url, sniff_mime, url_path_extension};
pub use text::{collapse_whitespace, normalize_label};
pub use url::{filename_from_url, normalize_url_key, resolve_url};
