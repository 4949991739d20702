//! Normalized records handed back to callers, plus the internal candidate type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course as listed by a provider. Identity is `(provider, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCourse {
    pub provider: String,
    pub external_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

/// A downloadable material belonging to an external course.
///
/// `external_id` is either the portal's own id or a synthesized
/// `materialurl:` reference (see [`crate::ids`]); both re-resolve to the same
/// item on a later call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMaterial {
    pub provider: String,
    pub external_id: String,
    pub course_external_id: String,
    pub title: String,
    pub filename: String,
    pub content_type: String,
    /// Zero when the size is unknown until download.
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// A user enrolled in an external course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEnrollment {
    pub provider: String,
    pub external_user_id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Which tier of the pipeline produced a candidate's URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaterialSource {
    Link,
    Iframe,
    DataId,
    PreviewExtract,
    Network,
    Llm,
}

impl MaterialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Iframe => "iframe",
            Self::DataId => "data-id",
            Self::PreviewExtract => "preview-extract",
            Self::Network => "network",
            Self::Llm => "llm",
        }
    }
}

impl std::fmt::Display for MaterialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate material found on a page, before it becomes an [`ExternalMaterial`].
///
/// `confidence` is in `[0, 1]` and only used for ranking and logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMaterial {
    pub url: String,
    pub title: String,
    pub file_type: String,
    pub confidence: f32,
    pub source: MaterialSource,
}

impl ExtractedMaterial {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        file_type: impl Into<String>,
        confidence: f32,
        source: MaterialSource,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            file_type: file_type.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_source_serializes_kebab_case() {
        let json = serde_json::to_string(&MaterialSource::PreviewExtract).unwrap();
        assert_eq!(json, "\"preview-extract\"");
        assert_eq!(MaterialSource::DataId.to_string(), "data-id");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let m = ExtractedMaterial::new("u", "t", "pdf", 1.7, MaterialSource::Link);
        assert_eq!(m.confidence, 1.0);
    }
}
