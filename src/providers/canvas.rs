//! Canvas-style REST API provider.
//!
//! Bearer token on every request, list endpoints paginated with
//! `Link: <...>; rel="next"`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::download::fetch_file;
use super::Provider;
use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{ProviderError, ProviderResult};
use crate::http_client::HttpClient;
use crate::models::{ExternalCourse, ExternalEnrollment, ExternalMaterial};

const PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct CanvasTerm {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CanvasCourse {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    course_code: Option<String>,
    #[serde(default)]
    term: Option<CanvasTerm>,
}

#[derive(Debug, Deserialize)]
struct CanvasFile {
    id: u64,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(rename = "content-type", default)]
    content_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CanvasUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    login_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CanvasEnrollment {
    user_id: u64,
    #[serde(default)]
    role: Option<String>,
    #[serde(rename = "type", default)]
    enrollment_type: Option<String>,
    #[serde(default)]
    user: Option<CanvasUser>,
}

impl CanvasFile {
    fn into_material(self, provider: &str, course_external_id: &str) -> ExternalMaterial {
        let filename = self
            .filename
            .clone()
            .or_else(|| self.display_name.clone())
            .unwrap_or_else(|| self.id.to_string());
        ExternalMaterial {
            provider: provider.to_string(),
            external_id: self.id.to_string(),
            course_external_id: course_external_id.to_string(),
            title: self.display_name.unwrap_or_else(|| filename.clone()),
            filename,
            content_type: self
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size_bytes: self.size.unwrap_or(0),
            updated_at: self.updated_at,
            source_url: self.url,
        }
    }
}

pub struct CanvasProvider {
    name: String,
    config: ProviderConfig,
}

impl CanvasProvider {
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Base URL and an authenticated client, or `NotConfigured` without
    /// touching the network.
    fn client(&self) -> ProviderResult<(&str, HttpClient)> {
        let (Some(base), Some(token)) = (
            self.config.base(),
            self.config.token.as_deref().filter(|_| self.config.has_token()),
        ) else {
            return Err(ProviderError::NotConfigured(self.name.clone()));
        };
        let http = HttpClient::with_user_agent(
            Duration::from_secs(self.config.timeout),
            self.config.user_agent.as_deref(),
        )?
        .with_bearer(token, base);
        Ok((base, http))
    }

    fn course_id<'a>(&self, course_external_id: &'a str) -> ProviderResult<&'a str> {
        let id = course_external_id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProviderError::NotFound(format!(
                "{} is not a {} course id",
                course_external_id, self.name
            )));
        }
        Ok(id)
    }
}

#[async_trait]
impl Provider for CanvasProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Canvas
    }

    fn is_configured(&self) -> bool {
        self.config.base().is_some() && self.config.has_token()
    }

    async fn list_courses(&self) -> ProviderResult<Vec<ExternalCourse>> {
        let (base, http) = self.client()?;
        let url = format!("{}/api/v1/courses?include[]=term&per_page={}", base, PER_PAGE);
        let courses: Vec<CanvasCourse> = http.get_json_pages(&url, "course listing").await?;
        info!("{}: {} course(s)", self.name, courses.len());

        Ok(courses
            .into_iter()
            .map(|c| ExternalCourse {
                provider: self.name.clone(),
                external_id: c.id.to_string(),
                title: c
                    .name
                    .clone()
                    .or_else(|| c.course_code.clone())
                    .unwrap_or_else(|| c.id.to_string()),
                code: c.course_code,
                term: c.term.and_then(|t| t.name),
            })
            .collect())
    }

    async fn list_materials(&self, course_external_id: &str) -> ProviderResult<Vec<ExternalMaterial>> {
        let (base, http) = self.client()?;
        let course_id = self.course_id(course_external_id)?;
        let url = format!("{}/api/v1/courses/{}/files?per_page={}", base, course_id, PER_PAGE);
        let files: Vec<CanvasFile> = http
            .get_json_pages(&url, &format!("files of course {}", course_id))
            .await?;
        info!("{}: {} file(s) in course {}", self.name, files.len(), course_id);

        Ok(files
            .into_iter()
            .map(|f| f.into_material(&self.name, course_id))
            .collect())
    }

    async fn download_material(
        &self,
        material_external_id: &str,
    ) -> ProviderResult<(Vec<u8>, ExternalMaterial)> {
        let (base, http) = self.client()?;
        let file_id = material_external_id.trim();
        let meta_url = format!("{}/api/v1/files/{}", base, urlencoding::encode(file_id));
        let file: CanvasFile = http
            .get_checked(&meta_url, &format!("file {}", file_id))
            .await?
            .json()
            .await?;

        let download_url = file.url.clone().ok_or_else(|| {
            ProviderError::UpstreamError(format!("file {} has no download url", file_id))
        })?;
        // The files endpoint does not say which course a file belongs to.
        let mut material = file.into_material(&self.name, "");
        let downloaded = fetch_file(&http, &download_url, &material.filename).await?;

        material.size_bytes = downloaded.size();
        if material.content_type == "application/octet-stream" {
            material.content_type = downloaded.content_type;
        }
        Ok((downloaded.bytes, material))
    }

    async fn list_enrollments(
        &self,
        course_external_id: &str,
    ) -> ProviderResult<Vec<ExternalEnrollment>> {
        let (base, http) = self.client()?;
        let course_id = self.course_id(course_external_id)?;
        let url = format!(
            "{}/api/v1/courses/{}/enrollments?per_page={}",
            base, course_id, PER_PAGE
        );
        let enrollments: Vec<CanvasEnrollment> = http
            .get_json_pages(&url, &format!("enrollments of course {}", course_id))
            .await?;

        Ok(enrollments
            .into_iter()
            .map(|e| {
                let user = e.user.unwrap_or(CanvasUser {
                    name: None,
                    email: None,
                    login_id: None,
                });
                ExternalEnrollment {
                    provider: self.name.clone(),
                    external_user_id: e.user_id.to_string(),
                    role: e
                        .role
                        .or(e.enrollment_type)
                        .unwrap_or_else(|| "StudentEnrollment".to_string()),
                    name: user.name,
                    email: user
                        .email
                        .or(user.login_id.filter(|l| l.contains('@'))),
                }
            })
            .collect())
    }
}
