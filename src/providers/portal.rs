//! Scrape-backed portal provider.
//!
//! Every operation logs in afresh (or uses the configured token), then
//! crawls, snapshots or fetches pages with that one session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::download::fetch_file;
use super::Provider;
use crate::auth::{AuthSession, SessionResolver};
use crate::config::{PathTemplates, ProviderConfig, ProviderKind};
use crate::crawler::PortalCrawler;
use crate::engine::{DiscoveryEngine, ExtractionRequest};
use crate::error::{ProviderError, ProviderResult};
use crate::http_client::HttpClient;
use crate::identify::heuristics::{file_type_of, title_from_url};
use crate::ids::{decode_course_url, decode_material_url, encode_material_url};
use crate::models::{ExternalCourse, ExternalEnrollment, ExternalMaterial, ExtractedMaterial};
use crate::snapshot::looks_like_login_url;
use crate::utils::url::query_param_value;
use crate::utils::{
    collapse_whitespace, filename_from_url, guess_mime_from_filename, guess_mime_from_url,
    normalize_label, resolve_url,
};

pub struct PortalProvider {
    name: String,
    config: ProviderConfig,
    engine: Arc<DiscoveryEngine>,
}

impl PortalProvider {
    pub fn new(name: impl Into<String>, config: ProviderConfig, engine: Arc<DiscoveryEngine>) -> Self {
        Self {
            name: name.into(),
            config,
            engine,
        }
    }

    fn base(&self) -> ProviderResult<&str> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured(self.name.clone()));
        }
        self.config
            .base()
            .ok_or_else(|| ProviderError::NotConfigured(self.name.clone()))
    }

    /// A fresh client for one top-level operation; its jar receives the
    /// login cookies.
    fn client(&self) -> ProviderResult<HttpClient> {
        let http = HttpClient::with_user_agent(
            Duration::from_secs(self.config.timeout),
            self.config.user_agent.as_deref(),
        )?;
        Ok(match self.config.token.as_deref().filter(|_| self.config.has_token()) {
            Some(token) => http.with_bearer(token, self.base()?),
            None => http,
        })
    }

    async fn login(&self, http: &HttpClient) -> ProviderResult<AuthSession> {
        SessionResolver::new(&self.name, &self.config, http)
            .resolve()
            .await
    }

    /// Page holding a course's materials: the decoded `courseurl:` target,
    /// or the materials template rendered with a native id.
    fn course_page_url(&self, base: &str, course_external_id: &str) -> ProviderResult<String> {
        if let Some(url) = decode_course_url(course_external_id) {
            return Ok(url);
        }
        match self.config.paths.materials.as_deref() {
            Some(template) if !course_external_id.trim().is_empty() => Ok(resolve_url(
                base,
                &PathTemplates::render(template, Some(course_external_id.trim()), None),
            )),
            _ => Err(ProviderError::NotFound(format!(
                "course {} on {} (no materials path configured)",
                course_external_id, self.name
            ))),
        }
    }

    /// Native course id for templates; synthesized ids yield the course
    /// parameter of their URL.
    fn native_course_id(&self, course_external_id: &str) -> Option<String> {
        match decode_course_url(course_external_id) {
            Some(url) => query_param_value(&url, &self.config.signatures.course_params),
            None => Some(course_external_id.trim().to_string()).filter(|id| !id.is_empty()),
        }
    }

    fn download_url(&self, base: &str, material_external_id: &str) -> ProviderResult<String> {
        if let Some(url) = decode_material_url(material_external_id) {
            return Ok(url);
        }
        match self.config.paths.download.as_deref() {
            Some(template) if !material_external_id.trim().is_empty() => Ok(resolve_url(
                base,
                &PathTemplates::render(template, None, Some(material_external_id.trim())),
            )),
            _ => Err(ProviderError::NotFound(format!(
                "material {} on {} (no download path configured)",
                material_external_id, self.name
            ))),
        }
    }
}

/// Filename for a candidate: the URL's own when it has an extension,
/// otherwise the title plus the candidate's file type.
fn material_filename(material: &ExtractedMaterial) -> String {
    if file_type_of(&material.url) != "file" {
        if let Some(name) = filename_from_url(&material.url) {
            return name;
        }
    }
    let stem: String = material
        .title
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect();
    let stem = stem.trim();
    let stem = if stem.is_empty() { "material" } else { stem };
    if material.file_type == "file" || stem.to_lowercase().ends_with(&format!(".{}", material.file_type)) {
        stem.to_string()
    } else {
        format!("{}.{}", stem, material.file_type)
    }
}

fn to_external_material(
    provider: &str,
    course_external_id: &str,
    material: ExtractedMaterial,
) -> ExternalMaterial {
    let filename = material_filename(&material);
    let content_type = match guess_mime_from_url(&material.url) {
        "application/octet-stream" => guess_mime_from_filename(&filename),
        mime => mime,
    };
    ExternalMaterial {
        provider: provider.to_string(),
        external_id: encode_material_url(&material.url),
        course_external_id: course_external_id.to_string(),
        title: material.title,
        filename,
        content_type: content_type.to_string(),
        size_bytes: 0,
        updated_at: None,
        source_url: Some(material.url),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnrollmentColumn {
    Id,
    Name,
    Email,
    Role,
}

fn column_kind(header: &str) -> Option<EnrollmentColumn> {
    let label = normalize_label(header);
    if label.contains("mail") || label.contains("correo") {
        Some(EnrollmentColumn::Email)
    } else if label.contains("rol") || label.contains("role") || label.contains("tipo") {
        Some(EnrollmentColumn::Role)
    } else if label.contains("nombre") || label.contains("name") || label.contains("alumno")
        || label.contains("student") || label.contains("estudiante")
    {
        Some(EnrollmentColumn::Name)
    } else if label == "id" || label.contains("carne") || label.contains("codigo")
        || label.contains("usuario") || label.contains("user") || label.contains("matricula")
    {
        Some(EnrollmentColumn::Id)
    } else {
        None
    }
}

fn cell_text(cell: &ElementRef) -> String {
    collapse_whitespace(&cell.text().collect::<String>())
}

/// Enrollment rows from the first table whose header names a person
/// column. Rows without any identifying value are skipped.
pub fn parse_enrollment_table(html: &str, provider: &str) -> Vec<ExternalEnrollment> {
    let document = Html::parse_document(html);
    let (Ok(table_sel), Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("th, td"),
    ) else {
        return Vec::new();
    };

    for table in document.select(&table_sel) {
        let mut rows = table.select(&row_sel);
        let Some(header) = rows.next() else {
            continue;
        };
        let columns: Vec<Option<EnrollmentColumn>> = header
            .select(&cell_sel)
            .map(|c| column_kind(&cell_text(&c)))
            .collect();
        if !columns
            .iter()
            .any(|c| matches!(c, Some(EnrollmentColumn::Name | EnrollmentColumn::Email)))
        {
            continue;
        }

        let mut enrollments = Vec::new();
        for row in rows {
            let mut id = None;
            let mut name = None;
            let mut email = None;
            let mut role = None;
            for (cell, column) in row.select(&cell_sel).zip(columns.iter()) {
                let text = cell_text(&cell);
                if text.is_empty() {
                    continue;
                }
                match column {
                    Some(EnrollmentColumn::Id) => id = Some(text),
                    Some(EnrollmentColumn::Name) => name = Some(text),
                    Some(EnrollmentColumn::Email) => email = Some(text).filter(|e| e.contains('@')),
                    Some(EnrollmentColumn::Role) => role = Some(text),
                    None => {}
                }
            }
            let Some(external_user_id) = id.clone().or_else(|| email.clone()).or_else(|| name.clone())
            else {
                continue;
            };
            enrollments.push(ExternalEnrollment {
                provider: provider.to_string(),
                external_user_id,
                role: role.unwrap_or_else(|| "student".to_string()),
                name,
                email,
            });
        }
        return enrollments;
    }
    Vec::new()
}

#[async_trait]
impl Provider for PortalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Portal
    }

    fn is_configured(&self) -> bool {
        self.config.base().is_some() && (self.config.has_token() || self.config.has_credentials())
    }

    async fn list_courses(&self) -> ProviderResult<Vec<ExternalCourse>> {
        let base = self.base()?;
        let http = self.client()?;
        self.login(&http).await?;

        let paths = &self.config.paths;
        let seed = resolve_url(base, paths.courses.as_deref().unwrap_or(&paths.seed));
        PortalCrawler::new(
            &self.name,
            &http,
            &self.config.signatures,
            paths.materials.is_some(),
        )
        .crawl(&seed)
        .await
    }

    async fn list_materials(&self, course_external_id: &str) -> ProviderResult<Vec<ExternalMaterial>> {
        let base = self.base()?;
        let page_url = self.course_page_url(base, course_external_id)?;
        let http = self.client()?;
        let auth = self.login(&http).await?;

        let request = ExtractionRequest {
            provider: &self.name,
            page_url: &page_url,
            auth: &auth,
            http: &http,
            use_browser: self.config.use_browser,
            identifier: self.config.identifier,
            signatures: &self.config.signatures,
        };
        let materials = self.engine.extract_materials(&request).await?;

        Ok(materials
            .into_iter()
            .map(|m| to_external_material(&self.name, course_external_id, m))
            .collect())
    }

    async fn download_material(
        &self,
        material_external_id: &str,
    ) -> ProviderResult<(Vec<u8>, ExternalMaterial)> {
        let base = self.base()?;
        let url = self.download_url(base, material_external_id)?;
        let http = self.client()?;
        self.login(&http).await?;

        let fallback = title_from_url(&url);
        let file = fetch_file(&http, &url, &fallback).await?;
        info!(
            "{}: downloaded {} ({} bytes)",
            self.name,
            file.filename,
            file.size()
        );

        let material = ExternalMaterial {
            provider: self.name.clone(),
            external_id: material_external_id.to_string(),
            // A download id does not carry its course.
            course_external_id: String::new(),
            title: file.filename.clone(),
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            size_bytes: file.size(),
            updated_at: None,
            source_url: Some(file.final_url.clone()),
        };
        Ok((file.bytes, material))
    }

    async fn list_enrollments(
        &self,
        course_external_id: &str,
    ) -> ProviderResult<Vec<ExternalEnrollment>> {
        let base = self.base()?;
        let Some(template) = self.config.paths.enrollments.as_deref() else {
            return Err(ProviderError::NotFound(format!(
                "{} has no enrollment listing configured",
                self.name
            )));
        };
        let course_id = self.native_course_id(course_external_id).ok_or_else(|| {
            ProviderError::NotFound(format!("no course id in {}", course_external_id))
        })?;
        let url = resolve_url(base, &PathTemplates::render(template, Some(&course_id), None));

        let http = self.client()?;
        self.login(&http).await?;
        let (final_url, html) = http.get_page(&url).await?;
        if looks_like_login_url(&final_url) && !looks_like_login_url(&url) {
            return Err(ProviderError::Unauthorized(format!(
                "{} redirected to login page {}",
                url, final_url
            )));
        }

        let enrollments = parse_enrollment_table(&html, &self.name);
        debug!(
            "{}: {} enrollment(s) in course {}",
            self.name,
            enrollments.len(),
            course_id
        );
        Ok(enrollments)
    }
}
