//! Three-level portal walk for portals without a course listing endpoint.
//!
//! Seed page, then grouping pages (faculty, program), then sub-grouping
//! pages (term), collecting course-entry links on every level. Which links
//! count as what is decided by [`PortalSignatures`].

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::config::PortalSignatures;
use crate::error::{ProviderError, ProviderResult};
use crate::http_client::HttpClient;
use crate::ids::encode_course_url;
use crate::models::ExternalCourse;
use crate::utils::mime::has_material_extension;
use crate::utils::url::{host_of, query_param_names, query_param_value};
use crate::utils::{collapse_whitespace, normalize_label, resolve_url};

/// Hard cap on pages fetched by one crawl.
const MAX_CRAWL_PAGES: usize = 200;

static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());

/// An anchor with its absolute target and visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlLink {
    pub href: String,
    pub text: String,
}

/// Anchors on a page, resolved against `page_url`. Script, mail and
/// fragment-only links are skipped.
pub fn extract_links(html: &str, page_url: &str) -> Vec<CrawlLink> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                return None;
            }
            let mut text = collapse_whitespace(&el.text().collect::<String>());
            if text.is_empty() {
                text = el.value().attr("title").unwrap_or_default().trim().to_string();
            }
            Some(CrawlLink {
                href: resolve_url(page_url, href),
                text,
            })
        })
        .collect()
}

fn has_any_param(params: &[String], wanted: &[String]) -> bool {
    params
        .iter()
        .any(|p| wanted.iter().any(|w| w.eq_ignore_ascii_case(p)))
}

/// Home, logout, profile and friends.
pub fn is_navigation_label(text: &str, signatures: &PortalSignatures) -> bool {
    let label = normalize_label(text);
    !label.is_empty()
        && signatures
            .navigation_denylist
            .iter()
            .any(|deny| normalize_label(deny) == label)
}

pub fn is_grouping_link(link: &CrawlLink, signatures: &PortalSignatures) -> bool {
    if is_navigation_label(&link.text, signatures) {
        return false;
    }
    let params = query_param_names(&link.href);
    if has_any_param(&params, &signatures.grouping_params) {
        return true;
    }
    let label = normalize_label(&link.text);
    signatures
        .grouping_labels
        .iter()
        .any(|kw| label.split(' ').any(|word| word == kw))
}

pub fn is_subgrouping_link(
    link: &CrawlLink,
    signatures: &PortalSignatures,
    term_re: Option<&Regex>,
) -> bool {
    if is_navigation_label(&link.text, signatures) {
        return false;
    }
    let params = query_param_names(&link.href);
    has_any_param(&params, &signatures.subgrouping_params)
        || term_re.is_some_and(|re| re.is_match(&link.text))
}

/// Strict course-entry signature: course, section and offering parameters
/// together, or a course-code label plus a course parameter.
pub fn is_course_entry_link(
    link: &CrawlLink,
    signatures: &PortalSignatures,
    code_re: Option<&Regex>,
) -> bool {
    if is_navigation_label(&link.text, signatures) {
        return false;
    }
    let params = query_param_names(&link.href);
    let has_course = has_any_param(&params, &signatures.course_params);
    if has_course
        && has_any_param(&params, &signatures.section_params)
        && has_any_param(&params, &signatures.offering_params)
    {
        return true;
    }
    has_course && code_re.is_some_and(|re| re.is_match(link.text.trim()))
}

/// Drop parenthetical annotations (instructor names, schedules).
pub fn normalize_course_title(text: &str) -> String {
    collapse_whitespace(&PARENTHETICAL.replace_all(text, " "))
}

/// Build the course record for a course-entry link.
///
/// The portal's numeric course id is kept only when a material page
/// template can be rendered from it; anything else gets a synthesized
/// `courseurl:` id that navigates back to the exact entry URL.
pub fn course_from_link(
    provider: &str,
    link: &CrawlLink,
    signatures: &PortalSignatures,
    code_re: Option<&Regex>,
    term: Option<&str>,
    has_materials_template: bool,
) -> ExternalCourse {
    let numeric_id = query_param_value(&link.href, &signatures.course_params)
        .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()));

    let external_id = match numeric_id {
        Some(id) if has_materials_template => id,
        _ => encode_course_url(&link.href),
    };

    let code = code_re
        .and_then(|re| re.find(link.text.trim()))
        .map(|m| m.as_str().trim().to_string());

    let mut title = normalize_course_title(&link.text);
    if title.is_empty() {
        title = code.clone().unwrap_or_else(|| link.href.clone());
    }

    ExternalCourse {
        provider: provider.to_string(),
        external_id,
        title,
        code,
        term: term.map(|t| collapse_whitespace(t)).filter(|t| !t.is_empty()),
    }
}

/// Links inside a course page that lead to its material sections.
pub fn is_material_section_link(
    link: &CrawlLink,
    course_url: &str,
    signatures: &PortalSignatures,
) -> bool {
    if link.href == course_url
        || is_navigation_label(&link.text, signatures)
        || has_material_extension(&link.href)
        || host_of(&link.href) != host_of(course_url)
    {
        return false;
    }
    let href = link.href.to_lowercase();
    let label = normalize_label(&link.text);
    signatures
        .material_section_keywords
        .iter()
        .any(|kw| href.contains(kw.as_str()) || label.contains(kw.as_str()))
}

/// Walks a portal from its seed page and collects course entries.
pub struct PortalCrawler<'a> {
    provider: &'a str,
    http: &'a HttpClient,
    signatures: &'a PortalSignatures,
    has_materials_template: bool,
}

impl<'a> PortalCrawler<'a> {
    pub fn new(
        provider: &'a str,
        http: &'a HttpClient,
        signatures: &'a PortalSignatures,
        has_materials_template: bool,
    ) -> Self {
        Self {
            provider,
            http,
            signatures,
            has_materials_template,
        }
    }

    /// Crawl from `seed_url`. Fails with `DiscoveryFailed` when no course
    /// entry is found on any level.
    pub async fn crawl(&self, seed_url: &str) -> ProviderResult<Vec<ExternalCourse>> {
        let code_re = self.signatures.course_code_regex();
        let term_re = self.signatures.term_regex();
        let seed_host = host_of(seed_url);

        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_courses: HashSet<String> = HashSet::new();
        let mut courses: Vec<ExternalCourse> = Vec::new();

        let Some(seed_links) = self.fetch_links(seed_url, &mut visited).await else {
            return Err(ProviderError::DiscoveryFailed(format!(
                "could not load portal seed page {}",
                seed_url
            )));
        };

        let same_host = |l: &CrawlLink| host_of(&l.href) == seed_host;

        self.collect_courses(&seed_links, None, code_re.as_ref(), &mut seen_courses, &mut courses);

        let groupings: Vec<CrawlLink> = seed_links
            .iter()
            .filter(|l| same_host(l) && is_grouping_link(l, self.signatures))
            .filter(|l| !is_course_entry_link(l, self.signatures, code_re.as_ref()))
            .cloned()
            .collect();

        // Terms can hang directly off the seed page too.
        let mut subgroupings: Vec<CrawlLink> = seed_links
            .iter()
            .filter(|l| same_host(l) && is_subgrouping_link(l, self.signatures, term_re.as_ref()))
            .filter(|l| !is_course_entry_link(l, self.signatures, code_re.as_ref()))
            .cloned()
            .collect();

        debug!(
            "{}: seed has {} grouping and {} sub-grouping link(s)",
            self.provider,
            groupings.len(),
            subgroupings.len()
        );

        for grouping in &groupings {
            let Some(links) = self.fetch_links(&grouping.href, &mut visited).await else {
                continue;
            };
            self.collect_courses(&links, None, code_re.as_ref(), &mut seen_courses, &mut courses);
            subgroupings.extend(
                links
                    .into_iter()
                    .filter(|l| same_host(l))
                    .filter(|l| is_subgrouping_link(l, self.signatures, term_re.as_ref()))
                    .filter(|l| !is_course_entry_link(l, self.signatures, code_re.as_ref())),
            );
        }

        for sub in &subgroupings {
            let Some(links) = self.fetch_links(&sub.href, &mut visited).await else {
                continue;
            };
            self.collect_courses(
                &links,
                Some(sub.text.as_str()),
                code_re.as_ref(),
                &mut seen_courses,
                &mut courses,
            );
        }

        if courses.is_empty() {
            return Err(ProviderError::DiscoveryFailed(format!(
                "no course entries found from {} ({} page(s) visited)",
                seed_url,
                visited.len()
            )));
        }

        info!(
            "{}: crawl found {} course(s) across {} page(s)",
            self.provider,
            courses.len(),
            visited.len()
        );
        Ok(courses)
    }

    fn collect_courses(
        &self,
        links: &[CrawlLink],
        term: Option<&str>,
        code_re: Option<&Regex>,
        seen: &mut HashSet<String>,
        out: &mut Vec<ExternalCourse>,
    ) {
        for link in links {
            if !is_course_entry_link(link, self.signatures, code_re) {
                continue;
            }
            let course = course_from_link(
                self.provider,
                link,
                self.signatures,
                code_re,
                term,
                self.has_materials_template,
            );
            if seen.insert(course.external_id.clone()) {
                out.push(course);
            }
        }
    }

    /// Fetch a page once; `None` if already visited, over budget or failed.
    async fn fetch_links(&self, url: &str, visited: &mut HashSet<String>) -> Option<Vec<CrawlLink>> {
        if visited.len() >= MAX_CRAWL_PAGES || !visited.insert(url.to_string()) {
            return None;
        }
        match self.http.get_page(url).await {
            Ok((final_url, html)) => Some(extract_links(&html, &final_url)),
            Err(e) => {
                warn!("{}: skipping {}: {}", self.provider, url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(href: &str, text: &str) -> CrawlLink {
        CrawlLink {
            href: href.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_course_entry_requires_full_signature() {
        let sig = PortalSignatures::default();
        let code = sig.course_code_regex();
        assert!(is_course_entry_link(
            &link("https://p.edu/Curso.asp?idCurso=1&idSeccion=2&idOferta=3", "Cálculo I"),
            &sig,
            code.as_ref()
        ));
        assert!(!is_course_entry_link(
            &link("https://p.edu/Curso.asp?idCurso=1&idSeccion=2", "Cálculo I"),
            &sig,
            code.as_ref()
        ));
        assert!(is_course_entry_link(
            &link("https://p.edu/Curso.asp?idCurso=1", "MAT101 Cálculo I"),
            &sig,
            code.as_ref()
        ));
        assert!(!is_course_entry_link(
            &link("https://p.edu/Perfil.asp?idCurso=1", "MAT101 Cálculo I"),
            &PortalSignatures {
                course_params: vec!["cid".into()],
                ..PortalSignatures::default()
            },
            code.as_ref()
        ));
    }

    #[test]
    fn test_navigation_labels_are_excluded() {
        let sig = PortalSignatures::default();
        assert!(is_navigation_label("  Cerrar Sesión ", &sig));
        assert!(is_navigation_label("My Courses", &sig));
        assert!(!is_navigation_label("Física General", &sig));
        assert!(!is_grouping_link(&link("https://p.edu/x?grupo=1", "Inicio"), &sig));
    }

    #[test]
    fn test_grouping_and_subgrouping() {
        let sig = PortalSignatures::default();
        let term = sig.term_regex();
        assert!(is_grouping_link(&link("https://p.edu/Lista.asp?idGrupo=4", "Ingeniería"), &sig));
        assert!(is_grouping_link(&link("https://p.edu/fac/4", "Facultad de Ciencias"), &sig));
        assert!(is_subgrouping_link(&link("https://p.edu/Lista.asp?x=1", "2024-1"), &sig, term.as_ref()));
        assert!(is_subgrouping_link(&link("https://p.edu/Lista.asp?periodo=9", "Otoño"), &sig, term.as_ref()));
        assert!(!is_subgrouping_link(&link("https://p.edu/about", "About us"), &sig, term.as_ref()));
    }

    #[test]
    fn test_course_title_drops_parentheticals() {
        assert_eq!(
            normalize_course_title("Álgebra Lineal (Prof. J. Pérez) (Sec. 2)"),
            "Álgebra Lineal"
        );
    }

    #[test]
    fn test_course_id_policy() {
        let sig = PortalSignatures::default();
        let code = sig.course_code_regex();
        let entry = link(
            "https://p.edu/Curso.asp?idCurso=77&idSeccion=2&idOferta=3",
            "MAT101 Cálculo (Prof. X)",
        );

        let with_template = course_from_link("campus", &entry, &sig, code.as_ref(), Some("2024-1"), true);
        assert_eq!(with_template.external_id, "77");
        assert_eq!(with_template.code.as_deref(), Some("MAT101"));
        assert_eq!(with_template.title, "MAT101 Cálculo");
        assert_eq!(with_template.term.as_deref(), Some("2024-1"));

        let without = course_from_link("campus", &entry, &sig, code.as_ref(), None, false);
        assert_eq!(
            crate::ids::decode_course_url(&without.external_id).as_deref(),
            Some(entry.href.as_str())
        );
    }

    #[test]
    fn test_extract_links_resolves_and_skips_scripts() {
        let html = r##"
            <a href="Curso.asp?idCurso=1">  Uno  </a>
            <a href="javascript:void(0)">x</a>
            <a href="#top">top</a>
            <a href="/doc.pdf" title="Syllabus"></a>
        "##;
        let links = extract_links(html, "https://p.edu/dir/Lista.asp");
        assert_eq!(
            links,
            vec![
                link("https://p.edu/dir/Curso.asp?idCurso=1", "Uno"),
                link("https://p.edu/doc.pdf", "Syllabus"),
            ]
        );
    }

    #[test]
    fn test_material_section_links() {
        let sig = PortalSignatures::default();
        let course = "https://p.edu/Curso.asp?idCurso=1";
        assert!(is_material_section_link(
            &link("https://p.edu/Material.asp?idCurso=1", "Apuntes"),
            course,
            &sig
        ));
        assert!(is_material_section_link(
            &link("https://p.edu/c/1/x", "Contenidos"),
            course,
            &sig
        ));
        assert!(!is_material_section_link(&link("https://p.edu/material/a.pdf", "a"), course, &sig));
        assert!(!is_material_section_link(&link("https://other.edu/material", "m"), course, &sig));
    }
}
