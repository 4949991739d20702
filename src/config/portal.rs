//! Scrape-backed portal settings: endpoint path templates and the
//! signatures the crawler uses to recognize groupings and course entries.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Overridable endpoint paths. `{course_id}` and `{material_id}` are
/// substituted (URL-encoded) by [`PathTemplates::render`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathTemplates {
    #[serde(default = "default_login")]
    pub login: String,

    /// Page the crawler starts from when no course listing exists.
    #[serde(default = "default_seed")]
    pub seed: String,

    /// Direct course listing page. When unset the portal is crawled.
    #[serde(default)]
    pub courses: Option<String>,

    /// Course page holding materials, e.g. `/Curso.asp?idCurso={course_id}`.
    #[serde(default)]
    pub materials: Option<String>,

    /// Enrollment table page.
    #[serde(default)]
    pub enrollments: Option<String>,

    /// Direct download endpoint for native material ids.
    #[serde(default)]
    pub download: Option<String>,
}

impl Default for PathTemplates {
    fn default() -> Self {
        Self {
            login: default_login(),
            seed: default_seed(),
            courses: None,
            materials: None,
            enrollments: None,
            download: None,
        }
    }
}

fn default_login() -> String {
    "/login".to_string()
}

fn default_seed() -> String {
    "/".to_string()
}

impl PathTemplates {
    /// Fill `{course_id}` / `{material_id}` placeholders.
    pub fn render(template: &str, course_id: Option<&str>, material_id: Option<&str>) -> String {
        let mut out = template.to_string();
        if let Some(id) = course_id {
            out = out.replace("{course_id}", &urlencoding::encode(id));
        }
        if let Some(id) = material_id {
            out = out.replace("{material_id}", &urlencoding::encode(id));
        }
        out
    }
}

/// Patterns that identify portal navigation structure.
///
/// Parameter names are compared case-insensitively; labels are compared
/// after [`crate::utils::normalize_label`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalSignatures {
    /// Query parameters marking a top-level grouping (faculty, program).
    #[serde(default = "default_grouping_params")]
    pub grouping_params: Vec<String>,

    /// Label keywords marking a top-level grouping.
    #[serde(default = "default_grouping_labels")]
    pub grouping_labels: Vec<String>,

    /// Query parameters marking a sub-grouping (term, period).
    #[serde(default = "default_subgrouping_params")]
    pub subgrouping_params: Vec<String>,

    /// Regex for term-like link text ("2024-1", "Fall 2023", "Semestre II").
    #[serde(default = "default_term_pattern")]
    pub term_pattern: String,

    #[serde(default = "default_course_params")]
    pub course_params: Vec<String>,

    #[serde(default = "default_section_params")]
    pub section_params: Vec<String>,

    #[serde(default = "default_offering_params")]
    pub offering_params: Vec<String>,

    /// Regex for course-code labels ("MAT101", "CS-2040").
    #[serde(default = "default_course_code_pattern")]
    pub course_code_pattern: String,

    /// Normalized navigation labels that are never courses.
    #[serde(default = "default_navigation_denylist")]
    pub navigation_denylist: Vec<String>,

    /// Path/query keywords of sections inside a course page worth visiting
    /// for materials.
    #[serde(default = "default_section_keywords")]
    pub material_section_keywords: Vec<String>,
}

impl Default for PortalSignatures {
    fn default() -> Self {
        Self {
            grouping_params: default_grouping_params(),
            grouping_labels: default_grouping_labels(),
            subgrouping_params: default_subgrouping_params(),
            term_pattern: default_term_pattern(),
            course_params: default_course_params(),
            section_params: default_section_params(),
            offering_params: default_offering_params(),
            course_code_pattern: default_course_code_pattern(),
            navigation_denylist: default_navigation_denylist(),
            material_section_keywords: default_section_keywords(),
        }
    }
}

impl PortalSignatures {
    /// Compile the course-code pattern. An invalid pattern matches nothing.
    pub fn course_code_regex(&self) -> Option<Regex> {
        Regex::new(&self.course_code_pattern).ok()
    }

    pub fn term_regex(&self) -> Option<Regex> {
        Regex::new(&self.term_pattern).ok()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_grouping_params() -> Vec<String> {
    strings(&["idgrupo", "grupo", "group", "group_id", "category", "categoryid", "facultad", "idfacultad"])
}

fn default_grouping_labels() -> Vec<String> {
    strings(&["facultad", "faculty", "escuela", "school", "programa", "program", "department", "departamento"])
}

fn default_subgrouping_params() -> Vec<String> {
    strings(&["periodo", "idperiodo", "term", "term_id", "semester", "semestre", "year", "anio"])
}

fn default_term_pattern() -> String {
    r"(?i)(\b(19|20)\d{2}\s*[-/]\s*(0?[1-3]|i{1,3})\b|\b(spring|summer|fall|autumn|winter|semestre|semester|periodo|term|trimestre|ciclo)\b.*\b(19|20)\d{2}\b|\b(19|20)\d{2}\b.*\b(spring|summer|fall|autumn|winter|semestre|semester|periodo|term|trimestre|ciclo)\b)".to_string()
}

fn default_course_params() -> Vec<String> {
    strings(&["idcurso", "curso", "course_id", "courseid", "course", "id_curso"])
}

fn default_section_params() -> Vec<String> {
    strings(&["idseccion", "seccion", "section_id", "sectionid", "section", "id_seccion"])
}

fn default_offering_params() -> Vec<String> {
    strings(&["idoferta", "oferta", "offering_id", "offeringid", "offering", "id_oferta"])
}

fn default_course_code_pattern() -> String {
    r"^[A-Z]{2,5}[- ]?\d{3,4}[A-Z]?\b".to_string()
}

fn default_navigation_denylist() -> Vec<String> {
    strings(&[
        "home",
        "inicio",
        "logout",
        "log out",
        "sign out",
        "salir",
        "cerrar sesion",
        "profile",
        "perfil",
        "my courses",
        "mis cursos",
        "help",
        "ayuda",
        "back",
        "volver",
    ])
}

fn default_section_keywords() -> Vec<String> {
    strings(&["material", "contenido", "content", "recurso", "resource", "documento", "document", "archivo", "file", "biblioteca", "library"])
}
