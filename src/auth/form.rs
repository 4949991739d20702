//! Login form discovery and field guessing.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::utils::resolve_url;

static PASSWORD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(pass|pwd|clave|contrase|senha)").unwrap());

static USERNAME_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(user|login|email|e-mail|mail|usuario|correo|account|cuenta|rut|dni|cedula|matricula)")
        .unwrap()
});

/// Input types that can never hold the username.
const NON_TEXT_TYPES: &[&str] = &[
    "hidden", "password", "submit", "button", "checkbox", "radio", "image", "reset", "file",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    pub name: String,
    /// Lowercased `type` attribute; `text` when absent.
    pub input_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    /// Absolute submit URL.
    pub action: String,
    pub method: String,
    /// Hidden inputs, submitted unchanged as the base payload.
    pub hidden: Vec<(String, String)>,
    pub username_field: Option<String>,
    pub password_field: Option<String>,
}

impl LoginForm {
    /// Hidden payload with the credentials merged in.
    pub fn payload(&self, username: &str, password: &str) -> Vec<(String, String)> {
        let user_field = self.username_field.as_deref().unwrap_or("username");
        let pass_field = self.password_field.as_deref().unwrap_or("password");

        let mut payload: Vec<(String, String)> = self
            .hidden
            .iter()
            .filter(|(name, _)| name != user_field && name != pass_field)
            .cloned()
            .collect();
        payload.push((user_field.to_string(), username.to_string()));
        payload.push((pass_field.to_string(), password.to_string()));
        payload
    }
}

/// Find the login form on a page: the first form holding a password input,
/// else the first form. `None` when the page has no form at all.
pub fn parse_login_form(html: &str, page_url: &str) -> Option<LoginForm> {
    let document = Html::parse_document(html);
    let form_sel = Selector::parse("form").ok()?;

    let forms: Vec<(ElementRef, Vec<FormInput>)> = document
        .select(&form_sel)
        .map(|f| {
            let inputs = collect_inputs(&f);
            (f, inputs)
        })
        .collect();
    let (form, inputs) = forms
        .iter()
        .find(|(_, inputs)| inputs.iter().any(|i| i.input_type == "password"))
        .or_else(|| forms.first())?;
    let inputs = inputs.as_slice();
    let action = form
        .value()
        .attr("action")
        .map(str::trim)
        .filter(|a| !a.is_empty() && !a.starts_with("javascript:"))
        .map(|a| resolve_url(page_url, a))
        .unwrap_or_else(|| page_url.to_string());
    let method = form
        .value()
        .attr("method")
        .unwrap_or("post")
        .to_lowercase();

    let hidden = inputs
        .iter()
        .filter(|i| i.input_type == "hidden")
        .map(|i| (i.name.clone(), i.value.clone()))
        .collect();
    let password_field = guess_password_field(inputs);
    let username_field = guess_username_field(inputs, password_field.as_deref());

    Some(LoginForm {
        action,
        method,
        hidden,
        username_field,
        password_field,
    })
}

fn collect_inputs(form: &ElementRef) -> Vec<FormInput> {
    let Ok(input_sel) = Selector::parse("input") else {
        return Vec::new();
    };
    form.select(&input_sel)
        .filter_map(|el| {
            let name = el.value().attr("name")?.trim();
            if name.is_empty() {
                return None;
            }
            Some(FormInput {
                name: name.to_string(),
                input_type: el
                    .value()
                    .attr("type")
                    .unwrap_or("text")
                    .trim()
                    .to_lowercase(),
                value: el.value().attr("value").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// The `type=password` input, else one whose name looks like a password.
pub fn guess_password_field(inputs: &[FormInput]) -> Option<String> {
    inputs
        .iter()
        .find(|i| i.input_type == "password")
        .or_else(|| {
            inputs
                .iter()
                .find(|i| i.input_type != "hidden" && PASSWORD_NAME.is_match(&i.name))
        })
        .map(|i| i.name.clone())
}

/// +2 for a login-like name, +1 for a text/email type.
pub fn score_username_field(input: &FormInput) -> u32 {
    let mut score = 0;
    if USERNAME_NAME.is_match(&input.name) {
        score += 2;
    }
    if input.input_type == "text" || input.input_type == "email" {
        score += 1;
    }
    score
}

/// Highest-scoring visible, non-password input; earliest wins ties.
pub fn guess_username_field(inputs: &[FormInput], password_field: Option<&str>) -> Option<String> {
    let mut best: Option<(&FormInput, u32)> = None;
    for input in inputs {
        if NON_TEXT_TYPES.contains(&input.input_type.as_str())
            || Some(input.name.as_str()) == password_field
        {
            continue;
        }
        let score = score_username_field(input);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((input, score));
        }
    }
    best.map(|(input, _)| input.name.clone())
}
