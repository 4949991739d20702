//! Classifying the response to a login form submission.

use crate::error::LoginFailureReason;

/// Phrases portals print next to a rejected password.
const INVALID_LOGIN_PHRASES: &[&str] = &[
    "invalid password",
    "invalid username",
    "invalid login",
    "invalid credentials",
    "incorrect password",
    "incorrect username",
    "wrong password",
    "login failed",
    "authentication failed",
    "usuario o contraseña",
    "usuario y/o contraseña",
    "contraseña incorrecta",
    "clave incorrecta",
    "datos incorrectos",
    "credenciales inválidas",
    "credenciales invalidas",
    "usuario no válido",
    "usuario no valido",
];

const CAPTCHA_MARKERS: &[&str] = &[
    "g-recaptcha",
    "recaptcha",
    "hcaptcha",
    "h-captcha",
    "cf-turnstile",
    "captcha",
];

const SSO_MARKERS: &[&str] = &[
    "samlrequest",
    "/saml2/",
    "shibboleth",
    "/adfs/",
    "single sign-on",
    "single sign on",
    "login.microsoftonline.com",
    "accounts.google.com",
    "/cas/login",
    "oauth2/authorize",
    "/idp/",
];

/// What came back from the login submission.
#[derive(Debug, Clone, Copy)]
pub struct LoginAttempt<'a> {
    pub status: u16,
    pub body: &'a str,
    pub final_url: &'a str,
    /// Whether the jar holds at least one non-empty cookie afterwards.
    pub has_cookie: bool,
}

/// Diagnose a login attempt. `None` means the session looks established.
///
/// Checks run in a fixed order and the first match wins.
pub fn diagnose_login(attempt: &LoginAttempt<'_>) -> Option<LoginFailureReason> {
    if attempt.status == 401 || attempt.status == 403 {
        return Some(LoginFailureReason::BadCredentials);
    }

    let body = attempt.body.to_lowercase();
    let final_url = attempt.final_url.to_lowercase();

    if INVALID_LOGIN_PHRASES.iter().any(|p| body.contains(p)) {
        return Some(LoginFailureReason::BadCredentials);
    }
    if CAPTCHA_MARKERS.iter().any(|m| body.contains(m)) {
        return Some(LoginFailureReason::Captcha);
    }
    if SSO_MARKERS
        .iter()
        .any(|m| final_url.contains(m) || body.contains(m))
    {
        return Some(LoginFailureReason::SsoRequired);
    }
    if !attempt.has_cookie {
        return Some(LoginFailureReason::Unknown);
    }
    None
}

/// Whether `url` still points at the login page.
pub fn is_on_login_path(url: &str, login_path: &str) -> bool {
    let login_path = login_path
        .split('?')
        .next()
        .unwrap_or(login_path)
        .trim_end_matches('/')
        .to_lowercase();
    if login_path.is_empty() {
        return false;
    }
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
        .to_lowercase();
    path.trim_end_matches('/').ends_with(&login_path)
}
