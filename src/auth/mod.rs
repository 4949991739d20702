//! Turning stored credentials into an authenticated transport context.
//!
//! A present token always wins and skips login. Otherwise a single guided
//! form login is attempted; failures are diagnosed and never retried.

mod diagnosis;
mod form;

pub use diagnosis::{diagnose_login, is_on_login_path, LoginAttempt};
pub use form::{
    guess_password_field, guess_username_field, parse_login_form, score_username_field,
    FormInput, LoginForm,
};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::{LoginFailureReason, ProviderError, ProviderResult};
use crate::http_client::HttpClient;
use crate::utils::resolve_url;

/// One cookie of an established session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// Credentials carried by one discovery or download call.
///
/// Never cached across provider instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub cookies: Vec<SessionCookie>,
    pub header_token: Option<String>,
}

impl AuthSession {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            cookies: Vec::new(),
            header_token: Some(token.into()),
        }
    }

    pub fn with_cookies(cookies: Vec<SessionCookie>) -> Self {
        Self {
            cookies,
            header_token: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.header_token.is_none()
    }
}

/// Resolves the session for a scrape-backed provider.
pub struct SessionResolver<'a> {
    name: &'a str,
    config: &'a ProviderConfig,
    http: &'a HttpClient,
}

impl<'a> SessionResolver<'a> {
    pub fn new(name: &'a str, config: &'a ProviderConfig, http: &'a HttpClient) -> Self {
        Self { name, config, http }
    }

    /// Token if configured, else a form login with username/password.
    pub async fn resolve(&self) -> ProviderResult<AuthSession> {
        let base = self
            .config
            .base()
            .ok_or_else(|| ProviderError::NotConfigured(self.name.to_string()))?;

        if let Some(token) = self.config.token.as_deref().filter(|_| self.config.has_token()) {
            debug!("{}: using configured token, skipping login", self.name);
            return Ok(AuthSession::with_token(token));
        }

        let (Some(username), Some(password)) = (
            self.config.username.as_deref().filter(|_| self.config.has_credentials()),
            self.config.password.as_deref(),
        ) else {
            return Err(ProviderError::NotConfigured(self.name.to_string()));
        };

        let timeout = Duration::from_secs(self.config.timeout);
        match tokio::time::timeout(timeout, self.form_login(base, username, password)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::login(
                LoginFailureReason::Unknown,
                format!("login did not complete within {}s", self.config.timeout),
            )),
        }
    }

    async fn form_login(
        &self,
        base: &str,
        username: &str,
        password: &str,
    ) -> ProviderResult<AuthSession> {
        let login_url = resolve_url(base, &self.config.paths.login);
        info!("{}: logging in at {}", self.name, login_url);

        let (page_url, html) = self.http.get_page(&login_url).await?;
        let form = parse_login_form(&html, &page_url).ok_or_else(|| {
            ProviderError::login(
                LoginFailureReason::Unknown,
                format!("no login form found at {}", page_url),
            )
        })?;
        debug!(
            "{}: login form submits ({}) to {} (user field {:?}, password field {:?}, {} hidden)",
            self.name,
            form.method,
            form.action,
            form.username_field,
            form.password_field,
            form.hidden.len()
        );

        let payload = form.payload(username, password);
        let response = self
            .http
            .submit_form(&form.method, &form.action, &payload)
            .await?;
        let status = response.status.as_u16();
        let final_url = response.final_url.clone();
        let body = response.text().await.unwrap_or_default();

        let cookies: Vec<SessionCookie> = self
            .http
            .cookies_for(base)
            .into_iter()
            .filter(|c| !c.value.is_empty())
            .collect();

        let attempt = LoginAttempt {
            status,
            body: &body,
            final_url: &final_url,
            has_cookie: !cookies.is_empty(),
        };

        if let Some(reason) = diagnose_login(&attempt) {
            let message = if reason == LoginFailureReason::Unknown
                && is_on_login_path(&final_url, &self.config.paths.login)
            {
                format!("still on login page {} without a session cookie", final_url)
            } else {
                format!("login at {} rejected (HTTP {})", form.action, status)
            };
            warn!("{}: login failed ({}): {}", self.name, reason, message);
            return Err(ProviderError::login(reason, message));
        }

        info!("{}: logged in ({} cookie(s))", self.name, cookies.len());
        Ok(AuthSession::with_cookies(cookies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    #[tokio::test]
    async fn test_token_skips_login() {
        let config = ProviderConfig::new(ProviderKind::Portal, "http://127.0.0.1:1")
            .with_token("tok")
            .with_credentials("u", "p");
        let http = HttpClient::new(Duration::from_secs(1)).unwrap();
        let session = SessionResolver::new("campus", &config, &http)
            .resolve()
            .await
            .unwrap();
        assert_eq!(session.header_token.as_deref(), Some("tok"));
        assert!(session.cookies.is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_is_not_configured() {
        let config = ProviderConfig::new(ProviderKind::Portal, "http://127.0.0.1:1");
        let http = HttpClient::new(Duration::from_secs(1)).unwrap();
        let err = SessionResolver::new("campus", &config, &http)
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(name) if name == "campus"));
    }
}
