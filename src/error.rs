//! Error taxonomy shared by every provider.

use reqwest::StatusCode;
use thiserror::Error;

/// Why a form login was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailureReason {
    /// The portal rejected the username/password.
    BadCredentials,
    /// The portal wants an interactive challenge solved.
    Captcha,
    /// Login is delegated to an external identity provider.
    SsoRequired,
    /// Nothing recognizable, but no session was established either.
    Unknown,
}

impl LoginFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadCredentials => "bad_credentials",
            Self::Captcha => "captcha",
            Self::SsoRequired => "sso_required",
            Self::Unknown => "unknown",
        }
    }

    /// CAPTCHA and SSO can never be resolved by retrying with the same credentials.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Captcha | Self::SsoRequired)
    }
}

impl std::fmt::Display for LoginFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider '{0}' is not configured")]
    NotConfigured(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("downloaded payload is empty: {0}")]
    Empty(String),

    #[error("login failed ({reason}): {message}")]
    LoginFailed {
        reason: LoginFailureReason,
        message: String,
    },

    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("no download url could be resolved for item {0}")]
    ResolutionIncomplete(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn login(reason: LoginFailureReason, message: impl Into<String>) -> Self {
        Self::LoginFailed {
            reason,
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status to the matching error variant.
    ///
    /// Returns `None` for 2xx statuses.
    pub fn from_status(status: StatusCode, what: &str) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        Some(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Unauthorized(format!("{} (HTTP {})", what, status.as_u16()))
            }
            StatusCode::NOT_FOUND => Self::NotFound(what.to_string()),
            _ => Self::UpstreamError(format!("{} returned HTTP {}", what, status.as_u16())),
        })
    }

    /// Login failures that must surface immediately and never be retried.
    pub fn is_fatal_login(&self) -> bool {
        matches!(self, Self::LoginFailed { reason, .. } if reason.is_fatal())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_taxonomy() {
        assert!(ProviderError::from_status(StatusCode::OK, "x").is_none());
        assert!(matches!(
            ProviderError::from_status(StatusCode::FORBIDDEN, "x"),
            Some(ProviderError::Unauthorized(_))
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::NOT_FOUND, "x"),
            Some(ProviderError::NotFound(_))
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::BAD_GATEWAY, "x"),
            Some(ProviderError::UpstreamError(_))
        ));
    }

    #[test]
    fn test_fatal_login_reasons() {
        assert!(ProviderError::login(LoginFailureReason::Captcha, "x").is_fatal_login());
        assert!(ProviderError::login(LoginFailureReason::SsoRequired, "x").is_fatal_login());
        assert!(!ProviderError::login(LoginFailureReason::BadCredentials, "x").is_fatal_login());
    }
}
