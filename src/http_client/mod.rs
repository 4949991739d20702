//! HTTP transport shared by API and scrape-backed providers.
//!
//! One client per top-level operation: its cookie jar holds that
//! operation's login session and is never shared across providers.

mod response;

pub use response::{parse_content_disposition_filename, parse_link_next, HttpResponse};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::{Origin, Url};

use crate::auth::SessionCookie;
use crate::error::{ProviderError, ProviderResult};

/// Upper bound on followed `rel="next"` links.
const MAX_PAGES: usize = 1000;

pub const USER_AGENT: &str = concat!("coursefetch/", env!("CARGO_PKG_VERSION"));

/// Sent for `user_agent = "browser"`. Some portals serve a stripped page,
/// or drop the session, for agents they do not recognize.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    jar: Arc<Jar>,
    bearer: Option<(String, Origin)>,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the default user agent.
    pub fn new(timeout: Duration) -> ProviderResult<Self> {
        Self::with_user_agent(timeout, None)
    }

    /// Create a client for a provider's `user_agent` setting: unset or empty
    /// sends [`USER_AGENT`], `"browser"` sends [`BROWSER_USER_AGENT`], and
    /// anything else is sent verbatim.
    pub fn with_user_agent(timeout: Duration, user_agent: Option<&str>) -> ProviderResult<Self> {
        let user_agent = match user_agent.map(str::trim) {
            None | Some("") => USER_AGENT,
            Some("browser") => BROWSER_USER_AGENT,
            Some(custom) => custom,
        };
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .cookie_provider(jar.clone())
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            jar,
            bearer: None,
            timeout,
        })
    }

    /// Send `Authorization: Bearer <token>` on requests to `base_url`'s
    /// origin. File URLs on other hosts (CDNs, signed storage links) go
    /// without it.
    pub fn with_bearer(mut self, token: impl Into<String>, base_url: &str) -> Self {
        self.bearer = Url::parse(base_url)
            .ok()
            .map(|base| (token.into(), base.origin()));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some((token, origin)) = &self.bearer {
            if Url::parse(url).is_ok_and(|u| &u.origin() == origin) {
                request = request.bearer_auth(token);
            }
        }
        request
    }

    /// GET without status checking.
    pub async fn get(&self, url: &str) -> ProviderResult<HttpResponse> {
        debug!("GET {}", url);
        let response = self.request(reqwest::Method::GET, url).send().await?;
        Ok(HttpResponse::from_response(response))
    }

    /// GET and map non-2xx statuses to the provider error taxonomy.
    pub async fn get_checked(&self, url: &str, what: &str) -> ProviderResult<HttpResponse> {
        self.get(url).await?.error_for_status(what)
    }

    /// GET a page and return `(final_url, body)`.
    pub async fn get_page(&self, url: &str) -> ProviderResult<(String, String)> {
        let response = self.get_checked(url, url).await?;
        let final_url = response.final_url.clone();
        Ok((final_url, response.text().await?))
    }

    /// Submit an urlencoded form the way its `method` attribute asks: in the
    /// query string for `get`, as the body otherwise.
    pub async fn submit_form(
        &self,
        method: &str,
        url: &str,
        form: &[(String, String)],
    ) -> ProviderResult<HttpResponse> {
        let request = if method.eq_ignore_ascii_case("get") {
            debug!("GET {} ({} fields)", url, form.len());
            self.request(reqwest::Method::GET, url).query(form)
        } else {
            debug!("POST {} ({} fields)", url, form.len());
            self.request(reqwest::Method::POST, url).form(form)
        };
        Ok(HttpResponse::from_response(request.send().await?))
    }

    /// GET a JSON array and follow `Link: rel="next"` until exhausted,
    /// accumulating one list. Any failing page fails the whole call.
    pub async fn get_json_pages<T: DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> ProviderResult<Vec<T>> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next.take() {
            if !visited.insert(page_url.clone()) || visited.len() > MAX_PAGES {
                debug!("Stopping pagination for {} at repeated {}", what, page_url);
                break;
            }

            let response = self.get_checked(&page_url, what).await?;
            next = response
                .next_link()
                .map(|link| crate::utils::resolve_url(&page_url, &link));
            let page: Vec<T> = response.json().await?;
            debug!("{}: {} item(s) from {}", what, page.len(), page_url);
            items.extend(page);
        }

        Ok(items)
    }

    /// Cookies the jar would send to `url`.
    pub fn cookies_for(&self, url: &str) -> Vec<SessionCookie> {
        let Ok(parsed) = Url::parse(url) else {
            return Vec::new();
        };
        let domain = parsed.host_str().unwrap_or_default().to_string();
        let Some(header) = self.jar.cookies(&parsed) else {
            return Vec::new();
        };
        let Ok(header) = header.to_str() else {
            return Vec::new();
        };

        header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some(SessionCookie {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                    domain: domain.clone(),
                    path: "/".to_string(),
                })
            })
            .filter(|c| !c.name.is_empty())
            .collect()
    }

    /// Seed the jar with cookies from a previously established session.
    pub fn add_cookies(&self, url: &str, cookies: &[SessionCookie]) -> ProviderResult<()> {
        let parsed = Url::parse(url)
            .map_err(|e| ProviderError::Config(format!("invalid URL {}: {}", url, e)))?;
        for cookie in cookies {
            self.jar.add_cookie_str(
                &format!("{}={}; Path={}", cookie.name, cookie.value, cookie.path),
                &parsed,
            );
        }
        Ok(())
    }
}
