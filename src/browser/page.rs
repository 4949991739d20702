//! One isolated browser context with a single page, driven over CDP.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams, Headers,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, Page};

use crate::auth::AuthSession;
use crate::snapshot::{is_api_like_url, NetworkExchange, PageDriver};

type NetworkLog = Arc<StdMutex<Vec<NetworkExchange>>>;

/// A browser context owned by one logical operation.
///
/// [`BrowserSession::close`] releases the page and the context; if the
/// session is dropped without it (a cancelled future), release happens on
/// a background task.
pub struct BrowserSession {
    browser: Arc<Mutex<Browser>>,
    context_id: Option<BrowserContextId>,
    page: Option<Page>,
    network: NetworkLog,
    recorder: Option<JoinHandle<()>>,
}

impl BrowserSession {
    pub(super) async fn open(
        browser: Arc<Mutex<Browser>>,
        auth: &AuthSession,
        base_url: &str,
        max_body_bytes: usize,
    ) -> anyhow::Result<Self> {
        let (context_id, page) = {
            let guard = browser.lock().await;
            let context_id = guard
                .execute(CreateBrowserContextParams::default())
                .await
                .context("Failed to create browser context")?
                .result
                .browser_context_id
                .clone();
            let target = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context_id.clone())
                .build()
                .map_err(|e| anyhow::anyhow!("Invalid target params: {}", e))?;
            let page = guard.new_page(target).await;
            match page {
                Ok(page) => (context_id, page),
                Err(e) => {
                    let _ = guard
                        .execute(DisposeBrowserContextParams::new(context_id))
                        .await;
                    return Err(e).context("Failed to open page");
                }
            }
        };

        let network: NetworkLog = Arc::new(StdMutex::new(Vec::new()));
        let mut session = Self {
            browser,
            context_id: Some(context_id),
            page: Some(page.clone()),
            network: network.clone(),
            recorder: None,
        };

        apply_auth(&page, auth, base_url).await;
        session.recorder = Some(start_recorder(page, network, max_body_bytes).await?);
        Ok(session)
    }

    fn page(&self) -> anyhow::Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("page already closed"))
    }

    /// Close the page, then dispose of the context.
    pub async fn close(mut self) {
        self.release().await;
    }

    async fn release(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            recorder.abort();
        }
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close reported: {}", e);
            }
        }
        if let Some(context_id) = self.context_id.take() {
            let guard = self.browser.lock().await;
            if let Err(e) = guard
                .execute(DisposeBrowserContextParams::new(context_id))
                .await
            {
                debug!("Browser context dispose reported: {}", e);
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.context_id.is_none() && self.page.is_none() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Browser session dropped outside a runtime; context leaked until browser exit");
            return;
        };
        let mut leftover = BrowserSession {
            browser: self.browser.clone(),
            context_id: self.context_id.take(),
            page: self.page.take(),
            network: self.network.clone(),
            recorder: self.recorder.take(),
        };
        runtime.spawn(async move {
            leftover.release().await;
        });
    }
}

/// Inject session cookies and the bearer header before any navigation.
async fn apply_auth(page: &Page, auth: &AuthSession, base_url: &str) {
    let cookies: Vec<CookieParam> = auth
        .cookies
        .iter()
        .filter(|c| !c.name.is_empty())
        .filter_map(|c| {
            let mut builder = CookieParam::builder().name(c.name.clone()).value(c.value.clone());
            builder = if c.domain.is_empty() {
                builder.url(base_url.to_string())
            } else {
                builder.domain(c.domain.clone())
            };
            if !c.path.is_empty() {
                builder = builder.path(c.path.clone());
            }
            match builder.build() {
                Ok(param) => Some(param),
                Err(e) => {
                    warn!("Failed to build cookie {}: {}", c.name, e);
                    None
                }
            }
        })
        .collect();
    if !cookies.is_empty() {
        let count = cookies.len();
        match page.set_cookies(cookies).await {
            Ok(_) => debug!("Injected {} session cookie(s)", count),
            Err(e) => warn!("Failed to inject session cookies: {}", e),
        }
    }

    if let Some(token) = auth.header_token.as_deref() {
        let headers = Headers::new(serde_json::json!({
            "Authorization": format!("Bearer {}", token)
        }));
        if let Err(e) = page.execute(SetExtraHttpHeadersParams::new(headers)).await {
            warn!("Failed to set authorization header: {}", e);
        }
    }
}

/// Record every response; keep bodies of small JSON responses from
/// API-like endpoints once they finish loading.
async fn start_recorder(
    page: Page,
    network: NetworkLog,
    max_body_bytes: usize,
) -> anyhow::Result<JoinHandle<()>> {
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .context("Failed to listen for responses")?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .context("Failed to listen for finished loads")?;

    Ok(tokio::spawn(async move {
        let mut pending: HashMap<String, NetworkExchange> = HashMap::new();
        loop {
            tokio::select! {
                Some(event) = responses.next() => {
                    let url = event.response.url.clone();
                    if url.starts_with("data:") {
                        continue;
                    }
                    let exchange = NetworkExchange {
                        url,
                        mime_type: event.response.mime_type.clone(),
                        status: u16::try_from(event.response.status).unwrap_or(0),
                        body: None,
                    };
                    if exchange.mime_type.contains("json") && is_api_like_url(&exchange.url) {
                        pending.insert(event.request_id.inner().clone(), exchange);
                    } else if let Ok(mut log) = network.lock() {
                        log.push(exchange);
                    }
                }
                Some(event) = finished.next() => {
                    let Some(mut exchange) = pending.remove(event.request_id.inner()) else {
                        continue;
                    };
                    if event.encoded_data_length <= max_body_bytes as f64 {
                        match page.execute(GetResponseBodyParams::new(event.request_id.clone())).await {
                            Ok(resp) if !resp.result.base64_encoded => {
                                exchange.body = Some(resp.result.body.clone());
                            }
                            Ok(_) => {}
                            Err(e) => debug!("No body for {}: {}", exchange.url, e),
                        }
                    }
                    if let Ok(mut log) = network.lock() {
                        log.push(exchange);
                    }
                }
                else => break,
            }
        }
    }))
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
        self.page()?
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    async fn current_url(&mut self) -> anyhow::Result<String> {
        Ok(self.page()?.url().await?.unwrap_or_default())
    }

    async fn evaluate(&mut self, script: &str) -> anyhow::Result<serde_json::Value> {
        let result = self.page()?.evaluate(script.to_string()).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn drain_network(&mut self) -> Vec<NetworkExchange> {
        self.network
            .lock()
            .map(|mut log| std::mem::take(&mut *log))
            .unwrap_or_default()
    }
}
