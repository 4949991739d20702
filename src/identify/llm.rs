//! LLM-backed material classifier.
//!
//! The snapshot is summarized into a compact JSON context and the model is
//! asked to return only the materials on the page. Any failure (transport,
//! timeout, unparseable answer) falls back to the rule-based identifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::heuristics::{file_type_of, is_script_artifact, title_from_url};
use super::{MaterialIdentifier, RuleBasedIdentifier};
use crate::config::{LlmConfig, LlmProvider};
use crate::models::{ExtractedMaterial, MaterialSource};
use crate::snapshot::PageSnapshot;
use crate::utils::resolve_url;
use crate::utils::text::truncate;

const LLM_CONFIDENCE: f32 = 0.7;

const SYSTEM_PROMPT: &str = "You extract downloadable course materials (documents, slides, \
spreadsheets, videos, audio) from a structured summary of a learning-portal page. \
Ignore navigation, profile, logout and help links. Answer with a JSON array only, \
each element {\"url\": string, \"title\": string, \"file_type\": string}. \
Answer [] when the page has no materials.";

/// Errors from the model call. Only logged; the identifier falls back.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct LlmMaterial {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    file_type: String,
}

/// Classifier that asks a language model, falling back to rules.
pub struct LlmIdentifier {
    config: LlmConfig,
    client: Client,
    fallback: RuleBasedIdentifier,
}

impl LlmIdentifier {
    pub fn new(config: LlmConfig, fallback: RuleBasedIdentifier) -> Self {
        Self {
            config,
            client: Client::new(),
            fallback,
        }
    }

    async fn classify(&self, snapshot: &PageSnapshot) -> Result<Vec<ExtractedMaterial>, LlmError> {
        let context = build_context(snapshot, self.config.max_context_chars);
        let call = async {
            match self.config.provider {
                LlmProvider::Ollama => self.call_ollama(&context).await,
                LlmProvider::OpenAi => self.call_openai(&context).await,
            }
        };
        let answer = tokio::time::timeout(Duration::from_secs(self.config.timeout), call)
            .await
            .map_err(|_| LlmError::Timeout(self.config.timeout))??;
        parse_llm_materials(&answer, &snapshot.url)
    }

    async fn call_ollama(&self, context: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: context.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Api(format!("HTTP {}", resp.status())));
        }
        let body: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(body.response)
    }

    async fn call_openai(&self, context: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );
        let request = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": context},
            ],
        });

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = self.config.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Api(format!("HTTP {}", resp.status())));
        }
        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("no choices in response".to_string()))
    }
}

#[async_trait]
impl MaterialIdentifier for LlmIdentifier {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn identify(&self, snapshot: &PageSnapshot) -> Vec<ExtractedMaterial> {
        match self.classify(snapshot).await {
            Ok(materials) => {
                debug!("Model returned {} material(s) for {}", materials.len(), snapshot.url);
                materials
            }
            Err(e) => {
                warn!("LLM classification of {} failed, using rules: {}", snapshot.url, e);
                self.fallback.identify_sync(snapshot)
            }
        }
    }
}

/// What the model sees of a page. Page-level fields come first so they
/// survive truncation.
#[derive(Serialize)]
struct PageContext<'a> {
    page_url: &'a str,
    page_title: &'a str,
    iframes: &'a [String],
    file_rows: Vec<serde_json::Value>,
    material_names: &'a [String],
    download_url_templates: &'a [String],
    links: Vec<serde_json::Value>,
}

/// Compact JSON view of the snapshot, capped at `max_chars`.
fn build_context(snapshot: &PageSnapshot, max_chars: usize) -> String {
    let links: Vec<serde_json::Value> = snapshot
        .links
        .iter()
        .filter(|l| !l.href.is_empty())
        .take(300)
        .map(|l| json!({"href": l.href, "text": l.text, "context": l.context}))
        .collect();
    let rows: Vec<serde_json::Value> = snapshot
        .file_items
        .iter()
        .take(200)
        .map(|item| {
            let id = item.data_id.as_deref().unwrap_or_default();
            json!({
                "id": id,
                "text": item.text,
                "links": item.links.iter().map(|l| l.href.as_str()).collect::<Vec<_>>(),
                "resolved_url": snapshot.file_url_map.get(id).or_else(|| snapshot.clicked_urls.get(id)),
                "resolved_title": snapshot.file_title_map.get(id),
            })
        })
        .collect();

    let context = PageContext {
        page_url: &snapshot.url,
        page_title: &snapshot.title,
        iframes: &snapshot.iframes,
        file_rows: rows,
        material_names: &snapshot.material_names,
        download_url_templates: &snapshot.download_url_patterns,
        links,
    };
    let context = serde_json::to_string(&context).unwrap_or_default();
    truncate(&context, max_chars).to_string()
}

/// Parse the model's answer: the first JSON array in the text.
///
/// URLs are resolved against `base_url`; entries without a URL or carrying
/// template syntax are dropped.
pub fn parse_llm_materials(answer: &str, base_url: &str) -> Result<Vec<ExtractedMaterial>, LlmError> {
    let start = answer
        .find('[')
        .ok_or_else(|| LlmError::Parse("no JSON array in answer".to_string()))?;
    let end = answer
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| LlmError::Parse("unterminated JSON array".to_string()))?;
    let items: Vec<LlmMaterial> = serde_json::from_str(&answer[start..=end])
        .map_err(|e| LlmError::Parse(e.to_string()))?;

    Ok(items
        .into_iter()
        .filter(|m| !m.url.trim().is_empty() && !is_script_artifact(&m.url))
        .map(|m| {
            let url = resolve_url(base_url, &m.url);
            let title = if m.title.trim().is_empty() {
                title_from_url(&url)
            } else {
                m.title.trim().to_string()
            };
            let file_type = if m.file_type.trim().is_empty() {
                file_type_of(&url)
            } else {
                m.file_type.trim().to_lowercase()
            };
            ExtractedMaterial::new(url, title, file_type, LLM_CONFIDENCE, MaterialSource::Llm)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::PageLink;

    #[test]
    fn test_parse_answer_with_prose() {
        let answer = r#"Here are the materials:
            [{"url": "/files/a.pdf", "title": "Guía 1"},
             {"url": "https://cdn.p.edu/v.mp4", "title": "", "file_type": "MP4"},
             {"url": "/get?f=${x}", "title": "bad"},
             {"title": "no url"}]
            Hope this helps."#;
        let materials = parse_llm_materials(answer, "https://p.edu/c/Curso.asp").unwrap();
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[0].url, "https://p.edu/files/a.pdf");
        assert_eq!(materials[0].file_type, "pdf");
        assert_eq!(materials[1].title, "v.mp4");
        assert_eq!(materials[1].file_type, "mp4");
        assert!(materials.iter().all(|m| m.source == MaterialSource::Llm));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_llm_materials("I could not find anything.", "https://p.edu/").is_err());
        assert!(parse_llm_materials("] nope [", "https://p.edu/").is_err());
    }

    #[test]
    fn test_context_is_capped() {
        let mut snap = PageSnapshot::new("https://p.edu/c");
        snap.links = (0..500)
            .map(|i| PageLink {
                href: format!("https://p.edu/files/{}.pdf", i),
                text: "Guía".to_string(),
                ..Default::default()
            })
            .collect();
        let context = build_context(&snap, 2000);
        assert!(context.len() <= 2000);
        assert!(context.starts_with("{\"page_url\""));
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back_to_rules() {
        let config = LlmConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout: 2,
            ..Default::default()
        };
        let identifier = LlmIdentifier::new(config, RuleBasedIdentifier::default());
        let mut snap = PageSnapshot::new("https://p.edu/c");
        snap.iframes.push("https://p.edu/viewer/doc.pdf".to_string());

        let materials = identifier.identify(&snap).await;
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].source, MaterialSource::Iframe);
    }
}
