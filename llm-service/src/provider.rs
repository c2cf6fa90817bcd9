//! `ProviderAdapter`: uniform interface over multiple LLM vendors via enum
//! dispatch (no `async-trait`, no `dyn Trait`), mirroring the teacher's
//! `ProviderClient` shape from the host-provider facade.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::errors::{Error, LlmResult, ProviderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Anthropic,
    OpenRouter,
    Gemini,
}

impl ProviderKind {
    /// Whether this provider exposes a native embedding endpoint. Providers
    /// that return `false` must be constructed with an `embeddingFallback`.
    pub fn has_native_embedding(self) -> bool {
        matches!(self, ProviderKind::Ollama | ProviderKind::OpenAi | ProviderKind::Gemini)
    }

    /// Whether the provider's embedding endpoint accepts a batch of inputs
    /// in one call.
    pub fn has_batch_embedding(self) -> bool {
        matches!(self, ProviderKind::OpenAi)
    }
}

/// A single vendor's connection details. Intentionally generic across
/// vendors — each vendor-specific request/response shape is handled in the
/// matching arm of `ProviderAdapter`'s methods.
#[derive(Clone)]
pub struct HttpProvider {
    pub kind: ProviderKind,
    pub http: Client,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
}

/// Text (and, where supported, embedding) generation over one vendor, with
/// an optional fallback used only for embeddings when the primary vendor
/// lacks native embedding support.
#[derive(Clone)]
pub struct ProviderAdapter {
    primary: HttpProvider,
    embedding_fallback: Option<Box<HttpProvider>>,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOpts {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateOpts {
    fn default() -> Self {
        GenerateOpts {
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

impl ProviderAdapter {
    /// Choosing an embedding-incapable primary without a fallback is a
    /// hard, construction-time error.
    pub fn new(primary: HttpProvider, embedding_fallback: Option<HttpProvider>) -> LlmResult<Self> {
        if !primary.kind.has_native_embedding() {
            match &embedding_fallback {
                None => return Err(Error::MissingEmbeddingFallback(format!("{:?}", primary.kind))),
                Some(fb) if !fb.kind.has_native_embedding() => {
                    return Err(Error::FallbackLacksEmbedding(format!("{:?}", fb.kind)));
                }
                Some(_) => {}
            }
        }
        Ok(ProviderAdapter {
            primary,
            embedding_fallback: embedding_fallback.map(Box::new),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.primary.kind
    }

    pub async fn generate_text(&self, prompt: &str, opts: GenerateOpts) -> LlmResult<String> {
        let p = &self.primary;
        debug!(kind = ?p.kind, "generate_text");
        match p.kind {
            ProviderKind::Ollama => {
                let url = format!("{}/api/generate", p.base_url);
                let body = json!({
                    "model": p.model,
                    "prompt": prompt,
                    "stream": false,
                    "options": { "temperature": opts.temperature, "num_predict": opts.max_tokens }
                });
                #[derive(Deserialize)]
                struct OllamaResp {
                    response: String,
                }
                let resp: OllamaResp = send_json(&p.http, &url, &p.api_key, &body).await?;
                Ok(resp.response)
            }
            ProviderKind::OpenAi | ProviderKind::OpenRouter => {
                let url = format!("{}/chat/completions", p.base_url);
                let body = json!({
                    "model": p.model,
                    "messages": [{"role": "user", "content": prompt}],
                    "temperature": opts.temperature,
                    "max_tokens": opts.max_tokens,
                });
                #[derive(Deserialize)]
                struct Choice {
                    message: Msg,
                }
                #[derive(Deserialize)]
                struct Msg {
                    content: String,
                }
                #[derive(Deserialize)]
                struct ChatResp {
                    choices: Vec<Choice>,
                }
                let resp: ChatResp = send_json(&p.http, &url, &p.api_key, &body).await?;
                resp.choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| Error::Provider(ProviderError::InvalidResponse("no choices".into())))
            }
            ProviderKind::Anthropic => {
                let url = format!("{}/v1/messages", p.base_url);
                let body = json!({
                    "model": p.model,
                    "max_tokens": opts.max_tokens,
                    "temperature": opts.temperature,
                    "messages": [{"role": "user", "content": prompt}],
                });
                #[derive(Deserialize)]
                struct Block {
                    text: String,
                }
                #[derive(Deserialize)]
                struct AnthropicResp {
                    content: Vec<Block>,
                }
                let resp: AnthropicResp = send_json(&p.http, &url, &p.api_key, &body).await?;
                resp.content
                    .into_iter()
                    .next()
                    .map(|b| b.text)
                    .ok_or_else(|| Error::Provider(ProviderError::InvalidResponse("empty content".into())))
            }
            ProviderKind::Gemini => {
                let url = format!(
                    "{}/v1beta/models/{}:generateContent?key={}",
                    p.base_url,
                    p.model,
                    p.api_key.as_deref().unwrap_or_default()
                );
                let body = json!({
                    "contents": [{"parts": [{"text": prompt}]}],
                    "generationConfig": { "temperature": opts.temperature, "maxOutputTokens": opts.max_tokens }
                });
                #[derive(Deserialize)]
                struct Part {
                    text: String,
                }
                #[derive(Deserialize)]
                struct Content {
                    parts: Vec<Part>,
                }
                #[derive(Deserialize)]
                struct Candidate {
                    content: Content,
                }
                #[derive(Deserialize)]
                struct GeminiResp {
                    candidates: Vec<Candidate>,
                }
                let resp: GeminiResp = send_json(&p.http, &url, &None, &body).await?;
                resp.candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content.parts.into_iter().next())
                    .map(|p| p.text)
                    .ok_or_else(|| Error::Provider(ProviderError::InvalidResponse("no candidates".into())))
            }
        }
    }

    pub async fn generate_embedding(&self, text: &str) -> LlmResult<Vec<f32>> {
        let provider = if self.primary.kind.has_native_embedding() {
            &self.primary
        } else {
            self.embedding_fallback
                .as_deref()
                .expect("constructor enforces a fallback when primary lacks embeddings")
        };
        embed_one(provider, text).await
    }

    pub async fn generate_embedding_batch(&self, texts: &[String]) -> LlmResult<Option<Vec<Vec<f32>>>> {
        let provider = if self.primary.kind.has_native_embedding() {
            &self.primary
        } else {
            self.embedding_fallback
                .as_deref()
                .expect("constructor enforces a fallback when primary lacks embeddings")
        };
        if !provider.kind.has_batch_embedding() {
            return Ok(None);
        }
        let url = format!("{}/embeddings", provider.base_url);
        let body = json!({ "model": provider.embedding_model, "input": texts });
        #[derive(Deserialize)]
        struct EmbeddingItem {
            embedding: Vec<f32>,
        }
        #[derive(Deserialize)]
        struct EmbeddingResp {
            data: Vec<EmbeddingItem>,
        }
        let resp: EmbeddingResp = send_json(&provider.http, &url, &provider.api_key, &body).await?;
        Ok(Some(resp.data.into_iter().map(|d| d.embedding).collect()))
    }
}

async fn embed_one(provider: &HttpProvider, text: &str) -> LlmResult<Vec<f32>> {
    match provider.kind {
        ProviderKind::Ollama => {
            let url = format!("{}/api/embeddings", provider.base_url);
            let body = json!({ "model": provider.embedding_model, "prompt": text });
            #[derive(Deserialize)]
            struct OllamaEmbedResp {
                embedding: Vec<f32>,
            }
            let resp: OllamaEmbedResp = send_json(&provider.http, &url, &provider.api_key, &body).await?;
            Ok(resp.embedding)
        }
        ProviderKind::OpenAi => {
            let url = format!("{}/embeddings", provider.base_url);
            let body = json!({ "model": provider.embedding_model, "input": text });
            #[derive(Deserialize)]
            struct EmbeddingItem {
                embedding: Vec<f32>,
            }
            #[derive(Deserialize)]
            struct EmbeddingResp {
                data: Vec<EmbeddingItem>,
            }
            let resp: EmbeddingResp = send_json(&provider.http, &url, &provider.api_key, &body).await?;
            resp.data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .ok_or_else(|| Error::Provider(ProviderError::InvalidResponse("no embedding data".into())))
        }
        ProviderKind::Gemini => {
            let url = format!(
                "{}/v1beta/models/{}:embedContent?key={}",
                provider.base_url,
                provider.embedding_model,
                provider.api_key.as_deref().unwrap_or_default()
            );
            let body = json!({ "content": { "parts": [{"text": text}] } });
            #[derive(Deserialize)]
            struct EmbeddingValue {
                values: Vec<f32>,
            }
            #[derive(Deserialize)]
            struct GeminiEmbedResp {
                embedding: EmbeddingValue,
            }
            let resp: GeminiEmbedResp = send_json(&provider.http, &url, &None, &body).await?;
            Ok(resp.embedding.values)
        }
        ProviderKind::Anthropic | ProviderKind::OpenRouter => {
            Err(Error::MissingEmbeddingFallback(format!("{:?}", provider.kind)))
        }
    }
}

async fn send_json<T: for<'de> Deserialize<'de>>(
    http: &Client,
    url: &str,
    api_key: &Option<String>,
    body: &serde_json::Value,
) -> LlmResult<T> {
    let mut req = http.post(url).json(body);
    if let Some(key) = api_key {
        req = req.header("Authorization", format!("Bearer {key}"));
    }
    let resp = req.send().await.map_err(ProviderError::from)?;
    let status = resp.status();
    if !status.is_success() {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(Error::Provider(match status.as_u16() {
            401 => ProviderError::Unauthorized,
            403 => ProviderError::Forbidden,
            404 => ProviderError::NotFound,
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after,
            },
            code @ 500..=599 => ProviderError::Server(code),
            code => ProviderError::HttpStatus(code),
        }));
    }
    resp.json::<T>()
        .await
        .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(kind: ProviderKind) -> HttpProvider {
        HttpProvider {
            kind,
            http: Client::new(),
            base_url: "http://localhost".into(),
            api_key: None,
            model: "test-model".into(),
            embedding_model: "test-embed".into(),
        }
    }

    #[test]
    fn construction_fails_without_fallback_for_text_only_provider() {
        let err = ProviderAdapter::new(provider(ProviderKind::Anthropic), None);
        assert!(err.is_err());
    }

    #[test]
    fn construction_succeeds_with_valid_fallback() {
        let adapter = ProviderAdapter::new(
            provider(ProviderKind::Anthropic),
            Some(provider(ProviderKind::Ollama)),
        );
        assert!(adapter.is_ok());
    }

    #[test]
    fn construction_fails_when_fallback_also_lacks_embeddings() {
        let err = ProviderAdapter::new(
            provider(ProviderKind::Anthropic),
            Some(provider(ProviderKind::OpenRouter)),
        );
        assert!(err.is_err());
    }
}
