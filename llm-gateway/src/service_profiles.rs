//! Shared LLM service with three active profiles: `fast`, `slow`, and `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout).
//! - Provides generation via fast/slow, structured output, and embeddings
//!   (single + batched with bounded concurrency).
//! - If `slow` profile is not provided, it falls back to `fast`.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::Arc,
    time::Instant,
};

use futures::{StreamExt, stream};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    errors::{LlmError, LlmResult},
    retry::retry_with_backoff,
    schema::{LlmSchema, decode_structured},
    services::{ollama_service::OllamaService, open_ai_service::OpenAiService},
};

/// Attempts for transient failures on idempotent calls.
const RETRY_ATTEMPTS: u32 = 3;

/// Default parallelism for batched embedding requests.
const EMBED_CONCURRENCY: usize = 8;

/// Shared service that manages three logical LLM profiles: **fast**, **slow**,
/// and **embedding**.
///
/// Internally caches Ollama/OpenAI clients keyed by their configuration to
/// avoid recreating HTTP clients on each call.
#[derive(Debug)]
pub struct LlmServiceProfiles {
    fast: LlmModelConfig,
    slow: LlmModelConfig,
    embedding: LlmModelConfig,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,
}

impl LlmServiceProfiles {
    /// Creates a new service with three profiles.
    ///
    /// - `fast`: required fast profile (drafting/repair).
    /// - `slow_opt`: optional slow profile (quality). If `None`, falls back to `fast`.
    /// - `embedding`: required embedding profile.
    pub fn new(
        fast: LlmModelConfig,
        slow_opt: Option<LlmModelConfig>,
        embedding: LlmModelConfig,
    ) -> Self {
        let slow = slow_opt.unwrap_or_else(|| fast.clone());

        info!(
            fast.provider = %fast.provider,
            fast.model = %fast.model,
            slow.provider = %slow.provider,
            slow.model = %slow.model,
            embedding.provider = %embedding.provider,
            embedding.model = %embedding.model,
            "LlmServiceProfiles initialized"
        );

        Self {
            fast,
            slow,
            embedding,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
        }
    }

    /// Generates text using the **fast** profile.
    pub async fn generate_fast(&self, prompt: &str) -> LlmResult<String> {
        self.generate_with(&self.fast, prompt, None).await
    }

    /// Generates text using the **slow** profile.
    ///
    /// Falls back to the fast profile if the slow profile was not specified
    /// at creation.
    pub async fn generate_slow(&self, prompt: &str) -> LlmResult<String> {
        self.generate_with(&self.slow, prompt, None).await
    }

    /// Generates text using the **slow** profile with a system instruction.
    pub async fn generate_slow_with_system(
        &self,
        prompt: &str,
        system: &str,
    ) -> LlmResult<String> {
        self.generate_with(&self.slow, prompt, Some(system)).await
    }

    /// Requests a schema-conformant object from the **slow** profile.
    ///
    /// Uses the provider's structured-output mode (OpenAI `response_format`,
    /// Ollama `format`). Output that fails to decode surfaces as
    /// [`LlmError::SchemaViolation`], leaving the repair strategy to the caller.
    pub async fn invoke_structured<T: LlmSchema>(&self, prompt: &str) -> LlmResult<T> {
        let started = Instant::now();
        let schema = T::json_schema();

        let raw = retry_with_backoff("invoke_structured", RETRY_ATTEMPTS, || async {
            match self.slow.provider {
                LlmProvider::Ollama => {
                    let cli = self.get_or_init_ollama(&self.slow).await?;
                    cli.generate_structured(prompt, &schema).await
                }
                LlmProvider::OpenAI => {
                    let cli = self.get_or_init_openai(&self.slow).await?;
                    cli.generate_structured(prompt, T::NAME, &schema).await
                }
            }
        })
        .await?;

        let out = decode_structured::<T>(&raw)?;
        info!(
            schema = T::NAME,
            provider = %self.slow.provider,
            model = %self.slow.model,
            latency_ms = started.elapsed().as_millis() as u64,
            "structured generation completed"
        );
        Ok(out)
    }

    /// Computes a single embedding vector using the **embedding** profile.
    pub async fn embed(&self, input: &str) -> LlmResult<Vec<f32>> {
        retry_with_backoff("embed", RETRY_ATTEMPTS, || async {
            match self.embedding.provider {
                LlmProvider::Ollama => {
                    let cli = self.get_or_init_ollama(&self.embedding).await?;
                    cli.embeddings(input).await
                }
                LlmProvider::OpenAI => {
                    let cli = self.get_or_init_openai(&self.embedding).await?;
                    cli.embeddings(input).await
                }
            }
        })
        .await
    }

    /// Embeds a batch of texts with bounded concurrency, preserving input order.
    ///
    /// The embedding endpoint takes one input per request, so the batch fans
    /// out over `buffered` futures; the first failure aborts the batch.
    pub async fn embed_batch(&self, texts: &[String]) -> LlmResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let results: Vec<LlmResult<Vec<f32>>> = stream::iter(texts.iter())
            .map(|t| self.embed(t))
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        let mut out = Vec::with_capacity(results.len());
        for r in results {
            out.push(r?);
        }

        info!(
            count = out.len(),
            provider = %self.embedding.provider,
            model = %self.embedding.model,
            latency_ms = started.elapsed().as_millis() as u64,
            "batch embeddings completed"
        );
        Ok(out)
    }

    /// Returns references to the current profiles `(fast, slow, embedding)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig, &LlmModelConfig) {
        (&self.fast, &self.slow, &self.embedding)
    }

    /* --------------------- Internals --------------------- */

    async fn generate_with(
        &self,
        cfg: &LlmModelConfig,
        prompt: &str,
        system: Option<&str>,
    ) -> LlmResult<String> {
        let started = Instant::now();

        let res = retry_with_backoff("generate", RETRY_ATTEMPTS, || async {
            match cfg.provider {
                LlmProvider::Ollama => {
                    let cli = self.get_or_init_ollama(cfg).await?;
                    cli.generate(prompt).await
                }
                LlmProvider::OpenAI => {
                    let cli = self.get_or_init_openai(cfg).await?;
                    cli.generate(prompt, system).await
                }
            }
        })
        .await;

        if res.is_ok() {
            info!(
                provider = %cfg.provider,
                model = %cfg.model,
                prompt_len = prompt.len(),
                has_system = system.is_some(),
                latency_ms = started.elapsed().as_millis() as u64,
                "generation completed"
            );
        }
        res
    }

    async fn get_or_init_ollama(&self, cfg: &LlmModelConfig) -> LlmResult<Arc<OllamaService>> {
        let key = ClientKey::from(cfg);

        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            debug!(model = %cfg.model, "ollama client cache hit");
            return Ok(cli);
        }

        let mut w = self.ollama.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OllamaService::new(cfg.clone())?);
        w.insert(key, cli.clone());

        debug!(model = %cfg.model, endpoint = %cfg.endpoint, "ollama client initialized");
        Ok(cli)
    }

    async fn get_or_init_openai(&self, cfg: &LlmModelConfig) -> LlmResult<Arc<OpenAiService>> {
        let key = ClientKey::from(cfg);

        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            debug!(model = %cfg.model, "openai client cache hit");
            return Ok(cli);
        }

        let mut w = self.openai.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OpenAiService::new(cfg.clone())?);
        w.insert(key, cli.clone());

        debug!(model = %cfg.model, endpoint = %cfg.endpoint, "openai client initialized");
        Ok(cli)
    }
}

/// Internal cache key to identify unique client configs.
///
/// `api_key` participates in the key to isolate clients with different
/// credentials, but the key's fields are never logged.
#[derive(Clone, Eq, Debug)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}

impl PartialEq for ClientKey {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.endpoint == other.endpoint
            && self.model == other.model
            && self.api_key == other.api_key
            && self.timeout == other.timeout
    }
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.endpoint.hash(state);
        self.model.hash(state);
        if let Some(ref k) = self.api_key {
            k.hash(state);
        } else {
            0usize.hash(state);
        }
        self.timeout.hash(state);
    }
}
