//! Shared LLM gateway for the review backend.
//!
//! One crate owns every outbound model call:
//! - text generation through **fast** (drafting) and **slow** (quality) profiles,
//! - **structured output** against a JSON schema with typed decoding,
//! - **embeddings**, single and batched with bounded concurrency.
//!
//! Providers (Ollama, OpenAI) are thin enum-dispatched clients — no
//! `async-trait`, no `Box<dyn ...>`. Construct [`service_profiles::LlmServiceProfiles`]
//! once, wrap it in `Arc`, and pass clones to dependents.

pub mod config;
pub mod errors;
pub mod retry;
pub mod schema;
pub mod service_profiles;
pub mod services;

pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use errors::LlmError;
pub use schema::LlmSchema;
pub use service_profiles::LlmServiceProfiles;
