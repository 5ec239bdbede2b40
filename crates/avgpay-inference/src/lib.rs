//! # avgpay-inference
//!
//! LLM generation backends and the fallback chain used by the enrichment
//! processor.
//!
//! ## Providers
//!
//! - [`anthropic`]: Anthropic Messages API
//! - [`openai`]: OpenAI-compatible chat completions (OpenAI, OpenRouter,
//!   local servers)
//!
//! ## Chain
//!
//! [`ChainConfig`] reads `ENRICHMENT_MODEL_CHAIN` (for example
//! `anthropic:claude-3-5-haiku-latest,openai:gpt-4o-mini`) and builds one
//! backend per entry. [`FallbackClient`] walks that list once per request,
//! classifying each rejected attempt as `malformed_json`, `api_error`,
//! `model_error` or `low_quality`.

pub mod anthropic;
pub mod chain;
pub mod extract;
pub mod fallback;
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use chain::{parse_chain, ChainConfig, ModelSpec, ProviderKind};
pub use extract::extract_json_object;
pub use fallback::{
    AttemptFailure, FailureKind, FallbackClient, FallbackError, FallbackSuccess, QualityVerdict,
};
pub use openai::{OpenAIBackend, OpenAIConfig};

// Re-export core types
pub use avgpay_core::{Error, GenerationBackend, Result};
