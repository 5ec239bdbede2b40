//! Ordered model chain configuration.
//!
//! A chain is a comma-separated list of provider-qualified slugs:
//!
//! ```text
//! "anthropic:claude-3-5-haiku-latest,openai:gpt-4o-mini"
//! "openrouter:meta-llama/llama-3.1-70b-instruct"
//! ```
//!
//! The slug is split on the first `:`; everything after it is the model id,
//! so model names may themselves contain colons or slashes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use avgpay_core::defaults::MODEL_CHAIN;
use avgpay_core::{Error, GenerationBackend, Result};

use crate::anthropic::{AnthropicBackend, AnthropicConfig};
use crate::openai::{OpenAIBackend, OpenAIConfig};

// ---------------------------------------------------------------------------
// Provider kinds
// ---------------------------------------------------------------------------

/// Provider families the chain can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    /// OpenAI-compatible API served by OpenRouter.
    OpenRouter,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(Error::Config(format!("Unknown provider: {}", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Chain parsing
// ---------------------------------------------------------------------------

/// One entry of the model chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model: String,
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

impl FromStr for ModelSpec {
    type Err = Error;

    fn from_str(slug: &str) -> Result<Self> {
        let slug = slug.trim();
        let (provider, model) = slug.split_once(':').ok_or_else(|| {
            Error::Config(format!(
                "Model slug '{}' must be provider-qualified (provider:model)",
                slug
            ))
        })?;
        let model = model.trim();
        if model.is_empty() {
            return Err(Error::Config(format!("Model slug '{}' has no model", slug)));
        }
        Ok(Self {
            provider: provider.parse()?,
            model: model.to_string(),
        })
    }
}

/// Parse a comma-separated chain. Blank entries are ignored; an empty
/// chain is an error.
pub fn parse_chain(chain: &str) -> Result<Vec<ModelSpec>> {
    let specs = chain
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ModelSpec::from_str)
        .collect::<Result<Vec<_>>>()?;

    if specs.is_empty() {
        return Err(Error::Config("Model chain is empty".to_string()));
    }
    Ok(specs)
}

// ---------------------------------------------------------------------------
// Backend construction
// ---------------------------------------------------------------------------

/// Chain order plus per-provider connection settings.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub models: Vec<ModelSpec>,
    pub anthropic: AnthropicConfig,
    pub openai: OpenAIConfig,
    pub openrouter: OpenAIConfig,
}

impl ChainConfig {
    pub fn new(models: Vec<ModelSpec>) -> Self {
        Self {
            models,
            anthropic: AnthropicConfig::default(),
            openai: OpenAIConfig::default(),
            openrouter: OpenAIConfig {
                provider: ProviderKind::OpenRouter.as_str().to_string(),
                base_url: crate::openai::DEFAULT_OPENROUTER_URL.to_string(),
                json_mode: false,
                ..OpenAIConfig::default()
            },
        }
    }

    /// Load the chain from `ENRICHMENT_MODEL_CHAIN` and provider settings
    /// from their `ANTHROPIC_*`, `OPENAI_*` and `OPENROUTER_*` variables.
    pub fn from_env() -> Result<Self> {
        let chain =
            std::env::var("ENRICHMENT_MODEL_CHAIN").unwrap_or_else(|_| MODEL_CHAIN.to_string());
        Ok(Self {
            models: parse_chain(&chain)?,
            anthropic: AnthropicConfig::from_env(),
            openai: OpenAIConfig::openai_from_env(),
            openrouter: OpenAIConfig::openrouter_from_env(),
        })
    }

    fn has_key(&self, provider: ProviderKind) -> bool {
        let key = match provider {
            ProviderKind::Anthropic => &self.anthropic.api_key,
            ProviderKind::OpenAI => &self.openai.api_key,
            ProviderKind::OpenRouter => &self.openrouter.api_key,
        };
        key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Build one backend per chain entry, in order.
    ///
    /// Entries whose provider has no API key configured are skipped with a
    /// warning. Fails when nothing is left.
    pub fn build_backends(&self) -> Result<Vec<Arc<dyn GenerationBackend>>> {
        let mut backends: Vec<Arc<dyn GenerationBackend>> = Vec::with_capacity(self.models.len());

        for spec in &self.models {
            if !self.has_key(spec.provider) {
                warn!(
                    subsystem = "inference",
                    component = "chain",
                    provider = %spec.provider,
                    model = %spec.model,
                    "Skipping chain entry: no API key configured"
                );
                continue;
            }

            let backend: Arc<dyn GenerationBackend> = match spec.provider {
                ProviderKind::Anthropic => Arc::new(AnthropicBackend::new(
                    self.anthropic.clone().with_model(&spec.model),
                )?),
                ProviderKind::OpenAI => Arc::new(OpenAIBackend::new(
                    self.openai.clone().with_model(&spec.model),
                )?),
                ProviderKind::OpenRouter => Arc::new(OpenAIBackend::new(
                    self.openrouter.clone().with_model(&spec.model),
                )?),
            };
            backends.push(backend);
        }

        if backends.is_empty() {
            return Err(Error::Config(
                "No model in the chain has an API key configured".to_string(),
            ));
        }

        info!(
            subsystem = "inference",
            component = "chain",
            chain = %self
                .models
                .iter()
                .map(ModelSpec::to_string)
                .collect::<Vec<_>>()
                .join(","),
            result_count = backends.len(),
            "Model chain initialized"
        );
        Ok(backends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_chain() {
        let chain = parse_chain(MODEL_CHAIN).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].provider, ProviderKind::Anthropic);
        assert_eq!(chain[0].model, "claude-3-5-haiku-latest");
        assert_eq!(chain[1].provider, ProviderKind::OpenAI);
        assert_eq!(chain[1].model, "gpt-4o-mini");
    }

    #[test]
    fn parse_splits_on_first_colon_only() {
        let chain = parse_chain("openrouter:qwen/qwen3:free").unwrap();
        assert_eq!(chain[0].provider, ProviderKind::OpenRouter);
        assert_eq!(chain[0].model, "qwen/qwen3:free");
    }

    #[test]
    fn parse_tolerates_whitespace_and_blank_entries() {
        let chain = parse_chain(" openai:gpt-4o , ,Anthropic:claude-3-5-sonnet-latest ").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].provider, ProviderKind::Anthropic);
        assert_eq!(chain[1].to_string(), "anthropic:claude-3-5-sonnet-latest");
    }

    #[test]
    fn parse_rejects_unknown_provider() {
        let err = parse_chain("cohere:command-r").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("cohere"));
    }

    #[test]
    fn parse_rejects_bare_slug_and_empty_model() {
        assert!(parse_chain("gpt-4o").is_err());
        assert!(parse_chain("openai:").is_err());
        assert!(parse_chain(" , ").is_err());
    }

    #[test]
    fn build_skips_providers_without_keys() {
        let mut config = ChainConfig::new(parse_chain(MODEL_CHAIN).unwrap());
        config.openai.api_key = Some("sk-test".to_string());

        let backends = config.build_backends().unwrap();
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].provider_name(), "openai");
        assert_eq!(backends[0].model_name(), "gpt-4o-mini");
    }

    #[test]
    fn build_fails_when_no_keys() {
        let config = ChainConfig::new(parse_chain(MODEL_CHAIN).unwrap());
        assert!(matches!(config.build_backends(), Err(Error::Config(_))));
    }

    #[test]
    fn build_openrouter_uses_openai_compatible_backend() {
        let mut config = ChainConfig::new(parse_chain("openrouter:mistralai/mixtral").unwrap());
        config.openrouter.api_key = Some("or-key".to_string());

        let backends = config.build_backends().unwrap();
        assert_eq!(backends[0].provider_name(), "openrouter");
        assert_eq!(backends[0].model_name(), "mistralai/mixtral");
    }
}
