//! Priority-ordered model fallback with a quality gate.
//!
//! Each backend in the chain is tried at most once. A call that errors, does
//! not yield a JSON object, or yields one the gate rejects is recorded as an
//! [`AttemptFailure`] and the next backend is tried. The first result that
//! passes the gate wins.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use avgpay_core::{Error, GenerationBackend};

use crate::chain::ChainConfig;
use crate::extract::extract_json_object;

// ---------------------------------------------------------------------------
// Attempt bookkeeping
// ---------------------------------------------------------------------------

/// Why a single chain entry was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedJson,
    ApiError,
    ModelError,
    LowQuality,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedJson => "malformed_json",
            Self::ApiError => "api_error",
            Self::ModelError => "model_error",
            Self::LowQuality => "low_quality",
        }
    }

    /// Classify a backend error.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Inference(_) => Self::ModelError,
            Error::Serialization(_) => Self::MalformedJson,
            _ => Self::ApiError,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rejected chain entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub provider: String,
    pub model: String,
    pub reason: FailureKind,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{}]: {}",
            self.provider, self.model, self.reason, self.message
        )
    }
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(AttemptFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Quality gate
// ---------------------------------------------------------------------------

/// Result of a quality gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityVerdict {
    pub valid: bool,
    pub reason: Option<String>,
}

impl QualityVerdict {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Accepted output plus the failures that preceded it.
#[derive(Debug, Clone)]
pub struct FallbackSuccess {
    /// Parsed JSON object that passed the gate.
    pub content: JsonValue,
    /// Raw model text.
    pub raw: String,
    pub provider: String,
    pub model: String,
    pub attempts: Vec<AttemptFailure>,
    pub duration_ms: u64,
}

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("No models configured in the fallback chain")]
    EmptyChain,

    #[error("All {} models failed: {}", .attempts.len(), summarize(.attempts))]
    Exhausted { attempts: Vec<AttemptFailure> },
}

impl From<FallbackError> for Error {
    fn from(e: FallbackError) -> Self {
        Error::Inference(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Tries an ordered list of backends until one yields gate-approved JSON.
#[derive(Clone)]
pub struct FallbackClient {
    chain: Vec<Arc<dyn GenerationBackend>>,
}

impl FallbackClient {
    pub fn new(chain: Vec<Arc<dyn GenerationBackend>>) -> Self {
        Self { chain }
    }

    /// Build backends from a chain configuration.
    pub fn from_config(config: &ChainConfig) -> avgpay_core::Result<Self> {
        Ok(Self::new(config.build_backends()?))
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// `provider:model` labels in chain order.
    pub fn labels(&self) -> Vec<String> {
        self.chain
            .iter()
            .map(|b| format!("{}:{}", b.provider_name(), b.model_name()))
            .collect()
    }

    /// Run the chain. `gate` sees each parsed JSON object and decides whether
    /// it is acceptable.
    pub async fn generate_with_fallback<F>(
        &self,
        system: &str,
        prompt: &str,
        gate: F,
    ) -> Result<FallbackSuccess, FallbackError>
    where
        F: Fn(&JsonValue) -> QualityVerdict + Send + Sync,
    {
        if self.chain.is_empty() {
            return Err(FallbackError::EmptyChain);
        }

        let start = Instant::now();
        let mut attempts = Vec::new();

        for backend in &self.chain {
            let provider = backend.provider_name().to_string();
            let model = backend.model_name().to_string();
            let attempt_start = Instant::now();

            let failure = match backend.generate_with_system(system, prompt).await {
                Err(e) => AttemptFailure {
                    provider,
                    model,
                    reason: FailureKind::classify(&e),
                    message: e.to_string(),
                },
                Ok(raw) => match extract_json_object(&raw) {
                    Err(message) => AttemptFailure {
                        provider,
                        model,
                        reason: FailureKind::MalformedJson,
                        message,
                    },
                    Ok(content) => {
                        let verdict = gate(&content);
                        if verdict.valid {
                            let duration_ms = start.elapsed().as_millis() as u64;
                            info!(
                                subsystem = "inference",
                                component = "fallback",
                                op = "generate_with_fallback",
                                provider = %provider,
                                model = %model,
                                attempt = attempts.len() + 1,
                                response_len = raw.len(),
                                duration_ms,
                                "Model output accepted"
                            );
                            return Ok(FallbackSuccess {
                                content,
                                raw,
                                provider,
                                model,
                                attempts,
                                duration_ms,
                            });
                        }
                        AttemptFailure {
                            provider,
                            model,
                            reason: FailureKind::LowQuality,
                            message: verdict
                                .reason
                                .unwrap_or_else(|| "rejected by quality gate".to_string()),
                        }
                    }
                },
            };

            warn!(
                subsystem = "inference",
                component = "fallback",
                provider = %failure.provider,
                model = %failure.model,
                failure_kind = %failure.reason,
                duration_ms = attempt_start.elapsed().as_millis() as u64,
                error = %failure.message,
                "Model attempt failed, trying next"
            );
            attempts.push(failure);
        }

        debug!(
            subsystem = "inference",
            component = "fallback",
            result_count = attempts.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Fallback chain exhausted"
        );
        Err(FallbackError::Exhausted { attempts })
    }
}
