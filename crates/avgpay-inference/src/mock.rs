//! Scripted generation backend for deterministic testing.
//!
//! Each call pops the next scripted step; when the script runs out the
//! default step (if any) repeats. Clones share the script and call log, so
//! a test can keep a handle after moving the backend into a chain.
//!
//! ```rust,ignore
//! let backend = ScriptedBackend::new("anthropic", "haiku")
//!     .fail_api("HTTP 529")
//!     .reply(r#"{"summary": "ok"}"#);
//! let handle = backend.clone();
//! let client = FallbackClient::new(vec![Arc::new(backend)]);
//! // ... run the client ...
//! assert_eq!(handle.calls(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use avgpay_core::{Error, GenerationBackend, Result};

#[derive(Debug, Clone)]
enum Step {
    Reply(String),
    ApiError(String),
    ModelError(String),
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Step>,
    default: Option<Step>,
    prompts: Vec<String>,
}

/// Backend that replays a fixed script of replies and failures.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    provider: String,
    model: String,
    state: Arc<Mutex<State>>,
}

impl ScriptedBackend {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(self, step: Step) -> Self {
        self.lock().script.push_back(step);
        self
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Step::Reply(text.into()))
    }

    /// Queue a transport/HTTP failure (`Error::Request`).
    pub fn fail_api(self, message: impl Into<String>) -> Self {
        self.push(Step::ApiError(message.into()))
    }

    /// Queue a provider-reported failure (`Error::Inference`).
    pub fn fail_model(self, message: impl Into<String>) -> Self {
        self.push(Step::ModelError(message.into()))
    }

    /// Reply used once the script is exhausted.
    pub fn with_default_reply(self, text: impl Into<String>) -> Self {
        self.lock().default = Some(Step::Reply(text.into()));
        self
    }

    /// Number of generation calls so far.
    pub fn calls(&self) -> usize {
        self.lock().prompts.len()
    }

    /// Prompts received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        let step = {
            let mut state = self.lock();
            state.prompts.push(prompt.to_string());
            state.script.pop_front().or_else(|| state.default.clone())
        };

        match step {
            Some(Step::Reply(text)) => Ok(text),
            Some(Step::ApiError(message)) => Err(Error::Request(message)),
            Some(Step::ModelError(message)) => Err(Error::Inference(message)),
            None => Err(Error::Request(format!(
                "{}:{} has no scripted response",
                self.provider, self.model
            ))),
        }
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
