//! OpenAI-compatible chat completions backend.
//!
//! Works with any endpoint implementing `/chat/completions`:
//!
//! - OpenAI cloud API
//! - OpenRouter (with optional `HTTP-Referer` / `X-Title` attribution headers)
//! - vLLM, LM Studio, Ollama in OpenAI compatibility mode
//!
//! # Example
//!
//! ```rust,no_run
//! use avgpay_core::GenerationBackend;
//! use avgpay_inference::openai::{OpenAIBackend, OpenAIConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OpenAIConfig::default().with_model("gpt-4o-mini");
//!     let backend = OpenAIBackend::new(config).unwrap();
//!     let text = backend.generate("Say hello").await.unwrap();
//!     println!("{}", text);
//! }
//! ```

mod backend;
pub mod types;

pub use backend::{
    OpenAIBackend, OpenAIConfig, DEFAULT_OPENAI_URL, DEFAULT_OPENROUTER_URL, DEFAULT_TIMEOUT_SECS,
};
