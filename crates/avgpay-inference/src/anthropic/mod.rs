//! Anthropic Messages API backend.
//!
//! Sends a single user turn with an optional system prompt to
//! `{base_url}/v1/messages` and returns the concatenated text blocks.

mod backend;
pub mod types;

pub use backend::{
    AnthropicBackend, AnthropicConfig, ANTHROPIC_VERSION, DEFAULT_ANTHROPIC_MODEL,
    DEFAULT_ANTHROPIC_URL,
};
