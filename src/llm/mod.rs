//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for the judge model and the
//! prompt templates the judges are formatted from.

mod client;
mod prompts;

pub use client::{JudgeModel, LlmClient, Message, Role};
pub use prompts::Prompts;
