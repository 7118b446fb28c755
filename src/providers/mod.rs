//! Concrete `Provider` implementations.
//!
//! Only one ships in this crate: an adapter for OpenAI-compatible chat
//! completion servers (LM Studio, Ollama, llama.cpp, vLLM). Hosts wanting a
//! different wire protocol implement `crate::provider::Provider` directly.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
