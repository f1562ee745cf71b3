//! Tapline AI - example rows from a chat-completion model
//!
//! This crate provides:
//! - An OpenAI-compatible chat-completion client
//! - Prompt building from a table's columns
//! - Record synthesis with token-limit and decode checks

pub mod client;
pub mod prompt;
pub mod synthesis;

pub use client::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, CompletionModel, LlmClient,
};
pub use synthesis::{generate_records, GenerateRequest, Record};
