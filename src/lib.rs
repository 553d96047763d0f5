//! Chitter is a small streaming chat client for OpenAI-compatible
//! chat-completion APIs.
//!
//! The crate is organized around a few collaborating layers:
//! - [`core`] owns the channel configuration and its store, the request
//!   pipeline, the SSE delta parser and the conversation view-model.
//! - [`api`] defines the wire payloads exchanged with the server.
//! - [`cli`] is the line-oriented front end used by the binary.
//!
//! The binary (`src/main.rs`) routes straight into [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
