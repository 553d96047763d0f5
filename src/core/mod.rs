pub mod builtin_models;
pub mod chat_client;
pub mod chat_error;
pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod message;
pub mod session;
