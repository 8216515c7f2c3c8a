//! Tutor API Library Crate
//!
//! The HTTP side of the tutor: the chat endpoint that turns a session's
//! context into a system prompt and relays the completion, and the
//! participant log store. The `api` binary is a thin wrapper around this
//! library.

pub mod config;
pub mod handlers;
pub mod log_store;
pub mod models;
pub mod router;
pub mod state;
