//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the completion client and the log store.

use crate::config::Config;
use crate::log_store::LogStore;
use std::sync::Arc;
use tutor_core::{llm_client::LLMClient, prompt::PromptPolicy};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub llm_client: Arc<dyn LLMClient>,
    pub prompt_policy: Arc<PromptPolicy>,
    pub log_store: Arc<LogStore>,
    pub config: Arc<Config>,
}
