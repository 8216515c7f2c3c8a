use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingVar(&'static str),
    #[error("{var} is invalid: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// The completion backends the tutor can talk to. Both are reached through
/// the OpenAI-compatible chat API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    /// Environment variable holding this provider's API key.
    pub fn key_var(self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn api_base(self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "gemini" => Ok(Provider::Gemini),
            other => Err(format!("unknown provider '{other}' (expected openai or gemini)")),
        }
    }
}

/// Service settings, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    /// Key for `provider`; the other provider's key is never read.
    pub api_key: String,
    pub chat_model: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub logs_path: PathBuf,
    /// Language the tutor replies in.
    pub language: String,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    var_or(name, default)
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var: name,
            reason: e.to_string(),
        })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A stray .env would leak into the env-driven tests.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let provider: Provider = parsed("TUTOR_PROVIDER", "openai")?;
        let api_key = std::env::var(provider.key_var())
            .map_err(|_| ConfigError::MissingVar(provider.key_var()))?;

        Ok(Self {
            bind_address: parsed("BIND_ADDRESS", "0.0.0.0:3000")?,
            provider,
            api_key,
            chat_model: var_or("CHAT_MODEL", "gpt-5-mini"),
            log_level: parsed("RUST_LOG", "INFO")?,
            prompts_path: var_or("PROMPTS_PATH", "./prompts").into(),
            logs_path: var_or("LOGS_PATH", "./logs").into(),
            language: var_or("TUTOR_LANGUAGE", "English"),
        })
    }
}
