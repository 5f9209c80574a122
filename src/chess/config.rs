use super::commentary;
use super::error::ConfigError;
use super::lichess;
use std::env;

pub const LICHESS_TOKEN_VAR: &str = "LICHESS_API_TOKEN";
pub const LICHESS_URL_VAR: &str = "LICHESS_API_URL";
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
pub const OPENAI_URL_VAR: &str = "OPENAI_API_URL";
pub const MODEL_VAR: &str = "CHECKMATE_MODEL";

/// Settings read from the process environment.
///
/// Secrets are optional here; the accessors that need them fail with
/// [`ConfigError::MissingVar`] so a command only requires what it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    lichess_token: Option<String>,
    pub lichess_url: String,
    openai_key: Option<String>,
    pub openai_url: String,
    pub model: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let lichess_url = var(LICHESS_URL_VAR).unwrap_or_else(|| lichess::DEFAULT_BASE_URL.to_string());
        let openai_url = var(OPENAI_URL_VAR).unwrap_or_else(|| commentary::DEFAULT_BASE_URL.to_string());
        for (name, url) in [(LICHESS_URL_VAR, &lichess_url), (OPENAI_URL_VAR, &openai_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidVar {
                    name,
                    value: url.clone(),
                });
            }
        }

        Ok(Self {
            lichess_token: var(LICHESS_TOKEN_VAR),
            lichess_url,
            openai_key: var(OPENAI_KEY_VAR),
            openai_url,
            model: var(MODEL_VAR).unwrap_or_else(|| commentary::DEFAULT_MODEL.to_string()),
        })
    }

    pub fn lichess_token(&self) -> Result<&str, ConfigError> {
        self.lichess_token
            .as_deref()
            .ok_or(ConfigError::MissingVar(LICHESS_TOKEN_VAR))
    }

    pub fn openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_key
            .as_deref()
            .ok_or(ConfigError::MissingVar(OPENAI_KEY_VAR))
    }
}
