//! Process configuration read from the environment.

use std::env;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_VAR: &str = "GOOGLE_API_KEY";
const MODEL_VAR: &str = "GEMINI_MODEL";
const API_BASE_VAR: &str = "GEMINI_API_BASE";

/// Settings for the generation service client.
///
/// A missing API key is accepted here; it surfaces as a credential failure
/// on the first inference.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

impl Config {
    /// Reads `GOOGLE_API_KEY`, `GEMINI_MODEL` and `GEMINI_API_BASE`, after
    /// loading a `.env` file from the working directory if one exists.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            api_key: non_empty(API_KEY_VAR),
            model: non_empty(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: non_empty(API_BASE_VAR)
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

// keep the key out of logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .finish()
    }
}
