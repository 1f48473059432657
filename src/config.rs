//! Runtime configuration read from the environment.

use std::env;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::ai::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::error::{Error, Result};
use crate::utils::{get_database_path, mask_secret};

pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Explicit database file; `None` means the platform data directory.
    pub database_path: Option<PathBuf>,
    pub ai_enabled: bool,
    /// Queue enrichment after every create/update.
    pub async_ai: bool,
    pub ai_api_key: String,
    pub ai_endpoint: String,
    pub ai_model: String,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            ai_enabled: false,
            async_ai: true,
            ai_api_key: String::new(),
            ai_endpoint: DEFAULT_ENDPOINT.to_string(),
            ai_model: DEFAULT_MODEL.to_string(),
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | `<data dir>/marks/bookmarks.db` |
    /// | `AI_ENABLED` | `false` |
    /// | `ENABLE_ASYNC_AI` | `true` |
    /// | `AI_API_KEY` | empty |
    /// | `AI_ENDPOINT` | OpenAI chat completions |
    /// | `AI_MODEL` | `gpt-3.5-turbo` |
    /// | `AI_WORKER_COUNT` | `5` |
    /// | `AI_QUEUE_CAPACITY` | `1000` |
    pub fn from_env() -> Self {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();

        let database_path = env_string("DATABASE_URL").map(|url| parse_database_url(&url));

        let worker_count = env::var("AI_WORKER_COUNT")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_WORKER_COUNT)
            .max(1);

        let queue_capacity = env::var("AI_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
            .max(1);

        Self {
            database_path,
            ai_enabled: parse_bool_env("AI_ENABLED", false),
            async_ai: parse_bool_env("ENABLE_ASYNC_AI", true),
            ai_api_key: env_string("AI_API_KEY").unwrap_or_default(),
            ai_endpoint: env_string("AI_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            ai_model: env_string("AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            worker_count,
            queue_capacity,
        }
    }

    /// Checks settings that cannot work together.
    ///
    /// An endpoint on the local machine is allowed but logged, since it is a
    /// common cause of requests looping back into this process.
    pub fn validate(&self) -> Result<()> {
        if self.ai_enabled && self.ai_api_key.is_empty() {
            return Err(Error::validation("AI_ENABLED is set but AI_API_KEY is empty"));
        }

        if self.ai_enabled && is_local_endpoint(&self.ai_endpoint) {
            warn!(endpoint = %self.ai_endpoint, "AI_ENDPOINT points at the local machine");
        }

        if self.ai_enabled {
            info!(
                endpoint = %self.ai_endpoint,
                model = %self.ai_model,
                api_key = %mask_secret(&self.ai_api_key),
                workers = self.worker_count,
                "AI enrichment configured"
            );
        }
        Ok(())
    }

    /// Whether writes should queue enrichment tasks.
    pub fn enrichment_enabled(&self) -> bool {
        self.ai_enabled && self.async_ai
    }

    /// Resolves the database file, falling back to the platform data directory.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => get_database_path(),
        }
    }
}

/// Strips the `sqlite:///` prefix accepted for compatibility with URL-style settings.
fn parse_database_url(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("sqlite:///").unwrap_or(url))
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => {
            matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes")
        }
        _ => default,
    }
}

fn is_local_endpoint(endpoint: &str) -> bool {
    ["localhost", "127.0.0.1", "[::1]"]
        .iter()
        .any(|host| endpoint.contains(host))
}
