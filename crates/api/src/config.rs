use std::env;
use std::str::FromStr;
use std::time::Duration;

use occacia_agents::{FlowConfig, DEFAULT_HISTORY_LIMIT, MIN_FLOW_TIMEOUT};

pub const DEFAULT_API_KEY: &str = "dev-occacia-key";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub api_key: String,
    pub allowed_origins: Vec<String>,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub history_limit: usize,
    pub seed_demo: bool,
    pub flow: FlowConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            database_url: None,
            api_key: DEFAULT_API_KEY.to_string(),
            allowed_origins: vec!["http://localhost:5173".to_string()],
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 60,
            history_limit: DEFAULT_HISTORY_LIMIT,
            seed_demo: true,
            flow: FlowConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind: env::var("OCCACIA_BIND").unwrap_or(defaults.bind),
            database_url: non_empty_var("OCCACIA_DATABASE_URL"),
            api_key: non_empty_var("OCCACIA_API_KEY").unwrap_or(defaults.api_key),
            allowed_origins: non_empty_var("OCCACIA_ALLOWED_ORIGINS")
                .map(|value| parse_origins(&value))
                .unwrap_or(defaults.allowed_origins),
            rate_limit_window: Duration::from_secs(parsed_var(
                "OCCACIA_RATE_LIMIT_WINDOW_SECONDS",
                defaults.rate_limit_window.as_secs(),
            )),
            rate_limit_max: parsed_var("OCCACIA_RATE_LIMIT_MAX", defaults.rate_limit_max),
            history_limit: parsed_var("OCCACIA_HISTORY_LIMIT", defaults.history_limit),
            seed_demo: parsed_var("OCCACIA_SEED_DEMO", defaults.seed_demo),
            flow: FlowConfig {
                url: env::var("LANGFLOW_URL").unwrap_or_default(),
                token: env::var("LANGFLOW_TOKEN").unwrap_or_default(),
                org_id: env::var("LANGFLOW_ORG_ID").unwrap_or_default(),
                timeout: FlowConfig::clamp_timeout(Duration::from_secs(parsed_var(
                    "LANGFLOW_TIMEOUT_SECONDS",
                    MIN_FLOW_TIMEOUT.as_secs(),
                ))),
            },
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
