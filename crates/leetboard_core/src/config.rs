use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "leetboard/0.1";
pub const DEFAULT_API_BASE_URL: &str = "https://leetcodeapi-v1.vercel.app";
pub const DEFAULT_PROFILE_PREFIX: &str = "https://leetcode.com/u/";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_BIND: &str = "0.0.0.0:3001";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BoardConfig {
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SourceSection {
    pub profile_prefix: Option<String>,
    pub api_base_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ScheduleSection {
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ServerSection {
    pub bind: Option<String>,
}

/// Fully resolved settings: env > config file > defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub profile_prefix: String,
    pub api_base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub interval: Duration,
    pub bind: String,
}

impl BoardConfig {
    pub fn settings(&self) -> Settings {
        self.settings_with_lookup(|key| env::var(key).ok())
    }

    pub fn settings_with_lookup<F>(&self, lookup_env: F) -> Settings
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_setting = |key: &str, configured: &Option<String>, default: &str| {
            non_empty_env(&lookup_env, key)
                .or_else(|| configured.clone())
                .unwrap_or_else(|| default.to_string())
        };
        let number_setting = |key: &str, configured: Option<u64>, default: u64| {
            non_empty_env(&lookup_env, key)
                .and_then(|value| value.parse::<u64>().ok())
                .or(configured)
                .unwrap_or(default)
        };

        Settings {
            profile_prefix: string_setting(
                "LEETBOARD_PROFILE_PREFIX",
                &self.source.profile_prefix,
                DEFAULT_PROFILE_PREFIX,
            ),
            api_base_url: string_setting(
                "LEETBOARD_API_URL",
                &self.source.api_base_url,
                DEFAULT_API_BASE_URL,
            )
            .trim_end_matches('/')
            .to_string(),
            user_agent: string_setting(
                "LEETBOARD_USER_AGENT",
                &self.source.user_agent,
                DEFAULT_USER_AGENT,
            ),
            timeout: Duration::from_millis(number_setting(
                "LEETBOARD_HTTP_TIMEOUT_MS",
                self.source.timeout_ms,
                DEFAULT_TIMEOUT_MS,
            )),
            // A zero interval would spin the scheduler.
            interval: Duration::from_secs(
                number_setting(
                    "LEETBOARD_INTERVAL_SECS",
                    self.schedule.interval_secs,
                    DEFAULT_INTERVAL_SECS,
                )
                .max(1),
            ),
            bind: string_setting("LEETBOARD_BIND", &self.server.bind, DEFAULT_BIND),
        }
    }
}

fn non_empty_env<F>(lookup_env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Load and parse a BoardConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BoardConfig> {
    if !config_path.exists() {
        return Ok(BoardConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BoardConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> String {
    format!(
        "# leetboard configuration (materialized by `leetboard init`)\n\n[source]\nprofile_prefix = \"{DEFAULT_PROFILE_PREFIX}\"\napi_base_url = \"{DEFAULT_API_BASE_URL}\"\n# user_agent = \"{DEFAULT_USER_AGENT}\"\n# timeout_ms = {DEFAULT_TIMEOUT_MS}\n\n[schedule]\ninterval_secs = {DEFAULT_INTERVAL_SECS}\n\n[server]\nbind = \"{DEFAULT_BIND}\"\n"
    )
}
