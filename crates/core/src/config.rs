use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Key/value lookup used to build a [`Config`]. The process environment in
/// production, a map in tests.
trait Source {
    fn get(&self, key: &str) -> Option<String>;
}

struct ProcessEnv;

impl Source for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl<F> Source for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

fn env_opt(src: &dyn Source, key: &str) -> Option<String> {
    src.get(key).filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(src: &dyn Source, profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(src, &prefixed) {
            return Some(v);
        }
    }
    env_opt(src, key)
}

fn profiled_env_or(src: &dyn Source, profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(src, profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(src: &dyn Source, profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(src, profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub tools: ToolServerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TOOLCHAT_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_opt(&ProcessEnv, "TOOLCHAT_PROFILE").unwrap_or_default();
        Self::from_env_profile(&profile)
    }

    /// Build config from environment variables for an explicit profile.
    pub fn from_env_profile(profile: &str) -> Self {
        Self::build(&ProcessEnv, profile)
    }

    /// Build config from an arbitrary lookup function instead of the process
    /// environment.
    pub fn from_lookup<F>(profile: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(&lookup, profile)
    }

    fn build(src: &dyn Source, profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            llm: LlmConfig::from_env_profiled(src, p),
            tools: ToolServerConfig::from_env_profiled(src, p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Check the settings required to construct the conversation engine.
    ///
    /// The API credential is deliberately not required here: a session can be
    /// configured first and given a credential later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.base_url.is_none() {
            return Err(ConfigError::Missing("BASE_URL"));
        }
        if self.llm.model.is_none() {
            return Err(ConfigError::Missing("MODEL"));
        }
        if self.tools.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "TOOL_REQUEST_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        if self.tools.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "TOOL_HANDSHAKE_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  llm:    base_url={}, model={}, api_key={}",
            self.llm.base_url.as_deref().unwrap_or("(none)"),
            self.llm.model.as_deref().unwrap_or("(none)"),
            if self.llm.is_configured() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  tools:  script={}, timeout={}s",
            self.tools.script_path.display(),
            self.tools.request_timeout_secs
        );
    }
}

// ── LLM endpoint ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    fn from_env_profiled(src: &dyn Source, p: &str) -> Self {
        Self {
            api_key: profiled_env_opt(src, p, "DEEPSEEK_API_KEY"),
            base_url: profiled_env_opt(src, p, "BASE_URL"),
            model: profiled_env_opt(src, p, "MODEL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// ── Tool server ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Script launched as the tool server (`.py` or `.js`).
    pub script_path: PathBuf,
    /// Interpreter for `.py` scripts.
    pub python: String,
    /// Interpreter for `.js` scripts.
    pub node: String,
    pub request_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
}

impl ToolServerConfig {
    fn from_env_profiled(src: &dyn Source, p: &str) -> Self {
        Self {
            script_path: PathBuf::from(profiled_env_or(
                src,
                p,
                "TOOL_SERVER_SCRIPT",
                "servers/tushareserver.py",
            )),
            python: profiled_env_or(src, p, "TOOLCHAT_PYTHON", "python3"),
            node: profiled_env_or(src, p, "TOOLCHAT_NODE", "node"),
            request_timeout_secs: profiled_env_u64(src, p, "TOOL_REQUEST_TIMEOUT_SECS", 30),
            handshake_timeout_secs: profiled_env_u64(src, p, "TOOL_HANDSHAKE_TIMEOUT_SECS", 30),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
