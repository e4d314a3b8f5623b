use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::completion::SYSTEM_INSTRUCTION;
use crate::quota::MAX_REQUESTS;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub log_level: Option<String>,
    pub max_requests: u32,
    pub completion: CompletionConfig,
    pub session: SessionConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub system_instruction: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Cookie,
    Memory,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub secret_key: Option<String>,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
            log_level: None,
            max_requests: MAX_REQUESTS,
            completion: CompletionConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.2,
            max_tokens: 2000,
            timeout_secs: 45,
            system_instruction: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Cookie,
            secret_key: None,
            cookie_name: "devops_copilot_session".to_string(),
            cookie_secure: false,
            idle_timeout_secs: 30 * 60,
        }
    }
}

impl Config {
    /// Loads the YAML config at `path`. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content)
                .with_context(|| format!("Could not parse config file {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Could not read config file {}", path.display())),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

impl SessionConfig {
    /// Cookie lifetime in seconds, clamped to what the cookie layer can hold.
    pub fn session_ttl_secs(&self) -> i64 {
        i64::try_from(self.idle_timeout_secs).unwrap_or(i64::MAX)
    }
}

impl CompletionConfig {
    /// An explicit `api_key` wins over the environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn system_instruction(&self) -> &str {
        self.system_instruction.as_deref().unwrap_or(SYSTEM_INSTRUCTION)
    }
}
