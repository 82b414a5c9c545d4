use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Language-model backend settings (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub api_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_url(),
            model: default_llm_model(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    // Data locations
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,
    #[serde(default = "default_users_file")]
    pub users_file: String,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    /// Optional external reference-tool dataset; the built-in listing is
    /// used when unset.
    #[serde(default)]
    pub reference_file: Option<String>,

    /// Cap on model rounds within one turn; the runaway-tool-calling
    /// cancellation mechanism.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_prompts_dir() -> String {
    "data/prompts".to_string()
}

fn default_users_file() -> String {
    "data/users.json".to_string()
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

fn default_max_tool_rounds() -> usize {
    5
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            prompts_dir: default_prompts_dir(),
            users_file: default_users_file(),
            logs_dir: default_logs_dir(),
            reference_file: None,
            max_tool_rounds: default_max_tool_rounds(),
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Path to the config file (next to the executable).
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("peerlearn_config.toml")
    }

    /// Load config from peerlearn_config.toml, falling back to defaults
    /// plus environment variables.
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config.with_env_overrides();
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::default().with_env_overrides()
    }

    /// Environment variables win over the file, so deployments can inject
    /// the API key and port without editing the config.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = env::var("PEERLEARN_BIND") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr;
            }
        }
        // Hosted platforms hand out the port via PORT.
        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                let host = self
                    .bind_addr
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                self.bind_addr = format!("{}:{}", host, port);
            }
        }

        if let Ok(dir) = env::var("PEERLEARN_PROMPTS_DIR") {
            if !dir.trim().is_empty() {
                self.prompts_dir = dir;
            }
        }
        if let Ok(file) = env::var("PEERLEARN_USERS_FILE") {
            if !file.trim().is_empty() {
                self.users_file = file;
            }
        }
        if let Ok(dir) = env::var("PEERLEARN_LOGS_DIR") {
            if !dir.trim().is_empty() {
                self.logs_dir = dir;
            }
        }

        if let Ok(url) = env::var("LLM_API_URL") {
            if !url.trim().is_empty() {
                self.llm.api_url = url;
            }
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
        if let Ok(key) = env::var("OPENAI_API_KEY").or_else(|_| env::var("LLM_API_KEY")) {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.max_tool_rounds, 5);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.request_timeout_secs, 60);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            logs_dir = "/var/peerlearn/logs"

            [llm]
            model = "gpt-4o"
            "#,
        )
        .unwrap();
        assert_eq!(config.logs_dir, "/var/peerlearn/logs");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.api_url, default_llm_url());
        assert_eq!(config.max_tool_rounds, 5);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let reparsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.bind_addr, config.bind_addr);
        assert_eq!(reparsed.llm.model, config.llm.model);
    }
}
