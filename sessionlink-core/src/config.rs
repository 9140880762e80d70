use config::{Config, File};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionLinkConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Process-local store. Wins over `service_url` when both are set.
    pub use_memory: bool,
    /// Base URL of the remote session service.
    pub service_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_memory: false,
            service_url: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub app_name: String,
    pub name: String,
    pub instruction: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: "diagram_agent".to_string(),
            name: "diagram_agent".to_string(),
            instruction: "You help the user design diagrams. Answer concisely and describe \
                          the diagram you would draw."
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible local endpoint. Unset means the hosted Gemini endpoint.
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model_name: None,
            api_key: None,
            temperature: 0.2,
            timeout_seconds: 120,
        }
    }
}

impl SessionLinkConfig {
    /// Load `path` (optional) with process environment overrides on top.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(path: &str, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .set_override_option("server.port", var("PORT").and_then(|p| p.parse::<i64>().ok()))?
            .set_override_option("session.use_memory", var("SESSION_USE_MEMORY").map(|v| is_truthy(&v)))?
            .set_override_option("session.service_url", var("SESSION_SERVICE_URL"))?
            .set_override_option(
                "session.timeout_seconds",
                var("SESSION_TIMEOUT_SECONDS").and_then(|t| t.parse::<i64>().ok()),
            )?
            .set_override_option("llm.base_url", var("LLM_BASE_URL").or_else(|| var("KSERVE_URL")))?
            .set_override_option("llm.model_name", var("LLM_MODEL_NAME"))?
            .set_override_option("llm.api_key", var("OPENAI_API_KEY").or_else(|| var("GOOGLE_API_KEY")))?
            .build()?;
        Ok(s.try_deserialize()?)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}
