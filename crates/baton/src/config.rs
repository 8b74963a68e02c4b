use config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;

use crate::providers::configs::OpenAiProviderConfig;
use crate::swarm::{SwarmConfig, DEFAULT_MAX_PARALLEL_TOOLS};

const ENV_PREFIX: &str = "BATON";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration, set the {env_var} environment variable")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Environment variable backing a dotted configuration key
pub fn to_env_var(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.replace('.', "__").to_uppercase())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderSettings {
    pub fn provider_config(&self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.host.clone(),
            api_key: self.api_key.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSettings {
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub shell_enabled: bool,
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    #[serde(default = "default_max_parallel_tools")]
    pub max_parallel_tools: usize,
}

impl SandboxSettings {
    /// The sandbox root with `~` and environment variables expanded
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.root).map_or_else(
            |_| self.root.clone(),
            |expanded| expanded.into_owned(),
        ))
    }

    pub fn swarm_config(&self) -> SwarmConfig {
        SwarmConfig {
            max_parallel_tools: self.max_parallel_tools,
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            allowed_extensions: default_allowed_extensions(),
            shell_enabled: false,
            allowed_commands: Vec::new(),
            max_parallel_tools: default_max_parallel_tools(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
}

impl Settings {
    /// Load settings from `BATON_*` environment variables, after reading a
    /// `.env` file if one is present.
    pub fn new() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("provider.host", default_host())?
            .set_default("provider.model", default_model())?
            .set_default("provider.timeout_secs", default_timeout_secs())?
            .set_default("sandbox.root", default_root())?
            .set_default("sandbox.allowed_extensions", default_allowed_extensions())?
            .set_default("sandbox.shell_enabled", false)?
            .set_default("sandbox.allowed_commands", Vec::<String>::new())?
            .set_default("sandbox.max_parallel_tools", default_max_parallel_tools() as u64)?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("sandbox.allowed_extensions")
                    .with_list_parse_key("sandbox.allowed_commands")
                    .try_parsing(true),
            )
            .build()?;

        if let Err(config::ConfigError::NotFound(_)) = config.get_string("provider.api_key") {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            let message = err.to_string();
            if let Some(field) = message
                .strip_prefix("missing field `")
                .and_then(|rest| rest.split('`').next())
            {
                ConfigError::MissingEnvVar {
                    env_var: to_env_var(field),
                }
            } else if let config::ConfigError::NotFound(field) = &err {
                ConfigError::MissingEnvVar {
                    env_var: to_env_var(field),
                }
            } else {
                ConfigError::Other(err)
            }
        })
    }
}

fn default_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_root() -> String {
    ".".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    ["txt", "md", "json", "csv", "html"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_parallel_tools() -> usize {
    DEFAULT_MAX_PARALLEL_TOOLS
}
