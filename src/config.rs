use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::apis::RedditCredentials;
use crate::cli::Cli;
use crate::fetcher::FetchConfig;
use crate::llm::Provider;
use crate::retry::RetryPolicy;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_API_TIMEOUT_SECS: u64 = 15;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_LLM_RETRY_BASE_MS: u64 = 1000;
const DEFAULT_REDDIT_USER_AGENT: &str = "aeocheck/0.1 (web presence check)";

/// Configuration file structure.
/// All fields are optional to allow partial configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Output format: text or json
    pub output: Option<String>,

    /// Save report to file
    pub save: Option<String>,

    /// Verbose output
    pub verbose: Option<bool>,

    /// Owner id charged for jobs
    pub owner: Option<String>,

    #[serde(default)]
    pub fetch: FetchSection,

    #[serde(default)]
    pub llm: LlmSection,

    #[serde(default)]
    pub credentials: CredentialsSection,

    #[serde(default)]
    pub endpoints: EndpointsSection,
}

/// `max_retries` here and in [`LlmSection`] counts retries after the first
/// attempt, so `3` allows up to four requests
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FetchSection {
    pub max_retries: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LlmSection {
    pub timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    #[serde(default)]
    pub models: ModelsSection,
}

/// Models queried per provider; each model yields its own response
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelsSection {
    pub openai: Option<Vec<String>>,
    pub anthropic: Option<Vec<String>>,
    pub gemini: Option<Vec<String>>,
    pub perplexity: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CredentialsSection {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: Option<String>,
}

/// Base URL overrides, mostly for proxies and tests
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EndpointsSection {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
    pub perplexity: Option<String>,
    pub wikipedia: Option<String>,
    pub reddit: Option<String>,
}

/// Configuration file format based on file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                "toml" => Some(ConfigFormat::Toml),
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                _ => None,
            })
    }

    /// Get file extensions for this format
    pub fn extensions(&self) -> &[&str] {
        match self {
            ConfigFormat::Json => &["json"],
            ConfigFormat::Toml => &["toml"],
            ConfigFormat::Yaml => &["yaml", "yml"],
        }
    }
}

/// Fetcher and resolver settings
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub retry: FetchConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub api_key: Option<String>,
    /// Empty means the provider's default model
    pub models: Vec<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    pub providers: Vec<ProviderSettings>,
}

/// Fully defaulted view consumed by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub llm: LlmSettings,
    pub api_timeout: Duration,
    /// `None` leaves the Reddit block unconfigured
    pub reddit: Option<RedditCredentials>,
    pub wikipedia_base_url: Option<String>,
    pub reddit_base_url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let format = ConfigFormat::from_path(path)
            .with_context(|| format!("Unsupported config file format: {}", path.display()))?;

        let config = match format {
            ConfigFormat::Json => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            ConfigFormat::Toml => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            ConfigFormat::Yaml => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
        };

        Ok(config)
    }

    /// Get the default configuration file paths to check (in order of priority)
    /// Returns paths in order: current directory, user config directory
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        for format in &[ConfigFormat::Json, ConfigFormat::Toml, ConfigFormat::Yaml] {
            for ext in format.extensions() {
                paths.push(PathBuf::from(format!("aeocheck.{}", ext)));
            }
        }

        // XDG_CONFIG_HOME if set, otherwise ~/.config
        let config_home = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .and_then(|p| if p.is_empty() { None } else { Some(PathBuf::from(p)) })
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")));

        if let Some(config_home) = config_home {
            let app_dir = config_home.join("aeocheck");
            for format in &[ConfigFormat::Json, ConfigFormat::Toml, ConfigFormat::Yaml] {
                for ext in format.extensions() {
                    paths.push(app_dir.join(format!("config.{}", ext)));
                }
            }
        }

        paths
    }

    /// Try to load configuration from default paths
    /// Returns the first configuration file found, or None if no config exists
    pub fn from_default_paths() -> Result<Option<Self>> {
        for path in Self::default_paths() {
            if path.exists() {
                return Ok(Some(Self::from_file(&path)?));
            }
        }
        Ok(None)
    }

    /// Overlays credentials found through `lookup`; a set variable beats the file
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let creds = &mut self.credentials;
        let slots: [(&str, &mut Option<String>); 7] = [
            (Provider::OpenAi.env_var(), &mut creds.openai_api_key),
            (Provider::Anthropic.env_var(), &mut creds.anthropic_api_key),
            (Provider::Gemini.env_var(), &mut creds.gemini_api_key),
            (Provider::Perplexity.env_var(), &mut creds.perplexity_api_key),
            ("REDDIT_CLIENT_ID", &mut creds.reddit_client_id),
            ("REDDIT_CLIENT_SECRET", &mut creds.reddit_client_secret),
            ("REDDIT_USER_AGENT", &mut creds.reddit_user_agent),
        ];
        for (var, slot) in slots {
            if let Some(value) = non_empty(lookup(var)) {
                *slot = Some(value);
            }
        }
        self
    }

    /// Same as [`Config::with_env`] against the process environment
    pub fn with_process_env(self) -> Self {
        self.with_env(|var| std::env::var(var).ok())
    }

    /// Merge this configuration with CLI arguments
    /// CLI arguments take precedence over config file values
    pub fn merge_with_cli(&self, cli: &Cli) -> Cli {
        Cli {
            url: cli.url.clone(),
            owner: if cli.owner != "local" {
                cli.owner.clone()
            } else {
                self.owner.clone().unwrap_or_else(|| cli.owner.clone())
            },
            output: if cli.output != "text" {
                cli.output.clone()
            } else {
                self.output.clone().unwrap_or_else(|| cli.output.clone())
            },
            save: cli.save.clone().or_else(|| self.save.clone()),
            redacted: cli.redacted,
            config: cli.config.clone(),
            max_retries: cli.max_retries.or(self.fetch.max_retries),
            timeout: cli.timeout.or(self.fetch.timeout_seconds),
            verbose: if cli.verbose {
                cli.verbose
            } else {
                self.verbose.unwrap_or(cli.verbose)
            },
            no_progress: cli.no_progress,
        }
    }

    fn provider_settings(&self, provider: Provider) -> ProviderSettings {
        let (api_key, models, base_url) = match provider {
            Provider::OpenAi => (
                &self.credentials.openai_api_key,
                &self.llm.models.openai,
                &self.endpoints.openai,
            ),
            Provider::Anthropic => (
                &self.credentials.anthropic_api_key,
                &self.llm.models.anthropic,
                &self.endpoints.anthropic,
            ),
            Provider::Gemini => (
                &self.credentials.gemini_api_key,
                &self.llm.models.gemini,
                &self.endpoints.gemini,
            ),
            Provider::Perplexity => (
                &self.credentials.perplexity_api_key,
                &self.llm.models.perplexity,
                &self.endpoints.perplexity,
            ),
        };
        ProviderSettings {
            provider,
            api_key: non_empty(api_key.clone()),
            models: models.clone().unwrap_or_default(),
            base_url: base_url.clone(),
        }
    }

    fn reddit_credentials(&self) -> Option<RedditCredentials> {
        let creds = &self.credentials;
        let client_id = non_empty(creds.reddit_client_id.clone())?;
        let client_secret = non_empty(creds.reddit_client_secret.clone())?;
        Some(RedditCredentials {
            client_id,
            client_secret,
            user_agent: non_empty(creds.reddit_user_agent.clone())
                .unwrap_or_else(|| DEFAULT_REDDIT_USER_AGENT.to_string()),
        })
    }

    /// Resolves every knob to a concrete value; `cli` should already be merged
    pub fn settings(&self, cli: &Cli) -> Settings {
        let connect_timeout = Duration::from_secs(
            self.fetch
                .connect_timeout_seconds
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        );
        let fetch_retries = cli.max_retries.or(self.fetch.max_retries);
        let mut fetch_retry = FetchConfig::default();
        if let Some(max_retries) = fetch_retries {
            fetch_retry.max_retries = max_retries;
        }

        let llm_retry = RetryPolicy::new(
            cli.max_retries
                .or(self.llm.max_retries)
                .unwrap_or(RetryPolicy::default().max_retries),
            Duration::from_millis(self.llm.retry_base_delay_ms.unwrap_or(DEFAULT_LLM_RETRY_BASE_MS)),
        );

        Settings {
            fetch: FetchSettings {
                timeout: Duration::from_secs(
                    cli.timeout
                        .or(self.fetch.timeout_seconds)
                        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
                ),
                connect_timeout,
                probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
                retry: fetch_retry,
            },
            llm: LlmSettings {
                timeout: Duration::from_secs(self.llm.timeout_seconds.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS)),
                connect_timeout: Duration::from_secs(
                    self.llm
                        .connect_timeout_seconds
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                ),
                retry: llm_retry,
                providers: Provider::ALL.iter().map(|p| self.provider_settings(*p)).collect(),
            },
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            reddit: self.reddit_credentials(),
            wikipedia_base_url: self.endpoints.wikipedia.clone(),
            reddit_base_url: self.endpoints.reddit.clone(),
        }
    }
}
