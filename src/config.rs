use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use reqwest::Url;
use thiserror::Error;

pub const DEFAULT_PORT: i64 = 8080;
pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1/";
pub const DEFAULT_LLM_MODEL: &str = "llama3.2:latest";
pub const DEFAULT_LOG_FILE: &str = "./logs/log.jsonl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port number: {0}, port number must be in between 1 and 65535")]
    InvalidPort(i64),

    #[error("Invalid base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid LLM timeout: {0}s, must be at least 1 second")]
    InvalidTimeout(u64),
}

/// minivault: 把 prompt 转发给 OpenAI 兼容的 LLM 服务
#[derive(Parser, Debug, Clone)]
#[command(name = "minivault", version, about = "Local LLM prompt gateway")]
pub struct CliArgs {
    /// Port to run the server on
    #[arg(long, default_value_t = DEFAULT_PORT, allow_negative_numbers = true)]
    pub port: i64,

    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Base url of an OpenAI-compatible LLM server like Ollama
    #[arg(long, default_value = DEFAULT_LLM_BASE_URL)]
    pub llm_base_url: String,

    /// The LLM model to use
    #[arg(long, default_value = DEFAULT_LLM_MODEL)]
    pub llm_model: String,

    /// API key sent as a bearer token, if the backend needs one
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Seconds to wait for the LLM before giving up
    #[arg(long, default_value_t = 60)]
    pub llm_timeout_secs: u64,

    /// Log file for requests and responses
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Send a single test prompt, print the answer and exit
    #[arg(long, default_value = "")]
    pub test_prompt: String,

    /// Answer with a canned response instead of calling the LLM
    #[arg(
        long,
        default_value_t = false,
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub stubbed: bool,
}

/// 启动时构造一次，之后只读
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub host: String,
    pub llm_base_url: Url,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout: Duration,
    pub log_file: PathBuf,
    pub test_prompt: Option<String>,
    pub stubbed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve,
    OneShot { prompt: String },
}

impl Settings {
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let port = validate_port(args.port)?;
        let llm_base_url = validate_base_url(&args.llm_base_url)?;
        if args.llm_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(args.llm_timeout_secs));
        }

        Ok(Self {
            port,
            host: args.host,
            llm_base_url,
            llm_model: args.llm_model,
            llm_api_key: args.llm_api_key.filter(|k| !k.is_empty()),
            llm_timeout: Duration::from_secs(args.llm_timeout_secs),
            log_file: args.log_file,
            test_prompt: Some(args.test_prompt).filter(|p| !p.is_empty()),
            stubbed: args.stubbed,
        })
    }

    pub fn mode(&self) -> Mode {
        match &self.test_prompt {
            Some(prompt) => Mode::OneShot {
                prompt: prompt.clone(),
            },
            None => Mode::Serve,
        }
    }
}

pub fn validate_port(port: i64) -> Result<u16, ConfigError> {
    if (1..=65535).contains(&port) {
        Ok(port as u16)
    } else {
        Err(ConfigError::InvalidPort(port))
    }
}

pub fn validate_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}
