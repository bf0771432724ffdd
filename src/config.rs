use std::env;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};

pub const DEFAULT_COMPLETION_API_HOSTNAME: &str = "https://api.groq.com/openai";
pub const DEFAULT_COMPLETION_MODEL: &str = "llama3-70b-8192";
pub const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub completion_api_hostname: String,
    pub completion_api_key: String,
    pub completion_model: String,
    pub completion_timeout: Option<Duration>,
    // Receives lead notifications and sends replies
    pub operator_email: String,
    pub gmail_api_client_id: String,
    pub gmail_api_client_secret: String,
    pub gmail_refresh_token: String,
    pub data_dir: String,
}

fn required(name: &str) -> Result<String, Error> {
    env::var(name).map_err(|_| anyhow!("Missing env var {}", name))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    /// Read the config from the environment
    pub fn from_env() -> Result<Self, Error> {
        let completion_timeout = match env::var("COMPLETION_TIMEOUT_SECS") {
            Ok(secs) => Some(Duration::from_secs(secs.parse().map_err(|e| {
                anyhow!("Invalid COMPLETION_TIMEOUT_SECS {:?}: {}", secs, e)
            })?)),
            Err(_) => None,
        };

        Ok(Self {
            completion_api_hostname: optional(
                "COMPLETION_API_HOSTNAME",
                DEFAULT_COMPLETION_API_HOSTNAME,
            ),
            completion_api_key: required("GROQ_API_KEY")?,
            completion_model: optional("COMPLETION_MODEL", DEFAULT_COMPLETION_MODEL),
            completion_timeout,
            operator_email: required("EMAIL_USER")?,
            gmail_api_client_id: required("GMAIL_API_CLIENT_ID")?,
            gmail_api_client_secret: required("GMAIL_API_CLIENT_SECRET")?,
            gmail_refresh_token: required("GMAIL_REFRESH_TOKEN")?,
            data_dir: optional("DATA_DIR", DEFAULT_DATA_DIR),
        })
    }
}
