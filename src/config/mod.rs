//! Application configuration

pub mod modes;
pub mod prompts;

use std::env;

use serde::{Deserialize, Serialize};

pub use modes::{ModeId, DEFAULT_MODE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// API key for the Gemini backend. Model calls fail without it.
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub model: String,
    /// Language every response is written in.
    pub language: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into()),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into()),
            language: env::var("RESPONSE_LANGUAGE").unwrap_or_else(|_| "English".into()),
        })
    }
}
