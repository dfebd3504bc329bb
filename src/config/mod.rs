//! Configuration module for the enrollment data layer.
//!
//! Backend connection settings are loaded from environment variables. The URL and
//! public API key are required; everything else has a default.

use std::env;

use reqwest::Url;

use crate::errors::AppError;

pub const URL_VAR: &str = "SUPABASE_URL";
pub const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";
pub const BUCKET_VAR: &str = "ENROLLMENT_PROFILE_BUCKET";
pub const LOG_LEVEL_VAR: &str = "ENROLLMENT_LOG_LEVEL";

/// Storage bucket holding student profile images.
pub const DEFAULT_PROFILE_BUCKET: &str = "student-profiles";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend
    pub backend_url: Url,
    /// Public (anonymous) API key sent with every request
    pub anon_key: String,
    /// Bucket used for profile images
    pub profile_bucket: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = required(&lookup, URL_VAR)?;
        let anon_key = required(&lookup, ANON_KEY_VAR)?;

        let backend_url = parse_backend_url(&raw_url)?;

        let profile_bucket = lookup(BUCKET_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE_BUCKET.to_string());

        let log_level = lookup(LOG_LEVEL_VAR).unwrap_or_else(|| "info".to_string());

        Ok(Self {
            backend_url,
            anon_key,
            profile_bucket,
            log_level,
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::Configuration(format!("Missing required environment variable {}", name))
        })
}

/// Parse the backend URL, rejecting anything that is not absolute http(s).
pub fn parse_backend_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        AppError::Configuration(format!("Invalid {} '{}': {}", URL_VAR, raw, e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::Configuration(format!(
            "Invalid {} scheme '{}': expected http or https",
            URL_VAR, other
        ))),
    }
}
