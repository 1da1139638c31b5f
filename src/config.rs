use std::{env, net::SocketAddr};

use crate::{DigitizerError, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 12 * 1024 * 1024;

/// Everything the service needs at startup. Built once in `main` and handed
/// to the pieces that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Reads `.env` (if there is one) and then the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = non_empty("API_KEY")
            .or_else(|| non_empty("GEMINI_API_KEY"))
            .ok_or_else(|| {
                DigitizerError::Configuration(
                    "API_KEY (or GEMINI_API_KEY) environment variable not set".into(),
                )
            })?;

        let api_base = non_empty("GEMINI_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let bind_raw =
            non_empty("DIGITIZER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|err| {
            DigitizerError::Configuration(format!(
                "DIGITIZER_BIND_ADDR '{bind_raw}' is not a socket address: {err}"
            ))
        })?;

        let log_level =
            non_empty("DIGITIZER_LOG").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let max_upload_bytes = match non_empty("DIGITIZER_MAX_UPLOAD_BYTES") {
            Some(raw) => raw.parse::<usize>().map_err(|err| {
                DigitizerError::Configuration(format!(
                    "DIGITIZER_MAX_UPLOAD_BYTES '{raw}' is not a byte count: {err}"
                ))
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            api_key,
            api_base,
            model,
            bind_addr,
            log_level,
            max_upload_bytes,
        })
    }
}
