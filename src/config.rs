//! Looker connection settings from the environment

use crate::error::LookdeckError;
use url::Url;

/// Environment variables required before a run can start
pub const REQUIRED_ENV_VARS: [&str; 3] = [
    "LOOKERSDK_BASE_URL",
    "LOOKERSDK_CLIENT_ID",
    "LOOKERSDK_CLIENT_SECRET",
];

/// Connection settings for the Looker API
#[derive(Debug, Clone)]
pub struct LookerConfig {
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: String,
}

impl LookerConfig {
    /// Read the connection settings from the environment.
    ///
    /// The caller is expected to have loaded a `.env` file first (the CLI
    /// does this in `main`). A missing or malformed variable is a
    /// `Config` error and aborts before the pipeline runs.
    pub fn from_env() -> Result<Self, LookdeckError> {
        for var in REQUIRED_ENV_VARS {
            if std::env::var(var).map(|v| v.is_empty()).unwrap_or(true) {
                return Err(LookdeckError::Config(format!(
                    "environment variable {var} is not set"
                )));
            }
        }

        let raw_url = std::env::var("LOOKERSDK_BASE_URL").unwrap();
        let base_url = Url::parse(&raw_url).map_err(|e| {
            LookdeckError::Config(format!("LOOKERSDK_BASE_URL '{raw_url}' is not a URL: {e}"))
        })?;

        Ok(Self {
            base_url,
            client_id: std::env::var("LOOKERSDK_CLIENT_ID").unwrap(),
            client_secret: std::env::var("LOOKERSDK_CLIENT_SECRET").unwrap(),
        })
    }
}
