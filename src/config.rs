// Runtime configuration, read from the environment (and a `.env` file when
// present). Every value has a default so the binary runs with no setup
// beyond the client-secrets file.

use std::path::PathBuf;

use crate::auth::AuthConfig;

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_CLIENT_SECRETS: &str = "credentials.json";
pub const TOKEN_FILE_NAME: &str = ".drive_reports_token.json";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Drive REST API.
    pub api_url: String,
    /// Installed-app client secrets downloaded from the cloud console.
    pub client_secrets: PathBuf,
    /// Where credentials are persisted between runs.
    pub token_file: PathBuf,
    /// Folder holding saved reports. `None` lists reports from the whole drive.
    pub reports_folder_id: Option<String>,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Config {
    /// Load configuration from `.env` and environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Config {
            api_url: get("DRIVE_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.into()),
            client_secrets: get("DRIVE_CLIENT_SECRETS")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_SECRETS)),
            token_file: get("DRIVE_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(default_token_file),
            reports_folder_id: get("DRIVE_REPORTS_FOLDER_ID"),
            log_level: get("DRIVE_LOG").unwrap_or_else(|| "info".into()),
        }
    }

    pub fn auth(&self) -> AuthConfig {
        AuthConfig::new(self.client_secrets.clone(), self.token_file.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn default_token_file() -> PathBuf {
    let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(TOKEN_FILE_NAME)
}
