use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest `cmlimit` the Commons API grants to non-bot clients.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub commons: CommonsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

/// Wikimedia Commons API client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommonsConfig {
    /// Endpoint for `action=query` requests.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Site root, used to build layer source URLs (`<site>/wiki/<category>`).
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Client-agent string sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Category members requested per listing page (1-500).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Minimum delay between requests in milliseconds (0 = no delay).
    #[serde(default)]
    pub rate_limit_ms: u64,
}

impl Default for CommonsConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            site_url: default_site_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
            rate_limit_ms: 0,
        }
    }
}

fn default_api_url() -> String {
    "https://commons.wikimedia.org/w/api.php".to_string()
}

fn default_site_url() -> String {
    "https://commons.wikimedia.org".to_string()
}

fn default_user_agent() -> String {
    format!(
        "WikiMaps Warper/{} (Import Maps from Category)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_timeout() -> u32 {
    30
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("wikimaps.db")
}

/// Import behaviour defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Group the imported maps into a layer named after the category.
    #[serde(default = "default_create_layer")]
    pub create_layer: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            create_layer: default_create_layer(),
        }
    }
}

fn default_create_layer() -> bool {
    true
}
