use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server_address: String,
    pub database_url: String,
    pub environment: String,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "max_page_size")]
    pub max_page_size: u32,
    /// Credentials for the first super-admin, used only while none exists.
    #[serde(default)]
    pub bootstrap_admin_email: Option<String>,
    #[serde(default)]
    pub bootstrap_admin_password: Option<String>,
    #[serde(default = "bootstrap_admin_firstname")]
    pub bootstrap_admin_firstname: String,
}

fn default_page_size() -> u32 {
    10
}

fn max_page_size() -> u32 {
    100
}

fn bootstrap_admin_firstname() -> String {
    "Admin".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let env = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific configuration
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Add local configuration (for development overrides)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "ADMIN_USERS_"
            .add_source(Environment::with_prefix("ADMIN_USERS"))
            .build()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

        Ok(s.try_deserialize()?)
    }

    /// Effective page size for a request, clamped to the configured maximum.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0:3000".to_string(),
            database_url: "sqlite:data/admin_users.db".to_string(),
            environment: "development".to_string(),
            default_page_size: default_page_size(),
            max_page_size: max_page_size(),
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
            bootstrap_admin_firstname: bootstrap_admin_firstname(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_defaults_and_clamps() {
        let config = AppConfig::default();
        assert_eq!(config.page_size(None), 10);
        assert_eq!(config.page_size(Some(25)), 25);
        assert_eq!(config.page_size(Some(500)), 100);
        assert_eq!(config.page_size(Some(0)), 1);
    }
}
