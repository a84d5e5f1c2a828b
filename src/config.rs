use anyhow::{bail, Result};
use clap::Args;

pub const DEFAULT_API_VERSION: &str = "2020-10";

/// Connection settings for the store's Admin API.
///
/// Each setting can be given as a flag or through its environment variable.
#[derive(Args, Clone, Debug, Default)]
pub struct StoreConfig {
    /// Private app API key
    #[arg(long, env = "STORE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Private app password
    #[arg(long, env = "STORE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Store name (`NAME.myshopify.com`), host name, or base URL
    #[arg(long, env = "STORE_NAME")]
    pub store_name: String,

    /// Admin API version
    #[arg(long, env = "STORE_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,
}

impl StoreConfig {
    /// # Errors
    ///
    /// Returns an error if any setting is empty.
    pub fn validate(&self) -> Result<()> {
        if [&self.api_key, &self.password, &self.store_name, &self.api_version]
            .iter()
            .any(|s| s.trim().is_empty())
        {
            bail!("API key, password and store name must be set");
        }
        Ok(())
    }

    /// Returns the base URL of the store.
    #[must_use]
    pub fn base_url(&self) -> String {
        let name = self.store_name.trim().trim_end_matches('/');
        if name.starts_with("http") {
            name.to_string()
        } else if name.contains('.') {
            format!("https://{name}")
        } else {
            format!("https://{name}.myshopify.com")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(store_name: &str) -> StoreConfig {
        StoreConfig {
            api_key: "key".into(),
            password: "secret".into(),
            store_name: store_name.into(),
            api_version: DEFAULT_API_VERSION.into(),
        }
    }

    #[test]
    fn base_url_fn_accepts_names_hosts_and_urls() {
        assert_eq!(config("acme").base_url(), "https://acme.myshopify.com");
        assert_eq!(config("shop.acme.com").base_url(), "https://shop.acme.com");
        assert_eq!(config("http://127.0.0.1:8080/").base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn validate_fn_rejects_missing_settings() {
        assert!(config("acme").validate().is_ok());
        let mut c = config("acme");
        c.password = String::new();
        assert!(c.validate().is_err());
        assert!(config(" ").validate().is_err());
    }
}
