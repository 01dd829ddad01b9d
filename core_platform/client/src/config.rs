use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server origin, read from `CORE_PLATFORM_API_URL`.
    #[serde(rename = "api_url", default = "default_api_url")]
    pub base_url: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Loads configuration from `CORE_PLATFORM_*` environment variables.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("CORE_PLATFORM"))
            .build()?
            .try_deserialize()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_fall_back_to_local_server() {
        let config: ClientConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn can_read_api_url_setting() {
        let config: ClientConfig = config::Config::builder()
            .set_override("api_url", "https://platform.internal")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config, ClientConfig::new("https://platform.internal"));
    }
}
