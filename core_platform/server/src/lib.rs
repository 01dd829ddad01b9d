pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        pub admin_username: String,
        pub admin_password: String,
        pub jwt_secret: String,
        #[serde(default = "default_token_expires_minutes")]
        pub token_expires_minutes: i64,
        #[serde(default = "default_environment")]
        pub environment: String,
        #[serde(default = "default_recurrence_horizon_days")]
        pub recurrence_horizon_days: i64,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default())
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8000
    }

    fn default_token_expires_minutes() -> i64 {
        30
    }

    fn default_environment() -> String {
        "local".to_string()
    }

    fn default_recurrence_horizon_days() -> i64 {
        365
    }

}
pub mod access;
pub mod auth;
pub mod bootstrap;
pub mod entities;
pub mod events;
pub mod registry;
pub mod sidebar;
pub mod tasks;
pub mod web;
