pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        /// Secret shared with the login service that signs identity tokens.
        pub jwt_secret: String,
        /// Directory cover images are written to and served from.
        #[serde(default = "default_storage_dir")]
        pub storage_dir: String,
        #[serde(default = "default_page_size")]
        pub page_size: u64,
        /// Where anonymous visitors of the pages are sent.
        #[serde(default = "default_login_url")]
        pub login_url: String,
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
        8080
    }

    fn default_storage_dir() -> String {
        "storage".to_string()
    }

    fn default_page_size() -> u64 {
        crate::todo::DEFAULT_PAGE_SIZE
    }

    fn default_login_url() -> String {
        "/auth/login".to_string()
    }
}
pub mod auth;
pub mod blob;
pub mod entities;
pub mod stats;
pub mod todo;
pub mod web;
