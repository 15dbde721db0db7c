use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;
use thiserror::Error;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8110";
const DEFAULT_KAFKA_GROUP: &str = "bar-tab-service";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Settings read from the environment, after loading `.env` if present.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub kafka_url: Option<String>,
    pub kafka_group: String,
    pub listen_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let listen_addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.into());
        let listen_addr = listen_addr
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "LISTEN_ADDR",
                value: listen_addr.clone(),
            })?;

        Ok(Config {
            database_url: env::var("DATABASE_URL").ok(),
            kafka_url: env::var("KAFKA_URL").ok(),
            kafka_group: env::var("KAFKA_GROUP").unwrap_or_else(|_| DEFAULT_KAFKA_GROUP.into()),
            listen_addr,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn kafka_url(&self) -> Result<&str, ConfigError> {
        self.kafka_url
            .as_deref()
            .ok_or(ConfigError::Missing("KAFKA_URL"))
    }
}
