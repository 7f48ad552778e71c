use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::http::headers::HeaderSet;
use crate::transport::http2::H2Settings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fail to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("fail to deserialize config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// One extra field injected into every response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderEntry {
    pub field: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,

    /// Content root of the static site.
    pub directory: PathBuf,
    /// Document served with every 404.
    pub error_page: PathBuf,
    /// Worker count. Only a single worker is run.
    pub process: usize,

    pub headers: Vec<HeaderEntry>,
    pub send_date: bool,

    #[serde(deserialize_with = "deserialize_duration")]
    pub attach_timeout: Duration,

    pub h2: H2Settings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 80,

            directory: PathBuf::from("./public"),
            error_page: PathBuf::from("./404.html"),
            process: 1,

            headers: Vec::new(),
            send_date: true,

            attach_timeout: Duration::from_secs(30),

            h2: H2Settings::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;

        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<ServerConfig>(content)
    }

    /// The configured extra headers as a header set, names lower-cased.
    pub fn response_headers(&self) -> HeaderSet {
        self.headers
            .iter()
            .map(|entry| (entry.field.to_ascii_lowercase(), entry.content.clone()))
            .collect()
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
