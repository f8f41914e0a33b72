//! Server configuration: TOML file defaults, overridden by CLI flags.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONNECTIONS};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Directory exposed to clients
    pub root: PathBuf,
    /// Interface to listen on
    pub bind: String,
    /// Listening port; 0 asks the OS for a free one
    pub port: Option<u16>,
    /// Number of connection slots
    pub max_connections: usize,
    /// Payload size of each FileDownloadData packet
    pub chunk_size: usize,
    /// Connection event log
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            bind: "0.0.0.0".to_string(),
            port: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_file: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&data).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    /// `host:port` string for `TcpListener::bind`
    pub fn bind_addr(&self) -> Result<String> {
        match self.port {
            Some(port) => Ok(format!("{}:{}", self.bind, port)),
            None => bail!("a listening port is required (-p <port> or `port` in the config file)"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1 byte");
        }
        if !self.root.exists() {
            bail!("Root directory does not exist: {}", self.root.display());
        }
        if !self.root.is_dir() {
            bail!("Root path is not a directory: {}", self.root.display());
        }
        self.bind_addr()?;
        Ok(())
    }
}
