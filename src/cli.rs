//! Shared CLI helpers and small reusable Clap fragments

use anyhow::Result;
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::config::ServerConfig;

/// Daemon options used by netfsd
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "NetFS daemon - serve a directory to netfs clients")]
pub struct ServerOpts {
    /// Root directory to serve
    #[arg(short = 'r', long)]
    pub root: Option<PathBuf>,

    /// Port to listen on
    #[arg(short = 'p', long, required_unless_present = "config")]
    pub port: Option<u16>,

    /// Interface address to bind
    #[arg(long)]
    pub bind: Option<String>,

    /// Maximum concurrent connections (slot pool capacity)
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Bytes per download data packet
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// TOML configuration file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append connection events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl ServerOpts {
    /// Merge the optional config file with explicit flags.
    pub fn resolve(&self) -> Result<ServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(root) = &self.root {
            cfg.root = root.clone();
        }
        if let Some(port) = self.port {
            cfg.port = Some(port);
        }
        if let Some(bind) = &self.bind {
            cfg.bind = bind.clone();
        }
        if let Some(n) = self.max_connections {
            cfg.max_connections = n;
        }
        if let Some(n) = self.chunk_size {
            cfg.chunk_size = n;
        }
        if let Some(p) = &self.log_file {
            cfg.log_file = Some(p.clone());
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Interactive client options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "NetFS client - browse and fetch files from a netfsd server")]
pub struct ClientOpts {
    /// Server IPv4 address
    pub address: Ipv4Addr,

    /// Server port
    pub port: u16,

    /// Where downloaded files are written
    #[arg(short = 'd', long, default_value = ".")]
    pub download_dir: PathBuf,

    /// Hide the download progress bar
    #[arg(long)]
    pub no_progress: bool,
}
