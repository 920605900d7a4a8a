//! Endpoint configuration and resolution
//!
//! Every binary resolves the coordinator endpoints with the same priority
//! order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (merged into the CLI layer by clap)
//! 3. TOML config file (`<config dir>/chorus/config.toml`)
//! 4. Compiled default (fallback)

use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CLOCK_PORT: u16 = 50013;
pub const DEFAULT_COMMAND_PORT: u16 = 50014;
pub const DEFAULT_BROADCAST_PORT: u16 = 50015;

/// Resolved coordinator endpoints.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub host: String,
    pub clock_port: u16,
    pub command_port: u16,
    pub broadcast_port: u16,
}

/// Optional `[coordinator]`-level keys in the config file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    clock_port: Option<u16>,
    command_port: Option<u16>,
    broadcast_port: Option<u16>,
}

impl Endpoints {
    /// Resolve endpoints from CLI/env overrides, then the config file, then
    /// compiled defaults. A missing or unparsable config file falls through
    /// silently.
    pub fn resolve(
        host: Option<String>,
        clock_port: Option<u16>,
        command_port: Option<u16>,
        broadcast_port: Option<u16>,
    ) -> Self {
        let file = load_config_file().unwrap_or_default();
        Self {
            host: host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            clock_port: clock_port.or(file.clock_port).unwrap_or(DEFAULT_CLOCK_PORT),
            command_port: command_port
                .or(file.command_port)
                .unwrap_or(DEFAULT_COMMAND_PORT),
            broadcast_port: broadcast_port
                .or(file.broadcast_port)
                .unwrap_or(DEFAULT_BROADCAST_PORT),
        }
    }

    pub fn clock_addr(&self) -> String {
        format!("{}:{}", self.host, self.clock_port)
    }

    pub fn command_addr(&self) -> String {
        format!("{}:{}", self.host, self.command_port)
    }

    pub fn broadcast_addr(&self) -> String {
        format!("{}:{}", self.host, self.broadcast_port)
    }

    /// Bind addresses listen on all interfaces; only the port is shared
    /// with the connect side.
    pub fn clock_bind(&self) -> String {
        format!("0.0.0.0:{}", self.clock_port)
    }

    pub fn command_bind(&self) -> String {
        format!("0.0.0.0:{}", self.command_port)
    }

    pub fn broadcast_bind(&self) -> String {
        format!("0.0.0.0:{}", self.broadcast_port)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::resolve(None, None, None, None)
    }
}

fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chorus").join("config.toml"))
}

fn load_config_file() -> Option<FileConfig> {
    let path = config_file_path()?;
    let content = std::fs::read_to_string(&path).ok()?;
    match toml::from_str(&content) {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::debug!("ignoring unparsable {}: {}", path.display(), e);
            None
        }
    }
}
