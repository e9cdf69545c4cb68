//! Server configuration.
//!
//! Loaded from the TOML file named by `HARBOR_CONFIG`; every field has a
//! default so an empty file (or no file at all) yields a working echo
//! server.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 7070
//! log_filter = "info"
//!
//! [app]
//! type = "line_filter"
//! pattern = '\d+'
//! ```

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Default tracing filter; the `RUST_LOG` environment variable wins.
    pub log_filter: String,
    pub app: AppConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 7070,
            log_filter: "info".to_string(),
            app: AppConfig::Echo,
        }
    }
}

/// Which application the server runs on accepted connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppConfig {
    /// Echo every byte back to the sender.
    Echo,
    /// Forward only the newline-delimited lines matching `pattern`.
    LineFilter { pattern: String },
}

impl ServerConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    /// Collect every problem instead of stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.host.parse::<IpAddr>().is_err() {
            errors.push(format!("'{}' is not an IP address", self.host));
        }
        if let AppConfig::LineFilter { pattern } = &self.app {
            if let Err(err) = harbor_regex::Regex::new(pattern) {
                errors.push(format!("line_filter pattern: {err}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Read configuration from the file named by `HARBOR_CONFIG`, falling back
/// to defaults when the variable is unset.
pub fn load() -> anyhow::Result<ServerConfig> {
    let Ok(path) = std::env::var("HARBOR_CONFIG") else {
        return Ok(ServerConfig::default());
    };
    let raw =
        std::fs::read_to_string(&path).with_context(|| format!("reading config file {path}"))?;
    let config = toml::from_str(&raw).with_context(|| format!("parsing config file {path}"))?;
    Ok(config)
}
