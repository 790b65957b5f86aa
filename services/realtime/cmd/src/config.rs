//! Configuration handling for the realtime service.
//!
//! Reads an optional YAML config file and applies environment variable
//! overrides, mirroring how the rest of the WorkWise services are
//! configured.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Realtime service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Listen address for the push server; `None` disables the server
    pub listen: Option<String>,
    /// Liveness sweep interval in seconds
    pub ping_interval_secs: u64,
    /// Outbound client configuration; `None` disables the client
    pub client: Option<ClientSection>,
}

/// Outbound client section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// Realtime server host, e.g. `app.workwise.example`
    pub host: String,
    /// Use `wss://` for the connection
    #[serde(default)]
    pub secure: bool,
    /// Identity to authenticate as
    pub identity: Option<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            listen: None,
            ping_interval_secs: 30,
            client: None,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    realtime: Option<RealtimeConfig>,
}

impl RealtimeConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    if let Some(realtime) = root.realtime {
                        config = realtime;
                    }
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?} ({}), using defaults",
                        config_path.as_ref(),
                        e
                    );
                }
            }
        } else {
            warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            );
        }

        config.apply_environment_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_environment_overrides(&mut self) {
        if let Ok(listen) = std::env::var("WORKWISE_REALTIME_LISTEN") {
            info!("Listen address overridden by environment: {}", listen);
            self.listen = Some(listen);
        }

        if let Ok(interval) = std::env::var("WORKWISE_REALTIME_PING_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.ping_interval_secs = secs;
                info!("Ping interval overridden by environment: {}s", secs);
            }
        }

        if let Ok(host) = std::env::var("WORKWISE_REALTIME_HOST") {
            info!("Client host overridden by environment: {}", host);
            let secure = std::env::var("WORKWISE_REALTIME_SECURE")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or_else(|_| {
                    self.client.as_ref().map(|c| c.secure).unwrap_or(false)
                });
            let identity = std::env::var("WORKWISE_REALTIME_IDENTITY")
                .ok()
                .or_else(|| self.client.as_ref().and_then(|c| c.identity.clone()));
            self.client = Some(ClientSection {
                host,
                secure,
                identity,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert!(config.listen.is_none());
        assert_eq!(config.ping_interval_secs, 30);
        assert!(config.client.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
realtime:
  listen: "0.0.0.0:8080"
  ping_interval_secs: 15
  client:
    host: "app.workwise.example"
    secure: true
    identity: "user-1"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = RealtimeConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.listen.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(config.ping_interval_secs, 15);
        let client = config.client.unwrap();
        assert_eq!(client.host, "app.workwise.example");
        assert!(client.secure);
        assert_eq!(client.identity.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = RealtimeConfig::load_from_file("/nonexistent/realtime.yaml").unwrap();
        assert_eq!(config.ping_interval_secs, 30);
    }
}
