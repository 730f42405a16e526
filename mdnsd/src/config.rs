use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::types::{Attributes, Service};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub browse: BrowseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub ipv4: bool,
    #[serde(default = "default_true")]
    pub ipv6: bool,
    /// How often to look for new interfaces and join the multicast groups on them
    #[serde(default = "default_rejoin_interval")]
    pub rejoin_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    /// Overrides the system hostname
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub port: u16,
    #[serde(default)]
    pub txt: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowseConfig {
    #[serde(default)]
    pub types: Vec<String>,
    /// How long addresses are collected for each discovered service
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_rejoin_interval() -> u64 {
    60
}

fn default_resolve_timeout() -> u64 {
    2000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ipv4: true,
            ipv6: true,
            rejoin_interval_secs: default_rejoin_interval(),
        }
    }
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            resolve_timeout_ms: default_resolve_timeout(),
        }
    }
}

/// Accept `_http._tcp`, `_http._tcp.local` and `_http._tcp.local.` alike
pub fn qualify_type(service_type: &str) -> String {
    let trimmed = service_type.trim_end_matches('.');
    if trimmed.ends_with(".local") {
        format!("{}.", trimmed)
    } else {
        format!("{}.local.", trimmed)
    }
}

impl ServiceConfig {
    pub fn to_service(&self) -> Service {
        let attributes: Attributes = self
            .txt
            .iter()
            .map(|(key, value)| (key.clone(), Some(value.as_bytes().to_vec())))
            .collect();
        Service {
            service_type: qualify_type(&self.service_type),
            name: self.name.clone(),
            hostname: String::new(),
            port: self.port,
            attributes,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.server.ipv4 && config.server.ipv6);
        assert_eq!(config.server.rejoin_interval_secs, 60);
        assert_eq!(config.host.name, None);
        assert!(config.services.is_empty());
        assert_eq!(config.browse.resolve_timeout_ms, 2000);
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
            [server]
            ipv6 = false

            [host]
            name = "nas"

            [[services]]
            name = "Files"
            type = "_http._tcp"
            port = 8080
            [services.txt]
            path = "/files"
            uuid = "0b5f"

            [browse]
            types = ["_http._tcp.local."]
            resolve_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert!(config.server.ipv4);
        assert!(!config.server.ipv6);
        assert_eq!(config.host.name.as_deref(), Some("nas"));
        assert_eq!(config.browse.types, vec!["_http._tcp.local."]);
        assert_eq!(config.browse.resolve_timeout_ms, 500);

        let service = config.services[0].to_service();
        assert_eq!(service.service_type, "_http._tcp.local.");
        assert_eq!(service.fqdn(), "Files._http._tcp.local.");
        assert_eq!(service.attribute_str("uuid"), Some("0b5f"));
    }

    #[test]
    fn test_missing_service_port_is_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [[services]]
            name = "Files"
            type = "_http._tcp"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_qualify_type() {
        assert_eq!(qualify_type("_http._tcp"), "_http._tcp.local.");
        assert_eq!(qualify_type("_http._tcp.local"), "_http._tcp.local.");
        assert_eq!(qualify_type("_http._tcp.local."), "_http._tcp.local.");
    }
}
