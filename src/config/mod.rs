use anyhow::{Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::boot::FLASH_BY_ADDR;
use crate::protocol::FirmwareVersion;

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_PATH: &str = "/";
pub const DEFAULT_VERSION_FILE: &str = "app.ver";
pub const DEFAULT_RAW_FILE: &str = "file.bin";

/// Version of the firmware this build runs
pub const LOCAL_VERSION: FirmwareVersion = FirmwareVersion::new(1, 0);

/// Bound on every network wait (connect, each reply segment)
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_millis(10_000);

/// One bank of the default two-bank layout, minus the trailing config sector
pub const DEFAULT_MAX_IMAGE_SIZE: u32 = 0x7_F000;

/// Where the update server lives and what it calls each file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Host name or dotted address
    #[serde(rename = "@host")]
    pub host: String,
    #[serde(rename = "@port", default = "default_port")]
    pub port: u16,
    /// URL prefix, prepended verbatim to each file name
    #[serde(rename = "@path", default = "default_path")]
    pub path: String,
    #[serde(rename = "@versionFile", default = "default_version_file")]
    pub version_file: String,
    #[serde(rename = "@rom0")]
    pub rom0_file: String,
    #[serde(rename = "@rom1")]
    pub rom1_file: String,
    /// Image fetched when flashing by address instead of by slot
    #[serde(rename = "@rawFile", default = "default_raw_file")]
    pub raw_file: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_version_file() -> String {
    DEFAULT_VERSION_FILE.to_string()
}

fn default_raw_file() -> String {
    DEFAULT_RAW_FILE.to_string()
}

impl ServerConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
        version_file: impl Into<String>,
        rom0_file: impl Into<String>,
        rom1_file: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
            version_file: version_file.into(),
            rom0_file: rom0_file.into(),
            rom1_file: rom1_file.into(),
            raw_file: default_raw_file(),
        }
    }

    pub fn with_raw_file(mut self, raw_file: impl Into<String>) -> Self {
        self.raw_file = raw_file.into();
        self
    }

    /// Image name to request for a target slot.
    pub fn firmware_file(&self, slot: u8) -> &str {
        match slot {
            FLASH_BY_ADDR => &self.raw_file,
            0 => &self.rom0_file,
            _ => &self.rom1_file,
        }
    }
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub local_version: FirmwareVersion,
    pub network_timeout: Duration,
    pub max_image_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_version: LOCAL_VERSION,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
        }
    }
}

/// Contents of an `<ota>` config file.
#[derive(Debug, Clone)]
pub struct OtaConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize)]
struct OtaFile {
    server: ServerConfig,
    #[serde(default)]
    engine: Option<EngineSection>,
}

#[derive(Debug, Deserialize)]
struct EngineSection {
    #[serde(rename = "@timeoutMs", default)]
    timeout_ms: Option<u64>,
    #[serde(rename = "@maxImageSize", default)]
    max_image_size: Option<u32>,
    #[serde(default)]
    current: Option<FirmwareVersion>,
}

/// Parse a config file from disk
pub fn parse_config_file(path: &Path) -> Result<OtaConfig> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse_config_xml(&xml)?;
    info!(
        "Loaded config from {} (server {}:{})",
        path.display(),
        config.server.host,
        config.server.port
    );
    Ok(config)
}

/// Parse `<ota>` config XML
pub fn parse_config_xml(xml: &str) -> Result<OtaConfig> {
    let file: OtaFile = from_str(xml.trim()).context("Failed to parse <ota> config XML")?;

    let mut engine = EngineConfig::default();
    if let Some(section) = file.engine {
        if let Some(ms) = section.timeout_ms {
            engine.network_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = section.max_image_size {
            engine.max_image_size = size;
        }
        if let Some(current) = section.current {
            engine.local_version = current;
        }
    }

    if file.server.host.trim().is_empty() {
        anyhow::bail!("<server> host must not be empty");
    }

    Ok(OtaConfig {
        server: file.server,
        engine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let xml = r#"
        <ota>
          <server host="ota.local" port="8080" path="/fw/" versionFile="app.ver"
                  rom0="rom0.bin" rom1="rom1.bin" rawFile="blob.bin"/>
          <engine timeoutMs="2500" maxImageSize="4096">
            <current major="3" minor="1"/>
          </engine>
        </ota>
        "#;

        let config = parse_config_xml(xml).unwrap();
        assert_eq!(config.server.host, "ota.local");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.firmware_file(0), "rom0.bin");
        assert_eq!(config.server.firmware_file(1), "rom1.bin");
        assert_eq!(config.server.firmware_file(FLASH_BY_ADDR), "blob.bin");
        assert_eq!(config.engine.network_timeout, Duration::from_millis(2500));
        assert_eq!(config.engine.max_image_size, 4096);
        assert_eq!(config.engine.local_version, FirmwareVersion::new(3, 1));
    }

    #[test]
    fn test_defaults_applied() {
        let xml = r#"<ota><server host="10.0.0.2" rom0="a.bin" rom1="b.bin"/></ota>"#;

        let config = parse_config_xml(xml).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.path, "/");
        assert_eq!(config.server.version_file, "app.ver");
        assert_eq!(config.server.raw_file, "file.bin");
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_missing_rom_names_rejected() {
        let xml = r#"<ota><server host="10.0.0.2"/></ota>"#;
        assert!(parse_config_xml(xml).is_err());
    }

    #[test]
    fn test_configure_constructor() {
        let server = ServerConfig::new("h", 80, "/fw/", "app.ver", "rom0.bin", "rom1.bin")
            .with_raw_file("raw.bin");
        assert_eq!(server.firmware_file(FLASH_BY_ADDR), "raw.bin");
    }
}
