//! Config & wiring.
//!
//! `ChannelConfigFile` is a `toml`-deserializable convenience load path for
//! demo binaries and integration tests that want connection settings on disk
//! instead of constructed in code. It is not a CLI surface.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfigFile {
    pub elasticsearch: ElasticsearchConfig,
    pub channel: ChannelSection,
    #[serde(default)]
    pub bootstrap: BootstrapSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelSection {
    #[serde(default = "default_inbound_max_size")]
    pub inbound_max_size: usize,
    #[serde(default = "default_outbound_max_size")]
    pub outbound_max_size: usize,
    #[serde(default = "default_outbound_max_lifetime_secs")]
    pub outbound_max_lifetime_secs: u64,
    pub export_max_concurrency: Option<usize>,
    #[serde(default = "default_export_max_retries")]
    pub export_max_retries: u32,
    #[serde(default)]
    pub drop_on_full: bool,
}

impl ChannelSection {
    pub fn outbound_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.outbound_max_lifetime_secs)
    }
}

fn default_inbound_max_size() -> usize {
    100_000
}
fn default_outbound_max_size() -> usize {
    1_000
}
fn default_outbound_max_lifetime_secs() -> u64 {
    5
}
fn default_export_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BootstrapSection {
    #[serde(default)]
    pub template_name: String,
    #[serde(default)]
    pub template_wildcard: String,
    #[serde(default)]
    pub silent: bool,
}

impl ChannelConfigFile {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("failed to read channel config file")?;
        let config: ChannelConfigFile =
            toml::from_str(&content).context("failed to parse channel config file")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            [elasticsearch]
            url = "http://localhost:9200"

            [channel]
            inbound_max_size = 500
        "#;
        let config: ChannelConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(config.elasticsearch.url, "http://localhost:9200");
        assert_eq!(config.channel.inbound_max_size, 500);
        assert_eq!(config.channel.outbound_max_size, 1_000);
    }
}
