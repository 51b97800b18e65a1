use super::{CommonArgs, ConfigError, LogFormat, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of `--config-file`.
///
/// ```toml
/// [common]
/// broker_url = "redis://queue:6379"
/// stream = "logs"
/// log_format = "json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub common: CommonSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommonSection {
    pub broker_url: Option<String>,
    pub stream: Option<String>,
    pub group: Option<String>,
    pub channel: Option<String>,
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

impl CommonArgs {
    /// Fill values still at their default from the file section.
    /// Anything given on the command line or through the environment wins.
    pub fn merge_file(&mut self, section: CommonSection) {
        let defaults = CommonArgs::default();

        if let Some(url) = section.broker_url
            && self.broker_url == defaults.broker_url
        {
            self.broker_url = url;
        }
        if let Some(stream) = section.stream
            && self.stream == defaults.stream
        {
            self.stream = stream;
        }
        if let Some(group) = section.group
            && self.group == defaults.group
        {
            self.group = group;
        }
        if let Some(channel) = section.channel
            && self.channel == defaults.channel
        {
            self.channel = channel;
        }
        if let Some(level) = section.log_level
            && self.log_level == defaults.log_level
        {
            self.log_level = level;
        }
        if let Some(format) = section.log_format
            && self.log_format == defaults.log_format
        {
            self.log_format = format;
        }
    }
}
