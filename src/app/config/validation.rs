use super::cli::{Command, CommonArgs, ConsumeArgs, ServeArgs, ShipArgs, WorkersArgs};
use super::ConfigError;
use crate::ingest::MAX_BATCH_LIMIT;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

impl Command {
    /// Convert the integer options into their `Duration` counterparts.
    pub fn post_process(&mut self) {
        match self {
            Command::Consume(args) => {
                args.block = Duration::from_millis(args.block_ms);
            }
            Command::Workers(args) => {
                args.check_interval = Duration::from_secs(args.check_interval_secs);
                args.stop_grace = Duration::from_secs(args.stop_grace_secs);
                args.restart_window = Duration::from_secs(args.restart_window_secs);
            }
            Command::Ship(args) => {
                args.batch_timeout = Duration::from_secs(args.batch_timeout_secs);
            }
            Command::Serve(_) => {}
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Command::Serve(args) => args.validate(),
            Command::Consume(args) => args.validate(),
            Command::Workers(args) => args.validate(),
            Command::Ship(args) => args.validate(),
        }
    }
}

fn parse_url(label: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {label} '{value}': {e}")))
}

fn require_positive(label: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidConfig(format!(
            "{label} must be greater than 0"
        )));
    }
    Ok(())
}

fn require_name(label: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(format!("{label} must not be empty")));
    }
    Ok(())
}

impl CommonArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = parse_url("broker URL", &self.broker_url)?;
        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(ConfigError::InvalidUrl(format!(
                "Broker URL must use redis:// or rediss://, got '{}'",
                url.scheme()
            )));
        }
        require_name("Stream name", &self.stream)?;
        require_name("Consumer group", &self.group)?;
        require_name("Fan-out channel", &self.channel)?;
        Ok(())
    }
}

impl ServeArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()?;

        self.bind.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidConfig(format!("Invalid bind address '{}': {}", self.bind, e))
        })?;

        require_positive("Max batch size", self.max_batch as u64)?;
        if self.max_batch > MAX_BATCH_LIMIT {
            return Err(ConfigError::InvalidConfig(format!(
                "Max batch size ({}) must not exceed {}",
                self.max_batch, MAX_BATCH_LIMIT
            )));
        }

        require_positive("Subscriber outbox capacity", self.outbox_capacity as u64)
    }
}

impl ConsumeArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()?;
        require_name("Consumer name", &self.consumer_name)?;
        require_positive("Batch size", self.batch_size as u64)?;
        require_positive("Block window", self.block_ms)?;
        require_positive("Database max connections", u64::from(self.db_max_connections))?;
        parse_url("database URL", &self.database_url)?;
        Ok(())
    }
}

impl WorkersArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()?;
        require_positive("Worker count", self.workers as u64)?;
        require_positive("Batch size", self.batch_size as u64)?;
        require_positive("Check interval", self.check_interval_secs)?;
        require_positive("Block window", self.block_ms)?;
        require_positive("Database max connections", u64::from(self.db_max_connections))?;
        parse_url("database URL", &self.database_url)?;
        if let Some(ceiling) = self.restart_ceiling {
            require_positive("Restart ceiling", ceiling as u64)?;
            require_positive("Restart window", self.restart_window_secs)?;
        }
        Ok(())
    }
}

impl ShipArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()?;
        parse_url("API URL", &self.api_url)?;
        require_positive("Batch size", self.batch_size as u64)?;
        require_positive("Batch timeout", self.batch_timeout_secs)?;
        require_positive("Save interval", self.save_interval)?;
        if let Some(lines) = self.max_replay_lines {
            require_positive("Max replay lines", lines)?;
        }
        if self.log_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Log file path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
