use super::config::{LogFormat, LogLevel};
use crate::domain::PipelineError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Dependency targets that are clamped to `warn` whatever the base level is.
const QUIET_TARGETS: [&str; 6] = ["hyper", "reqwest", "h2", "tower", "sqlx", "redis"];

/// Build the filter string: base level, quiet targets, then `RUST_LOG` on top.
pub fn filter_directives(level: LogLevel, rust_log: Option<&str>) -> String {
    let mut directives = vec![level.as_str().to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    if let Some(extra) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        directives.push(extra.to_string());
    }
    directives.join(",")
}

pub fn build_filter(level: LogLevel, rust_log: Option<&str>) -> Result<EnvFilter, PipelineError> {
    let directives = filter_directives(level, rust_log);
    EnvFilter::try_new(&directives).map_err(|e| {
        PipelineError::Logging(format!("invalid filter '{directives}': {e}"))
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<(), PipelineError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(level, rust_log.as_deref())?;

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true),
            )
            .with(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().compact().with_target(true))
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| PipelineError::Logging(e.to_string()))
}
