pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{Cli, Command, ConfigError, LogFormat, LogLevel};

use crate::broadcast::Broadcaster;
use crate::domain::PipelineError;
use crate::ingest::{self, IngestState};
use crate::parser::ParserRegistry;
use crate::port::StreamBroker;
use crate::queue::{ConsumerSettings, QueueConsumer, QueueProducer, RedisBroker};
use crate::shipper::{HttpBatchTransport, HttpTransportSettings, Shipper, ShipperSettings};
use crate::store::{PgRecordStore, StoreSettings};
use crate::supervisor::{ProcessLauncher, RestartCeiling, SupervisorSettings, WorkerPool};
use config::{CommonArgs, ConsumeArgs, ServeArgs, ShipArgs, WorkersArgs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse the command line, install logging and run the selected subcommand.
pub async fn main() -> Result<(), PipelineError> {
    let cli = Cli::from_args(std::env::args_os())?;
    let common = cli.command.common();
    logging::init_logging(common.log_level, common.log_format)?;

    info!(
        "Starting rask-log-pipeline v{} ({})",
        crate::VERSION,
        cli.command.name()
    );

    let result = run(cli.command).await;
    if let Err(e) = &result {
        error!("rask-log-pipeline failed: {}", e);
    }
    result
}

pub async fn run(command: Command) -> Result<(), PipelineError> {
    match command {
        Command::Serve(args) => serve(args).await,
        Command::Consume(args) => consume(args).await,
        Command::Workers(args) => workers(args).await,
        Command::Ship(args) => ship(args).await,
    }
}

async fn connect_broker(common: &CommonArgs) -> Result<Arc<dyn StreamBroker>, PipelineError> {
    let broker = RedisBroker::connect(&common.broker_url).await?;
    Ok(Arc::new(broker))
}

async fn serve(args: ServeArgs) -> Result<(), PipelineError> {
    let broker = connect_broker(&args.common).await?;
    let producer = Arc::new(QueueProducer::new(broker.clone(), args.common.stream.clone()));
    let broadcaster = Broadcaster::new(broker, args.common.channel.clone(), args.outbox_capacity);

    let state = Arc::new(IngestState {
        registry: Arc::new(ParserRegistry::with_builtins()),
        producer,
        broadcaster,
        max_batch: args.max_batch,
    });
    let app = ingest::router(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .map_err(|source| PipelineError::Bind {
            address: args.bind.clone(),
            source,
        })?;
    info!(
        "Ingestion endpoint listening on {} (stream '{}', channel '{}')",
        args.bind, args.common.stream, args.common.channel
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await?;

    info!("Ingestion endpoint stopped");
    Ok(())
}

async fn consume(args: ConsumeArgs) -> Result<(), PipelineError> {
    let broker = connect_broker(&args.common).await?;

    let store = PgRecordStore::connect_lazy(&StoreSettings {
        database_url: args.database_url.clone(),
        max_connections: args.db_max_connections,
        acquire_timeout: DB_ACQUIRE_TIMEOUT,
    })?;
    store.ensure_schema().await?;

    let mut settings = ConsumerSettings::new(args.consumer_name.clone());
    settings.stream = args.common.stream.clone();
    settings.group = args.common.group.clone();
    settings.channel = args.common.channel.clone();
    settings.batch_size = args.batch_size;
    settings.block = args.block;

    let consumer = QueueConsumer::new(broker, Arc::new(store), settings);
    let stats = consumer.run(shutdown::cancel_on_signal()).await?;

    info!(
        "Consumer {} finished: {} records in {} batches, {} errors",
        args.consumer_name, stats.processed, stats.batches, stats.errors
    );
    Ok(())
}

/// Arguments handed to every `consume` child. The identity travels in the environment.
fn worker_args(args: &WorkersArgs) -> Vec<String> {
    let common = &args.common;
    vec![
        "consume".to_string(),
        "--batch-size".to_string(),
        args.batch_size.to_string(),
        "--block-ms".to_string(),
        args.block_ms.to_string(),
        "--database-url".to_string(),
        args.database_url.clone(),
        "--db-max-connections".to_string(),
        args.db_max_connections.to_string(),
        "--broker-url".to_string(),
        common.broker_url.clone(),
        "--stream".to_string(),
        common.stream.clone(),
        "--group".to_string(),
        common.group.clone(),
        "--channel".to_string(),
        common.channel.clone(),
        "--log-level".to_string(),
        common.log_level.as_str().to_string(),
        "--log-format".to_string(),
        match common.log_format {
            LogFormat::Text => "text".to_string(),
            LogFormat::Json => "json".to_string(),
        },
    ]
}

async fn workers(args: WorkersArgs) -> Result<(), PipelineError> {
    let launcher = ProcessLauncher::current_exe(worker_args(&args))?;

    let settings = SupervisorSettings {
        num_workers: args.workers,
        check_interval: args.check_interval,
        stop_grace: args.stop_grace,
        restart_ceiling: args.restart_ceiling.map(|max_restarts| RestartCeiling {
            max_restarts,
            window: args.restart_window,
        }),
    };

    let pool = WorkerPool::new(Arc::new(launcher), settings);
    pool.start()?;
    pool.supervise(shutdown::cancel_on_signal()).await;
    Ok(())
}

async fn ship(args: ShipArgs) -> Result<(), PipelineError> {
    let transport = HttpBatchTransport::new(HttpTransportSettings {
        api_url: args.api_url.clone(),
        ..HttpTransportSettings::default()
    })?;

    let mut settings = ShipperSettings::new(args.log_file.clone());
    settings.position_file = args.position_file.clone();
    settings.batch_size = args.batch_size;
    settings.batch_timeout = args.batch_timeout;
    settings.save_interval = args.save_interval;
    settings.max_replay_lines = args.max_replay_lines;

    info!(
        "Shipping {} to {}",
        args.log_file.display(),
        transport.batch_url()
    );

    let shipper = Shipper::new(settings, Arc::new(transport));
    let stats = shipper.run(shutdown::cancel_on_signal()).await?;

    info!(
        "Shipper finished: {} lines processed, {} sent, {} failed, {} skipped",
        stats.lines_processed, stats.lines_sent, stats.lines_failed, stats.lines_skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_worker_args_forward_common_options() {
        let cli = Cli::try_parse_from([
            "rask-log-pipeline",
            "workers",
            "--stream",
            "audit",
            "--log-format",
            "json",
            "--database-url",
            "postgres://store:5432/audit",
            "--block-ms",
            "500",
            "--db-max-connections",
            "2",
        ])
        .unwrap();
        let Command::Workers(args) = cli.command else {
            panic!("expected workers");
        };

        let forwarded = worker_args(&args);

        assert_eq!(forwarded[0], "consume");
        let pairs: Vec<(&str, &str)> = forwarded[1..]
            .chunks(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
            .collect();
        assert!(pairs.contains(&("--batch-size", "1000")));
        assert!(pairs.contains(&("--database-url", "postgres://store:5432/audit")));
        assert!(pairs.contains(&("--block-ms", "500")));
        assert!(pairs.contains(&("--db-max-connections", "2")));
        assert!(pairs.contains(&("--stream", "audit")));
        assert!(pairs.contains(&("--log-format", "json")));
        assert!(!forwarded.iter().any(|a| a == "--consumer-name"));
    }

    #[test]
    fn test_forwarded_args_parse_as_consume() {
        let cli = Cli::try_parse_from(["rask-log-pipeline", "workers"]).unwrap();
        let Command::Workers(args) = cli.command else {
            panic!("expected workers");
        };

        let mut argv = vec!["rask-log-pipeline".to_string()];
        argv.extend(worker_args(&args));
        let child = Cli::try_parse_from(argv).unwrap();

        let Command::Consume(consume) = child.command else {
            panic!("expected consume");
        };
        assert_eq!(consume.batch_size, 1000);
        assert_eq!(consume.block_ms, args.block_ms);
        assert_eq!(consume.database_url, args.database_url);
        assert_eq!(consume.db_max_connections, args.db_max_connections);
        assert_eq!(consume.common, args.common);
    }
}
