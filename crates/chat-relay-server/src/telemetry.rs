//! Telemetry setup

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

const LOG_FILE_PREFIX: &str = "chat-relay-server.log";

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
///
/// The returned guard flushes the file writer and must live as long as the
/// process.
pub fn init_telemetry(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers = Vec::new();

    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(true);
    let stdout_layer = match config.format {
        LogFormat::Json => stdout_layer.json().boxed(),
        LogFormat::Pretty => stdout_layer.pretty().boxed(),
    };
    layers.push(stdout_layer);

    let mut file_guard = None;

    if let Some(directory) = &config.directory {
        let directory = PathBuf::from(directory);

        match std::fs::create_dir_all(&directory) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, directory, LOG_FILE_PREFIX);
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                file_guard = Some(guard);

                let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);
                let file_layer = match config.format {
                    LogFormat::Json => file_layer.json().boxed(),
                    LogFormat::Pretty => file_layer.boxed(),
                };
                layers.push(file_layer);
            }
            Err(e) => eprintln!("Failed to create log directory, file logging disabled: {}", e),
        }
    }

    // try_init so tests and embedders that already installed one keep it
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init();

    file_guard
}
