use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Value},
    Figment,
};
use tracing::{debug, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mzmider::MZMider;

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Log to STDERR, and to `log_file` too when given. The returned guard must be held
/// until the program exits so the file is flushed.
fn configure_log(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer()
        .compact()
        .with_timer(fmt::time::ChronoLocal::rfc_3339())
        .with_writer(io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        );

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(fs::File::create(path)?);
            let layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(writer)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(tracing::Level::DEBUG.into())
                        .from_env_lossy(),
                );
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Layer the defaults, `mzmider.toml`, the `--config-file`, `MZMIDER_` environment
/// variables and finally the options given on the command line, each overriding the last.
fn load_configuration() -> Result<MZMider, figment::Error> {
    let matches = MZMider::command().get_matches();
    let args = MZMider::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let given: Vec<&str> = matches
        .ids()
        .map(|id| id.as_str())
        .filter(|id| matches.value_source(id) == Some(ValueSource::CommandLine))
        .collect();
    let mut explicit = Dict::new();
    if let Some(values) = Value::serialize(&args)?.into_dict() {
        for (key, value) in values {
            if given.contains(&key.as_str()) {
                explicit.insert(key, value);
            }
        }
    }

    let mut config = Figment::from(Serialized::defaults(&args)).merge(Toml::file("mzmider.toml"));
    if let Some(path) = args.config_file.as_ref() {
        config = config.merge(Toml::file_exact(path));
    }
    config
        .merge(Env::prefixed("MZMIDER_").split("__"))
        .merge(Serialized::defaults(explicit))
        .extract()
}

fn main() -> ExitCode {
    let config = load_configuration();

    let log_file = config.as_ref().ok().and_then(|c| c.log_file.clone());
    let _guard = match configure_log(log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to open the log file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let driver = match config {
        Ok(driver) => driver,
        Err(e) => {
            error!("Failed to read the configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    match toml::to_string_pretty(&driver) {
        Ok(text) => debug!("Effective configuration:\n{text}"),
        Err(e) => debug!("Could not render the configuration: {e}"),
    }

    match driver.main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
