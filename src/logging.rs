use classroom_config::Config;
use eyre::{
    Context as _,
    Result,
};
use std::{
    fs::File,
    sync::Mutex,
};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

lazy_static::lazy_static! {
    static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));
}

/// `RUST_LOG` if set, the configured level otherwise.
fn filter(config: &Config) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .wrap_err_with(|| format!("Invalid log level {:?}", config.log_level))
}

/// Logs to stderr and to a fresh log file in the data directory.
pub fn log_init(config: &Config) -> Result<()> {
    let directory = config.data_dir();
    std::fs::create_dir_all(directory).context("Failed to create data directory")?;
    let log_path = directory.join(LOG_FILE.as_str());
    let log_file = File::create(&log_path).wrap_err_with(|| format!("Failed to create log file {log_path:?}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter(config)?))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .with_filter(filter(config)?),
        )
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    debug!(?log_path, "Logging initialized");
    Ok(())
}
