//! Structured logging bootstrap, backed by `fern`.
//!
//! Every record is tagged with the node id so that aggregated logs from
//! several coordinator processes stay attributable.

use std::path::Path;

use fern::colors::{Color, ColoredLevelConfig};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install logger: {0}")]
    SetLogger(#[from] log::SetLoggerError),
}

/// Initializes the global logger. Call exactly once, as early as possible
/// in `main`. `log_file` is optional; when absent only stdout is used.
pub fn init(node_id: &str, level: log::LevelFilter, log_file: Option<&Path>) -> Result<(), LoggingError> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let node_id = node_id.to_string();
    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colors.color(record.level()),
                node_id,
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        let file = fern::log_file(path).map_err(|source| LoggingError::FileOpen {
            path: path.display().to_string(),
            source,
        })?;
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}
