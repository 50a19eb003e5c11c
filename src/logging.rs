use flexi_logger::{
    colored_default_format, opt_format, Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError,
    Logger, LoggerHandle, Naming,
};
use std::path::PathBuf;

/// Where and how verbosely the binaries log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Fallback spec when `RUST_LOG` is unset
    pub level: String,
    /// Rotating log files go here; stderr only when `None`
    pub directory: Option<PathBuf>,
    pub rotate_bytes: u64,
    pub keep_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            rotate_bytes: 10 * 1024 * 1024, // 10 MB
            keep_files: 7,
        }
    }
}

/// Start the global logger; keep the returned handle alive for the process lifetime.
pub fn setup_logging(config: &LogConfig) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(&config.level)?;
    match &config.directory {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir).basename(crate::NAME))
            .duplicate_to_stderr(Duplicate::Info)
            .format_for_files(opt_format)
            .format_for_stderr(colored_default_format)
            .rotate(
                Criterion::Size(config.rotate_bytes),
                Naming::Numbers,
                Cleanup::KeepLogFiles(config.keep_files),
            )
            .start(),
        None => logger.format(colored_default_format).start(),
    }
}
