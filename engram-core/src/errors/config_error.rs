/// Configuration loading failures.
///
/// Startup never propagates these: a malformed or unreadable config file
/// falls back to defaults. They surface only through the explicit
/// `EngramConfig::load_from_path` entry point.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Read(#[from] std::io::Error),

    #[error("config file malformed: {reason}")]
    Parse { reason: String },
}
