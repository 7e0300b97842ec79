/// Multi-process web-lock failures.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("web lock held by a live process on {host}:{port}")]
    PortConflict { host: String, port: u16 },

    #[error("stale lock file: {details}")]
    Stale { details: String },

    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
}
