/// Migration-engine failures.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("a migration is already running")]
    AlreadyRunning,

    #[error("migration partially failed: {re_embedded} re-embedded, {failed} rows failed")]
    PartialFailure { re_embedded: u64, failed: u64 },
}
