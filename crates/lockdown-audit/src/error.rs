#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to open audit log {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
