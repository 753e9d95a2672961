/// Everything that can go wrong loading or validating a policy file.
///
/// A reload that produces this error leaves the previously published
/// snapshot in place (see [`crate::store::PolicyStore::reload`]).
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy JSON: {0}")]
    ParseFailed(#[source] serde_json::Error),

    #[error("app name {0:?} is longer than 15 bytes after canonicalization")]
    AppNameTooLong(String),

    #[error("{0:?} is not a valid IPv4 dotted-quad address")]
    InvalidIpAddress(String),
}
