use std::net::AddrParseError;

/// Error kinds produced by the kernel bridge. Most are fatal at startup,
/// `Unsupported` lets the supervisor continue without egress enforcement,
/// and `InvalidAddress`/`MapUpdate` are warn-and-continue during normal
/// operation.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("failed to raise the memory-lock rlimit")]
    MemlockFailed(#[source] std::io::Error),

    #[error("kernel rejected the object file at {path}: {source}")]
    LoadFailed {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to attach {what}: {source}")]
    AttachFailed {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("the running kernel/driver does not support {what}")]
    Unsupported { what: &'static str },

    #[error("{0} is not a valid IPv4 dotted-quad address")]
    InvalidAddress(String, #[source] Option<AddrParseError>),

    #[error("transient kernel map error: {0}")]
    MapUpdate(#[source] anyhow::Error),
}
