#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("failed to bind UDP listener on {addr}: {source}")]
    BindFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
