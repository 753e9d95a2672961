use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lockdown_audit::AuditSink;
use lockdown_kernel::KernelSync;
use lockdown_policy::PolicyStore;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::error::DnsError;
use crate::wire::{self, Query};

/// Default recv buffer. On the public internet any MTU above 1500 is very
/// unlikely; this leaves headroom without risking a second allocation.
const DATAGRAM_BUFFER: usize = 2048;

pub struct ProxyConfig {
    pub bind: SocketAddr,
    pub upstream: SocketAddr,
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8053".parse().expect("valid default address"),
            upstream: "8.8.8.8:53".parse().expect("valid default address"),
            upstream_timeout: Duration::from_secs(2),
        }
    }
}

/// Runs the DNS proxy forever. Binds `config.bind` and spawns one task per
/// inbound datagram so a slow or stuck upstream exchange never holds up any
/// other client's query.
pub async fn run(
    config: ProxyConfig,
    policy: Arc<PolicyStore>,
    kernel: Arc<Mutex<dyn KernelSync + Send>>,
    audit: AuditSink,
) -> Result<(), DnsError> {
    let socket = UdpSocket::bind(config.bind)
        .await
        .map_err(|source| DnsError::BindFailed {
            addr: config.bind,
            source,
        })?;
    let socket = Arc::new(socket);

    tracing::info!(bind = %config.bind, upstream = %config.upstream, "DNS proxy listening");

    let mut buf = vec![0u8; DATAGRAM_BUFFER];
    loop {
        let (len, client) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "failed to receive UDP datagram");
                continue;
            }
        };

        let datagram = buf[..len].to_vec();
        let socket = Arc::clone(&socket);
        let policy = Arc::clone(&policy);
        let kernel = Arc::clone(&kernel);
        let audit = audit.clone();
        let upstream = config.upstream;
        let timeout = config.upstream_timeout;

        tokio::spawn(async move {
            handle_datagram(datagram, client, socket, policy, kernel, audit, upstream, timeout)
                .await;
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_datagram(
    datagram: Vec<u8>,
    client: SocketAddr,
    socket: Arc<UdpSocket>,
    policy: Arc<PolicyStore>,
    kernel: Arc<Mutex<dyn KernelSync + Send>>,
    audit: AuditSink,
    upstream: SocketAddr,
    upstream_timeout: Duration,
) {
    let query = match Query::parse(&datagram) {
        Ok(query) => query,
        Err(e) => {
            tracing::debug!(%client, error = %e, "dropping unparseable DNS datagram");
            return;
        }
    };

    let name = match query.name() {
        Ok(name) => name,
        Err(_) => {
            let reply = wire::minimal_reply(query.id(), query.rd());
            send_reply(&socket, client, &reply).await;
            return;
        }
    };

    let snapshot = policy.get();

    if !snapshot.is_allowed_name(&name) {
        let reply = query.nxdomain();
        send_reply(&socket, client, &reply).await;
        audit.log(client.ip().to_string(), name, false);
        return;
    }

    let upstream_reply = match exchange_with_upstream(query.as_bytes(), upstream, upstream_timeout).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(%client, %name, error = %e, "upstream DNS exchange failed");
            let reply = query.empty_noerror();
            send_reply(&socket, client, &reply).await;
            audit.log(client.ip().to_string(), name, true);
            return;
        }
    };

    for ip in wire::extract_a_records(&upstream_reply) {
        let mut kernel = kernel.lock().await;
        if let Err(e) = kernel.allow_ip(&ip.to_string()) {
            tracing::warn!(%ip, error = %e, "failed to allow resolved IP, forwarding reply anyway");
        }
    }

    send_reply(&socket, client, &upstream_reply).await;
    audit.log(client.ip().to_string(), name, true);
}

async fn exchange_with_upstream(
    query: &[u8],
    upstream: SocketAddr,
    timeout: Duration,
) -> std::io::Result<Vec<u8>> {
    let local: SocketAddr = if upstream.is_ipv6() {
        "[::]:0".parse().expect("valid wildcard address")
    } else {
        "0.0.0.0:0".parse().expect("valid wildcard address")
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(upstream).await?;
    socket.send(query).await?;

    let mut buf = vec![0u8; DATAGRAM_BUFFER];
    let len = tokio::time::timeout(timeout, socket.recv(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream DNS timeout"))??;

    buf.truncate(len);
    Ok(buf)
}

async fn send_reply(socket: &UdpSocket, to: SocketAddr, reply: &[u8]) {
    if let Err(e) = socket.send_to(reply, to).await {
        tracing::warn!(client = %to, error = %e, "failed to send DNS reply");
    }
}
