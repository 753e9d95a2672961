//! Intercepts UDP DNS on a loopback port, enforces the domain allowlist, and
//! feeds resolved A-records into the kernel's egress table before ever
//! handing a reply back to the client.

mod error;
mod proxy;
mod wire;

pub use error::DnsError;
pub use proxy::{run, ProxyConfig};
