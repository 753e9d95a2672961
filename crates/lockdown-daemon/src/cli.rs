use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Host-resident exec and egress enforcement daemon", long_about = None)]
pub struct Cli {
    /// Policy file to load at startup and on every SIGHUP.
    #[arg(long, env = "LOCKDOWND_POLICY_PATH", default_value = "policy.json")]
    pub policy_path: PathBuf,

    /// Network interface the egress gate attaches its TC classifier to.
    #[arg(long, env = "LOCKDOWND_IFACE", default_value = "eth0")]
    pub iface: String,

    /// UDP address the DNS proxy listens on.
    #[arg(long, env = "LOCKDOWND_DNS_BIND", default_value = "127.0.0.1:8053")]
    pub dns_bind: SocketAddr,

    /// Upstream resolver the proxy forwards allowed queries to.
    #[arg(long, env = "LOCKDOWND_UPSTREAM", default_value = "8.8.8.8:53")]
    pub upstream: SocketAddr,

    /// Append-only log the audit pipeline writes JSON lines to.
    #[arg(long, env = "LOCKDOWND_AUDIT_LOG_PATH", default_value = "audit.json.log")]
    pub audit_log_path: PathBuf,

    /// Precompiled LSM object implementing the exec gate.
    #[arg(
        long,
        env = "LOCKDOWND_EXEC_GATE_OBJECT",
        default_value = "/usr/local/lib/lockdownd/exec_gate.o"
    )]
    pub exec_gate_object: PathBuf,

    /// Precompiled TC object implementing the egress gate.
    #[arg(
        long,
        env = "LOCKDOWND_EGRESS_GATE_OBJECT",
        default_value = "/usr/local/lib/lockdownd/egress_gate.o"
    )]
    pub egress_gate_object: PathBuf,

    /// Names to pre-resolve and allow at startup, before the DNS proxy is
    /// listening. May be repeated, or supplied as a comma-separated list via
    /// `LOCKDOWND_CRITICAL_NAMES`.
    #[arg(long = "critical-name", env = "LOCKDOWND_CRITICAL_NAMES", value_delimiter = ',')]
    pub critical_names: Vec<String>,
}
