use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use lockdown_audit::AuditSink;
use lockdown_kernel::{KernelBridge, KernelError, KernelSync};
use lockdown_policy::PolicyStore;
use tokio::sync::Mutex;

use crate::cli::Cli;
use crate::signals::{Hangup, Terminate};

/// Brings every component up in the order spelled out for the supervisor,
/// then blocks until a shutdown signal arrives.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut terminate = Terminate::new().context("failed to install SIGINT/SIGTERM handler")?;
    let mut hangup = Hangup::new().context("failed to install SIGHUP handler")?;

    let kernel_bridge = Arc::new(Mutex::new(KernelBridge::new()));

    {
        let mut guard = kernel_bridge.lock().await;
        guard
            .start_exec_gate(&cli.exec_gate_object)
            .context("failed to start exec gate")?;
    }
    tracing::info!("exec gate attached");

    let policy_store = Arc::new(PolicyStore::new());
    {
        let mut guard = kernel_bridge.lock().await;
        policy_store
            .reload(&cli.policy_path, &mut *guard)
            .context("failed to load initial policy")?;
    }
    tracing::info!(path = %cli.policy_path.display(), "policy loaded");

    resolve_critical_names(&cli.critical_names, &kernel_bridge).await;

    {
        let mut guard = kernel_bridge.lock().await;
        match guard.start_egress_gate(&cli.iface, &cli.egress_gate_object) {
            Ok(()) => tracing::info!(iface = %cli.iface, "egress gate attached"),
            Err(KernelError::Unsupported { what }) => {
                tracing::warn!(what, "egress enforcement unsupported here, continuing without it");
            }
            Err(e) => return Err(e).context("failed to start egress gate"),
        }
    }

    let (audit, audit_handle) = AuditSink::spawn(&cli.audit_log_path)
        .await
        .context("failed to open audit log")?;
    tracing::info!(path = %cli.audit_log_path.display(), "audit writer started");

    let kernel_sync: Arc<Mutex<dyn KernelSync + Send>> = kernel_bridge.clone();
    let dns_config = lockdown_dns::ProxyConfig {
        bind: cli.dns_bind,
        upstream: cli.upstream,
        upstream_timeout: Duration::from_secs(2),
    };
    let mut dns_task = tokio::spawn(lockdown_dns::run(
        dns_config,
        Arc::clone(&policy_store),
        kernel_sync,
        audit.clone(),
    ));

    loop {
        tokio::select! {
            _ = terminate.recv() => {
                tracing::info!("shutdown signal received");
                break;
            }
            _ = hangup.recv() => {
                tracing::info!("reload signal received");
                let mut guard = kernel_bridge.lock().await;
                if let Err(e) = policy_store.reload(&cli.policy_path, &mut *guard) {
                    tracing::error!(error = %e, "policy reload failed, keeping previous policy");
                }
            }
            result = &mut dns_task => {
                match result {
                    Ok(Ok(())) => tracing::warn!("DNS proxy exited unexpectedly"),
                    Ok(Err(e)) => tracing::error!(error = %e, "DNS proxy failed"),
                    Err(e) => tracing::error!(error = %e, "DNS proxy task panicked"),
                }
                break;
            }
        }
    }

    dns_task.abort();
    drop(audit);
    if let Err(e) = audit_handle.await {
        tracing::warn!(error = %e, "audit writer task panicked during shutdown");
    }

    let mut guard = kernel_bridge.lock().await;
    guard.stop_egress_gate();
    tracing::info!("egress gate detached");
    guard.stop_exec_gate();
    tracing::info!("exec gate detached");

    Ok(())
}

/// Resolves each critical name via the system resolver and seeds its A
/// answers into the egress table before the DNS proxy is listening.
/// Failures are warnings only: a daemon that can't yet resolve one
/// hard-coded name should still come up and let the proxy handle it later.
async fn resolve_critical_names(names: &[String], kernel: &Arc<Mutex<KernelBridge>>) {
    for name in names {
        let target = format!("{name}:0");
        let addrs = match tokio::net::lookup_host(&target).await {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!(%name, error = %e, "failed to pre-resolve critical name");
                continue;
            }
        };

        let mut guard = kernel.lock().await;
        for addr in addrs {
            if let std::net::IpAddr::V4(ip) = addr.ip() {
                if let Err(e) = guard.allow_ip(&ip.to_string()) {
                    tracing::warn!(%name, %ip, error = %e, "failed to allow pre-resolved IP");
                }
            }
        }
    }
}
