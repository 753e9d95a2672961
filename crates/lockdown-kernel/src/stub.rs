#![expect(
    clippy::unnecessary_wraps,
    reason = "Function signatures must align with the Linux impl."
)]

use std::path::Path;

use lockdown_ebpf_shared::AppKey;

use crate::error::KernelError;

/// Non-Linux stand-in. Every enforcement call fails loudly; nothing here is
/// meant to run in production off Linux, it exists so that `lockdown-policy`,
/// `lockdown-dns` and `lockdown-audit` stay portable and testable.
#[derive(Default)]
pub struct KernelBridge {}

impl KernelBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_exec_gate(&mut self, _object_path: &Path) -> Result<(), KernelError> {
        Err(KernelError::Unsupported {
            what: "exec_gate (non-Linux platform)",
        })
    }

    pub fn start_egress_gate(&mut self, _iface: &str, _object_path: &Path) -> Result<(), KernelError> {
        Err(KernelError::Unsupported {
            what: "egress_gate (non-Linux platform)",
        })
    }

    pub fn sync_allowed_apps(&mut self, _apps: &[AppKey]) -> Result<(), KernelError> {
        Ok(())
    }

    pub fn allow_ip(&mut self, _ipv4_str: &str) -> Result<(), KernelError> {
        Ok(())
    }

    pub fn stop_exec_gate(&mut self) {}

    pub fn stop_egress_gate(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_refuse_to_start() {
        let mut kernel = KernelBridge::new();
        assert!(kernel.start_exec_gate(Path::new("exec_gate.o")).is_err());
        assert!(kernel
            .start_egress_gate("eth0", Path::new("egress_gate.o"))
            .is_err());
    }

    #[test]
    fn table_updates_are_accepted_as_no_ops() {
        let mut kernel = KernelBridge::new();
        assert!(kernel.sync_allowed_apps(&[]).is_ok());
        assert!(kernel.allow_ip("127.0.0.1").is_ok());
    }

    #[test]
    fn stopping_an_unstarted_gate_does_not_panic() {
        let mut kernel = KernelBridge::new();
        kernel.stop_exec_gate();
        kernel.stop_egress_gate();
    }
}
