//! Loads and attaches the two kernel programs this daemon depends on, and
//! owns the handles to their shared lookup tables for the daemon's lifetime.
//!
//! The kernel programs themselves are opaque, precompiled object files
//! (compiling them is out of scope for this crate); this module only knows
//! their declared symbol names and map ABI.

mod error;

#[cfg(target_os = "linux")]
#[path = "linux.rs"]
mod platform;
#[cfg(not(target_os = "linux"))]
#[path = "stub.rs"]
mod platform;

pub use error::KernelError;
pub use lockdown_ebpf_shared::AppKey;
pub use platform::KernelBridge;

/// Narrow seam the orchestrator (`lockdown-policy`) programs against,
/// instead of depending on the concrete `KernelBridge`/`aya` types directly.
pub trait KernelSync {
    /// Full replace of the app allowlist table.
    fn sync_allowed_apps(&mut self, apps: &[AppKey]) -> Result<(), KernelError>;

    /// Insert a single IPv4 address into the egress allowlist table.
    fn allow_ip(&mut self, ipv4_str: &str) -> Result<(), KernelError>;
}

impl KernelSync for KernelBridge {
    fn sync_allowed_apps(&mut self, apps: &[AppKey]) -> Result<(), KernelError> {
        KernelBridge::sync_allowed_apps(self, apps)
    }

    fn allow_ip(&mut self, ipv4_str: &str) -> Result<(), KernelError> {
        KernelBridge::allow_ip(self, ipv4_str)
    }
}
