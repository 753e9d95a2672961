use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use lockdown_kernel::KernelSync;

use crate::error::PolicyError;
use crate::orchestrator;
use crate::policy::Policy;

/// Holds the currently-active [`Policy`] behind a lock-free snapshot.
///
/// Readers (the DNS proxy, the exec gate's name-to-key lookups) call
/// [`PolicyStore::get`] and never block on a writer; a [`PolicyStore::reload`]
/// in progress is invisible to them until it publishes its new snapshot.
pub struct PolicyStore {
    current: ArcSwap<Policy>,
}

impl PolicyStore {
    /// Starts out holding [`Policy::empty`], so readers never observe a null
    /// snapshot before the first successful reload.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Policy::empty()),
        }
    }

    pub fn get(&self) -> Arc<Policy> {
        self.current.load_full()
    }

    /// Reads, parses and validates the policy file at `path`, then swaps it
    /// in and pushes it into the kernel via `kernel`.
    ///
    /// A read or validation failure leaves the previous snapshot untouched
    /// and is returned to the caller. Once the file is valid, the swap
    /// happens unconditionally; a subsequent kernel-sync failure is reported
    /// but the new snapshot stays published, since policy and kernel state
    /// are two distinct sources of truth and re-reading gives the operator
    /// no better option than retrying the reload.
    pub fn reload(
        &self,
        path: &Path,
        kernel: &mut dyn KernelSync,
    ) -> Result<(), PolicyError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;

        let policy = Policy::from_json(&contents)?;

        self.current.store(Arc::new(policy.clone()));

        if let Err(e) = orchestrator::apply(&policy, kernel) {
            tracing::error!(error = %e, "kernel sync failed after policy reload; kernel state may diverge from the published policy");
        }

        Ok(())
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}
