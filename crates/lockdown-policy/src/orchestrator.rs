use lockdown_kernel::{AppKey, KernelSync};

use crate::policy::{canonicalize_app_name, Policy};

/// Pushes a policy snapshot into the kernel tables.
///
/// `sync_allowed_apps` failures are fatal for the caller (the policy has
/// already been swapped in by the time this runs; see
/// [`crate::store::PolicyStore::reload`] for the accepted divergence this
/// implies). `allow_ip` failures are logged and otherwise ignored — a single
/// bad entry must not abort the rest of the reload.
pub fn apply(policy: &Policy, kernel: &mut dyn KernelSync) -> Result<(), lockdown_kernel::KernelError> {
    let keys: Vec<AppKey> = policy
        .allowed_apps()
        .iter()
        .map(|name| {
            let canonical = canonicalize_app_name(name);
            AppKey::from_canonical_bytes(canonical.as_bytes())
                .expect("policy loader already rejected names that don't fit")
        })
        .collect();

    kernel.sync_allowed_apps(&keys)?;

    for ip in policy.allowed_ips() {
        if let Err(e) = kernel.allow_ip(&ip.to_string()) {
            tracing::warn!(%ip, error = %e, "failed to seed allowed IP, continuing reload");
        }
    }

    Ok(())
}
