use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use serde::Deserialize;

use lockdown_kernel::AppKey;

use crate::error::PolicyError;

/// On-disk policy file shape. Unknown keys are ignored by `serde`'s default
/// behavior; duplicates within an array are deduplicated once loaded into
/// the `BTreeSet`s of [`Policy`].
#[derive(Debug, Deserialize)]
struct PolicyFile {
    allowed_domains: Vec<String>,
    allowed_apps: Vec<String>,
    allowed_ips: Vec<String>,
}

/// An immutable, fully-validated policy snapshot. Never mutated after
/// construction; a reload builds a new one and swaps it in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    allowed_domain_suffixes: BTreeSet<String>,
    allowed_apps: BTreeSet<String>,
    allowed_ips: BTreeSet<Ipv4Addr>,
}

impl Policy {
    /// The empty policy: no app may execute, no name resolves, no IP is
    /// reachable. Used as the store's initial value so readers never
    /// observe a null snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(contents: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile =
            serde_json::from_str(contents).map_err(PolicyError::ParseFailed)?;

        Self::from_file(file)
    }

    fn from_file(file: PolicyFile) -> Result<Self, PolicyError> {
        let mut allowed_apps = BTreeSet::new();
        for raw in &file.allowed_apps {
            let canonical = canonicalize_app_name(raw);

            if AppKey::from_canonical_bytes(canonical.as_bytes()).is_none() {
                return Err(PolicyError::AppNameTooLong(canonical));
            }

            allowed_apps.insert(canonical);
        }

        let mut allowed_ips = BTreeSet::new();
        for raw in &file.allowed_ips {
            let ip: Ipv4Addr = raw
                .parse()
                .map_err(|_| PolicyError::InvalidIpAddress(raw.clone()))?;

            allowed_ips.insert(ip);
        }

        let allowed_domain_suffixes = file
            .allowed_domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .collect();

        Ok(Self {
            allowed_domain_suffixes,
            allowed_apps,
            allowed_ips,
        })
    }

    pub fn allowed_apps(&self) -> &BTreeSet<String> {
        &self.allowed_apps
    }

    pub fn allowed_ips(&self) -> &BTreeSet<Ipv4Addr> {
        &self.allowed_ips
    }

    pub fn allowed_domain_suffixes(&self) -> &BTreeSet<String> {
        &self.allowed_domain_suffixes
    }

    /// Lowercases `name`, strips one trailing dot if present, then checks
    /// whether it equals or is a (dot-bounded) subdomain of some allowed
    /// suffix. Boundary-aware: `evilcodeforces.com` must never match
    /// `codeforces.com`.
    pub fn is_allowed_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        let name = name.strip_suffix('.').unwrap_or(&name);

        self.allowed_domain_suffixes.iter().any(|suffix| {
            name == suffix || name.ends_with(&format!(".{suffix}"))
        })
    }
}

/// Trim + lowercase (ASCII-aware for the common case, but operates on the
/// whole `&str` so multi-byte names lowercase correctly too).
pub fn canonicalize_app_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}
