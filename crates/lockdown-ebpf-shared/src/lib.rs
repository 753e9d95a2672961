//! Shared data structures between the (out-of-scope, precompiled) kernel
//! objects and user space.
//!
//! Layout here is the contract: the LSM program reads [`AppKey`] bytes
//! directly out of its hash map, and the TC classifier reads [`IpKey`] as a
//! big-endian `u32` straight from the IPv4 header. Changing a field's order
//! or width here without changing the kernel object breaks the match.

#![cfg_attr(not(feature = "std"), no_std)]

/// Canonical 16-byte key for the app allowlist table.
///
/// Derived from an executable name by trimming whitespace, lowercasing
/// ASCII, and copying at most 15 bytes into a zero-initialized buffer; byte
/// 15 is always the zero terminator. See `lockdown-policy` for the
/// canonicalization logic; this type only carries the resulting bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppKey([u8; 16]);

impl AppKey {
    pub const MAX_NAME_LEN: usize = 15;

    /// Builds a key from already-canonicalized (trimmed, lowercased) bytes.
    ///
    /// Returns `None` if `canonical` is longer than [`Self::MAX_NAME_LEN`].
    pub fn from_canonical_bytes(canonical: &[u8]) -> Option<Self> {
        if canonical.len() > Self::MAX_NAME_LEN {
            return None;
        }

        let mut buf = [0u8; 16];
        buf[..canonical.len()].copy_from_slice(canonical);

        Some(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Present-marker value for both kernel tables.
///
/// Presence of a key means "allowed"; the value itself carries no meaning
/// beyond existing, but the maps are typed as `u32 -> u32` to match a
/// straightforward BPF hash-map definition.
pub type Marker = u32;

pub const PRESENT: Marker = 1;

/// Kernel key for the IPv4 egress allowlist: a 32-bit unsigned integer whose
/// bytes equal `(a, b, c, d)` for address `a.b.c.d`, i.e. network byte order.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpKey(u32);

impl IpKey {
    /// Builds a key from the four octets of an IPv4 address, in the order
    /// they appear on the wire.
    pub const fn from_octets(octets: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(octets))
    }

    pub const fn as_be_u32(&self) -> u32 {
        self.0
    }
}

#[cfg(all(feature = "std", target_os = "linux"))]
mod userspace {
    use super::{AppKey, IpKey};

    // SAFETY: `AppKey` is `#[repr(C)]` over a fixed-size byte array with no
    // padding, and every bit pattern is valid.
    unsafe impl aya::Pod for AppKey {}

    // SAFETY: `IpKey` is `#[repr(transparent)]` over a `u32`, and every bit
    // pattern is valid.
    unsafe impl aya::Pod for IpKey {}
}
