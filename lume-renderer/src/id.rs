//! Process-wide resource identifiers (§3 "Resource identity (UID)").
//!
//! Runtime UIDs come from a monotonically increasing counter seeded well above
//! the range string-derived UIDs can produce, so the two spaces never collide
//! in practice; string UIDs are a stable hash of the input string.

use std::sync::atomic::{AtomicU64, Ordering};

pub type Uid = u64;

/// First runtime UID handed out. Everything below this is reserved for
/// string-derived UIDs, which hash into the full `u64` range but are
/// overwhelmingly unlikely to land at or above this value.
pub const RUNTIME_UID_BASE: Uid = 1_000_000_000;

static NEXT_RUNTIME_UID: AtomicU64 = AtomicU64::new(RUNTIME_UID_BASE);

/// Allocates a fresh runtime UID. Process-wide and thread-safe.
pub fn next_runtime_uid() -> Uid {
    NEXT_RUNTIME_UID.fetch_add(1, Ordering::Relaxed)
}

/// Stable FNV-1a hash of a string into the UID space. Used for cache keys
/// derived from names (file paths, pass identifiers, local resource names)
/// so the same input always resolves to the same UID across runs.
pub fn string_uid(s: &str) -> Uid {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Combines two UIDs into one, used to salt a pass-local resource id with its
/// owning pass's identifier hash (§4.3 `Pass::init`).
pub fn combine_uid(a: Uid, b: Uid) -> Uid {
    string_uid(&format!("{a:x}:{b:x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_uid_is_stable() {
        assert_eq!(string_uid("hello"), string_uid("hello"));
        assert_ne!(string_uid("hello"), string_uid("world"));
    }

    #[test]
    fn runtime_uids_are_monotonic_and_above_base() {
        let a = next_runtime_uid();
        let b = next_runtime_uid();
        assert!(a >= RUNTIME_UID_BASE);
        assert!(b > a);
    }
}
