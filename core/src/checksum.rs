//! Structural checksums for mount deduplication.
//!
//! A checksum is a content hash computed once, at registration or mount
//! time, over a canonical line serialization of an application: its name,
//! seed, route set, binding names, declared type names, custom error codes
//! and macro names. Two mounts of the same application-seed-checksum
//! combination are deduplicated — hooks and namespaces are not re-applied.

use sha2::{Digest, Sha256};
use std::fmt;

/// A structural fingerprint of an application instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Checksum(u64);

impl Checksum {
    /// The raw fingerprint value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Accumulates canonical lines and hashes them into a [`Checksum`].
///
/// Lines are sorted before hashing so the fingerprint is structural:
/// registration order does not change it.
#[derive(Debug, Default)]
pub struct FingerprintBuilder {
    lines: Vec<String>,
}

impl FingerprintBuilder {
    /// Start an empty fingerprint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `prefix:value` line.
    pub fn push(&mut self, prefix: &str, value: &str) {
        self.lines.push(format!("{prefix}:{value}"));
    }

    /// Hash the accumulated lines.
    #[must_use]
    pub fn finish(mut self) -> Checksum {
        self.lines.sort_unstable();
        let mut hasher = Sha256::new();
        for line in &self.lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Checksum(u64::from_be_bytes(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(lines: &[(&str, &str)]) -> Checksum {
        let mut builder = FingerprintBuilder::new();
        for (prefix, value) in lines {
            builder.push(prefix, value);
        }
        builder.finish()
    }

    #[test]
    fn identical_content_hashes_identically() {
        let a = fingerprint(&[("name", "auth"), ("route", "GET /login")]);
        let b = fingerprint(&[("name", "auth"), ("route", "GET /login")]);
        assert_eq!(a, b);
    }

    #[test]
    fn order_does_not_matter() {
        let a = fingerprint(&[("route", "GET /login"), ("name", "auth")]);
        let b = fingerprint(&[("name", "auth"), ("route", "GET /login")]);
        assert_eq!(a, b);
    }

    #[test]
    fn content_changes_the_hash() {
        let a = fingerprint(&[("name", "auth")]);
        let b = fingerprint(&[("name", "sessions")]);
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_fixed_width_hex() {
        let checksum = fingerprint(&[("name", "auth")]);
        assert_eq!(checksum.to_string().len(), 16);
    }
}
