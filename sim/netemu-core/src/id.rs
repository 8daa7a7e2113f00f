//! Stable identifiers for protocol types.
//!
//! Every [`ProtocolType`](crate::protocol::ProtocolType) names itself with an
//! [`Id`] computed at compile time from a string. The registry compares these
//! ids to find an entry again, and node creation events log them in hex so a
//! run can be grepped for one protocol.

use const_fnv1a_hash::fnv1a_hash_64;
use std::fmt::Display;

/// The identity of a protocol type, derived from its name.
///
/// Ids are the FNV-1a hash of the name, so the same name gives the same id in
/// every run and every build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

impl Id {
    /// Hashes `name` into an id. Usable in a `const` item.
    pub const fn from_string(name: &'static str) -> Self {
        Self(fnv1a_hash_64(name.as_bytes(), None))
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_hash_to_fixed_ids() {
        const STANDARD: Id = Id::from_string("Standard");
        assert_eq!(STANDARD, Id::from_string("Standard"));
        assert_ne!(STANDARD, Id::from_string("Server"));
        // FNV-1a of the empty string is the offset basis.
        assert_eq!(Id::from_string("").to_string(), "cbf29ce484222325");
    }
}
