// SPDX-License-Identifier: Apache-2.0
//! Identifier types for the actor-network model.
use blake3::Hasher;

/// Canonical 256-bit hash used for director kind identifiers.
pub type Hash = [u8; 32];

/// Strongly typed index of an entity within a [`crate::Network`].
///
/// Ids are arena indices: they are only meaningful for the network that
/// produced them, and iteration over entities always follows insertion
/// order. Using a dedicated wrapper prevents accidental mixing of entity,
/// port, and relation identifiers.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    /// Returns the raw arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Strongly typed index of a port within a [`crate::Network`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortId(pub(crate) u32);

impl PortId {
    /// Returns the raw arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Strongly typed index of a relation within a [`crate::Network`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelationId(pub(crate) u32);

impl RelationId {
    /// Returns the raw arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier for the concrete kind of a director.
///
/// A composite entity that owns a director is *opaque*: it starts a new
/// hierarchical level. Two directors are compatible only when their kinds
/// are exactly equal, so kinds are content-addressed: a stable,
/// domain-separated BLAKE3 hash of a kind label produced by
/// [`make_director_kind`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirectorKind(pub Hash);

impl DirectorKind {
    /// Returns the canonical byte representation of this kind.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Returns the first eight bytes of the kind hash in hex, for logs.
    #[must_use]
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[0..8])
    }
}

impl core::fmt::Debug for DirectorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "DirectorKind({})", self.short_hex())
    }
}

/// Produces a stable, domain-separated director kind (prefix `b"director:"`)
/// using BLAKE3.
pub fn make_director_kind(label: &str) -> DirectorKind {
    let mut hasher = Hasher::new();
    hasher.update(b"director:");
    hasher.update(label.as_bytes());
    DirectorKind(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn director_kinds_are_stable_and_label_separated() {
        assert_eq!(make_director_kind("sdf"), make_director_kind("sdf"));
        assert_ne!(make_director_kind("sdf"), make_director_kind("pn"));
    }
}
