// SPDX-License-Identifier: Apache-2.0
//! Match bindings: the injective pattern-to-host map built by the matcher.
use rustc_hash::FxHashMap;

use crate::ident::{EntityId, PortId, RelationId};

/// A matchable object on either the pattern or the host side.
///
/// Relations never appear directly; connectivity is matched through
/// [`Path`] objects, which capture a complete walk from port to port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchObject {
    /// An atomic or opaque composite entity.
    Entity(EntityId),
    /// A port of an entity.
    Port(PortId),
    /// The director of an opaque composite, identified by its owner.
    Director(EntityId),
    /// A relation walk between two ports.
    Path(Path),
}

/// A walk from a start port to an end port, alternating relations and
/// ports and passing only through transparent composite boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    start: PortId,
    hops: Vec<(RelationId, PortId)>,
}

impl Path {
    /// Creates a path from its start port and hop sequence. The hop
    /// list must be non-empty; its last port is the end of the path.
    #[must_use]
    pub fn new(start: PortId, hops: Vec<(RelationId, PortId)>) -> Self {
        Self { start, hops }
    }

    /// The port the walk starts from.
    #[must_use]
    pub fn start_port(&self) -> PortId {
        self.start
    }

    /// The port the walk ends at: the last hop's port, or the start
    /// port for an empty hop list.
    #[must_use]
    pub fn end_port(&self) -> PortId {
        self.hops.last().map_or(self.start, |&(_, port)| port)
    }

    /// The relation-port hops of the walk, in order.
    #[must_use]
    pub fn hops(&self) -> &[(RelationId, PortId)] {
        &self.hops
    }
}

/// An insertion-ordered injective map from pattern objects to host
/// objects.
///
/// The matcher extends the result as it binds objects and rolls it back
/// to a checkpoint with [`MatchResult::retain`] when a branch fails, so
/// lookups in both directions and ordered truncation must all be cheap.
#[derive(Debug, Default, Clone)]
pub struct MatchResult {
    entries: Vec<(MatchObject, MatchObject)>,
    by_pattern: FxHashMap<MatchObject, usize>,
    by_host: FxHashMap<MatchObject, usize>,
    director_pairs: usize,
}

impl MatchResult {
    /// Creates an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pair is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of bound pairs whose pattern side is a director.
    #[must_use]
    pub fn director_pairs(&self) -> usize {
        self.director_pairs
    }

    /// Binds `pattern` to `host`. The caller guarantees neither side is
    /// already bound.
    pub fn insert(&mut self, pattern: MatchObject, host: MatchObject) {
        let index = self.entries.len();
        if matches!(pattern, MatchObject::Director(_)) {
            self.director_pairs += 1;
        }
        self.by_pattern.insert(pattern.clone(), index);
        self.by_host.insert(host.clone(), index);
        self.entries.push((pattern, host));
    }

    /// The host object bound to `pattern`, if any.
    #[must_use]
    pub fn get(&self, pattern: &MatchObject) -> Option<&MatchObject> {
        self.by_pattern
            .get(pattern)
            .map(|&index| &self.entries[index].1)
    }

    /// Whether `pattern` is bound.
    #[must_use]
    pub fn contains_pattern(&self, pattern: &MatchObject) -> bool {
        self.by_pattern.contains_key(pattern)
    }

    /// Whether some pattern object is bound to `host`.
    #[must_use]
    pub fn contains_host(&self, host: &MatchObject) -> bool {
        self.by_host.contains_key(host)
    }

    /// Rolls back to the first `keep` bindings, in insertion order.
    pub fn retain(&mut self, keep: usize) {
        while self.entries.len() > keep {
            if let Some((pattern, host)) = self.entries.pop() {
                if matches!(pattern, MatchObject::Director(_)) {
                    self.director_pairs -= 1;
                }
                self.by_pattern.remove(&pattern);
                self.by_host.remove(&host);
            }
        }
    }

    /// The bound pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(MatchObject, MatchObject)> {
        self.entries.iter()
    }
}
