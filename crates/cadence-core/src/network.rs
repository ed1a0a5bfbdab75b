// SPDX-License-Identifier: Apache-2.0
//! Arena-backed actor-network model: entities, ports, relations, directors.
//!
//! This is the graph model consumed by the matcher and the causality
//! engine. Entities form a containment tree (composites contain child
//! entities, ports, and relations); ports carry input/output flags and
//! link to relations; relations are undirected hyperedges over two or
//! more ports. Every structural mutation bumps a version counter that
//! consumers use for cache invalidation.
//!
//! Iteration order is always insertion order. Candidate enumeration in
//! the matcher and frontier processing in the causality engine inherit
//! that order, which keeps both deterministic across runs.
use std::ops::Index;

use thiserror::Error;

use crate::ident::{DirectorKind, EntityId, PortId, RelationId};

/// Error returned by [`Network`] mutators when a containment or linking
/// precondition does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The referenced entity is not a composite.
    #[error("entity `{0}` is not a composite")]
    NotAComposite(String),
    /// A link was requested between a port and a relation that do not
    /// share a hierarchy level.
    ///
    /// A relation contained in composite `C` may link ports of `C`'s
    /// direct children (an outside link) or ports of `C` itself (an
    /// inside link); nothing else.
    #[error("port `{port}` cannot link relation `{relation}`: different hierarchy levels")]
    CrossLevelLink {
        /// Full name of the port.
        port: String,
        /// Full name of the relation.
        relation: String,
    },
}

/// Whether an entity is a leaf actor or a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntityKind {
    /// A leaf actor with ports but no children.
    Atomic,
    /// A container for child entities, ports, and relations.
    Composite,
}

/// A node of the actor network.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityRecord {
    name: String,
    kind: EntityKind,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    ports: Vec<PortId>,
    relations: Vec<RelationId>,
    director: Option<DirectorKind>,
}

impl EntityRecord {
    /// Returns the simple (non-qualified) name of the entity.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the entity is atomic or composite.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the containing composite, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Child entities in insertion order.
    #[must_use]
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Ports of this entity in insertion order.
    #[must_use]
    pub fn ports(&self) -> &[PortId] {
        &self.ports
    }

    /// Relations contained in this composite in insertion order.
    #[must_use]
    pub fn relations(&self) -> &[RelationId] {
        &self.relations
    }

    /// The director kind marker, if the composite owns a director.
    #[must_use]
    pub fn director(&self) -> Option<DirectorKind> {
        self.director
    }
}

/// A port of an entity.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortRecord {
    name: String,
    owner: EntityId,
    is_input: bool,
    is_output: bool,
    /// Relations linked on the outside of the owning entity.
    links: Vec<RelationId>,
    /// Relations linked on the inside (owner must be a composite).
    inside_links: Vec<RelationId>,
}

impl PortRecord {
    /// Returns the simple name of the port.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning entity.
    #[must_use]
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Whether the port receives data.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.is_input
    }

    /// Whether the port produces data.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.is_output
    }

    /// Relations linked on the outside of the owning entity.
    #[must_use]
    pub fn links(&self) -> &[RelationId] {
        &self.links
    }

    /// Relations linked on the inside of the owning composite.
    #[must_use]
    pub fn inside_links(&self) -> &[RelationId] {
        &self.inside_links
    }
}

/// An undirected hyperedge over two or more ports.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelationRecord {
    name: String,
    container: EntityId,
    ports: Vec<PortId>,
}

impl RelationRecord {
    /// Returns the simple name of the relation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the containing composite.
    #[must_use]
    pub fn container(&self) -> EntityId {
        self.container
    }

    /// Linked ports in link order.
    #[must_use]
    pub fn ports(&self) -> &[PortId] {
        &self.ports
    }
}

/// Arena store for one actor network.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Network {
    entities: Vec<EntityRecord>,
    ports: Vec<PortRecord>,
    relations: Vec<RelationRecord>,
    version: u64,
}

impl Network {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the structural version of the network.
    ///
    /// Every mutation bumps this counter. Consumers that cache derived
    /// data (notably the causality engine) key their caches on it; a
    /// stale read against an old version is a correctness bug, not just
    /// a performance one.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Adds a composite entity. Pass `None` for a root.
    pub fn add_composite(
        &mut self,
        name: impl Into<String>,
        parent: Option<EntityId>,
    ) -> Result<EntityId, NetworkError> {
        if let Some(parent) = parent {
            self.require_composite(parent)?;
        }
        Ok(self.push_entity(name.into(), EntityKind::Composite, parent))
    }

    /// Adds an atomic entity inside the given composite.
    pub fn add_atomic(
        &mut self,
        name: impl Into<String>,
        parent: EntityId,
    ) -> Result<EntityId, NetworkError> {
        self.require_composite(parent)?;
        Ok(self.push_entity(name.into(), EntityKind::Atomic, Some(parent)))
    }

    /// Adds a port with the given direction flags to an entity.
    ///
    /// Both flags may be set; such ports act as wildcards for the
    /// matcher, though the causality engine does not support them (see
    /// [`crate::CompositeCausality`]).
    pub fn add_port(
        &mut self,
        owner: EntityId,
        name: impl Into<String>,
        is_input: bool,
        is_output: bool,
    ) -> PortId {
        let id = PortId(u32::try_from(self.ports.len()).unwrap_or(u32::MAX));
        self.ports.push(PortRecord {
            name: name.into(),
            owner,
            is_input,
            is_output,
            links: Vec::new(),
            inside_links: Vec::new(),
        });
        self.entities[owner.index()].ports.push(id);
        self.version += 1;
        id
    }

    /// Adds an input port.
    pub fn add_input_port(&mut self, owner: EntityId, name: impl Into<String>) -> PortId {
        self.add_port(owner, name, true, false)
    }

    /// Adds an output port.
    pub fn add_output_port(&mut self, owner: EntityId, name: impl Into<String>) -> PortId {
        self.add_port(owner, name, false, true)
    }

    /// Adds a relation to the given composite.
    pub fn add_relation(
        &mut self,
        container: EntityId,
        name: impl Into<String>,
    ) -> Result<RelationId, NetworkError> {
        self.require_composite(container)?;
        let id = RelationId(u32::try_from(self.relations.len()).unwrap_or(u32::MAX));
        self.relations.push(RelationRecord {
            name: name.into(),
            container,
            ports: Vec::new(),
        });
        self.entities[container.index()].relations.push(id);
        self.version += 1;
        Ok(id)
    }

    /// Links a port to a relation.
    ///
    /// The link side is inferred from containment: a relation in
    /// composite `C` links ports of `C`'s direct children on their
    /// outside, and ports of `C` itself on their inside. Any other
    /// combination is a [`NetworkError::CrossLevelLink`].
    pub fn link(&mut self, port: PortId, relation: RelationId) -> Result<(), NetworkError> {
        let owner = self.ports[port.index()].owner;
        let container = self.relations[relation.index()].container;
        if owner == container {
            self.ports[port.index()].inside_links.push(relation);
        } else if self.entities[owner.index()].parent == Some(container) {
            self.ports[port.index()].links.push(relation);
        } else {
            return Err(NetworkError::CrossLevelLink {
                port: self.port_full_name(port),
                relation: self.relations[relation.index()].name.clone(),
            });
        }
        self.relations[relation.index()].ports.push(port);
        self.version += 1;
        Ok(())
    }

    /// Sets or clears the director kind of a composite.
    ///
    /// A composite with a director is opaque: it starts a new
    /// hierarchical level for both the matcher and the causality engine.
    pub fn set_director(
        &mut self,
        entity: EntityId,
        kind: Option<DirectorKind>,
    ) -> Result<(), NetworkError> {
        self.require_composite(entity)?;
        self.entities[entity.index()].director = kind;
        self.version += 1;
        Ok(())
    }

    /// Returns the entity record, or `None` if the id is out of range.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(id.index())
    }

    /// Returns the port record, or `None` if the id is out of range.
    #[must_use]
    pub fn port(&self, id: PortId) -> Option<&PortRecord> {
        self.ports.get(id.index())
    }

    /// Returns the relation record, or `None` if the id is out of range.
    #[must_use]
    pub fn relation(&self, id: RelationId) -> Option<&RelationRecord> {
        self.relations.get(id.index())
    }

    /// Returns whether the entity is an opaque composite (owns a director).
    #[must_use]
    pub fn is_opaque(&self, entity: EntityId) -> bool {
        self[entity].director.is_some()
    }

    /// Input ports of an entity, in insertion order.
    #[must_use]
    pub fn input_ports(&self, entity: EntityId) -> Vec<PortId> {
        self[entity]
            .ports
            .iter()
            .copied()
            .filter(|&p| self[p].is_input)
            .collect()
    }

    /// Output ports of an entity, in insertion order.
    #[must_use]
    pub fn output_ports(&self, entity: EntityId) -> Vec<PortId> {
        self[entity]
            .ports
            .iter()
            .copied()
            .filter(|&p| self[p].is_output)
            .collect()
    }

    /// All relations linked to a port: outside links first, then inside
    /// links when the owner is a composite.
    #[must_use]
    pub fn linked_relations(&self, port: PortId) -> Vec<RelationId> {
        let record = &self[port];
        let mut relations = record.links.clone();
        relations.extend_from_slice(&record.inside_links);
        relations
    }

    /// Ports that receive data from `from` through its outside links.
    ///
    /// For an output port of a contained entity these are sibling input
    /// ports plus output ports of the containing composite reached on
    /// their inside.
    #[must_use]
    pub fn sinks(&self, from: PortId) -> Vec<PortId> {
        let mut result = Vec::new();
        for &relation in &self[from].links {
            self.collect_receivers(relation, from, &mut result);
        }
        result
    }

    /// Ports that receive data from `from` through its inside links.
    ///
    /// For an input port of a composite these are input ports of
    /// contained entities plus output ports of the composite itself
    /// (a direct passthrough).
    #[must_use]
    pub fn inside_sinks(&self, from: PortId) -> Vec<PortId> {
        let mut result = Vec::new();
        for &relation in &self[from].inside_links {
            self.collect_receivers(relation, from, &mut result);
        }
        result
    }

    /// Renders the dotted path of an entity from its root, for diagnostics.
    #[must_use]
    pub fn full_name(&self, entity: EntityId) -> String {
        let mut segments = vec![self[entity].name.clone()];
        let mut cursor = self[entity].parent;
        while let Some(parent) = cursor {
            segments.push(self[parent].name.clone());
            cursor = self[parent].parent;
        }
        segments.reverse();
        segments.join(".")
    }

    /// Renders the dotted path of a port from its root, for diagnostics.
    #[must_use]
    pub fn port_full_name(&self, port: PortId) -> String {
        let record = &self[port];
        format!("{}.{}", self.full_name(record.owner), record.name)
    }

    fn push_entity(&mut self, name: String, kind: EntityKind, parent: Option<EntityId>) -> EntityId {
        let id = EntityId(u32::try_from(self.entities.len()).unwrap_or(u32::MAX));
        self.entities.push(EntityRecord {
            name,
            kind,
            parent,
            children: Vec::new(),
            ports: Vec::new(),
            relations: Vec::new(),
            director: None,
        });
        if let Some(parent) = parent {
            self.entities[parent.index()].children.push(id);
        }
        self.version += 1;
        id
    }

    fn require_composite(&self, entity: EntityId) -> Result<(), NetworkError> {
        if self[entity].kind == EntityKind::Composite {
            Ok(())
        } else {
            Err(NetworkError::NotAComposite(self.full_name(entity)))
        }
    }

    /// Receivers of a relation seen from `exclude`: ports linked on
    /// their outside that are inputs, and ports linked on their inside
    /// that are outputs (the boundary of the containing composite).
    fn collect_receivers(&self, relation: RelationId, exclude: PortId, out: &mut Vec<PortId>) {
        for &candidate in &self[relation].ports {
            if candidate == exclude {
                continue;
            }
            let record = &self[candidate];
            let outside = record.links.contains(&relation);
            if (outside && record.is_input) || (!outside && record.is_output) {
                out.push(candidate);
            }
        }
    }
}

impl Index<EntityId> for Network {
    type Output = EntityRecord;

    fn index(&self, id: EntityId) -> &EntityRecord {
        &self.entities[id.index()]
    }
}

impl Index<PortId> for Network {
    type Output = PortRecord;

    fn index(&self, id: PortId) -> &PortRecord {
        &self.ports[id.index()]
    }
}

impl Index<RelationId> for Network {
    type Output = RelationRecord;

    fn index(&self, id: RelationId) -> &RelationRecord {
        &self.relations[id.index()]
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn full_names_render_the_containment_path() {
        let mut net = Network::new();
        let root = net.add_composite("top", None).expect("root");
        let inner = net.add_composite("inner", Some(root)).expect("inner");
        let actor = net.add_atomic("actor", inner).expect("actor");
        let port = net.add_input_port(actor, "in");
        assert_eq!(net.full_name(actor), "top.inner.actor");
        assert_eq!(net.port_full_name(port), "top.inner.actor.in");
    }

    #[test]
    fn version_bumps_on_every_structural_mutation() {
        let mut net = Network::new();
        let v0 = net.version();
        let root = net.add_composite("top", None).expect("root");
        let actor = net.add_atomic("a", root).expect("actor");
        let port = net.add_output_port(actor, "out");
        let relation = net.add_relation(root, "r").expect("relation");
        net.link(port, relation).expect("link");
        assert_eq!(net.version(), v0 + 5);
    }

    #[test]
    fn link_side_is_inferred_from_containment() {
        let mut net = Network::new();
        let root = net.add_composite("top", None).expect("root");
        let actor = net.add_atomic("a", root).expect("actor");
        let boundary = net.add_input_port(root, "in");
        let inner = net.add_input_port(actor, "in");
        let relation = net.add_relation(root, "r").expect("relation");
        net.link(boundary, relation).expect("inside link");
        net.link(inner, relation).expect("outside link");
        assert_eq!(net[boundary].inside_links(), &[relation]);
        assert_eq!(net[inner].links(), &[relation]);
        assert_eq!(net.inside_sinks(boundary), vec![inner]);
    }

    #[test]
    fn cross_level_links_are_rejected() {
        let mut net = Network::new();
        let root = net.add_composite("top", None).expect("root");
        let inner = net.add_composite("inner", Some(root)).expect("inner");
        let actor = net.add_atomic("a", inner).expect("actor");
        let port = net.add_input_port(actor, "in");
        let relation = net.add_relation(root, "r").expect("relation");
        assert!(matches!(
            net.link(port, relation),
            Err(NetworkError::CrossLevelLink { .. })
        ));
    }
}
