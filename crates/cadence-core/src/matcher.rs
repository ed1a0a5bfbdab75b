// SPDX-License-Identifier: Apache-2.0
//! Recursive subgraph matching of a pattern network against a host
//! network.
//!
//! The matcher binds pattern objects (entities, ports, directors, and
//! relation paths) to host objects one at a time, depth-first. Newly
//! bound objects push their neighbours onto a pattern frontier and a
//! host frontier; the search repeatedly picks the next unbound pattern
//! frontier object and tries every compatible host frontier object.
//! Every branch records a checkpoint (result length and frontier
//! lengths) on entry and rolls back to it on failure, so a failed
//! search always leaves an empty result.
//!
//! Hierarchy is matched structurally: transparent composites (no
//! director) are flattened away on both sides, while opaque composites
//! must match as units with equal director kinds. Connectivity is
//! matched through [`Path`] objects, complete relation walks that stop
//! at atomic ports and opaque boundaries. Patterns with disconnected
//! components are supported by revisiting matched composites for
//! children the search has not bound yet.
use rustc_hash::FxHashSet;

use crate::ident::{EntityId, PortId, RelationId};
use crate::match_result::{MatchObject, MatchResult, Path};
use crate::network::{EntityKind, Network};

/// Receives match results as the search finds them.
pub trait MatchCallback {
    /// Called with each complete match. Return `true` to accept it and
    /// stop the search, or `false` to keep searching for more matches.
    fn found_match(&mut self, result: &MatchResult) -> bool;
}

impl<F: FnMut(&MatchResult) -> bool> MatchCallback for F {
    fn found_match(&mut self, result: &MatchResult) -> bool {
        self(result)
    }
}

/// The default callback: accepts the first match found.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl MatchCallback for FirstMatch {
    fn found_match(&mut self, _result: &MatchResult) -> bool {
        true
    }
}

/// Matches a pattern network against a host network.
pub struct GraphMatcher {
    callback: Box<dyn MatchCallback>,
    result: MatchResult,
    success: bool,
}

impl Default for GraphMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphMatcher {
    /// Creates a matcher that accepts the first match.
    #[must_use]
    pub fn new() -> Self {
        Self {
            callback: Box::new(FirstMatch),
            result: MatchResult::new(),
            success: false,
        }
    }

    /// Sets the callback invoked on every complete match.
    pub fn set_callback(&mut self, callback: Box<dyn MatchCallback>) {
        self.callback = callback;
    }

    /// Sets the callback, builder style.
    #[must_use]
    pub fn with_callback(mut self, callback: Box<dyn MatchCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// The latest match result. Empty unless the last search succeeded,
    /// except while a callback is observing an intermediate match.
    #[must_use]
    pub fn match_result(&self) -> &MatchResult {
        &self.result
    }

    /// Whether the last search found a match the callback accepted.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.success
    }

    /// Searches `host` (from `host_root`) for an occurrence of the
    /// pattern rooted at `pattern_root`.
    ///
    /// Returns `true` when a match was found and accepted by the
    /// callback. Returns `false`, with an empty result, when no match
    /// exists or the callback declined every match.
    pub fn match_graphs(
        &mut self,
        pattern: &Network,
        pattern_root: EntityId,
        host: &Network,
        host_root: EntityId,
    ) -> bool {
        self.result = MatchResult::new();
        let root = MatchObject::Entity(pattern_root);
        let mut pattern_objects = FxHashSet::default();
        pattern_objects.insert(root.clone());
        let mut search = Search {
            pattern,
            host,
            pattern_root,
            host_root,
            result: &mut self.result,
            callback: self.callback.as_mut(),
            pattern_frontier: vec![root],
            host_frontier: vec![MatchObject::Entity(host_root)],
            pattern_objects,
            visited_composites: Vec::new(),
            accepted: false,
        };
        self.success = search.match_entry_list(0, 0);
        debug_assert!(
            self.success || self.result.is_empty(),
            "failed search must unwind all bindings"
        );
        self.success
    }
}

impl core::fmt::Debug for GraphMatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GraphMatcher")
            .field("result", &self.result)
            .field("success", &self.success)
            .finish_non_exhaustive()
    }
}

/// Which side of the match a lookup concerns.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Pattern,
    Host,
}

/// State of one search over a pattern/host pair.
struct Search<'a> {
    pattern: &'a Network,
    host: &'a Network,
    pattern_root: EntityId,
    host_root: EntityId,
    result: &'a mut MatchResult,
    callback: &'a mut dyn MatchCallback,
    /// Pattern objects awaiting a binding, in discovery order. Grows as
    /// objects are bound; truncated to checkpoints on backtracking.
    pattern_frontier: Vec<MatchObject>,
    host_frontier: Vec<MatchObject>,
    /// Every pattern object ever discovered. Grow-only; completion
    /// means every one of these is bound.
    pattern_objects: FxHashSet<MatchObject>,
    /// Matched pattern composites, revisited for children that belong
    /// to components the search has not reached through wiring.
    visited_composites: Vec<EntityId>,
    /// Set once the callback accepts a match. Unwinding frames then
    /// report success without re-invoking the callback on the same
    /// bindings.
    accepted: bool,
}

impl Search<'_> {
    /// Whether every discovered pattern object has a binding. Director
    /// pairs are excluded from the count; they are bound as a side
    /// effect of composite matching and never enter the frontier.
    fn all_objects_bound(&self) -> bool {
        self.pattern_objects.len() == self.result.len() - self.result.director_pairs()
    }

    /// Reports the current bindings to the callback if they are
    /// complete. Returns `false` only when a complete match was
    /// declined, which sends the search on to the next candidate.
    ///
    /// Once a match has been accepted, every later completion check is
    /// part of the successful unwind and must not report the same
    /// bindings again.
    fn check_complete(&mut self) -> bool {
        if self.accepted {
            return true;
        }
        if self.all_objects_bound() {
            #[cfg(feature = "telemetry")]
            crate::telemetry::match_found(self.result.len());
            let stop = self.callback.found_match(&*self.result);
            self.accepted = stop;
            stop
        } else {
            true
        }
    }

    /// Tries to bind the pattern frontier object at `pattern_index` to
    /// each host frontier object from `host_start` on.
    fn match_entry_list(&mut self, pattern_index: usize, host_start: usize) -> bool {
        if pattern_index >= self.pattern_frontier.len() {
            return self.check_complete();
        }
        let pattern_object = self.pattern_frontier[pattern_index].clone();
        let mut host_index = host_start;
        while host_index < self.host_frontier.len() {
            let host_object = self.host_frontier[host_index].clone();
            if self.match_object(&pattern_object, &host_object) {
                return true;
            }
            host_index += 1;
        }
        false
    }

    /// Binds every pattern object discovered after the checkpoints
    /// `pattern_base`/`host_base`, then handles disconnected components
    /// when nothing new was discovered.
    fn match_loop(&mut self, pattern_base: usize, host_base: usize) -> bool {
        if pattern_base >= self.pattern_frontier.len() {
            return self.match_disconnected_components();
        }
        let mut pattern_index = pattern_base;
        while pattern_index < self.pattern_frontier.len() {
            let pattern_object = self.pattern_frontier[pattern_index].clone();
            if !self.result.contains_pattern(&pattern_object)
                && !self.match_entry_list(pattern_index, host_base)
            {
                return false;
            }
            pattern_index += 1;
        }
        true
    }

    fn match_object(&mut self, pattern_object: &MatchObject, host_object: &MatchObject) -> bool {
        if self.result.contains_pattern(pattern_object) {
            return self.result.get(pattern_object) == Some(host_object)
                && self.match_disconnected_components();
        }
        if self.result.contains_host(host_object) {
            return false;
        }
        match (pattern_object, host_object) {
            (&MatchObject::Entity(pattern_entity), &MatchObject::Entity(host_entity)) => {
                let pattern_kind = self.pattern[pattern_entity].kind();
                let host_kind = self.host[host_entity].kind();
                match (pattern_kind, host_kind) {
                    (EntityKind::Atomic, EntityKind::Atomic) => {
                        self.match_atomic(pattern_entity, host_entity)
                    }
                    (EntityKind::Composite, EntityKind::Composite) => {
                        self.match_composite(pattern_entity, host_entity)
                    }
                    _ => false,
                }
            }
            (&MatchObject::Port(pattern_port), &MatchObject::Port(host_port)) => {
                self.match_port(pattern_port, host_port)
            }
            (MatchObject::Path(pattern_path), MatchObject::Path(host_path)) => {
                self.match_path(&pattern_path.clone(), &host_path.clone())
            }
            _ => false,
        }
    }

    /// Matches two atomic entities and queues their ports.
    fn match_atomic(&mut self, pattern_entity: EntityId, host_entity: EntityId) -> bool {
        let checkpoint = self.result.len();
        let pattern_tail = self.pattern_frontier.len();
        let host_tail = self.host_frontier.len();

        self.result.insert(
            MatchObject::Entity(pattern_entity),
            MatchObject::Entity(host_entity),
        );
        let mut success = true;

        for &port in self.pattern[pattern_entity].ports() {
            let key = MatchObject::Port(port);
            match self.result.get(&key) {
                None => {
                    self.pattern_frontier.push(key.clone());
                    self.pattern_objects.insert(key);
                }
                Some(&MatchObject::Port(bound)) if self.host[bound].owner() == host_entity => {}
                Some(_) => {
                    success = false;
                    break;
                }
            }
        }

        if success {
            for &port in self.host[host_entity].ports() {
                let key = MatchObject::Port(port);
                if !self.result.contains_host(&key) {
                    self.host_frontier.push(key);
                }
            }
        }

        success = success && self.match_loop(pattern_tail, host_tail);

        if !success {
            self.result.retain(checkpoint);
            self.pattern_frontier.truncate(pattern_tail);
            self.host_frontier.truncate(host_tail);
        }
        success
    }

    /// Matches two composites: director compatibility on first
    /// entrance, then one unbound pattern child against each host child
    /// candidate in turn, backtracking between candidates.
    fn match_composite(&mut self, pattern_entity: EntityId, host_entity: EntityId) -> bool {
        let checkpoint = self.result.len();
        let first_entrance = !self
            .result
            .contains_pattern(&MatchObject::Entity(pattern_entity));
        let mut success = true;

        if first_entrance {
            self.result.insert(
                MatchObject::Entity(pattern_entity),
                MatchObject::Entity(host_entity),
            );
            success = self.match_director(pattern_entity, host_entity);
        }

        if success {
            let mut pattern_cursor = Vec::new();
            let pattern_child = find_first_child(
                self.pattern,
                pattern_entity,
                &mut pattern_cursor,
                self.result,
                Side::Pattern,
            );
            if let Some(pattern_child) = pattern_child {
                let checkpoint_inner = self.result.len();
                let pattern_tail = self.pattern_frontier.len();
                let host_tail = self.host_frontier.len();
                let visited_tail = self.visited_composites.len();
                if first_entrance {
                    self.visited_composites.push(pattern_entity);
                }

                let mut host_cursor = Vec::new();
                let mut host_child = find_first_child(
                    self.host,
                    host_entity,
                    &mut host_cursor,
                    self.result,
                    Side::Host,
                );

                success = false;
                while !success {
                    let Some(candidate) = host_child else {
                        break;
                    };
                    let pattern_key = MatchObject::Entity(pattern_child);
                    self.pattern_frontier.push(pattern_key.clone());
                    self.pattern_objects.insert(pattern_key);
                    self.host_frontier.push(MatchObject::Entity(candidate));

                    if self.match_entry_list(pattern_tail, host_tail) {
                        success = true;
                    } else {
                        self.result.retain(checkpoint_inner);
                        self.host_frontier.truncate(host_tail);
                        self.pattern_frontier.truncate(pattern_tail);
                        if first_entrance {
                            self.visited_composites.truncate(visited_tail + 1);
                        }
                        host_child = find_next_child(
                            self.host,
                            host_entity,
                            &mut host_cursor,
                            self.result,
                            Side::Host,
                        );
                    }
                }

                if !success && first_entrance {
                    self.visited_composites.pop();
                }
            } else {
                // No unbound children left under this composite.
                success = self.check_complete();
            }
        }

        if !success && first_entrance {
            self.result.retain(checkpoint);
        }
        success
    }

    /// Directors match when both composites are transparent, or both
    /// are opaque with exactly equal director kinds.
    fn match_director(&mut self, pattern_entity: EntityId, host_entity: EntityId) -> bool {
        let pattern_director = self.pattern[pattern_entity].director();
        let host_director = self.host[host_entity].director();
        match (pattern_director, host_director) {
            (None, None) => true,
            (Some(pattern_kind), Some(host_kind)) => {
                let checkpoint = self.result.len();
                self.result.insert(
                    MatchObject::Director(pattern_entity),
                    MatchObject::Director(host_entity),
                );
                let success = pattern_kind == host_kind;
                if !success {
                    self.result.retain(checkpoint);
                }
                success
            }
            _ => false,
        }
    }

    /// Revisits matched pattern composites, most recent first, to bind
    /// children in components not connected to anything matched so far.
    fn match_disconnected_components(&mut self) -> bool {
        if self.visited_composites.is_empty() {
            return self.check_complete();
        }
        let top = self.visited_composites.len();
        for index in (0..top).rev() {
            if index >= self.visited_composites.len() {
                continue;
            }
            let pattern_entity = self.visited_composites[index];
            let bound = self
                .result
                .get(&MatchObject::Entity(pattern_entity))
                .cloned();
            let Some(MatchObject::Entity(host_entity)) = bound else {
                return false;
            };
            if !self.match_composite(pattern_entity, host_entity) {
                return false;
            }
        }
        true
    }

    /// Matches two ports: direction compatibility, container
    /// correspondence, then the relation paths leaving each port.
    fn match_port(&mut self, pattern_port: PortId, host_port: PortId) -> bool {
        if !self.shallow_match_port(pattern_port, host_port) {
            return false;
        }

        let checkpoint = self.result.len();
        let pattern_tail = self.pattern_frontier.len();
        let host_tail = self.host_frontier.len();

        self.result
            .insert(MatchObject::Port(pattern_port), MatchObject::Port(host_port));
        let mut success = true;

        let pattern_container = self.pattern[pattern_port].owner();
        let container_key = MatchObject::Entity(pattern_container);
        match self.result.get(&container_key) {
            None => {
                self.pattern_frontier.push(container_key.clone());
                self.pattern_objects.insert(container_key);
            }
            Some(&MatchObject::Entity(bound)) if bound == self.host[host_port].owner() => {}
            Some(_) => success = false,
        }

        if success {
            let host_container = MatchObject::Entity(self.host[host_port].owner());
            if !self.result.contains_host(&host_container) {
                self.host_frontier.push(host_container);
            }
        }

        if success {
            for path in enumerate_paths(self.pattern, self.pattern_root, pattern_port) {
                let key = MatchObject::Path(path);
                match self.result.get(&key) {
                    None => {
                        self.pattern_frontier.push(key.clone());
                        self.pattern_objects.insert(key);
                    }
                    Some(MatchObject::Path(bound)) if bound.start_port() == host_port => {}
                    Some(_) => {
                        success = false;
                        break;
                    }
                }
            }
        }

        if success {
            for path in enumerate_paths(self.host, self.host_root, host_port) {
                let key = MatchObject::Path(path);
                if !self.result.contains_host(&key) {
                    self.host_frontier.push(key);
                }
            }
        }

        success = success && self.match_loop(pattern_tail, host_tail);

        if !success {
            self.result.retain(checkpoint);
            self.pattern_frontier.truncate(pattern_tail);
            self.host_frontier.truncate(host_tail);
        }
        success
    }

    /// Matches two paths by endpoint compatibility and queues their end
    /// ports.
    fn match_path(&mut self, pattern_path: &Path, host_path: &Path) -> bool {
        let checkpoint = self.result.len();
        let pattern_tail = self.pattern_frontier.len();
        let host_tail = self.host_frontier.len();

        self.result.insert(
            MatchObject::Path(pattern_path.clone()),
            MatchObject::Path(host_path.clone()),
        );
        let mut success = self.shallow_match_path(pattern_path, host_path);

        let pattern_end = pattern_path.end_port();
        let host_end = host_path.end_port();

        if success {
            let key = MatchObject::Port(pattern_end);
            match self.result.get(&key) {
                None => {
                    self.pattern_frontier.push(key.clone());
                    self.pattern_objects.insert(key);
                }
                Some(&MatchObject::Port(bound)) if bound == host_end => {}
                Some(_) => success = false,
            }
        }

        if success {
            let key = MatchObject::Port(host_end);
            if !self.result.contains_host(&key) {
                self.host_frontier.push(key);
            }
        }

        success = success && self.match_loop(pattern_tail, host_tail);

        if !success {
            self.result.retain(checkpoint);
            self.pattern_frontier.truncate(pattern_tail);
            self.host_frontier.truncate(host_tail);
        }
        success
    }

    fn shallow_match_path(&self, pattern_path: &Path, host_path: &Path) -> bool {
        self.shallow_match_port(pattern_path.start_port(), host_path.start_port())
            && self.shallow_match_port(pattern_path.end_port(), host_path.end_port())
    }

    /// A host port must offer every direction the pattern port demands.
    fn shallow_match_port(&self, pattern_port: PortId, host_port: PortId) -> bool {
        let pattern_record = &self.pattern[pattern_port];
        let host_record = &self.host[host_port];
        if pattern_record.is_input() && !host_record.is_input() {
            return false;
        }
        if pattern_record.is_output() && !host_record.is_output() {
            return false;
        }
        true
    }
}

fn is_bound(result: &MatchResult, side: Side, entity: EntityId) -> bool {
    let key = MatchObject::Entity(entity);
    match side {
        Side::Pattern => result.contains_pattern(&key),
        Side::Host => result.contains_host(&key),
    }
}

fn is_match_unit(net: &Network, entity: EntityId) -> bool {
    net[entity].kind() == EntityKind::Atomic || net.is_opaque(entity)
}

/// Finds the first unbound matchable descendant of `top`, flattening
/// transparent composites, and records the descent in `cursor` as
/// (parent, child-index) frames.
fn find_first_child(
    net: &Network,
    top: EntityId,
    cursor: &mut Vec<(EntityId, usize)>,
    result: &MatchResult,
    side: Side,
) -> Option<EntityId> {
    let tail = cursor.len();
    for index in 0..net[top].children().len() {
        let child = net[top].children()[index];
        if is_bound(result, side, child) {
            continue;
        }
        cursor.push((top, index));
        if is_match_unit(net, child) {
            return Some(child);
        }
        if let Some(descendant) = find_first_child(net, child, cursor, result, side) {
            return Some(descendant);
        }
        cursor.truncate(tail);
    }
    None
}

/// Advances `cursor` to the next unbound matchable descendant after the
/// one it currently points at.
fn find_next_child(
    net: &Network,
    top: EntityId,
    cursor: &mut Vec<(EntityId, usize)>,
    result: &MatchResult,
    side: Side,
) -> Option<EntityId> {
    if cursor.is_empty() {
        return find_first_child(net, top, cursor, result, side);
    }
    while let Some(&(parent, index)) = cursor.last() {
        let level = cursor.len() - 1;
        for next in index + 1..net[parent].children().len() {
            cursor[level] = (parent, next);
            let child = net[parent].children()[next];
            if is_bound(result, side, child) {
                continue;
            }
            cursor.truncate(level + 1);
            if is_match_unit(net, child) {
                return Some(child);
            }
            if let Some(descendant) = find_first_child(net, child, cursor, result, side) {
                return Some(descendant);
            }
        }
        cursor.pop();
    }
    None
}

/// Enumerates every relation walk leaving `start`, through transparent
/// composite boundaries, ending at ports of atomic entities or opaque
/// composites (`root` counts as opaque).
///
/// Objects on an emitted walk stay visited for the rest of the
/// enumeration, so no two walks share a relation or an end port.
fn enumerate_paths(net: &Network, root: EntityId, start: PortId) -> Vec<Path> {
    let mut paths = Vec::new();
    let mut visited_relations = FxHashSet::default();
    let mut visited_ports = FxHashSet::default();
    // Walks back to their own start are excluded.
    visited_ports.insert(start);
    let mut hops = Vec::new();
    walk_paths(
        net,
        root,
        start,
        start,
        &mut visited_relations,
        &mut visited_ports,
        &mut hops,
        &mut paths,
    );
    paths
}

#[allow(clippy::too_many_arguments)]
fn walk_paths(
    net: &Network,
    root: EntityId,
    start: PortId,
    from: PortId,
    visited_relations: &mut FxHashSet<RelationId>,
    visited_ports: &mut FxHashSet<PortId>,
    hops: &mut Vec<(RelationId, PortId)>,
    paths: &mut Vec<Path>,
) -> usize {
    let mut emitted = 0;
    for relation in net.linked_relations(from) {
        if visited_relations.contains(&relation) {
            continue;
        }
        visited_relations.insert(relation);
        let mut emitted_through = 0;
        for index in 0..net[relation].ports().len() {
            let port = net[relation].ports()[index];
            if visited_ports.contains(&port) {
                continue;
            }
            visited_ports.insert(port);
            hops.push((relation, port));
            let owner = net[port].owner();
            let transparent = owner != root
                && net[owner].kind() == EntityKind::Composite
                && !net.is_opaque(owner);
            let emitted_below = if transparent {
                walk_paths(
                    net,
                    root,
                    start,
                    port,
                    visited_relations,
                    visited_ports,
                    hops,
                    paths,
                )
            } else {
                paths.push(Path::new(start, hops.clone()));
                1
            };
            hops.pop();
            if emitted_below == 0 {
                visited_ports.remove(&port);
            }
            emitted_through += emitted_below;
        }
        if emitted_through == 0 {
            visited_relations.remove(&relation);
        }
        emitted += emitted_through;
    }
    emitted
}
