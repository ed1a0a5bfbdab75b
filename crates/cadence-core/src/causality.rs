// SPDX-License-Identifier: Apache-2.0
//! Causality interfaces: which outputs depend on which inputs, and how.
//!
//! A causality interface answers, for one entity, the dependency of each
//! of its output ports on each of its input ports, expressed in a
//! [`Dependency`] semiring. [`DefaultCausality`] describes an atomic
//! entity where every output depends on every input with one default
//! dependency, minus explicitly removed pairs. [`CompositeCausality`]
//! infers a composite's interface from the interfaces of its contained
//! entities and the inside wiring, by propagating dependencies from each
//! boundary input across the graph: serial hops compose with `o_times`,
//! parallel paths merge with `o_plus`, and propagation continues only
//! while values still change.
//!
//! Interfaces reach each other through a [`CausalityResolver`], normally
//! an [`InterfaceRegistry`]. Composite results are cached against
//! [`Network::version`] and rebuilt lazily after structural changes.
//! Interfaces use interior mutability for their caches and are intended
//! for single-threaded use.
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::dependency::Dependency;
use crate::ident::{EntityId, PortId};
use crate::network::Network;

/// Errors reported by causality interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CausalityError {
    /// The argument must be an input port of the associated entity.
    #[error("`{0}` is not an input port of the associated entity")]
    NotAnInput(String),
    /// The argument is not a port of the associated entity.
    #[error("`{port}` is not a port of `{entity}`")]
    NotAPort {
        /// Full name of the offending port.
        port: String,
        /// Full name of the associated entity.
        entity: String,
    },
    /// A contained entity has no interface in the resolver.
    #[error("no causality interface registered for `{0}`")]
    MissingInterface(String),
}

/// The causality interface of one entity.
///
/// All query methods take the network and a resolver so that composite
/// interfaces can recurse into the interfaces of contained entities.
pub trait Causality<D: Dependency> {
    /// The entity this interface describes.
    fn entity(&self) -> EntityId;

    /// Dependency of `output` on `input`. Returns the o-plus identity
    /// when there is no dependency, including when the ports are not an
    /// input/output pair of the associated entity.
    fn dependency(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        input: PortId,
        output: PortId,
    ) -> Result<D, CausalityError>;

    /// Ports of the associated entity that depend on, or are depended
    /// on by, the given port: the inputs reaching an output, or the
    /// outputs reachable from an input.
    fn dependent_ports(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        port: PortId,
    ) -> Result<Vec<PortId>, CausalityError>;

    /// Input ports in the same equivalence class as `input`, always
    /// including `input` itself. Two inputs are equivalent when some
    /// output depends on both, directly or transitively.
    fn equivalent_ports(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        input: PortId,
    ) -> Result<Vec<PortId>, CausalityError>;

    /// Declares that `output` does not depend on `input`; subsequent
    /// [`Causality::dependency`] calls for the pair return the o-plus
    /// identity, and the dependent-port sets shrink accordingly.
    fn remove_dependency(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        input: PortId,
        output: PortId,
    ) -> Result<(), CausalityError>;
}

/// Resolves the causality interface of a contained entity.
pub trait CausalityResolver<D: Dependency> {
    /// The interface registered for `entity`, if any.
    fn interface_of(&self, entity: EntityId) -> Option<&dyn Causality<D>>;
}

/// Owning map from entities to their causality interfaces.
pub struct InterfaceRegistry<D: Dependency> {
    interfaces: FxHashMap<EntityId, Box<dyn Causality<D>>>,
}

impl<D: Dependency> Default for InterfaceRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dependency> InterfaceRegistry<D> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interfaces: FxHashMap::default(),
        }
    }

    /// Registers an interface under its own entity, replacing any
    /// previous interface for that entity.
    pub fn register(&mut self, interface: Box<dyn Causality<D>>) {
        self.interfaces.insert(interface.entity(), interface);
    }

    /// Dependency of `output` on `input` through the interface of
    /// `entity`, with this registry as the resolver.
    pub fn dependency(
        &self,
        net: &Network,
        entity: EntityId,
        input: PortId,
        output: PortId,
    ) -> Result<D, CausalityError> {
        self.require(net, entity)?.dependency(net, self, input, output)
    }

    /// Dependent ports of `port` through the interface of `entity`.
    pub fn dependent_ports(
        &self,
        net: &Network,
        entity: EntityId,
        port: PortId,
    ) -> Result<Vec<PortId>, CausalityError> {
        self.require(net, entity)?.dependent_ports(net, self, port)
    }

    /// Equivalence class of `input` through the interface of `entity`.
    pub fn equivalent_ports(
        &self,
        net: &Network,
        entity: EntityId,
        input: PortId,
    ) -> Result<Vec<PortId>, CausalityError> {
        self.require(net, entity)?.equivalent_ports(net, self, input)
    }

    /// Removes the dependency of `output` on `input` in the interface
    /// of `entity`.
    pub fn remove_dependency(
        &self,
        net: &Network,
        entity: EntityId,
        input: PortId,
        output: PortId,
    ) -> Result<(), CausalityError> {
        self.require(net, entity)?
            .remove_dependency(net, self, input, output)
    }

    fn require(
        &self,
        net: &Network,
        entity: EntityId,
    ) -> Result<&dyn Causality<D>, CausalityError> {
        self.interface_of(entity)
            .ok_or_else(|| CausalityError::MissingInterface(net.full_name(entity)))
    }
}

impl<D: Dependency> CausalityResolver<D> for InterfaceRegistry<D> {
    fn interface_of(&self, entity: EntityId) -> Option<&dyn Causality<D>> {
        self.interfaces.get(&entity).map(AsRef::as_ref)
    }
}

#[derive(Debug, Default)]
struct PrunedPairs {
    /// input -> outputs whose dependency on it was removed.
    forward: FxHashMap<PortId, FxHashSet<PortId>>,
    /// output -> inputs it no longer depends on.
    backward: FxHashMap<PortId, FxHashSet<PortId>>,
}

impl PrunedPairs {
    fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    fn contains(&self, input: PortId, output: PortId) -> bool {
        self.forward
            .get(&input)
            .is_some_and(|outputs| outputs.contains(&output))
    }

    fn insert(&mut self, input: PortId, output: PortId) {
        self.forward.entry(input).or_default().insert(output);
        self.backward.entry(output).or_default().insert(input);
    }
}

/// Causality interface for an atomic entity: every output depends on
/// every input with one default dependency, minus removed pairs.
#[derive(Debug)]
pub struct DefaultCausality<D> {
    entity: EntityId,
    default_dependency: D,
    pruned: RefCell<PrunedPairs>,
}

impl<D: Dependency> DefaultCausality<D> {
    /// Creates an interface where every output depends on every input
    /// with `default_dependency`.
    pub fn new(entity: EntityId, default_dependency: D) -> Self {
        Self {
            entity,
            default_dependency,
            pruned: RefCell::new(PrunedPairs::default()),
        }
    }

    /// The default dependency of an output on an input.
    pub fn default_dependency(&self) -> &D {
        &self.default_dependency
    }

    /// Transitive closure over the remaining dependencies: adds `input`
    /// to `inputs`, then every input sharing a still-dependent output.
    fn grow_dependencies(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        input: PortId,
        inputs: &mut Vec<PortId>,
        outputs: &mut Vec<PortId>,
    ) -> Result<(), CausalityError> {
        if inputs.contains(&input) {
            return Ok(());
        }
        inputs.push(input);
        for output in self.dependent_ports(net, resolver, input)? {
            if outputs.contains(&output) {
                continue;
            }
            outputs.push(output);
            for other_input in self.dependent_ports(net, resolver, output)? {
                self.grow_dependencies(net, resolver, other_input, inputs, outputs)?;
            }
        }
        Ok(())
    }
}

impl<D: Dependency> Causality<D> for DefaultCausality<D> {
    fn entity(&self) -> EntityId {
        self.entity
    }

    fn dependency(
        &self,
        net: &Network,
        _resolver: &dyn CausalityResolver<D>,
        input: PortId,
        output: PortId,
    ) -> Result<D, CausalityError> {
        let input_record = &net[input];
        let output_record = &net[output];
        let owned_pair = input_record.is_input()
            && input_record.owner() == self.entity
            && output_record.is_output()
            && output_record.owner() == self.entity;
        if !owned_pair || self.pruned.borrow().contains(input, output) {
            return Ok(D::o_plus_identity());
        }
        Ok(self.default_dependency.clone())
    }

    fn dependent_ports(
        &self,
        net: &Network,
        _resolver: &dyn CausalityResolver<D>,
        port: PortId,
    ) -> Result<Vec<PortId>, CausalityError> {
        let record = &net[port];
        if record.owner() != self.entity {
            return Err(CausalityError::NotAPort {
                port: net.port_full_name(port),
                entity: net.full_name(self.entity),
            });
        }
        let pruned = self.pruned.borrow();
        let mut result = Vec::new();
        if record.is_output() {
            for input in net.input_ports(self.entity) {
                let removed = pruned
                    .backward
                    .get(&port)
                    .is_some_and(|inputs| inputs.contains(&input));
                if !removed && !result.contains(&input) {
                    result.push(input);
                }
            }
        }
        if record.is_input() {
            for output in net.output_ports(self.entity) {
                let removed = pruned
                    .forward
                    .get(&port)
                    .is_some_and(|outputs| outputs.contains(&output));
                if !removed && !result.contains(&output) {
                    result.push(output);
                }
            }
        }
        Ok(result)
    }

    fn equivalent_ports(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        input: PortId,
    ) -> Result<Vec<PortId>, CausalityError> {
        let record = &net[input];
        if record.owner() != self.entity || !record.is_input() {
            return Err(CausalityError::NotAnInput(net.port_full_name(input)));
        }
        let inputs = net.input_ports(self.entity);
        // Without pruning, a shared dependence on every output puts all
        // inputs in one class. Likewise when there is nothing to split
        // the class on.
        if self.pruned.borrow().is_empty()
            || inputs.len() == 1
            || net.output_ports(self.entity).is_empty()
        {
            return Ok(inputs);
        }
        let mut class = Vec::new();
        let mut seen_outputs = Vec::new();
        self.grow_dependencies(net, resolver, input, &mut class, &mut seen_outputs)?;
        class.sort_unstable();
        Ok(class)
    }

    fn remove_dependency(
        &self,
        _net: &Network,
        _resolver: &dyn CausalityResolver<D>,
        input: PortId,
        output: PortId,
    ) -> Result<(), CausalityError> {
        self.pruned.borrow_mut().insert(input, output);
        Ok(())
    }
}

/// Cached analysis results for one composite, valid for one network
/// version.
#[derive(Debug)]
struct CompositeCache<D> {
    version: u64,
    /// composite input -> composite output -> dependency.
    forward: FxHashMap<PortId, FxHashMap<PortId, D>>,
    /// composite output -> composite input -> dependency.
    reverse: FxHashMap<PortId, FxHashMap<PortId, D>>,
    /// Equivalence classes of composite inputs. Members of one class
    /// share the identical set.
    classes: FxHashMap<PortId, Rc<FxHashSet<PortId>>>,
}

/// Causality interface of a composite, inferred from the interfaces of
/// its contained entities and the inside wiring.
pub struct CompositeCausality<D> {
    entity: EntityId,
    default_dependency: D,
    cache: RefCell<Option<CompositeCache<D>>>,
    removed: RefCell<FxHashSet<(PortId, PortId)>>,
}

impl<D: Dependency> CompositeCausality<D> {
    /// Creates an interface for the given composite. The default
    /// dependency only fixes the semiring identities used during
    /// propagation.
    pub fn new(entity: EntityId, default_dependency: D) -> Self {
        Self {
            entity,
            default_dependency,
            cache: RefCell::new(None),
            removed: RefCell::new(FxHashSet::default()),
        }
    }

    /// Rebuilds the cached analysis if the network changed since the
    /// last build.
    ///
    /// The whole analysis runs on local state and is stored at the end,
    /// so resolver recursion into other interfaces never observes a
    /// half-built cache. The `owner != self.entity` guard in the
    /// propagation keeps the recursion from re-entering this interface.
    fn ensure_cache(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
    ) -> Result<(), CausalityError> {
        let current = net.version();
        if self
            .cache
            .borrow()
            .as_ref()
            .is_some_and(|cache| cache.version == current)
        {
            return Ok(());
        }
        let mut cache = CompositeCache {
            version: current,
            forward: FxHashMap::default(),
            reverse: FxHashMap::default(),
            classes: FxHashMap::default(),
        };
        let inputs = net.input_ports(self.entity);
        for &input in &inputs {
            // Every input starts in a class of its own, so equivalent
            // port queries always return at least the input itself.
            let mut just_the_input = FxHashSet::default();
            just_the_input.insert(input);
            cache.classes.insert(input, Rc::new(just_the_input));
        }
        let mut propagation = Propagation {
            entity: self.entity,
            net,
            resolver,
            depends_on_inputs: FxHashMap::default(),
            cache: &mut cache,
        };
        for input in inputs {
            propagation.run(input)?;
        }
        for &(input, output) in self.removed.borrow().iter() {
            if let Some(outputs) = cache.forward.get_mut(&input) {
                outputs.remove(&output);
            }
            if let Some(entries) = cache.reverse.get_mut(&output) {
                entries.remove(&input);
            }
        }
        #[cfg(feature = "telemetry")]
        crate::telemetry::causality_rebuild(&net.full_name(self.entity), current);
        *self.cache.borrow_mut() = Some(cache);
        Ok(())
    }
}

impl<D: Dependency> Causality<D> for CompositeCausality<D> {
    fn entity(&self) -> EntityId {
        self.entity
    }

    fn dependency(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        input: PortId,
        output: PortId,
    ) -> Result<D, CausalityError> {
        self.ensure_cache(net, resolver)?;
        let cache = self.cache.borrow();
        let recorded = cache
            .as_ref()
            .and_then(|cache| cache.forward.get(&input))
            .and_then(|outputs| outputs.get(&output))
            .cloned();
        Ok(recorded.unwrap_or_else(D::o_plus_identity))
    }

    /// Does not support ports that are both input and output; such a
    /// port is treated as an output.
    fn dependent_ports(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        port: PortId,
    ) -> Result<Vec<PortId>, CausalityError> {
        let record = &net[port];
        if record.owner() != self.entity {
            return Err(CausalityError::NotAPort {
                port: net.port_full_name(port),
                entity: net.full_name(self.entity),
            });
        }
        self.ensure_cache(net, resolver)?;
        let cache = self.cache.borrow();
        let mut result: Vec<PortId> = if record.is_output() {
            cache
                .as_ref()
                .and_then(|cache| cache.reverse.get(&port))
                .map(|entries| entries.keys().copied().collect())
                .unwrap_or_default()
        } else if record.is_input() {
            cache
                .as_ref()
                .and_then(|cache| cache.forward.get(&port))
                .map(|entries| entries.keys().copied().collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        result.sort_unstable();
        Ok(result)
    }

    fn equivalent_ports(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        input: PortId,
    ) -> Result<Vec<PortId>, CausalityError> {
        let record = &net[input];
        if record.owner() != self.entity || !record.is_input() {
            return Err(CausalityError::NotAnInput(net.port_full_name(input)));
        }
        self.ensure_cache(net, resolver)?;
        let cache = self.cache.borrow();
        let mut class: Vec<PortId> = cache
            .as_ref()
            .and_then(|cache| cache.classes.get(&input))
            .map(|class| class.iter().copied().collect())
            .unwrap_or_else(|| vec![input]);
        class.sort_unstable();
        Ok(class)
    }

    fn remove_dependency(
        &self,
        net: &Network,
        resolver: &dyn CausalityResolver<D>,
        input: PortId,
        output: PortId,
    ) -> Result<(), CausalityError> {
        self.ensure_cache(net, resolver)?;
        self.removed.borrow_mut().insert((input, output));
        let mut cache = self.cache.borrow_mut();
        if let Some(cache) = cache.as_mut() {
            if let Some(outputs) = cache.forward.get_mut(&input) {
                outputs.remove(&output);
            }
            if let Some(entries) = cache.reverse.get_mut(&output) {
                entries.remove(&input);
            }
        }
        Ok(())
    }
}

impl<D: Dependency> core::fmt::Debug for CompositeCausality<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompositeCausality")
            .field("entity", &self.entity)
            .field("default_dependency", &self.default_dependency)
            .finish_non_exhaustive()
    }
}

/// One full propagation pass over a composite's inside wiring.
struct Propagation<'a, D: Dependency> {
    entity: EntityId,
    net: &'a Network,
    resolver: &'a dyn CausalityResolver<D>,
    /// For each visited port, the composite inputs it depends on; used
    /// to build the equivalence classes.
    depends_on_inputs: FxHashMap<PortId, Rc<FxHashSet<PortId>>>,
    cache: &'a mut CompositeCache<D>,
}

impl<D: Dependency> Propagation<'_, D> {
    /// Propagates dependencies from one composite input to every
    /// reachable port, breadth-first over the inside wiring. A port is
    /// reprocessed only when its accumulated dependency changed.
    fn run(&mut self, input: PortId) -> Result<(), CausalityError> {
        let mut map: FxHashMap<PortId, D> = FxHashMap::default();
        let mut frontier = self.net.inside_sinks(input);
        for &port in &frontier {
            map.insert(port, D::o_times_identity());
        }
        while !frontier.is_empty() {
            let mut next: Vec<PortId> = Vec::new();
            for port in frontier {
                let Some(dependency) = map.get(&port).cloned() else {
                    continue;
                };
                let record = &self.net[port];
                if record.owner() == self.entity {
                    // Reached the boundary. An output terminates a
                    // path; an input at this point is tolerated but
                    // carries no dependency.
                    if record.is_output() {
                        self.record(input, port, &mut map, dependency)?;
                    }
                    continue;
                }
                self.record(input, port, &mut map, dependency.clone())?;
                let actor = record.owner();
                let interface = self.resolver.interface_of(actor).ok_or_else(|| {
                    CausalityError::MissingInterface(self.net.full_name(actor))
                })?;
                for output in self.net.output_ports(actor) {
                    let across = interface.dependency(self.net, self.resolver, port, output)?;
                    let reached = dependency.o_times(&across);
                    if self.record(input, output, &mut map, reached.clone())? {
                        for sink in self.net.sinks(output) {
                            self.record(input, sink, &mut map, reached.clone())?;
                            if self.net[sink].owner() != self.entity && !next.contains(&sink) {
                                next.push(sink);
                            }
                        }
                    }
                }
            }
            frontier = next;
        }
        Ok(())
    }

    /// Records that `port` depends on the composite input `input` with
    /// `dependency`, merging with any prior value via `o_plus`. Updates
    /// the equivalence classes, and the boundary maps when `port`
    /// belongs to the composite. Returns whether the recorded value
    /// changed.
    fn record(
        &mut self,
        input: PortId,
        port: PortId,
        map: &mut FxHashMap<PortId, D>,
        dependency: D,
    ) -> Result<bool, CausalityError> {
        if dependency == D::o_plus_identity() {
            return Ok(false);
        }
        // Merge the class of the source input with everything this port
        // is already known to depend on.
        let mut merged: FxHashSet<PortId> = self
            .cache
            .classes
            .get(&input)
            .map(|class| (**class).clone())
            .unwrap_or_else(|| {
                let mut just_the_input = FxHashSet::default();
                just_the_input.insert(input);
                just_the_input
            });
        if let Some(depends) = self.depends_on_inputs.get(&port) {
            merged.extend(depends.iter().copied());
        }
        // An input of a contained entity drags in the dependencies of
        // its own equivalence class.
        let record = &self.net[port];
        if record.is_input() && record.owner() != self.entity {
            let owner = record.owner();
            let interface = self
                .resolver
                .interface_of(owner)
                .ok_or_else(|| CausalityError::MissingInterface(self.net.full_name(owner)))?;
            for equivalent in interface.equivalent_ports(self.net, self.resolver, port)? {
                let Some(other_inputs) = self.depends_on_inputs.get(&equivalent).cloned() else {
                    continue;
                };
                merged.extend(other_inputs.iter().copied());
                for &dependent_input in other_inputs.iter() {
                    if let Some(class) = self.cache.classes.get(&dependent_input).cloned() {
                        merged.extend(class.iter().copied());
                    }
                }
            }
        }
        let merged = Rc::new(merged);
        for &member in merged.iter() {
            self.cache.classes.insert(member, Rc::clone(&merged));
        }
        self.depends_on_inputs.insert(port, Rc::clone(&merged));

        let (stored, changed) = match map.get(&port) {
            None => (dependency, true),
            Some(prior) => {
                let combined = prior.o_plus(&dependency);
                let changed = combined != *prior;
                (combined, changed)
            }
        };
        if changed {
            map.insert(port, stored.clone());
        }
        if record.owner() == self.entity {
            self.cache
                .forward
                .entry(input)
                .or_default()
                .insert(port, stored.clone());
            self.cache
                .reverse
                .entry(port)
                .or_default()
                .insert(input, stored);
        }
        Ok(changed)
    }
}
