// SPDX-License-Identifier: Apache-2.0
//! Dependency queries on atomic interfaces and inferred composite
//! interfaces.

use cadence_core::{
    CausalityError, CompositeCausality, DefaultCausality, Delay, Dependency, EntityId,
    InterfaceRegistry, Network, PortId, Reachable,
};

/// A composite with one boundary input and one boundary output.
fn boundary(net: &mut Network) -> (EntityId, PortId, PortId) {
    let composite = net.add_composite("top", None).expect("add composite");
    let input = net.add_input_port(composite, "in");
    let output = net.add_output_port(composite, "out");
    (composite, input, output)
}

/// Adds an actor with one input and one output under `parent` and wires
/// `from` to its input. Returns the actor and its ports.
fn chain_actor(
    net: &mut Network,
    parent: EntityId,
    name: &str,
    from: PortId,
) -> (EntityId, PortId, PortId) {
    let actor = net.add_atomic(name, parent).expect("add actor");
    let input = net.add_input_port(actor, "in");
    let output = net.add_output_port(actor, "out");
    let wire = net
        .add_relation(parent, format!("{name}_in_wire"))
        .expect("add wire");
    net.link(from, wire).expect("link from");
    net.link(input, wire).expect("link actor input");
    (actor, input, output)
}

/// Wires `from` to the boundary output `to`.
fn wire_to_output(net: &mut Network, parent: EntityId, name: &str, from: PortId, to: PortId) {
    let wire = net.add_relation(parent, name).expect("add wire");
    net.link(from, wire).expect("link from");
    net.link(to, wire).expect("link boundary output");
}

#[test]
fn atomic_dependency_defaults_to_the_configured_value() {
    let mut net = Network::new();
    let root = net.add_composite("top", None).expect("root");
    let actor = net.add_atomic("delay", root).expect("actor");
    let input = net.add_input_port(actor, "in");
    let output = net.add_output_port(actor, "out");

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(actor, Delay::of(2.0))));

    let dependency = registry
        .dependency(&net, actor, input, output)
        .expect("dependency query");
    assert_eq!(dependency, Delay::of(2.0));

    registry
        .remove_dependency(&net, actor, input, output)
        .expect("remove dependency");
    let pruned = registry
        .dependency(&net, actor, input, output)
        .expect("dependency query after pruning");
    assert_eq!(pruned, Delay::o_plus_identity());
}

#[test]
fn atomic_dependent_ports_shrink_under_pruning() {
    let mut net = Network::new();
    let root = net.add_composite("top", None).expect("root");
    let actor = net.add_atomic("mix", root).expect("actor");
    let in1 = net.add_input_port(actor, "in1");
    let in2 = net.add_input_port(actor, "in2");
    let out = net.add_output_port(actor, "out");

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(actor, Reachable(true))));

    assert_eq!(
        registry.dependent_ports(&net, actor, out).expect("outputs"),
        vec![in1, in2]
    );
    registry
        .remove_dependency(&net, actor, in1, out)
        .expect("remove");
    assert_eq!(
        registry.dependent_ports(&net, actor, out).expect("outputs"),
        vec![in2]
    );
    assert!(
        registry
            .dependent_ports(&net, actor, in1)
            .expect("inputs")
            .is_empty(),
        "the pruned input must reach no outputs"
    );
}

#[test]
fn atomic_equivalence_classes_split_under_pruning() {
    let mut net = Network::new();
    let root = net.add_composite("top", None).expect("root");
    let actor = net.add_atomic("split", root).expect("actor");
    let in1 = net.add_input_port(actor, "in1");
    let in2 = net.add_input_port(actor, "in2");
    let out1 = net.add_output_port(actor, "out1");
    let out2 = net.add_output_port(actor, "out2");

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(actor, Reachable(true))));

    // Without pruning, every output depends on every input, so the
    // inputs form one class.
    assert_eq!(
        registry.equivalent_ports(&net, actor, in1).expect("class"),
        vec![in1, in2]
    );

    // Sever the cross pairs: in1 now feeds only out1, in2 only out2.
    registry
        .remove_dependency(&net, actor, in1, out2)
        .expect("remove");
    registry
        .remove_dependency(&net, actor, in2, out1)
        .expect("remove");
    assert_eq!(
        registry.equivalent_ports(&net, actor, in1).expect("class"),
        vec![in1]
    );
    assert_eq!(
        registry.equivalent_ports(&net, actor, in2).expect("class"),
        vec![in2]
    );
}

#[test]
fn equivalent_ports_rejects_non_inputs() {
    let mut net = Network::new();
    let root = net.add_composite("top", None).expect("root");
    let actor = net.add_atomic("a", root).expect("actor");
    let _input = net.add_input_port(actor, "in");
    let output = net.add_output_port(actor, "out");

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(actor, Reachable(true))));

    assert!(matches!(
        registry.equivalent_ports(&net, actor, output),
        Err(CausalityError::NotAnInput(_))
    ));
}

#[test]
fn composite_chain_accumulates_delay() {
    let mut net = Network::new();
    let (top, top_in, top_out) = boundary(&mut net);
    let (first, _, first_out) = chain_actor(&mut net, top, "first", top_in);
    let (second, _, second_out) = chain_actor(&mut net, top, "second", first_out);
    wire_to_output(&mut net, top, "out_wire", second_out, top_out);

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(first, Delay::of(2.0))));
    registry.register(Box::new(DefaultCausality::new(second, Delay::of(0.5))));
    registry.register(Box::new(CompositeCausality::new(top, Delay::of(0.0))));

    let dependency = registry
        .dependency(&net, top, top_in, top_out)
        .expect("chain dependency");
    assert_eq!(dependency, Delay::of(2.5), "serial hops must add delays");
}

#[test]
fn parallel_paths_keep_the_smaller_delay() {
    let mut net = Network::new();
    let (top, top_in, top_out) = boundary(&mut net);
    let (fast, _, fast_out) = chain_actor(&mut net, top, "fast", top_in);
    let (slow, _, slow_out) = chain_actor(&mut net, top, "slow", top_in);
    wire_to_output(&mut net, top, "fast_out_wire", fast_out, top_out);
    wire_to_output(&mut net, top, "slow_out_wire", slow_out, top_out);

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(fast, Delay::of(1.0))));
    registry.register(Box::new(DefaultCausality::new(slow, Delay::of(5.0))));
    registry.register(Box::new(CompositeCausality::new(top, Delay::of(0.0))));

    let dependency = registry
        .dependency(&net, top, top_in, top_out)
        .expect("diamond dependency");
    assert_eq!(dependency, Delay::of(1.0), "parallel paths must take the minimum");
}

#[test]
fn boundary_inputs_feeding_one_actor_become_equivalent() {
    let mut net = Network::new();
    let top = net.add_composite("top", None).expect("composite");
    let in1 = net.add_input_port(top, "in1");
    let in2 = net.add_input_port(top, "in2");
    let top_out = net.add_output_port(top, "out");

    let merger = net.add_atomic("merger", top).expect("merger");
    let m_in1 = net.add_input_port(merger, "a");
    let m_in2 = net.add_input_port(merger, "b");
    let m_out = net.add_output_port(merger, "out");
    for (name, from, to) in [("w1", in1, m_in1), ("w2", in2, m_in2)] {
        let wire = net.add_relation(top, name).expect("wire");
        net.link(from, wire).expect("link boundary");
        net.link(to, wire).expect("link actor");
    }
    wire_to_output(&mut net, top, "w3", m_out, top_out);

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(merger, Reachable(true))));
    registry.register(Box::new(CompositeCausality::new(top, Reachable(true))));

    let class = registry.equivalent_ports(&net, top, in1).expect("class");
    assert_eq!(class, vec![in1, in2], "inputs merged by one actor share a class");
    let class = registry.equivalent_ports(&net, top, in2).expect("class");
    assert_eq!(class, vec![in1, in2]);
}

#[test]
fn composite_cache_follows_structural_changes() {
    let mut net = Network::new();
    let (top, top_in, top_out) = boundary(&mut net);
    let (actor, _, actor_out) = chain_actor(&mut net, top, "only", top_in);
    wire_to_output(&mut net, top, "out_wire", actor_out, top_out);

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(actor, Delay::of(2.0))));
    registry.register(Box::new(CompositeCausality::new(top, Delay::of(0.0))));

    let before = registry
        .dependency(&net, top, top_in, top_out)
        .expect("before");
    assert_eq!(before, Delay::of(2.0));

    // A faster bypass path appears; the cached analysis must be rebuilt.
    let (bypass, _, bypass_out) = chain_actor(&mut net, top, "bypass", top_in);
    wire_to_output(&mut net, top, "bypass_out_wire", bypass_out, top_out);
    registry.register(Box::new(DefaultCausality::new(bypass, Delay::of(0.5))));

    let after = registry
        .dependency(&net, top, top_in, top_out)
        .expect("after");
    assert_eq!(after, Delay::of(0.5), "rebuild must see the new wiring");
}

#[test]
fn composite_pruning_survives_a_rebuild() {
    let mut net = Network::new();
    let (top, top_in, top_out) = boundary(&mut net);
    let (actor, _, actor_out) = chain_actor(&mut net, top, "only", top_in);
    wire_to_output(&mut net, top, "out_wire", actor_out, top_out);

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(actor, Delay::of(2.0))));
    registry.register(Box::new(CompositeCausality::new(top, Delay::of(0.0))));

    registry
        .remove_dependency(&net, top, top_in, top_out)
        .expect("remove");
    assert_eq!(
        registry.dependency(&net, top, top_in, top_out).expect("pruned"),
        Delay::o_plus_identity()
    );

    // Unrelated structural change forces a recompute; the removal must
    // be applied again on top of it.
    net.add_atomic("bystander", top).expect("bystander");
    assert_eq!(
        registry
            .dependency(&net, top, top_in, top_out)
            .expect("pruned after rebuild"),
        Delay::o_plus_identity()
    );
}

#[test]
fn reachability_semiring_reports_connected_pairs_only() {
    let mut net = Network::new();
    let top = net.add_composite("top", None).expect("composite");
    let in1 = net.add_input_port(top, "in1");
    let in2 = net.add_input_port(top, "in2");
    let out1 = net.add_output_port(top, "out1");
    let out2 = net.add_output_port(top, "out2");

    // Two independent lanes: in1 -> a -> out1, in2 -> b -> out2.
    let (a, _, a_out) = chain_actor(&mut net, top, "a", in1);
    let (b, _, b_out) = chain_actor(&mut net, top, "b", in2);
    wire_to_output(&mut net, top, "wa", a_out, out1);
    wire_to_output(&mut net, top, "wb", b_out, out2);

    let mut registry = InterfaceRegistry::new();
    registry.register(Box::new(DefaultCausality::new(a, Reachable(true))));
    registry.register(Box::new(DefaultCausality::new(b, Reachable(true))));
    registry.register(Box::new(CompositeCausality::new(top, Reachable(true))));

    assert_eq!(
        registry.dependency(&net, top, in1, out1).expect("lane a"),
        Reachable(true)
    );
    assert_eq!(
        registry.dependency(&net, top, in1, out2).expect("cross"),
        Reachable(false),
        "independent lanes must not reach each other"
    );
    assert_eq!(
        registry.dependent_ports(&net, top, in1).expect("reached"),
        vec![out1]
    );
    assert_eq!(
        registry.dependent_ports(&net, top, out2).expect("reaching"),
        vec![in2]
    );
}
