// SPDX-License-Identifier: Apache-2.0
//! Backtracking behaviour: candidate retries, match enumeration through
//! a declining callback, disconnected pattern components, hierarchy
//! flattening, and director compatibility.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use cadence_core::{make_director_kind, GraphMatcher, MatchObject, MatchResult, Network};
use common::{add_wired_pair, transparent_root};

#[test]
fn search_retries_candidates_until_the_wired_pair_is_found() {
    let mut pattern = Network::new();
    let pattern_root = transparent_root(&mut pattern);
    let p = add_wired_pair(&mut pattern, pattern_root, "p");

    let mut host = Network::new();
    let host_root = transparent_root(&mut host);
    // Actors with the right ports but no wiring come first, so the
    // search must bind and then abandon them.
    let lure = host.add_atomic("lure", host_root).expect("lure");
    host.add_output_port(lure, "out");
    let deaf = host.add_atomic("deaf", host_root).expect("deaf");
    host.add_input_port(deaf, "in");
    let h = add_wired_pair(&mut host, host_root, "h");

    let mut matcher = GraphMatcher::new();
    assert!(
        matcher.match_graphs(&pattern, pattern_root, &host, host_root),
        "the search must back out of the unwired lures"
    );

    // The accepted match must be the wired pair, not a lure.
    let result = matcher.match_result();
    assert_eq!(
        result.get(&MatchObject::Entity(p.source)),
        Some(&MatchObject::Entity(h.source))
    );
    assert_eq!(
        result.get(&MatchObject::Entity(p.sink)),
        Some(&MatchObject::Entity(h.sink))
    );
    assert!(
        !result.contains_host(&MatchObject::Entity(lure)),
        "the unwired lure must not appear in the final bindings"
    );
    assert!(!result.contains_host(&MatchObject::Entity(deaf)));
}

#[test]
fn an_accepted_match_under_nested_composites_is_reported_once() {
    // A transparent root holding one opaque composite with one child,
    // so the successful unwind revisits more than one composite.
    fn build(net: &mut Network) -> cadence_core::EntityId {
        let root = transparent_root(net);
        let inner = net.add_composite("inner", Some(root)).expect("inner");
        net.set_director(inner, Some(make_director_kind("discrete-event")))
            .expect("director");
        net.add_atomic("leaf", inner).expect("leaf");
        root
    }

    let mut pattern = Network::new();
    let pattern_root = build(&mut pattern);
    let mut host = Network::new();
    let host_root = build(&mut host);

    let seen = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&seen);
    let mut matcher = GraphMatcher::new();
    matcher.set_callback(Box::new(move |_: &MatchResult| {
        counter.set(counter.get() + 1);
        true
    }));

    assert!(matcher.match_graphs(&pattern, pattern_root, &host, host_root));
    assert_eq!(
        seen.get(),
        1,
        "an accepted match must reach the callback exactly once"
    );
}

#[test]
fn a_declining_callback_enumerates_every_match() {
    let mut pattern = Network::new();
    let pattern_root = transparent_root(&mut pattern);
    add_wired_pair(&mut pattern, pattern_root, "p");

    let mut host = Network::new();
    let host_root = transparent_root(&mut host);
    add_wired_pair(&mut host, host_root, "first");
    add_wired_pair(&mut host, host_root, "second");

    let seen = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&seen);
    let mut matcher = GraphMatcher::new();
    matcher.set_callback(Box::new(move |result: &MatchResult| {
        assert!(!result.is_empty(), "callback must observe complete matches");
        counter.set(counter.get() + 1);
        false
    }));

    assert!(
        !matcher.match_graphs(&pattern, pattern_root, &host, host_root),
        "declining every match must leave the search unsuccessful"
    );
    assert_eq!(seen.get(), 2, "one occurrence per wired pair");
    assert!(matcher.match_result().is_empty());
}

#[test]
fn an_accepting_callback_stops_at_the_first_match() {
    let mut pattern = Network::new();
    let pattern_root = transparent_root(&mut pattern);
    add_wired_pair(&mut pattern, pattern_root, "p");

    let mut host = Network::new();
    let host_root = transparent_root(&mut host);
    add_wired_pair(&mut host, host_root, "first");
    add_wired_pair(&mut host, host_root, "second");

    let seen = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&seen);
    let mut matcher = GraphMatcher::new();
    matcher.set_callback(Box::new(move |_: &MatchResult| {
        counter.set(counter.get() + 1);
        true
    }));

    assert!(matcher.match_graphs(&pattern, pattern_root, &host, host_root));
    assert_eq!(seen.get(), 1);
    assert!(!matcher.match_result().is_empty());
}

#[test]
fn disconnected_pattern_components_are_both_bound() {
    let mut pattern = Network::new();
    let pattern_root = transparent_root(&mut pattern);
    // Two actors with no wiring between them.
    pattern.add_atomic("x", pattern_root).expect("x");
    pattern.add_atomic("y", pattern_root).expect("y");

    let mut host = Network::new();
    let host_root = transparent_root(&mut host);
    add_wired_pair(&mut host, host_root, "h");

    let mut matcher = GraphMatcher::new();
    assert!(
        matcher.match_graphs(&pattern, pattern_root, &host, host_root),
        "components unreachable through wiring must still be matched"
    );
    assert_eq!(matcher.match_result().len(), 3, "root plus two actors");
}

#[test]
fn transparent_host_hierarchy_is_flattened_away() {
    let mut pattern = Network::new();
    let pattern_root = transparent_root(&mut pattern);
    let p = add_wired_pair(&mut pattern, pattern_root, "p");

    // Host: the sink lives inside a transparent composite, reached
    // through a boundary port.
    let mut host = Network::new();
    let host_root = transparent_root(&mut host);
    let source = host.add_atomic("source", host_root).expect("source");
    let source_out = host.add_output_port(source, "out");
    let inner = host.add_composite("inner", Some(host_root)).expect("inner");
    let boundary = host.add_input_port(inner, "in");
    let sink = host.add_atomic("sink", inner).expect("sink");
    let sink_in = host.add_input_port(sink, "in");
    let outer_wire = host.add_relation(host_root, "outer").expect("outer");
    let inner_wire = host.add_relation(inner, "inner").expect("inner wire");
    host.link(source_out, outer_wire).expect("link source");
    host.link(boundary, outer_wire).expect("link boundary outside");
    host.link(boundary, inner_wire).expect("link boundary inside");
    host.link(sink_in, inner_wire).expect("link sink");

    let mut matcher = GraphMatcher::new();
    assert!(
        matcher.match_graphs(&pattern, pattern_root, &host, host_root),
        "a flat pattern must match through a transparent boundary"
    );
    let result = matcher.match_result();
    assert_eq!(
        result.get(&cadence_core::MatchObject::Port(p.sink_in)),
        Some(&cadence_core::MatchObject::Port(sink_in)),
        "the pattern connection must land on the inner sink"
    );
}

#[test]
fn opaque_composites_require_equal_director_kinds() {
    let mut pattern = Network::new();
    let pattern_root = transparent_root(&mut pattern);
    let p_inner = pattern
        .add_composite("inner", Some(pattern_root))
        .expect("inner");
    pattern
        .set_director(p_inner, Some(make_director_kind("discrete-event")))
        .expect("director");

    let mut same = Network::new();
    let same_root = transparent_root(&mut same);
    let s_inner = same.add_composite("inner", Some(same_root)).expect("inner");
    same.set_director(s_inner, Some(make_director_kind("discrete-event")))
        .expect("director");

    let mut other = Network::new();
    let other_root = transparent_root(&mut other);
    let o_inner = other
        .add_composite("inner", Some(other_root))
        .expect("inner");
    other
        .set_director(o_inner, Some(make_director_kind("process-network")))
        .expect("director");

    let mut matcher = GraphMatcher::new();
    assert!(
        matcher.match_graphs(&pattern, pattern_root, &same, same_root),
        "equal director kinds must match"
    );
    assert!(
        !matcher.match_graphs(&pattern, pattern_root, &other, other_root),
        "different director kinds must not match"
    );
}

#[test]
fn an_opaque_pattern_composite_needs_an_opaque_host() {
    let mut pattern = Network::new();
    let pattern_root = transparent_root(&mut pattern);
    let p_inner = pattern
        .add_composite("inner", Some(pattern_root))
        .expect("inner");
    pattern
        .set_director(p_inner, Some(make_director_kind("discrete-event")))
        .expect("director");

    let mut host = Network::new();
    let host_root = transparent_root(&mut host);
    let h_inner = host.add_composite("inner", Some(host_root)).expect("inner");
    // Transparent composites are flattened, so its atomic child is the
    // only candidate the search can see, and kinds disagree.
    host.add_atomic("leaf", h_inner).expect("leaf");

    let mut matcher = GraphMatcher::new();
    assert!(!matcher.match_graphs(&pattern, pattern_root, &host, host_root));
}
