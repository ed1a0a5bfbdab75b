// SPDX-License-Identifier: Apache-2.0
#![allow(dead_code)]

use cadence_core::{EntityId, Network, PortId, RelationId};

/// A source actor wired to a sink actor inside one composite.
pub struct WiredPair {
    pub source: EntityId,
    pub sink: EntityId,
    pub source_out: PortId,
    pub sink_in: PortId,
    pub wire: RelationId,
}

/// Adds a source and a sink actor under `root`, wired output to input.
/// Port and relation names are prefixed so multiple pairs can coexist.
pub fn add_wired_pair(net: &mut Network, root: EntityId, prefix: &str) -> WiredPair {
    let source = net
        .add_atomic(format!("{prefix}_source"), root)
        .expect("add source");
    let sink = net
        .add_atomic(format!("{prefix}_sink"), root)
        .expect("add sink");
    let source_out = net.add_output_port(source, "out");
    let sink_in = net.add_input_port(sink, "in");
    let wire = net
        .add_relation(root, format!("{prefix}_wire"))
        .expect("add wire");
    net.link(source_out, wire).expect("link source.out");
    net.link(sink_in, wire).expect("link sink.in");
    WiredPair {
        source,
        sink,
        source_out,
        sink_in,
        wire,
    }
}

/// A transparent root composite.
pub fn transparent_root(net: &mut Network) -> EntityId {
    net.add_composite("top", None).expect("add root")
}
