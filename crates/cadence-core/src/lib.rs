// SPDX-License-Identifier: Apache-2.0
//! cadence-core: actor-network modeling primitives.
//!
//! Three cooperating subsystems over one hierarchical network model:
//! a calendar queue for event scheduling ([`CalendarQueue`]), a
//! causality engine that derives input-to-output dependency functions
//! across composite boundaries ([`DefaultCausality`],
//! [`CompositeCausality`]), and a recursive subgraph matcher
//! ([`GraphMatcher`]) for finding pattern occurrences in host networks.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::cognitive_complexity,
    clippy::option_if_let_else,
    clippy::significant_drop_tightening,
    clippy::doc_markdown,
    clippy::too_many_lines,
    clippy::too_long_first_doc_paragraph,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::similar_names,
    clippy::trivially_copy_pass_by_ref,
    clippy::manual_let_else,
    clippy::needless_pass_by_value,
    clippy::multiple_crate_versions
)]

mod calendar;
mod causality;
mod dependency;
mod ident;
mod match_result;
mod matcher;
mod network;
mod telemetry;

// Re-exports for stable public API
/// Calendar-queue scheduling: the queue, bin policies, and errors.
pub use calendar::{BinPolicy, CalendarError, CalendarQueue, RealBinPolicy, SharedCalendarQueue};
/// Causality interfaces for atomic and composite entities.
pub use causality::{
    Causality, CausalityError, CausalityResolver, CompositeCausality, DefaultCausality,
    InterfaceRegistry,
};
/// Dependency semiring abstraction and the two standard instances.
pub use dependency::{Delay, Dependency, Reachable};
/// Identifier types for network elements and director kinds.
pub use ident::{make_director_kind, DirectorKind, EntityId, Hash, PortId, RelationId};
/// Match bindings produced by the graph matcher.
pub use match_result::{MatchObject, MatchResult, Path};
/// Recursive subgraph matching over networks.
pub use matcher::{FirstMatch, GraphMatcher, MatchCallback};
/// The hierarchical network model: entities, ports, relations.
pub use network::{
    EntityKind, EntityRecord, Network, NetworkError, PortRecord, RelationRecord,
};
