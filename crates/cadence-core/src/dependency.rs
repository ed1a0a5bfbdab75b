// SPDX-License-Identifier: Apache-2.0
//! Dependency values and the semiring operations over them.
//!
//! A dependency describes how an actor's output relates to one of its
//! inputs. The causality engine only ever manipulates dependencies
//! through the two semiring operations: `o_plus` merges parallel paths
//! and `o_times` composes serial ones. Different analyses plug in
//! different semirings; [`Reachable`] answers "is there a path at all"
//! and [`Delay`] computes the minimum accumulated delay along any path.

/// A value in a dependency semiring.
///
/// Implementations must satisfy the usual semiring laws: `o_plus` is
/// commutative and associative with [`Dependency::o_plus_identity`] as
/// its identity, `o_times` is associative with
/// [`Dependency::o_times_identity`] as its identity, and the o-plus
/// identity annihilates `o_times`. The propagation fixed point in
/// [`crate::CompositeCausality`] terminates because repeated `o_plus`
/// converges (the semiring is idempotent for both provided impls).
pub trait Dependency: Clone + PartialEq + core::fmt::Debug {
    /// Merges two parallel paths.
    #[must_use]
    fn o_plus(&self, other: &Self) -> Self;

    /// Composes two serial paths.
    #[must_use]
    fn o_times(&self, other: &Self) -> Self;

    /// The identity of [`Dependency::o_plus`]: "no path".
    #[must_use]
    fn o_plus_identity() -> Self;

    /// The identity of [`Dependency::o_times`]: "a direct connection".
    #[must_use]
    fn o_times_identity() -> Self;

    /// The default dependency assumed between an input and an output
    /// when nothing more precise is known.
    ///
    /// Defaults to the o-times identity.
    #[must_use]
    fn default_dependency() -> Self {
        Self::o_times_identity()
    }
}

/// Boolean reachability: an output either depends on an input or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reachable(pub bool);

impl Dependency for Reachable {
    fn o_plus(&self, other: &Self) -> Self {
        Self(self.0 || other.0)
    }

    fn o_times(&self, other: &Self) -> Self {
        Self(self.0 && other.0)
    }

    fn o_plus_identity() -> Self {
        Self(false)
    }

    fn o_times_identity() -> Self {
        Self(true)
    }
}

/// Min-plus dependency: the least accumulated delay along any path.
///
/// `o_plus` takes the minimum of two delays and `o_times` adds them.
/// The o-plus identity is positive infinity ("unreachable"), the
/// o-times identity is zero delay.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Delay(pub f64);

impl Delay {
    /// A dependency through a pure delay of `value` time units.
    #[must_use]
    pub fn of(value: f64) -> Self {
        Self(value)
    }

    /// Whether the output is reachable from the input at all.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }
}

impl Dependency for Delay {
    fn o_plus(&self, other: &Self) -> Self {
        Self(self.0.min(other.0))
    }

    fn o_times(&self, other: &Self) -> Self {
        Self(self.0 + other.0)
    }

    fn o_plus_identity() -> Self {
        Self(f64::INFINITY)
    }

    fn o_times_identity() -> Self {
        Self(0.0)
    }
}
