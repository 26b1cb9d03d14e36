//! Conditions that filter candidate partitions.
//!
//! A condition is a single-method capability. Any `Fn(&Partition<T>) -> bool`
//! is a condition, so callers can pass closures directly; the constructors in
//! this module cover the common placements of agents.

use crate::partition::{Element, Partition};

/// A boolean predicate over a partition.
pub trait Condition<T> {
    /// True if `partition` satisfies this condition.
    fn is_consistent(&self, partition: &Partition<T>) -> bool;
}

impl<T, F> Condition<T> for F
where
    F: Fn(&Partition<T>) -> bool,
{
    fn is_consistent(&self, partition: &Partition<T>) -> bool {
        self(partition)
    }
}

/// True if every condition holds, stopping at the first failure.
pub fn all_consistent<T>(conditions: &[&dyn Condition<T>], partition: &Partition<T>) -> bool {
    conditions.iter().all(|c| c.is_consistent(partition))
}

/// Requires `a` and `b` to share a block.
pub fn monitored_together(a: impl Into<String>, b: impl Into<String>) -> impl Condition<String> {
    let (a, b) = (a.into(), b.into());
    move |p: &Partition<String>| p.are_monitored_together(&[a.as_str()], &[b.as_str()])
}

/// Requires `a` and `b` to sit in different blocks.
///
/// Holds vacuously when either element is absent from the partition.
pub fn monitored_apart(a: impl Into<String>, b: impl Into<String>) -> impl Condition<String> {
    let (a, b) = (a.into(), b.into());
    move |p: &Partition<String>| !p.are_monitored_together(&[a.as_str()], &[b.as_str()])
}

/// At most `n` monitors.
pub fn max_blocks<T: Element>(n: usize) -> impl Condition<T> {
    move |p: &Partition<T>| p.len() <= n
}

/// At least `n` monitors.
pub fn min_blocks<T: Element>(n: usize) -> impl Condition<T> {
    move |p: &Partition<T>| p.len() >= n
}

/// Inverts a condition.
pub fn negate<T, C: Condition<T>>(condition: C) -> impl Condition<T> {
    move |p: &Partition<T>| !condition.is_consistent(p)
}
