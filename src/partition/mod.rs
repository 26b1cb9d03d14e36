//! Partitions of agents into monitoring blocks.
//!
//! A [`Partition`] groups elements (agent roles, interaction identities) into
//! disjoint blocks that are monitored together. Internally it is a disjoint-set
//! forest over stable slot indices with union-by-weight and path halving, so
//! merging and lookup are near-constant time. The textual form consumed by the
//! oracle lives in [`wire`].
//!
//! ## Invariants
//! - Every element occurs in at most one block.
//! - Every block is non-empty.
//! - `make_independent` never empties a block; it re-homes the element to a
//!   fresh slot and tombstones the old one.

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

pub mod wire;

/// Bounds required of partition elements.
pub trait Element: Clone + Eq + Hash + Ord + fmt::Display {}

impl<T: Clone + Eq + Hash + Ord + fmt::Display> Element for T {}

#[derive(Debug, Clone)]
struct Slot<T> {
    element: T,
    parent: usize,
    /// Number of slots in the tree rooted here (meaningful at roots only).
    weight: usize,
    /// Number of live elements in the tree rooted here (meaningful at roots only).
    live: usize,
}

/// A grouping of elements into disjoint monitoring blocks.
#[derive(Debug, Clone)]
pub struct Partition<T> {
    slots: Vec<Slot<T>>,
    /// Element -> its live slot. Slots not referenced here are tombstones.
    index: HashMap<T, usize>,
    block_count: usize,
}

impl<T> Default for Partition<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            block_count: 0,
        }
    }
}

impl<T: Element> Partition<T> {
    /// Creates an empty partition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a partition with one block per non-empty group, taken verbatim.
    ///
    /// No merging happens across groups: the caller is responsible for handing
    /// in disjoint groups. Repeated elements inside one group collapse.
    ///
    /// # Errors
    /// Returns [`ValidationError::OverlappingBlocks`] if an element appears in two
    /// different groups.
    pub fn from_blocks<I, B>(raw_blocks: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = B>,
        B: IntoIterator<Item = T>,
    {
        let mut partition = Self::new();
        for group in raw_blocks {
            let mut root: Option<usize> = None;
            for element in group {
                if let Some(&slot) = partition.index.get(&element) {
                    let same_group =
                        root.is_some_and(|r| partition.find(slot) == partition.find(r));
                    if !same_group {
                        return Err(ValidationError::OverlappingBlocks {
                            element: element.to_string(),
                        });
                    }
                    continue;
                }
                let slot = partition.push_slot(element);
                root = Some(match root {
                    Some(r) => partition.link(r, slot),
                    None => {
                        partition.block_count += 1;
                        slot
                    }
                });
            }
        }
        Ok(partition)
    }

    /// Like [`Partition::from_blocks`], dropping absent groups as well as empty ones.
    ///
    /// # Errors
    /// Returns [`ValidationError::OverlappingBlocks`] if an element appears in two
    /// different groups.
    pub fn from_optional_blocks<I, B>(raw_blocks: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = Option<B>>,
        B: IntoIterator<Item = T>,
    {
        Self::from_blocks(raw_blocks.into_iter().flatten())
    }

    /// Number of blocks.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.block_count
    }

    /// True if the partition has no blocks.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    /// Number of distinct elements across all blocks.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.index.len()
    }

    /// True if `element` belongs to some block.
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(element)
    }

    /// True iff a single block contains every element of `a` and of `b`.
    ///
    /// With both sides empty this holds as soon as any block exists.
    pub fn are_monitored_together<Q>(&self, a: &[&Q], b: &[&Q]) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut shared_root: Option<usize> = None;
        for element in a.iter().chain(b.iter()) {
            let Some(&slot) = self.index.get(*element) else {
                return false;
            };
            let root = self.find(slot);
            match shared_root {
                Some(r) if r != root => return false,
                Some(_) => {}
                None => shared_root = Some(root),
            }
        }
        shared_root.is_some() || !self.is_empty()
    }

    /// Requires `a` and `b` to be monitored together, merging blocks as needed.
    ///
    /// Returns true if the partition changed. Applying a satisfied constraint is
    /// a no-op.
    pub fn add_constraint(&mut self, a: T, b: T) -> bool {
        let slot_a = self.index.get(&a).copied();
        let slot_b = self.index.get(&b).copied();
        match (slot_a, slot_b) {
            (Some(x), Some(y)) => {
                let rx = self.find_mut(x);
                let ry = self.find_mut(y);
                if rx == ry {
                    return false;
                }
                self.link(rx, ry);
                self.block_count -= 1;
            }
            (Some(x), None) => {
                let root = self.find_mut(x);
                let slot = self.push_slot(b);
                self.link(root, slot);
            }
            (None, Some(y)) => {
                let root = self.find_mut(y);
                let slot = self.push_slot(a);
                self.link(root, slot);
            }
            (None, None) => {
                let first = self.push_slot(a.clone());
                if a != b {
                    let second = self.push_slot(b);
                    self.link(first, second);
                }
                self.block_count += 1;
            }
        }
        true
    }

    /// Moves `element` out of its block into a new singleton block.
    ///
    /// No-op when the element is absent or already alone. Returns true if the
    /// partition changed.
    pub fn make_independent<Q>(&mut self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(&slot) = self.index.get(element) else {
            return false;
        };
        let root = self.find_mut(slot);
        if self.slots[root].live <= 1 {
            return false;
        }
        self.slots[root].live -= 1;
        let moved = self.slots[slot].element.clone();
        self.push_slot(moved);
        self.block_count += 1;

        if self.dead_slots() > self.index.len() {
            self.compact();
        }
        true
    }

    /// The block containing `element`, if any.
    pub fn block_of<Q>(&self, element: &Q) -> Option<BTreeSet<T>>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let root = self.find(*self.index.get(element)?);
        Some(
            self.live_slots()
                .filter(|&slot| self.find(slot) == root)
                .map(|slot| self.slots[slot].element.clone())
                .collect(),
        )
    }

    /// All blocks in canonical order.
    ///
    /// Blocks are ordered by their earliest inserted live element; elements
    /// within a block are sorted.
    #[must_use]
    pub fn blocks(&self) -> Vec<BTreeSet<T>> {
        let mut position: HashMap<usize, usize> = HashMap::with_capacity(self.block_count);
        let mut blocks: Vec<BTreeSet<T>> = Vec::with_capacity(self.block_count);
        for slot in self.live_slots() {
            let root = self.find(slot);
            let at = *position.entry(root).or_insert_with(|| {
                blocks.push(BTreeSet::new());
                blocks.len() - 1
            });
            blocks[at].insert(self.slots[slot].element.clone());
        }
        blocks
    }

    /// Bit-exact oracle wire text, see [`wire`].
    #[must_use]
    pub fn to_wire(&self) -> String {
        wire::to_wire(self)
    }

    fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(slot, s)| self.index.get(&s.element) == Some(slot))
            .map(|(slot, _)| slot)
    }

    fn dead_slots(&self) -> usize {
        self.slots.len() - self.index.len()
    }

    fn push_slot(&mut self, element: T) -> usize {
        let slot = self.slots.len();
        self.index.insert(element.clone(), slot);
        self.slots.push(Slot {
            element,
            parent: slot,
            weight: 1,
            live: 1,
        });
        slot
    }

    fn find(&self, mut slot: usize) -> usize {
        while self.slots[slot].parent != slot {
            slot = self.slots[slot].parent;
        }
        slot
    }

    fn find_mut(&mut self, mut slot: usize) -> usize {
        while self.slots[slot].parent != slot {
            let grandparent = self.slots[self.slots[slot].parent].parent;
            self.slots[slot].parent = grandparent;
            slot = grandparent;
        }
        slot
    }

    /// Joins two roots, returning the surviving root. Block count is the caller's job.
    fn link(&mut self, a: usize, b: usize) -> usize {
        let (root, child) = if self.slots[a].weight >= self.slots[b].weight {
            (a, b)
        } else {
            (b, a)
        };
        self.slots[child].parent = root;
        self.slots[root].weight += self.slots[child].weight;
        self.slots[root].live += self.slots[child].live;
        root
    }

    /// Rebuilds the forest without tombstones, preserving block order.
    fn compact(&mut self) {
        let blocks = self.blocks();
        let mut rebuilt = Self::new();
        for block in blocks {
            let mut root: Option<usize> = None;
            for element in block {
                let slot = rebuilt.push_slot(element);
                root = Some(match root {
                    Some(r) => rebuilt.link(r, slot),
                    None => slot,
                });
            }
            rebuilt.block_count += 1;
        }
        *self = rebuilt;
    }
}

impl<T: Element> PartialEq for Partition<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() || self.element_count() != other.element_count() {
            return false;
        }
        let mine: HashSet<BTreeSet<T>> = self.blocks().into_iter().collect();
        other.blocks().iter().all(|block| mine.contains(block))
    }
}

impl<T: Element> Eq for Partition<T> {}

impl<T: Element> fmt::Display for Partition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        wire::write_wire(self, f)
    }
}

impl<T: Element + Serialize> Serialize for Partition<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.blocks().serialize(serializer)
    }
}

impl<'de, T: Element + Deserialize<'de>> Deserialize<'de> for Partition<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Vec<T>>::deserialize(deserializer)?;
        Self::from_blocks(raw).map_err(serde::de::Error::custom)
    }
}
