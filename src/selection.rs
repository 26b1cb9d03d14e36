//! Random selection of one partition from a filtered sequence.
//!
//! Two policies are available:
//!
//! - [`SelectionPolicy::OrdinalDraw`] draws an ordinal `k` up front, before the
//!   length of the sequence is known, and returns the `k`-th element if the scan
//!   reaches it; otherwise it falls back to `collected[k % collected.len()]`.
//!   With the default draw range this is not uniform: for short sequences the
//!   choice is `k mod n`, which favours low ordinals whenever `n` does not
//!   divide the range. Every element seen is buffered until the scan ends.
//! - [`SelectionPolicy::Reservoir`] keeps one candidate and replaces it with the
//!   `i`-th element with probability `1/i`, which is uniform over the whole
//!   sequence and needs constant memory, at the cost of always scanning to the
//!   end.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, OracleResult, TexpResult};
use crate::partition::Partition;

/// Largest ordinal range, matching a non-negative 32-bit signed draw.
pub const DEFAULT_DRAW_RANGE: u32 = 0x7FFF_FFFF;

/// How `random_safe_partition` picks among the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Draw an ordinal before scanning, fall back to modulo on exhaustion.
    #[default]
    OrdinalDraw,
    /// Uniform single-pass reservoir sampling.
    Reservoir,
}

/// Picks one candidate according to `policy`.
///
/// # Errors
/// Returns [`ExecutionError::NoSafePartitionFound`] if `candidates` is empty,
/// or the first oracle error met while scanning.
pub fn select<T, I, R>(
    policy: SelectionPolicy,
    draw_range: u32,
    candidates: I,
    rng: &mut R,
) -> TexpResult<Partition<T>>
where
    I: IntoIterator<Item = OracleResult<Partition<T>>>,
    R: Rng + ?Sized,
{
    match policy {
        SelectionPolicy::OrdinalDraw => ordinal_draw(candidates, draw_range, rng),
        SelectionPolicy::Reservoir => reservoir(candidates, rng),
    }
}

/// Ordinal-draw selection, see the module docs.
///
/// # Errors
/// Returns [`ExecutionError::NoSafePartitionFound`] if `candidates` is empty,
/// or the first oracle error met while scanning.
pub fn ordinal_draw<T, I, R>(
    candidates: I,
    draw_range: u32,
    rng: &mut R,
) -> TexpResult<Partition<T>>
where
    I: IntoIterator<Item = OracleResult<Partition<T>>>,
    R: Rng + ?Sized,
{
    let k = rng.gen_range(0..draw_range.max(1)) as usize;
    let mut collected = Vec::new();
    for (ordinal, candidate) in candidates.into_iter().enumerate() {
        let candidate = candidate?;
        if ordinal == k {
            return Ok(candidate);
        }
        collected.push(candidate);
    }
    if collected.is_empty() {
        return Err(ExecutionError::NoSafePartitionFound.into());
    }
    let index = k % collected.len();
    Ok(collected.swap_remove(index))
}

/// Reservoir selection, see the module docs.
///
/// # Errors
/// Returns [`ExecutionError::NoSafePartitionFound`] if `candidates` is empty,
/// or the first oracle error met while scanning.
pub fn reservoir<T, I, R>(candidates: I, rng: &mut R) -> TexpResult<Partition<T>>
where
    I: IntoIterator<Item = OracleResult<Partition<T>>>,
    R: Rng + ?Sized,
{
    let mut chosen = None;
    for (seen, candidate) in candidates.into_iter().enumerate() {
        let candidate = candidate?;
        if rng.gen_range(0..=seen) == 0 {
            chosen = Some(candidate);
        }
    }
    chosen.ok_or_else(|| ExecutionError::NoSafePartitionFound.into())
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::error::{OracleError, TexpError};

    fn candidates(n: usize) -> Vec<OracleResult<Partition<usize>>> {
        (0..n).map(|i| Ok(Partition::from_blocks([[i]]).unwrap())).collect()
    }

    fn picked(p: &Partition<usize>) -> usize {
        *p.blocks()[0].iter().next().unwrap()
    }

    #[test]
    fn test_ordinal_draw_reaches_k() {
        // range 1 always draws 0
        let mut rng = StdRng::seed_from_u64(7);
        let p = ordinal_draw(candidates(5), 1, &mut rng).unwrap();
        assert_eq!(picked(&p), 0);
    }

    #[test]
    fn test_ordinal_draw_falls_back_to_modulo() {
        for seed in 0..32 {
            let mut draw = StdRng::seed_from_u64(seed);
            let k = draw.gen_range(0..1000u32) as usize;
            let mut rng = StdRng::seed_from_u64(seed);
            let p = ordinal_draw(candidates(3), 1000, &mut rng).unwrap();
            let expected = if k < 3 { k } else { k % 3 };
            assert_eq!(picked(&p), expected);
        }
    }

    #[test]
    fn test_ordinal_draw_stops_consuming_at_k() {
        let mut pulled = 0;
        let source = (0..100).map(|i| {
            pulled += 1;
            Ok(Partition::from_blocks([[i]]).unwrap())
        });
        let mut rng = StdRng::seed_from_u64(1);
        ordinal_draw(source, 1, &mut rng).unwrap();
        assert_eq!(pulled, 1);
    }

    #[test]
    fn test_empty_sequence_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        for policy in [SelectionPolicy::OrdinalDraw, SelectionPolicy::Reservoir] {
            let err = select(policy, DEFAULT_DRAW_RANGE, candidates(0), &mut rng).unwrap_err();
            assert!(err.is_no_safe_partition());
        }
    }

    #[test]
    fn test_oracle_error_propagates() {
        let mut rng = StdRng::seed_from_u64(0);
        let source: Vec<OracleResult<Partition<usize>>> = vec![
            Ok(Partition::from_blocks([[0]]).unwrap()),
            Err(OracleError::CursorClosed),
        ];
        let err = reservoir(source, &mut rng).unwrap_err();
        assert!(matches!(err, TexpError::Oracle(OracleError::CursorClosed)));
    }

    #[test]
    fn test_reservoir_covers_every_element() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            let p = reservoir(candidates(4), &mut rng).unwrap();
            counts[picked(&p)] += 1;
        }
        for count in counts {
            assert!((700..1300).contains(&count), "skewed counts {counts:?}");
        }
    }

    #[test]
    fn test_policy_serde_names() {
        assert_eq!(serde_json::to_string(&SelectionPolicy::Reservoir).unwrap(), "\"reservoir\"");
        let policy: SelectionPolicy = serde_json::from_str("\"ordinal_draw\"").unwrap();
        assert_eq!(policy, SelectionPolicy::OrdinalDraw);
    }
}
