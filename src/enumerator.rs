//! Lazy, filtered enumeration of monitoring-safe partitions.
//!
//! [`SafePartitions`] wraps one oracle cursor and a list of conditions into a
//! forward-only, single-pass sequence. It is a small state machine:
//!
//! ```text
//! Ready --lookahead--> Buffered --consume--> Ready
//!   \                                          |
//!    `--end of results / oracle error--> Exhausted (terminal, cursor closed)
//! ```
//!
//! The enumerator holds the session lock for its whole lifetime, so nothing can
//! reload the specification under an open cursor. Queries from the owning
//! thread meanwhile fail with `SessionBusy`. Dropping it closes the cursor
//! if the sequence was abandoned early.

use std::iter::FusedIterator;

use tracing::debug;

use crate::condition::{all_consistent, Condition};
use crate::error::OracleResult;
use crate::oracle::{to_partition, predicates, RawPartition, SafePartitionCursor, SessionGuard};
use crate::partition::Partition;

/// Observable state of a [`SafePartitions`] enumerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumeratorState {
    /// Nothing buffered; availability requires a lookahead pull.
    Ready,
    /// One accepted partition is cached awaiting consumption.
    Buffered,
    /// Terminal; the cursor has been closed.
    Exhausted,
}

#[derive(Debug)]
enum State {
    Ready,
    Buffered(Partition<String>),
    Exhausted,
}

/// Owns an open cursor and closes it exactly once.
#[derive(Debug)]
struct CursorGuard {
    cursor: Option<Box<dyn SafePartitionCursor>>,
}

impl CursorGuard {
    fn pull(&mut self) -> OracleResult<Option<RawPartition>> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.next_solution(),
            None => Ok(None),
        }
    }

    /// Returns true if this call closed the cursor.
    fn release(&mut self) -> bool {
        match self.cursor.take() {
            Some(mut cursor) => {
                cursor.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        if self.release() {
            debug!("safe partition cursor released before exhaustion");
        }
    }
}

/// Filtered lazy sequence of monitoring-safe partitions.
///
/// Yields `Err` at most once, after which the sequence is exhausted.
pub struct SafePartitions<'a> {
    // Field order matters: the cursor must close before the session unlocks.
    cursor: CursorGuard,
    _session: SessionGuard<'a>,
    conditions: &'a [&'a dyn Condition<String>],
    state: State,
    pulled: usize,
    rejected: usize,
}

impl<'a> SafePartitions<'a> {
    /// Opens a cursor on the locked session.
    pub(crate) fn open(
        mut session: SessionGuard<'a>,
        conditions: &'a [&'a dyn Condition<String>],
    ) -> OracleResult<Self> {
        let cursor = session.oracle().open_safe_partition_cursor()?;
        debug!(
            predicate = predicates::SAFE_PARTITION.0,
            conditions = conditions.len(),
            "opened safe partition cursor"
        );
        Ok(Self {
            cursor: CursorGuard {
                cursor: Some(cursor),
            },
            _session: session,
            conditions,
            state: State::Ready,
            pulled: 0,
            rejected: 0,
        })
    }

    /// Current state of the enumerator.
    #[must_use]
    pub const fn state(&self) -> EnumeratorState {
        match self.state {
            State::Ready => EnumeratorState::Ready,
            State::Buffered(_) => EnumeratorState::Buffered,
            State::Exhausted => EnumeratorState::Exhausted,
        }
    }

    /// Candidates pulled from the cursor so far.
    #[must_use]
    pub const fn pulled(&self) -> usize {
        self.pulled
    }

    /// Candidates discarded by a condition so far.
    #[must_use]
    pub const fn rejected(&self) -> usize {
        self.rejected
    }

    /// True if another partition is available, pulling ahead if needed.
    ///
    /// # Errors
    /// Propagates oracle failures; the enumerator is then exhausted.
    pub fn has_next(&mut self) -> OracleResult<bool> {
        self.lookahead()?;
        Ok(matches!(self.state, State::Buffered(_)))
    }

    /// The next partition without consuming it.
    ///
    /// # Errors
    /// Propagates oracle failures; the enumerator is then exhausted.
    pub fn peek(&mut self) -> OracleResult<Option<&Partition<String>>> {
        self.lookahead()?;
        Ok(match &self.state {
            State::Buffered(partition) => Some(partition),
            State::Ready | State::Exhausted => None,
        })
    }

    /// Stops the sequence early and closes the cursor now.
    pub fn close(&mut self) {
        self.finish();
    }

    fn lookahead(&mut self) -> OracleResult<()> {
        if !matches!(self.state, State::Ready) {
            return Ok(());
        }
        loop {
            let raw = match self.cursor.pull() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.finish();
                    return Ok(());
                }
                Err(err) => {
                    self.finish();
                    return Err(err);
                }
            };
            self.pulled += 1;
            let candidate = match to_partition(raw) {
                Ok(candidate) => candidate,
                Err(err) => {
                    self.finish();
                    return Err(err);
                }
            };
            if all_consistent(self.conditions, &candidate) {
                self.state = State::Buffered(candidate);
                return Ok(());
            }
            self.rejected += 1;
        }
    }

    fn finish(&mut self) {
        if self.cursor.release() {
            debug!(
                pulled = self.pulled,
                rejected = self.rejected,
                "safe partition cursor closed"
            );
        }
        self.state = State::Exhausted;
    }
}

impl Iterator for SafePartitions<'_> {
    type Item = OracleResult<Partition<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(err) = self.lookahead() {
            return Some(Err(err));
        }
        match std::mem::replace(&mut self.state, State::Ready) {
            State::Buffered(partition) => Some(Ok(partition)),
            other => {
                self.state = other;
                None
            }
        }
    }
}

impl FusedIterator for SafePartitions<'_> {}

impl std::fmt::Debug for SafePartitions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafePartitions")
            .field("state", &self.state())
            .field("pulled", &self.pulled)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::condition::{max_blocks, monitored_apart};
    use crate::oracle::scripted::ScriptedOracle;
    use crate::oracle::OracleSession;

    fn raw(blocks: &[&[&str]]) -> RawPartition {
        blocks
            .iter()
            .map(|b| b.iter().map(|s| (*s).to_string()).collect())
            .collect()
    }

    fn session(oracle: ScriptedOracle) -> OracleSession {
        let session = OracleSession::new(oracle);
        session
            .lock()
            .unwrap()
            .oracle()
            .consult(Path::new("script"))
            .unwrap();
        session
    }

    fn script() -> ScriptedOracle {
        ScriptedOracle::new(vec![
            raw(&[&["a"], &["b"], &["c"]]),
            raw(&[&["a", "b"], &["c"]]),
            raw(&[&["a"], &["b", "c"]]),
            raw(&[&["a", "b", "c"]]),
        ])
    }

    #[test]
    fn test_state_machine_transitions() {
        let oracle = script();
        let stats = oracle.stats();
        let session = session(oracle);
        let mut it = SafePartitions::open(session.lock().unwrap(), &[]).unwrap();

        assert_eq!(it.state(), EnumeratorState::Ready);
        assert!(it.has_next().unwrap());
        assert_eq!(it.state(), EnumeratorState::Buffered);
        // repeated availability checks do not pull again
        assert!(it.has_next().unwrap());
        assert_eq!(stats.pulls(), 1);

        assert!(it.next().unwrap().is_ok());
        assert_eq!(it.state(), EnumeratorState::Ready);

        assert_eq!(it.by_ref().count(), 3);
        assert_eq!(it.state(), EnumeratorState::Exhausted);
        assert_eq!(stats.closes(), 1);
        assert!(it.next().is_none());
        assert!(!it.has_next().unwrap());
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_conditions_filter_candidates() {
        let session = session(script());
        let apart = monitored_apart("a", "b");
        let small = max_blocks::<String>(2);
        let conditions: [&dyn Condition<String>; 2] = [&apart, &small];
        let mut it = SafePartitions::open(session.lock().unwrap(), &conditions).unwrap();
        let found: Vec<_> = it.by_ref().map(Result::unwrap).collect();
        assert_eq!(found, vec![Partition::from_blocks(raw(&[&["a"], &["b", "c"]])).unwrap()]);
        assert_eq!(it.pulled(), 4);
        assert_eq!(it.rejected(), 3);
    }

    #[test]
    fn test_abandoned_enumerator_closes_cursor_on_drop() {
        let oracle = script();
        let stats = oracle.stats();
        let session = session(oracle);
        {
            let mut it = SafePartitions::open(session.lock().unwrap(), &[]).unwrap();
            assert!(it.next().is_some());
            assert_eq!(stats.open(), 1);
        }
        assert_eq!(stats.opened(), 1);
        assert_eq!(stats.closes(), 1);
        // the session lock was released as well
        assert!(session.lock().is_ok());
    }

    #[test]
    fn test_explicit_close_is_terminal_and_single() {
        let oracle = script();
        let stats = oracle.stats();
        let session = session(oracle);
        let mut it = SafePartitions::open(session.lock().unwrap(), &[]).unwrap();
        it.close();
        it.close();
        assert_eq!(it.state(), EnumeratorState::Exhausted);
        assert!(it.next().is_none());
        drop(it);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_oracle_error_is_yielded_once() {
        let oracle = script().fail_after(2);
        let stats = oracle.stats();
        let session = session(oracle);
        let it = SafePartitions::open(session.lock().unwrap(), &[]).unwrap();
        let results: Vec<_> = it.collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn test_malformed_answer_exhausts() {
        let oracle = ScriptedOracle::new(vec![raw(&[&["a"], &["a"]]), raw(&[&["b"]])]);
        let session = session(oracle);
        let mut it = SafePartitions::open(session.lock().unwrap(), &[]).unwrap();
        assert!(it.peek().is_err());
        assert_eq!(it.state(), EnumeratorState::Exhausted);
        assert!(it.next().is_none());
    }
}
