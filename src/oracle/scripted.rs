//! Oracle that replays fixed answers.
//!
//! Useful as a stand-in for a real judgment process when the caller already
//! knows which partitions are safe. Cursor traffic is counted in
//! [`CursorStats`] so callers can check release discipline.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{OracleError, OracleResult};
use crate::partition::wire;

use super::{to_partition, Oracle, RawPartition, SafePartitionCursor};

/// Counters shared between a [`ScriptedOracle`] and its cursors.
#[derive(Debug, Default)]
pub struct CursorStats {
    opened: AtomicUsize,
    closes: AtomicUsize,
    pulls: AtomicUsize,
}

impl CursorStats {
    /// Cursors opened so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Calls to `close` so far, including repeated ones.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }

    /// Solutions pulled so far across all cursors.
    #[must_use]
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::Relaxed)
    }

    /// Cursors opened and not yet closed.
    #[must_use]
    pub fn open(&self) -> usize {
        self.opened().saturating_sub(self.closes())
    }
}

/// Oracle answering from a fixed script.
#[derive(Debug)]
pub struct ScriptedOracle {
    contractive: bool,
    minimal: Vec<RawPartition>,
    solutions: Arc<[RawPartition]>,
    fail_after: Option<usize>,
    consulted: Option<PathBuf>,
    consults: usize,
    stats: Arc<CursorStats>,
}

impl ScriptedOracle {
    /// A contractive script whose cursor yields `solutions` in order.
    ///
    /// Minimal partitions default to the same list.
    #[must_use]
    pub fn new(solutions: Vec<RawPartition>) -> Self {
        Self {
            contractive: true,
            minimal: solutions.clone(),
            solutions: solutions.into(),
            fail_after: None,
            consulted: None,
            consults: 0,
            stats: Arc::new(CursorStats::default()),
        }
    }

    /// Overrides the bulk minimal-partitions answer.
    #[must_use]
    pub fn with_minimal(mut self, minimal: Vec<RawPartition>) -> Self {
        self.minimal = minimal;
        self
    }

    /// Makes the contractiveness judgment false.
    #[must_use]
    pub fn not_contractive(mut self) -> Self {
        self.contractive = false;
        self
    }

    /// Makes every cursor fail after yielding `n` solutions.
    #[must_use]
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Shared cursor counters.
    #[must_use]
    pub fn stats(&self) -> Arc<CursorStats> {
        Arc::clone(&self.stats)
    }

    /// Number of successful consults.
    #[must_use]
    pub const fn consults(&self) -> usize {
        self.consults
    }

    fn ensure_loaded(&self) -> OracleResult<()> {
        if self.consulted.is_some() {
            Ok(())
        } else {
            Err(OracleError::NoSpecificationLoaded)
        }
    }
}

impl Oracle for ScriptedOracle {
    fn retract_all(&mut self) -> OracleResult<()> {
        self.consulted = None;
        Ok(())
    }

    fn consult(&mut self, source: &Path) -> OracleResult<()> {
        self.consulted = Some(source.to_path_buf());
        self.consults += 1;
        Ok(())
    }

    fn is_contractive(&mut self) -> OracleResult<bool> {
        self.ensure_loaded()?;
        Ok(self.contractive)
    }

    fn minimal_safe_partitions(&mut self) -> OracleResult<Vec<RawPartition>> {
        self.ensure_loaded()?;
        Ok(self.minimal.clone())
    }

    fn check_safe(&mut self, wire_text: &str) -> OracleResult<bool> {
        self.ensure_loaded()?;
        let candidate = wire::parse(wire_text)?;
        for raw in self.solutions.iter() {
            if to_partition(raw.clone())? == candidate {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn open_safe_partition_cursor(&mut self) -> OracleResult<Box<dyn SafePartitionCursor>> {
        self.ensure_loaded()?;
        self.stats.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ScriptedCursor {
            solutions: Arc::clone(&self.solutions),
            position: 0,
            fail_after: self.fail_after,
            closed: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct ScriptedCursor {
    solutions: Arc<[RawPartition]>,
    position: usize,
    fail_after: Option<usize>,
    closed: bool,
    stats: Arc<CursorStats>,
}

impl SafePartitionCursor for ScriptedCursor {
    fn next_solution(&mut self) -> OracleResult<Option<RawPartition>> {
        if self.closed {
            return Err(OracleError::CursorClosed);
        }
        if self.fail_after == Some(self.position) {
            return Err(OracleError::Communication {
                message: format!("scripted failure after {} solutions", self.position),
            });
        }
        self.stats.pulls.fetch_add(1, Ordering::Relaxed);
        let next = self.solutions.get(self.position).cloned();
        if next.is_some() {
            self.position += 1;
        }
        Ok(next)
    }

    fn close(&mut self) {
        self.closed = true;
        self.stats.closes.fetch_add(1, Ordering::Relaxed);
    }
}
