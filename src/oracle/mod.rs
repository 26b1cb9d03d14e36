//! Bridge to the monitoring-safety oracle.
//!
//! The oracle is an external judgment service that owns the semantics of
//! contractiveness and monitoring safety. The core only relies on the query
//! contract below: a bulk query, a boolean query and an incremental cursor.
//! Backends implement [`Oracle`]; [`OracleSession`] serializes access to one.

/// Reference oracle over declared role dependencies.
pub mod dependency;
/// Oracle replaying fixed answers.
pub mod scripted;
/// Exclusive-access session wrapper.
pub mod session;

use std::path::Path;

use crate::error::{OracleError, OracleResult};
use crate::partition::Partition;

pub use dependency::DependencyOracle;
pub use session::{OracleSession, SessionGuard};

/// Predicate names and arities a specification artifact must define.
pub mod predicates {
    /// Contractiveness judgment, no arguments.
    pub const IS_CONTRACTIVE: &str = "is_contractive";
    /// Monitoring-safety judgment over one serialized partition.
    pub const IS_MONITORING_SAFE: (&str, usize) = ("is_monitoring_safe", 1);
    /// Bulk minimal-partitions query producing one list term.
    pub const MINIMAL_SAFE_PARTITIONS: (&str, usize) = ("decAMonJADE", 1);
    /// Incremental safe-partition query, one solution at a time.
    pub const SAFE_PARTITION: (&str, usize) = ("decOne", 1);
}

/// A partition as answered by the oracle: a list of blocks of atoms.
pub type RawPartition = Vec<Vec<String>>;

/// Converts an oracle answer into a partition.
///
/// # Errors
/// Returns [`OracleError::Malformed`] if the answer has overlapping blocks.
pub fn to_partition(raw: RawPartition) -> OracleResult<Partition<String>> {
    Partition::from_blocks(raw).map_err(OracleError::from)
}

/// The query contract of a monitoring-safety oracle.
///
/// Each method is one synchronous, blocking round-trip. Errors are surfaced
/// unfiltered to callers.
pub trait Oracle: Send {
    /// Retracts every fact derived from the currently consulted artifact.
    fn retract_all(&mut self) -> OracleResult<()>;

    /// Installs the artifact at `source` into the session.
    fn consult(&mut self, source: &Path) -> OracleResult<()>;

    /// Contractiveness judgment for the consulted specification.
    fn is_contractive(&mut self) -> OracleResult<bool>;

    /// All minimal monitoring-safe partitions, in one round-trip.
    fn minimal_safe_partitions(&mut self) -> OracleResult<Vec<RawPartition>>;

    /// Safety judgment for one partition in wire format.
    fn check_safe(&mut self, wire: &str) -> OracleResult<bool>;

    /// Opens an incremental query over every monitoring-safe partition.
    fn open_safe_partition_cursor(&mut self) -> OracleResult<Box<dyn SafePartitionCursor>>;
}

/// A single-use, forward-only query over safe partitions.
///
/// Must be closed exactly once; `next_solution` after `close` fails with
/// [`OracleError::CursorClosed`].
pub trait SafePartitionCursor: Send {
    /// Pulls the next solution, or `None` at end of results.
    fn next_solution(&mut self) -> OracleResult<Option<RawPartition>>;

    /// Releases the query.
    fn close(&mut self);
}

impl std::fmt::Debug for dyn SafePartitionCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SafePartitionCursor")
    }
}
