//! # texp-monitor - Monitoring-safe partitions for decentralized runtime verification
//!
//! Instead of one monitor observing every interaction of a multi-agent system,
//! agents are split into groups that can each be verified independently against
//! a global protocol specification (a trace expression). This crate builds,
//! merges, serializes and filters those groupings, and finds the ones an oracle
//! judges monitoring-safe.
//!
//! ## Core Concepts
//!
//! - **Partition**: disjoint blocks of agents, each block watched by one monitor
//! - **Condition**: a predicate used to filter candidate partitions
//! - **Oracle**: the external service judging contractiveness and safety
//! - **ProtocolSpecification**: a consulted, contractive trace expression
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use texp_monitor::{condition, DependencyOracle, OracleSession, ProtocolSpecification};
//!
//! let session = Arc::new(OracleSession::new(DependencyOracle::new()));
//! let spec = ProtocolSpecification::load(session, "protocol.toml")?;
//!
//! let apart = condition::monitored_apart("alice", "bob");
//! let partition = spec.first_safe_partition(&[&apart])?;
//! println!("{partition}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod condition;
pub mod enumerator;
pub mod error;
pub mod oracle;
pub mod partition;
pub mod selection;
pub mod specification;

// Re-export primary types at crate root for convenience
pub use condition::Condition;
pub use enumerator::{EnumeratorState, SafePartitions};
pub use error::{ExecutionError, OracleError, TexpError, TexpResult, ValidationError};
pub use oracle::{DependencyOracle, Oracle, OracleSession, RawPartition, SafePartitionCursor};
pub use partition::{Element, Partition};
pub use selection::SelectionPolicy;
pub use specification::{ProtocolSpecification, SpecificationConfig};
