//! Protocol specifications and the retrieval surface.
//!
//! A [`ProtocolSpecification`] is a trace expression consulted into an
//! [`OracleSession`] and checked for contractiveness. Only one specification
//! is live per session: loading retracts whatever was there before, and a
//! handle whose load has been superseded fails every query.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::condition::{all_consistent, Condition};
use crate::enumerator::SafePartitions;
use crate::error::{ExecutionError, TexpError, TexpResult, ValidationError};
use crate::oracle::{predicates, to_partition, OracleSession, SessionGuard};
use crate::partition::{Element, Partition};
use crate::selection::{self, SelectionPolicy, DEFAULT_DRAW_RANGE};

/// Tuning for the retrieval operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpecificationConfig {
    /// Policy used by `random_safe_partition`.
    pub selection: SelectionPolicy,
    /// Exclusive upper bound of the ordinal drawn by [`SelectionPolicy::OrdinalDraw`].
    pub draw_range: u32,
}

impl Default for SpecificationConfig {
    fn default() -> Self {
        Self {
            selection: SelectionPolicy::OrdinalDraw,
            draw_range: DEFAULT_DRAW_RANGE,
        }
    }
}

impl SpecificationConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidConfig`] if `draw_range` is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.draw_range == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "draw_range must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidConfig`] on syntax errors, unknown keys
    /// or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self, ValidationError> {
        let config: Self = toml::from_str(text).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML configuration file.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidConfig`] if the file cannot be read or
    /// does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let text = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }
}

/// A loaded, contractive protocol specification.
#[derive(Debug)]
pub struct ProtocolSpecification {
    session: Arc<OracleSession>,
    source: PathBuf,
    generation: u64,
    config: SpecificationConfig,
}

impl ProtocolSpecification {
    /// Loads the artifact at `path` into `session` with the default configuration.
    ///
    /// # Errors
    /// - [`ValidationError::MissingField`] if `path` is empty
    /// - [`ExecutionError::SourceNotFound`] if the artifact does not exist
    /// - [`ExecutionError::NotContractive`] if the oracle rejects it; the
    ///   artifact stays consulted in the session
    /// - any oracle error, verbatim
    pub fn load(session: Arc<OracleSession>, path: impl AsRef<Path>) -> TexpResult<Self> {
        Self::load_with_config(session, path, SpecificationConfig::default())
    }

    /// Loads the artifact at `path` with an explicit configuration.
    ///
    /// # Errors
    /// As [`ProtocolSpecification::load`], plus [`ValidationError::InvalidConfig`].
    pub fn load_with_config(
        session: Arc<OracleSession>,
        path: impl AsRef<Path>,
        config: SpecificationConfig,
    ) -> TexpResult<Self> {
        config.validate()?;
        let source = resolve_source(path.as_ref())?;
        let generation = {
            let mut guard = session.lock()?;
            install(&mut guard, &source)?
        };
        Ok(Self {
            session,
            source,
            generation,
            config,
        })
    }

    /// Consults the same artifact again, making this handle live.
    ///
    /// # Errors
    /// As [`ProtocolSpecification::load`].
    pub fn reload(&mut self) -> TexpResult<()> {
        let source = resolve_source(&self.source)?;
        let mut guard = self.session.lock()?;
        self.generation = install(&mut guard, &source)?;
        Ok(())
    }

    /// Absolute path of the consulted artifact.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Session load generation this handle belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Retrieval configuration.
    #[must_use]
    pub const fn config(&self) -> &SpecificationConfig {
        &self.config
    }

    /// The session this specification is loaded into.
    #[must_use]
    pub fn session(&self) -> &Arc<OracleSession> {
        &self.session
    }

    /// True if this handle's facts are still the ones in the session.
    ///
    /// # Errors
    /// Returns an oracle error if the session lock is poisoned.
    pub fn is_live(&self) -> TexpResult<bool> {
        Ok(self.session.generation()? == self.generation)
    }

    /// Asks the oracle whether `partition` is monitoring-safe.
    ///
    /// # Errors
    /// [`ExecutionError::SpecificationSuperseded`] or any oracle error.
    pub fn is_monitoring_safe<T: Element>(&self, partition: &Partition<T>) -> TexpResult<bool> {
        let mut guard = self.live()?;
        let wire = partition.to_wire();
        let safe = guard.oracle().check_safe(&wire)?;
        debug!(
            predicate = predicates::IS_MONITORING_SAFE.0,
            partition = %wire,
            safe,
            "monitoring safety judged"
        );
        Ok(safe)
    }

    /// All minimal monitoring-safe partitions satisfying `conditions`.
    ///
    /// Issues the bulk query once and filters the full answer.
    ///
    /// # Errors
    /// [`ExecutionError::SpecificationSuperseded`] or any oracle error.
    pub fn minimal_safe_partitions(
        &self,
        conditions: &[&dyn Condition<String>],
    ) -> TexpResult<Vec<Partition<String>>> {
        let raw = {
            let mut guard = self.live()?;
            guard.oracle().minimal_safe_partitions()?
        };
        let total = raw.len();
        let mut accepted = Vec::with_capacity(total);
        for candidate in raw {
            let partition = to_partition(candidate)?;
            if all_consistent(conditions, &partition) {
                accepted.push(partition);
            }
        }
        debug!(
            predicate = predicates::MINIMAL_SAFE_PARTITIONS.0,
            total,
            accepted = accepted.len(),
            "minimal safe partitions retrieved"
        );
        Ok(accepted)
    }

    /// Lazy sequence of monitoring-safe partitions satisfying `conditions`.
    ///
    /// The session stays locked until the returned enumerator is dropped. Other
    /// threads block meanwhile; queries from this thread fail with
    /// [`OracleError::SessionBusy`](crate::error::OracleError::SessionBusy).
    ///
    /// # Errors
    /// [`ExecutionError::SpecificationSuperseded`] or any oracle error.
    pub fn safe_partitions<'a>(
        &'a self,
        conditions: &'a [&'a dyn Condition<String>],
    ) -> TexpResult<SafePartitions<'a>> {
        let guard = self.live()?;
        Ok(SafePartitions::open(guard, conditions)?)
    }

    /// The first monitoring-safe partition satisfying `conditions`.
    ///
    /// # Errors
    /// [`ExecutionError::NoSafePartitionFound`] if there is none, otherwise as
    /// [`ProtocolSpecification::safe_partitions`].
    pub fn first_safe_partition(
        &self,
        conditions: &[&dyn Condition<String>],
    ) -> TexpResult<Partition<String>> {
        let mut partitions = self.safe_partitions(conditions)?;
        match partitions.next() {
            Some(found) => Ok(found?),
            None => Err(ExecutionError::NoSafePartitionFound.into()),
        }
    }

    /// A randomly selected monitoring-safe partition satisfying `conditions`.
    ///
    /// # Errors
    /// As [`ProtocolSpecification::first_safe_partition`].
    pub fn random_safe_partition(
        &self,
        conditions: &[&dyn Condition<String>],
    ) -> TexpResult<Partition<String>> {
        self.random_safe_partition_with(&mut rand::thread_rng(), conditions)
    }

    /// Like [`ProtocolSpecification::random_safe_partition`] with a caller-supplied
    /// random source.
    ///
    /// # Errors
    /// As [`ProtocolSpecification::first_safe_partition`].
    pub fn random_safe_partition_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        conditions: &[&dyn Condition<String>],
    ) -> TexpResult<Partition<String>> {
        let partitions = self.safe_partitions(conditions)?;
        selection::select(self.config.selection, self.config.draw_range, partitions, rng)
    }

    fn live(&self) -> TexpResult<SessionGuard<'_>> {
        let guard = self.session.lock()?;
        let live = guard.generation();
        if live != self.generation {
            return Err(ExecutionError::SpecificationSuperseded {
                generation: self.generation,
                live,
            }
            .into());
        }
        Ok(guard)
    }
}

fn resolve_source(path: &Path) -> TexpResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(TexpError::missing("path"));
    }
    path.canonicalize().map_err(|_| {
        ExecutionError::SourceNotFound {
            path: path.to_path_buf(),
        }
        .into()
    })
}

/// Retracts, consults and validates. Returns the new load generation.
#[instrument(skip_all, fields(source = %source.display()))]
fn install(guard: &mut SessionGuard<'_>, source: &Path) -> TexpResult<u64> {
    let generation = guard.begin_load();
    guard.oracle().retract_all()?;
    guard.oracle().consult(source)?;
    if !guard.oracle().is_contractive()? {
        warn!(
            generation,
            predicate = predicates::IS_CONTRACTIVE,
            "trace expression is not contractive"
        );
        return Err(ExecutionError::NotContractive {
            path: source.to_path_buf(),
        }
        .into());
    }
    info!(generation, "specification loaded");
    Ok(generation)
}
