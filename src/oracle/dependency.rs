//! Reference oracle over declared causal dependencies between roles.
//!
//! The artifact is a TOML document:
//!
//! ```toml
//! contractive = true
//! roles = ["alice", "bob", "carol"]
//! dependencies = [["alice", "bob"]]
//! ```
//!
//! Two roles are dependent when the protocol orders events of one after events
//! of the other; such roles can only be judged by a shared monitor. A partition
//! is monitoring-safe iff it covers exactly the declared roles and every
//! dependent pair shares a block. The minimal safe partition is therefore the
//! set of connected components of the dependency graph, and the safe partitions
//! are exactly its coarsenings.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::{OracleError, OracleResult};
use crate::partition::{wire, Partition};

use super::{Oracle, RawPartition, SafePartitionCursor};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Artifact {
    contractive: bool,
    roles: Vec<String>,
    #[serde(default)]
    dependencies: Vec<(String, String)>,
}

#[derive(Debug)]
struct Facts {
    contractive: bool,
    roles: HashSet<String>,
    dependencies: Vec<(String, String)>,
    /// Connected components in role declaration order.
    components: Arc<[Vec<String>]>,
}

impl Facts {
    fn from_artifact(artifact: Artifact, path: &Path) -> OracleResult<Self> {
        let consult_err = |message: String| OracleError::Consult {
            path: path.to_path_buf(),
            message,
        };

        let mut roles = HashSet::with_capacity(artifact.roles.len());
        for role in &artifact.roles {
            let is_atom = !role.is_empty()
                && !role.contains(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']'));
            if !is_atom {
                return Err(consult_err(format!("role '{role}' is not an atom")));
            }
            if !roles.insert(role.clone()) {
                return Err(consult_err(format!("role '{role}' declared twice")));
            }
        }

        let mut graph = Partition::from_blocks(artifact.roles.iter().map(|r| [r.clone()]))
            .map_err(|e| consult_err(e.to_string()))?;
        for (a, b) in &artifact.dependencies {
            for role in [a, b] {
                if !roles.contains(role) {
                    return Err(consult_err(format!("dependency on undeclared role '{role}'")));
                }
            }
            graph.add_constraint(a.clone(), b.clone());
        }

        let components: Vec<Vec<String>> = graph
            .blocks()
            .into_iter()
            .map(|block| block.into_iter().collect())
            .collect();

        Ok(Self {
            contractive: artifact.contractive,
            roles,
            dependencies: artifact.dependencies,
            components: components.into(),
        })
    }

    fn is_safe(&self, partition: &Partition<String>) -> bool {
        partition.element_count() == self.roles.len()
            && self.roles.iter().all(|r| partition.contains(r.as_str()))
            && self
                .dependencies
                .iter()
                .all(|(a, b)| partition.are_monitored_together(&[a.as_str()], &[b.as_str()]))
    }
}

/// Oracle backend that judges safety from the dependency graph of an artifact.
#[derive(Debug, Default)]
pub struct DependencyOracle {
    source: Option<PathBuf>,
    facts: Option<Facts>,
}

impl DependencyOracle {
    /// Creates an oracle with nothing consulted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the consulted artifact, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn facts(&self) -> OracleResult<&Facts> {
        self.facts.as_ref().ok_or(OracleError::NoSpecificationLoaded)
    }
}

impl Oracle for DependencyOracle {
    fn retract_all(&mut self) -> OracleResult<()> {
        self.facts = None;
        self.source = None;
        Ok(())
    }

    fn consult(&mut self, source: &Path) -> OracleResult<()> {
        let text = std::fs::read_to_string(source).map_err(|e| OracleError::Consult {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        let artifact: Artifact = toml::from_str(&text).map_err(|e| OracleError::Consult {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        let facts = Facts::from_artifact(artifact, source)?;
        debug!(
            source = %source.display(),
            roles = facts.roles.len(),
            components = facts.components.len(),
            "consulted dependency artifact"
        );
        self.facts = Some(facts);
        self.source = Some(source.to_path_buf());
        Ok(())
    }

    fn is_contractive(&mut self) -> OracleResult<bool> {
        Ok(self.facts()?.contractive)
    }

    fn minimal_safe_partitions(&mut self) -> OracleResult<Vec<RawPartition>> {
        Ok(vec![self.facts()?.components.to_vec()])
    }

    fn check_safe(&mut self, wire_text: &str) -> OracleResult<bool> {
        let facts = self.facts()?;
        let partition = wire::parse(wire_text)?;
        Ok(facts.is_safe(&partition))
    }

    fn open_safe_partition_cursor(&mut self) -> OracleResult<Box<dyn SafePartitionCursor>> {
        let components = Arc::clone(&self.facts()?.components);
        Ok(Box::new(CoarseningCursor::new(components)))
    }
}

/// Enumerates every coarsening of a set of components, finest first.
///
/// Each coarsening is a restricted growth string `a` over the components,
/// `a[0] = 0` and `a[i] <= max(a[..i]) + 1`, visited in descending
/// lexicographic order from `0, 1, .., k-1` down to all zeros.
#[derive(Debug)]
struct CoarseningCursor {
    components: Arc<[Vec<String>]>,
    growth: Option<Vec<usize>>,
    closed: bool,
}

impl CoarseningCursor {
    fn new(components: Arc<[Vec<String>]>) -> Self {
        let growth = (0..components.len()).collect();
        Self {
            components,
            growth: Some(growth),
            closed: false,
        }
    }

    fn materialize(&self, growth: &[usize]) -> RawPartition {
        let block_count = growth.iter().max().map_or(0, |m| m + 1);
        let mut blocks: RawPartition = vec![Vec::new(); block_count];
        for (component, &block) in self.components.iter().zip(growth) {
            blocks[block].extend(component.iter().cloned());
        }
        blocks
    }

    /// Steps to the lexicographic predecessor, or `None` after all zeros.
    fn predecessor(mut growth: Vec<usize>) -> Option<Vec<usize>> {
        let pivot = growth.iter().rposition(|&v| v > 0)?;
        growth[pivot] -= 1;
        let mut max = growth[..=pivot].iter().copied().max().unwrap_or(0);
        for value in &mut growth[pivot + 1..] {
            max += 1;
            *value = max;
        }
        Some(growth)
    }
}

impl SafePartitionCursor for CoarseningCursor {
    fn next_solution(&mut self) -> OracleResult<Option<RawPartition>> {
        if self.closed {
            return Err(OracleError::CursorClosed);
        }
        let Some(growth) = self.growth.take() else {
            return Ok(None);
        };
        let solution = self.materialize(&growth);
        self.growth = Self::predecessor(growth);
        Ok(Some(solution))
    }

    fn close(&mut self) {
        self.closed = true;
        self.growth = None;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn artifact(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn consulted(body: &str) -> DependencyOracle {
        let file = artifact(body);
        let mut oracle = DependencyOracle::new();
        oracle.consult(file.path()).unwrap();
        oracle
    }

    fn drain(cursor: &mut dyn SafePartitionCursor) -> Vec<RawPartition> {
        let mut out = Vec::new();
        while let Some(p) = cursor.next_solution().unwrap() {
            out.push(p);
        }
        out
    }

    #[test]
    fn test_queries_before_consult_fail() {
        let mut oracle = DependencyOracle::new();
        assert!(matches!(oracle.is_contractive(), Err(OracleError::NoSpecificationLoaded)));
        assert!(matches!(oracle.check_safe("[ ]"), Err(OracleError::NoSpecificationLoaded)));
    }

    #[test]
    fn test_independent_roles() {
        let mut oracle = consulted("contractive = true\nroles = [\"a\", \"b\"]\n");
        assert!(oracle.is_contractive().unwrap());
        assert_eq!(
            oracle.minimal_safe_partitions().unwrap(),
            vec![vec![vec!["a".to_string()], vec!["b".to_string()]]]
        );
        assert!(oracle.check_safe("[[ a ][ b ] ]").unwrap());
        assert!(oracle.check_safe("[[ a, b ] ]").unwrap());
        assert!(!oracle.check_safe("[[ a ] ]").unwrap());
        assert!(!oracle.check_safe("[[ a ][ b ][ c ] ]").unwrap());
    }

    #[test]
    fn test_dependent_roles() {
        let mut oracle = consulted(
            "contractive = true\nroles = [\"a\", \"b\"]\ndependencies = [[\"a\", \"b\"]]\n",
        );
        assert!(!oracle.check_safe("[[ a ][ b ] ]").unwrap());
        assert!(oracle.check_safe("[[ a, b ] ]").unwrap());
    }

    #[test]
    fn test_malformed_wire_is_an_error() {
        let mut oracle = consulted("contractive = true\nroles = [\"a\"]\n");
        assert!(matches!(oracle.check_safe("[[a] ]"), Err(OracleError::Malformed(_))));
    }

    #[test]
    fn test_consult_rejects_bad_artifacts() {
        for body in [
            "roles = [\"a\"]\n",
            "contractive = true\nroles = [\"a\", \"a\"]\n",
            "contractive = true\nroles = [\"a b\"]\n",
            "contractive = true\nroles = [\"a\"]\ndependencies = [[\"a\", \"z\"]]\n",
            "contractive = true\nroles = [\"a\"]\nextra = 1\n",
        ] {
            let file = artifact(body);
            let mut oracle = DependencyOracle::new();
            assert!(
                matches!(oracle.consult(file.path()), Err(OracleError::Consult { .. })),
                "accepted {body:?}"
            );
        }
    }

    #[test]
    fn test_retract_clears_facts() {
        let mut oracle = consulted("contractive = false\nroles = [\"a\"]\n");
        assert!(!oracle.is_contractive().unwrap());
        assert!(oracle.source().is_some());
        oracle.retract_all().unwrap();
        assert!(oracle.source().is_none());
        assert!(oracle.is_contractive().is_err());
    }

    #[test]
    fn test_cursor_enumerates_all_coarsenings_finest_first() {
        let mut oracle = consulted("contractive = true\nroles = [\"a\", \"b\", \"c\"]\n");
        let mut cursor = oracle.open_safe_partition_cursor().unwrap();
        let all = drain(cursor.as_mut());
        // Bell(3)
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].len(), 3);
        assert_eq!(all[4], vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]);
        for raw in all {
            let partition = Partition::from_blocks(raw).unwrap();
            assert!(oracle.check_safe(&partition.to_wire()).unwrap());
        }
    }

    #[test]
    fn test_cursor_respects_components() {
        let mut oracle = consulted(
            r#"
contractive = true
roles = ["a", "b", "c", "d"]
dependencies = [["a", "c"]]
"#,
        );
        let mut cursor = oracle.open_safe_partition_cursor().unwrap();
        // components {a,c} {b} {d} -> Bell(3)
        assert_eq!(drain(cursor.as_mut()).len(), 5);
    }

    #[test]
    fn test_cursor_with_no_roles_yields_empty_partition_once() {
        let mut oracle = consulted("contractive = true\nroles = []\n");
        let mut cursor = oracle.open_safe_partition_cursor().unwrap();
        assert_eq!(drain(cursor.as_mut()), vec![RawPartition::new()]);
    }

    #[test]
    fn test_closed_cursor_rejects_pulls() {
        let mut oracle = consulted("contractive = true\nroles = [\"a\"]\n");
        let mut cursor = oracle.open_safe_partition_cursor().unwrap();
        cursor.close();
        assert!(matches!(cursor.next_solution(), Err(OracleError::CursorClosed)));
    }

    #[test]
    fn test_predecessor_sequence() {
        let mut growth = Some(vec![0, 1, 2]);
        let mut seen = Vec::new();
        while let Some(g) = growth {
            seen.push(g.clone());
            growth = CoarseningCursor::predecessor(g);
        }
        assert_eq!(
            seen,
            vec![vec![0, 1, 2], vec![0, 1, 1], vec![0, 1, 0], vec![0, 0, 1], vec![0, 0, 0]]
        );
    }
}
