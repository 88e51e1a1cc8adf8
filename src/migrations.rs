//! Ordered schema migration registry and sequencer.
//!
//! Migrations are registered declaratively at composition time, keyed by
//! the origin schema version they move the module FROM. Because the
//! registry is a map rather than a call-site-ordered list, the full chain
//! can be validated for gaps before any migration runs; a gap is a fatal
//! configuration error detected up front, never mid-upgrade.
//!
//! During an upgrade the sequencer applies the contiguous subsequence of
//! steps in strictly increasing origin order, each step at most once. A
//! step failure aborts the upgrade; there are no retries and the host is
//! expected to halt rather than run with partially migrated state.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::types::ModuleState;

/// A single migration step: a pure transformation of the stored state.
///
/// The sequencer stamps the new schema version after a successful step, so
/// steps only transform data and never manage version bookkeeping.
pub type MigrationStep = Box<dyn Fn(ModuleState) -> anyhow::Result<ModuleState> + Send + Sync>;

// =============================================================================
// Errors
// =============================================================================

/// Migration registry integrity and sequencing errors. Fatal at
/// composition or upgrade time; never silently skipped.
#[derive(Debug)]
pub enum MigrationError {
    /// A step for this origin version is already registered.
    DuplicateMigration { from_version: u64 },
    /// A required origin version has no registered step.
    MissingMigrationStep { from_version: u64 },
    /// The requested range is not a valid upgrade (origins start at 1 and
    /// the target must be above the origin).
    InvalidVersionRange { from_version: u64, to_version: u64 },
    /// A step itself failed; the upgrade is aborted.
    StepFailed {
        from_version: u64,
        source: anyhow::Error,
    },
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::DuplicateMigration { from_version } => {
                write!(f, "migration from version {} already registered", from_version)
            }
            MigrationError::MissingMigrationStep { from_version } => {
                write!(f, "no migration registered from version {}", from_version)
            }
            MigrationError::InvalidVersionRange {
                from_version,
                to_version,
            } => write!(
                f,
                "invalid migration range {} -> {}",
                from_version, to_version
            ),
            MigrationError::StepFailed {
                from_version,
                source,
            } => write!(
                f,
                "migration from version {} failed: {}",
                from_version, source
            ),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::StepFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

// =============================================================================
// Sequencer
// =============================================================================

/// Registry of migration steps keyed by origin schema version.
#[derive(Default)]
pub struct MigrationSequencer {
    steps: BTreeMap<u64, MigrationStep>,
}

impl fmt::Debug for MigrationSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationSequencer")
            .field("origins", &self.registered_origins())
            .finish()
    }
}

impl MigrationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the step that migrates the module from `from_version` to
    /// `from_version + 1`. Registering the same origin twice fails.
    pub fn register_migration(
        &mut self,
        from_version: u64,
        step: MigrationStep,
    ) -> Result<(), MigrationError> {
        if from_version == 0 {
            return Err(MigrationError::InvalidVersionRange {
                from_version: 0,
                to_version: 1,
            });
        }
        if self.steps.contains_key(&from_version) {
            return Err(MigrationError::DuplicateMigration { from_version });
        }
        self.steps.insert(from_version, step);
        debug!(from_version, "registered migration step");
        Ok(())
    }

    /// Origins with a registered step, in increasing order.
    pub fn registered_origins(&self) -> Vec<u64> {
        self.steps.keys().copied().collect()
    }

    /// Verify the chain covers every transition up to `current_version`.
    ///
    /// Run at composition time so a gap is discovered before any upgrade.
    pub fn validate_chain(&self, current_version: u64) -> Result<(), MigrationError> {
        for origin in 1..current_version {
            if !self.steps.contains_key(&origin) {
                return Err(MigrationError::MissingMigrationStep {
                    from_version: origin,
                });
            }
        }
        Ok(())
    }

    /// Apply the chain of steps taking the state from `from_version` up to
    /// `to_version`, in increasing origin order.
    ///
    /// The whole subrange is checked for missing steps before anything is
    /// applied, so a gap never leaves the state partially migrated.
    pub fn migrate(
        &self,
        state: ModuleState,
        from_version: u64,
        to_version: u64,
    ) -> Result<ModuleState, MigrationError> {
        if from_version == 0 || from_version >= to_version {
            return Err(MigrationError::InvalidVersionRange {
                from_version,
                to_version,
            });
        }
        for origin in from_version..to_version {
            if !self.steps.contains_key(&origin) {
                return Err(MigrationError::MissingMigrationStep {
                    from_version: origin,
                });
            }
        }

        let mut current = state;
        for origin in from_version..to_version {
            let step = &self.steps[&origin];
            current = step(current).map_err(|source| MigrationError::StepFailed {
                from_version: origin,
                source,
            })?;
            current.schema_version = origin + 1;
            debug!(
                origin,
                new_version = current.schema_version,
                "applied migration step"
            );
        }
        info!(from_version, to_version, "module schema migrated");
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoredRecord;

    /// Step that appends a marker record, so application order is visible
    /// in the resulting state.
    fn marker_step(marker: &'static str) -> MigrationStep {
        Box::new(move |mut state: ModuleState| {
            state.records.push(StoredRecord {
                key: marker.to_string(),
                value: serde_json::Value::Null,
            });
            Ok(state)
        })
    }

    fn markers(state: &ModuleState) -> Vec<&str> {
        state.records.iter().map(|r| r.key.as_str()).collect()
    }

    #[test]
    fn applies_steps_in_increasing_order() {
        let mut seq = MigrationSequencer::new();
        // Registration order is deliberately reversed.
        seq.register_migration(2, marker_step("v2->v3")).unwrap();
        seq.register_migration(1, marker_step("v1->v2")).unwrap();

        let migrated = seq
            .migrate(ModuleState::new(1), 1, 3)
            .expect("contiguous chain should apply");
        assert_eq!(markers(&migrated), vec!["v1->v2", "v2->v3"]);
        assert_eq!(migrated.schema_version, 3);
    }

    #[test]
    fn result_equals_step_composition() {
        let mut seq = MigrationSequencer::new();
        seq.register_migration(1, marker_step("a")).unwrap();
        seq.register_migration(2, marker_step("b")).unwrap();
        seq.register_migration(3, marker_step("c")).unwrap();

        let via_sequencer = seq.migrate(ModuleState::new(1), 1, 4).unwrap();

        let mut by_hand = ModuleState::new(1);
        for marker in ["a", "b", "c"] {
            by_hand = marker_step(marker)(by_hand).unwrap();
        }
        by_hand.schema_version = 4;

        assert_eq!(via_sequencer, by_hand);
    }

    #[test]
    fn missing_step_fails_without_partial_application() {
        let mut seq = MigrationSequencer::new();
        seq.register_migration(1, marker_step("v1->v2")).unwrap();
        // Origin 2 is missing.
        seq.register_migration(3, marker_step("v3->v4")).unwrap();

        let state = ModuleState::new(1);
        let err = seq
            .migrate(state.clone(), 1, 4)
            .expect_err("gap at origin 2 must fail");
        assert!(matches!(
            err,
            MigrationError::MissingMigrationStep { from_version: 2 }
        ));
        // The caller's copy is untouched; nothing was applied.
        assert_eq!(state, ModuleState::new(1));
    }

    #[test]
    fn duplicate_registration_fails_second_call() {
        let mut seq = MigrationSequencer::new();
        seq.register_migration(1, marker_step("first")).unwrap();
        let err = seq
            .register_migration(1, marker_step("second"))
            .expect_err("second registration for origin 1 must fail");
        assert!(matches!(
            err,
            MigrationError::DuplicateMigration { from_version: 1 }
        ));
    }

    #[test]
    fn validate_chain_detects_gap_at_composition_time() {
        let mut seq = MigrationSequencer::new();
        seq.register_migration(1, marker_step("v1->v2")).unwrap();
        seq.register_migration(3, marker_step("v3->v4")).unwrap();

        assert!(seq.validate_chain(2).is_ok());
        assert!(matches!(
            seq.validate_chain(4),
            Err(MigrationError::MissingMigrationStep { from_version: 2 })
        ));
    }

    #[test]
    fn step_failure_aborts_upgrade() {
        let mut seq = MigrationSequencer::new();
        seq.register_migration(1, marker_step("ok")).unwrap();
        seq.register_migration(
            2,
            Box::new(|_state| anyhow::bail!("corrupt record at key 7")),
        )
        .unwrap();

        let err = seq
            .migrate(ModuleState::new(1), 1, 3)
            .expect_err("failing step must abort");
        match err {
            MigrationError::StepFailed {
                from_version,
                source,
            } => {
                assert_eq!(from_version, 2);
                assert!(source.to_string().contains("corrupt record"));
            }
            other => panic!("expected StepFailed, got {other}"),
        }
    }

    #[test]
    fn rejects_invalid_ranges() {
        let seq = MigrationSequencer::new();
        assert!(matches!(
            seq.migrate(ModuleState::new(1), 2, 2),
            Err(MigrationError::InvalidVersionRange { .. })
        ));
        assert!(matches!(
            seq.migrate(ModuleState::new(1), 3, 2),
            Err(MigrationError::InvalidVersionRange { .. })
        ));
        assert!(matches!(
            seq.migrate(ModuleState::new(1), 0, 2),
            Err(MigrationError::InvalidVersionRange { .. })
        ));
    }

    #[test]
    fn rejects_zero_origin_registration() {
        let mut seq = MigrationSequencer::new();
        assert!(seq.register_migration(0, marker_step("bad")).is_err());
    }
}
