//! Composition root: the module descriptor the host application drives.
//!
//! The descriptor aggregates the config resolver, compatibility gate,
//! migration sequencer, and genesis bridge behind the fixed lifecycle
//! surface the host expects: identity, genesis hooks, service
//! registration, cycle hooks, and a chainable startup precondition.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::compat::{
    compatibility_precondition, BuildManifestReader, Precondition, RuntimeVersionProvider,
};
use crate::genesis::{GenesisBridge, GenesisError, GenesisState};
use crate::migrations::{MigrationError, MigrationSequencer, MigrationStep};
use crate::types::ParticipantUpdate;

/// Stable module name, also the message-handler route.
pub const MODULE_NAME: &str = "wasm";

/// Query route, identical to the module name.
pub const QUERIER_ROUTE: &str = MODULE_NAME;

/// Current schema version of the module's persisted data.
///
/// Must increase by exactly 1 for any change that is incompatible with
/// previously stored data. Starts at 1.
pub const CONSENSUS_VERSION: u64 = 3;

// =============================================================================
// Host-side registries
// =============================================================================

/// Host-provided registry the module installs itself into. Registration
/// is opaque to the module beyond these calls.
pub trait ModuleConfigurator {
    fn register_msg_handler(&mut self, route: &str) -> anyhow::Result<()>;
    fn register_query_handler(&mut self, route: &str) -> anyhow::Result<()>;
    fn register_migration(
        &mut self,
        module: &str,
        from_version: u64,
        step: MigrationStep,
    ) -> Result<(), MigrationError>;
}

/// In-memory configurator for tests and single-process hosts. Holds one
/// migration sequencer per registered module.
#[derive(Debug, Default)]
pub struct InMemoryConfigurator {
    msg_routes: Vec<String>,
    query_routes: Vec<String>,
    migrations: BTreeMap<String, MigrationSequencer>,
}

impl InMemoryConfigurator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn msg_routes(&self) -> &[String] {
        &self.msg_routes
    }

    pub fn query_routes(&self) -> &[String] {
        &self.query_routes
    }

    /// The migration sequencer collected for a module, if any.
    pub fn sequencer(&self, module: &str) -> Option<&MigrationSequencer> {
        self.migrations.get(module)
    }
}

impl ModuleConfigurator for InMemoryConfigurator {
    fn register_msg_handler(&mut self, route: &str) -> anyhow::Result<()> {
        if self.msg_routes.iter().any(|r| r == route) {
            anyhow::bail!("msg handler route {} already registered", route);
        }
        self.msg_routes.push(route.to_string());
        Ok(())
    }

    fn register_query_handler(&mut self, route: &str) -> anyhow::Result<()> {
        if self.query_routes.iter().any(|r| r == route) {
            anyhow::bail!("query handler route {} already registered", route);
        }
        self.query_routes.push(route.to_string());
        Ok(())
    }

    fn register_migration(
        &mut self,
        module: &str,
        from_version: u64,
        step: MigrationStep,
    ) -> Result<(), MigrationError> {
        self.migrations
            .entry(module.to_string())
            .or_default()
            .register_migration(from_version, step)
    }
}

// =============================================================================
// Subsystem collaborators
// =============================================================================

/// Supplies one migration step per origin version. Owned by the keeper's
/// migrator; the descriptor asks for every transition below the consensus
/// version.
pub trait MigrationProvider {
    fn step(&self, from_version: u64) -> Option<MigrationStep>;
}

/// A simulation operation with its selection weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedOperation {
    pub weight: u32,
    pub name: String,
}

/// Simulation genesis/operation generation, delegated to the subsystem.
pub trait SimulationGenerators {
    fn genesis_state(&self, seed: u64) -> GenesisState;
    fn weighted_operations(&self) -> Vec<WeightedOperation>;
}

// =============================================================================
// ModuleDescriptor
// =============================================================================

/// The module as the host sees it: identity, lifecycle hooks, and
/// injected collaborators.
pub struct ModuleDescriptor {
    genesis: GenesisBridge,
    migrations: Box<dyn MigrationProvider + Send + Sync>,
    manifest: Arc<dyn BuildManifestReader + Send + Sync>,
    runtime: Arc<dyn RuntimeVersionProvider + Send + Sync>,
    simulation: Option<Box<dyn SimulationGenerators + Send + Sync>>,
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &MODULE_NAME)
            .field("consensus_version", &CONSENSUS_VERSION)
            .finish()
    }
}

impl ModuleDescriptor {
    pub fn new(
        genesis: GenesisBridge,
        migrations: Box<dyn MigrationProvider + Send + Sync>,
        manifest: Arc<dyn BuildManifestReader + Send + Sync>,
        runtime: Arc<dyn RuntimeVersionProvider + Send + Sync>,
    ) -> Self {
        Self {
            genesis,
            migrations,
            manifest,
            runtime,
            simulation: None,
        }
    }

    /// Attach subsystem-provided simulation generators.
    pub fn with_simulation(
        mut self,
        generators: Box<dyn SimulationGenerators + Send + Sync>,
    ) -> Self {
        self.simulation = Some(generators);
        self
    }

    // -- identity ------------------------------------------------------------

    pub fn name(&self) -> &'static str {
        MODULE_NAME
    }

    pub fn consensus_version(&self) -> u64 {
        CONSENSUS_VERSION
    }

    pub fn querier_route(&self) -> &'static str {
        QUERIER_ROUTE
    }

    // -- genesis hooks -------------------------------------------------------

    /// Default genesis blob for a fresh chain.
    pub fn default_genesis(&self) -> Vec<u8> {
        GenesisBridge::default_genesis()
    }

    /// Validate a genesis blob without applying it.
    pub fn validate_genesis(&self, bytes: &[u8]) -> Result<(), GenesisError> {
        self.genesis.validate_bytes(bytes)
    }

    /// Import a genesis blob at boot. Returns the typed state for the
    /// keeper to apply plus the initial participant set.
    pub fn init_genesis(
        &self,
        bytes: &[u8],
    ) -> Result<(GenesisState, Vec<ParticipantUpdate>), GenesisError> {
        self.genesis.import(bytes)
    }

    /// Export the current state as a genesis blob.
    pub fn export_genesis(&self, state: &GenesisState) -> Vec<u8> {
        self.genesis.export(state)
    }

    // -- service registration ------------------------------------------------

    /// Install the module's handlers and every migration transition below
    /// the consensus version into the host registry.
    ///
    /// A missing or conflicting step is fatal: startup must abort rather
    /// than leave the upgrade chain incomplete.
    pub fn register_services(&self, cfg: &mut dyn ModuleConfigurator) -> anyhow::Result<()> {
        cfg.register_msg_handler(MODULE_NAME)?;
        cfg.register_query_handler(QUERIER_ROUTE)?;

        for origin in 1..CONSENSUS_VERSION {
            let step = self
                .migrations
                .step(origin)
                .ok_or(MigrationError::MissingMigrationStep {
                    from_version: origin,
                })
                .with_context(|| format!("registering migrations for module {}", MODULE_NAME))?;
            cfg.register_migration(MODULE_NAME, origin, step)
                .with_context(|| format!("registering migration from version {}", origin))?;
        }
        info!(
            module = MODULE_NAME,
            consensus_version = CONSENSUS_VERSION,
            "module services registered"
        );
        Ok(())
    }

    // -- startup gating ------------------------------------------------------

    /// The VM compatibility gate as a precondition to append to the
    /// host's pre-start hook chain.
    pub fn startup_precondition(&self) -> Precondition {
        compatibility_precondition(self.manifest.clone(), self.runtime.clone())
    }

    // -- reserved extension points -------------------------------------------

    /// Begin-of-cycle hook. Reserved; intentionally a no-op.
    pub fn begin_cycle(&self) {}

    /// End-of-cycle hook. Reserved; returns no participant updates.
    pub fn end_cycle(&self) -> Vec<ParticipantUpdate> {
        Vec::new()
    }

    /// Invariant-check registration. Reserved; intentionally a no-op.
    pub fn register_invariants(&self) {}

    // -- simulation delegation -----------------------------------------------

    /// Randomized genesis state for the simulation harness. Falls back to
    /// the default state when no generators are attached.
    pub fn generate_genesis_state(&self, seed: u64) -> GenesisState {
        match &self.simulation {
            Some(generators) => generators.genesis_state(seed),
            None => GenesisState::default(),
        }
    }

    /// Weighted simulation operations, delegated to the subsystem.
    pub fn weighted_operations(&self) -> Vec<WeightedOperation> {
        match &self.simulation {
            Some(generators) => generators.weighted_operations(),
            None => Vec::new(),
        }
    }
}
