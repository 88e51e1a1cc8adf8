//! Wasm module lifecycle core.
//!
//! Plugs the wasm subsystem into a block-oriented host application and
//! owns the parts of its lifecycle with real invariants to protect:
//!
//! - **Config resolution** ([`config`], [`flags`]): merges defaults with
//!   loosely-typed host option sources into an immutable [`WasmConfig`].
//! - **Compatibility gating** ([`compat`]): refuses to start when the
//!   loaded wasm VM does not match the version this binary was built
//!   against.
//! - **Schema migrations** ([`migrations`]): ordered, gap-checked,
//!   exactly-once application of stored-state migrations across upgrades.
//! - **Genesis bridging** ([`genesis`]): import/export between opaque
//!   blobs and the module's typed state snapshot.
//! - **Composition** ([`module`]): the [`ModuleDescriptor`] binding the
//!   above behind the host's fixed lifecycle surface.
//!
//! The keeper's business logic, the host's execution pipeline, and wire
//! codecs are external collaborators reached through the narrow traits in
//! these modules.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wasm_module::compat::{CompatError, RuntimeVersionProvider, StaticManifest};
//! use wasm_module::genesis::{AcceptAllValidator, GenesisBridge};
//! use wasm_module::migrations::MigrationStep;
//! use wasm_module::module::{InMemoryConfigurator, MigrationProvider, ModuleDescriptor};
//!
//! struct IdentitySteps;
//! impl MigrationProvider for IdentitySteps {
//!     fn step(&self, _from_version: u64) -> Option<MigrationStep> {
//!         Some(Box::new(|state| Ok(state)))
//!     }
//! }
//!
//! struct VmStub;
//! impl RuntimeVersionProvider for VmStub {
//!     fn runtime_version(&self) -> Result<String, CompatError> {
//!         Ok("1.5.2".to_string())
//!     }
//! }
//!
//! let module = ModuleDescriptor::new(
//!     GenesisBridge::new(Box::new(AcceptAllValidator)),
//!     Box::new(IdentitySteps),
//!     Arc::new(StaticManifest::baked()),
//!     Arc::new(VmStub),
//! );
//! let mut registry = InMemoryConfigurator::new();
//! module.register_services(&mut registry).unwrap();
//! ```

pub mod compat;
pub mod config;
pub mod flags;
pub mod genesis;
pub mod migrations;
pub mod module;
pub mod types;

// Re-export the main surface at the crate root for convenience.
pub use compat::{
    chain_preconditions, check_runtime_compatibility, BuildManifestReader, CompatError,
    DependencyInfo, Precondition, RuntimeVersionProvider, StaticManifest,
};
pub use config::{resolve_config, ConfigError, MapSource, OptionSource, OptionValue, WasmConfig};
pub use genesis::{GenesisBridge, GenesisError, GenesisState, SubsystemValidator};
pub use migrations::{MigrationError, MigrationSequencer, MigrationStep};
pub use module::{
    InMemoryConfigurator, MigrationProvider, ModuleConfigurator, ModuleDescriptor,
    SimulationGenerators, WeightedOperation, CONSENSUS_VERSION, MODULE_NAME,
};
pub use types::{ModuleState, ParticipantUpdate, Params};
