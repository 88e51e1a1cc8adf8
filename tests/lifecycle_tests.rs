//! End-to-end lifecycle tests: startup gating, config resolution across
//! sources, upgrade migration sequencing, and genesis round trips wired
//! through the module descriptor the way a host would drive them.

use std::sync::Arc;

use wasm_module::compat::{
    chain_preconditions, CompatError, DependencyInfo, Precondition, RuntimeVersionProvider,
    StaticManifest, WASM_VM_DEPENDENCY,
};
use wasm_module::config::{
    resolve_config, MapSource, OptionSource, OptionValue, WasmConfig, FLAG_TRACE,
    FLAG_WASM_QUERY_GAS_LIMIT, FLAG_WASM_SIMULATION_GAS_LIMIT,
};
use wasm_module::genesis::{AcceptAllValidator, GenesisBridge, GenesisState};
use wasm_module::module::{
    InMemoryConfigurator, MigrationProvider, ModuleDescriptor, CONSENSUS_VERSION,
};
use wasm_module::types::{ModuleState, ParticipantUpdate, StoredRecord};
use wasm_module::MigrationStep;

// =============================================================================
// Test fixtures
// =============================================================================

struct FixedVersion(&'static str);

impl RuntimeVersionProvider for FixedVersion {
    fn runtime_version(&self) -> Result<String, CompatError> {
        Ok(self.0.to_string())
    }
}

/// Keeper-style migrator: one marker-appending step per known origin.
struct Migrator {
    known_origins: Vec<u64>,
}

impl MigrationProvider for Migrator {
    fn step(&self, from_version: u64) -> Option<MigrationStep> {
        if !self.known_origins.contains(&from_version) {
            return None;
        }
        Some(Box::new(move |mut state: ModuleState| {
            state.records.push(StoredRecord {
                key: format!("upgrade-{}-{}", from_version, from_version + 1),
                value: serde_json::json!({ "applied": true }),
            });
            Ok(state)
        }))
    }
}

fn manifest(version: &str) -> StaticManifest {
    StaticManifest::new(vec![DependencyInfo {
        path: WASM_VM_DEPENDENCY.to_string(),
        version: version.to_string(),
        replacement: None,
    }])
}

fn module_with(vm_version: &'static str) -> ModuleDescriptor {
    ModuleDescriptor::new(
        GenesisBridge::new(Box::new(AcceptAllValidator)),
        Box::new(Migrator {
            known_origins: vec![1, 2],
        }),
        Arc::new(manifest("1.5.2+custom")),
        Arc::new(FixedVersion(vm_version)),
    )
}

// =============================================================================
// Upgrade scenario
// =============================================================================

#[test]
fn upgrade_from_stored_version_1_to_current() {
    // Module declares current version 3 and registers steps for origins 1
    // and 2; stored state is still at version 1.
    let module = module_with("1.5.2");
    let mut registry = InMemoryConfigurator::new();
    module
        .register_services(&mut registry)
        .expect("service registration should succeed");

    let sequencer = registry.sequencer("wasm").expect("migrations registered");
    sequencer
        .validate_chain(CONSENSUS_VERSION)
        .expect("chain must be contiguous before any upgrade runs");

    let stored = ModuleState::new(1);
    let migrated = sequencer
        .migrate(stored, 1, CONSENSUS_VERSION)
        .expect("upgrade should apply cleanly");

    assert_eq!(migrated.schema_version, 3, "stored version reaches current");
    let applied: Vec<&str> = migrated.records.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(
        applied,
        vec!["upgrade-1-2", "upgrade-2-3"],
        "steps apply in increasing origin order"
    );
}

#[test]
fn upgrade_with_gap_leaves_stored_state_alone() {
    let module = ModuleDescriptor::new(
        GenesisBridge::new(Box::new(AcceptAllValidator)),
        Box::new(Migrator {
            known_origins: vec![1], // origin 2 missing
        }),
        Arc::new(manifest("1.5.2")),
        Arc::new(FixedVersion("1.5.2")),
    );
    let mut registry = InMemoryConfigurator::new();
    assert!(
        module.register_services(&mut registry).is_err(),
        "a gap below the consensus version is fatal at registration time"
    );
}

// =============================================================================
// Startup gating
// =============================================================================

#[test]
fn host_prestart_chain_blocks_on_vm_mismatch() {
    let module = module_with("9.9.9");

    let host_check: Precondition = Box::new(|| Ok(()));
    let chain = chain_preconditions(vec![host_check, module.startup_precondition()]);

    let err = chain().expect_err("mismatched VM must block startup");
    let message = err.to_string();
    assert!(message.contains("9.9.9"), "carries the actual version");
    assert!(message.contains("1.5.2+custom"), "carries the expected version");
}

#[test]
fn host_prestart_chain_passes_on_substring_match() {
    // Reported 1.5.2 is embedded in the built 1.5.2+custom.
    let module = module_with("1.5.2");
    let chain = chain_preconditions(vec![module.startup_precondition()]);
    chain().expect("substring match should pass the gate");
}

// =============================================================================
// Config resolution across sources
// =============================================================================

#[test]
fn flags_env_and_file_merge_deterministically() {
    let flag_source = MapSource::new().with_option(
        FLAG_WASM_SIMULATION_GAS_LIMIT,
        OptionValue::Str("5000".into()),
    );
    let env_source = MapSource::new().with_option(FLAG_TRACE, OptionValue::Str("true".into()));

    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("app.json");
    std::fs::write(
        &path,
        r#"{"wasm": {"query_gas_limit": 7000000, "memory_cache_size": 256}}"#,
    )
    .expect("write config file");
    let file_source = MapSource::from_json_file(&path).expect("load config file");
    assert!(
        file_source.get(FLAG_WASM_QUERY_GAS_LIMIT).is_some(),
        "nested file keys flatten to dotted option names"
    );

    let cfg = resolve_config(&[&flag_source, &env_source, &file_source])
        .expect("merged resolution should succeed");
    assert_eq!(cfg.memory_cache_size, 256);
    assert_eq!(cfg.smart_query_gas_limit, 7_000_000);
    assert_eq!(cfg.simulation_gas_limit, Some(5000));
    assert!(cfg.contract_debug_mode);

    // Same sources, same result.
    let again = resolve_config(&[&flag_source, &env_source, &file_source]).unwrap();
    assert_eq!(cfg, again);
}

#[test]
fn no_sources_resolve_to_declared_defaults() {
    let cfg = resolve_config(&[]).expect("defaults always resolve");
    assert_eq!(cfg, WasmConfig::default());
    assert_eq!(cfg.memory_cache_size, 100);
    assert_eq!(cfg.smart_query_gas_limit, 3_000_000);
    assert!(cfg.simulation_gas_limit.is_none());
    assert!(!cfg.contract_debug_mode);
}

// =============================================================================
// Genesis boot and export
// =============================================================================

#[test]
fn genesis_boot_and_export_through_descriptor() {
    let module = ModuleDescriptor::new(
        GenesisBridge::new(Box::new(AcceptAllValidator)).with_init_hook(Box::new(
            |_state: &GenesisState| {
                vec![ParticipantUpdate {
                    identity: "validator-0".into(),
                    power: 10,
                }]
            },
        )),
        Box::new(Migrator {
            known_origins: vec![1, 2],
        }),
        Arc::new(manifest("1.5.2")),
        Arc::new(FixedVersion("1.5.2")),
    );

    let blob = module.default_genesis();
    module
        .validate_genesis(&blob)
        .expect("default genesis should validate");

    let (state, participants) = module
        .init_genesis(&blob)
        .expect("default genesis should import");
    assert_eq!(state, GenesisState::default());
    assert_eq!(participants.len(), 1, "init hook designates participants");

    let exported = module.export_genesis(&state);
    let (reimported, _) = module
        .init_genesis(&exported)
        .expect("exported state should re-import");
    assert_eq!(reimported, state, "round trip reproduces the state");
}

#[test]
fn genesis_rejects_malformed_blob() {
    let module = module_with("1.5.2");
    assert!(module.validate_genesis(b"\xff\xfe not json").is_err());
    assert!(module.init_genesis(b"[1,2,3]").is_err());
}
