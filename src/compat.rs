//! Startup compatibility gate between this binary and the loaded wasm VM.
//!
//! The wasm VM is a separately versioned native runtime. A binary built
//! against one VM version must never serve traffic on top of another, so
//! startup compares the version baked into the build against the version
//! the loaded runtime reports about itself, and halts on mismatch.
//!
//! The check runs as one link in an ordered chain of startup
//! preconditions; the chain short-circuits on the first failure.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

/// Canonical identity of the wasm VM dependency in the build manifest.
pub const WASM_VM_DEPENDENCY: &str = "wasmvm";

/// The VM version this binary was built and tested against.
/// This MUST match the version the build actually links.
pub const BAKED_WASM_VM_VERSION: &str = "1.5.2";

// =============================================================================
// Collaborator interfaces
// =============================================================================

/// One dependency entry embedded at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInfo {
    /// Canonical dependency identity.
    pub path: String,
    /// Nominal version recorded at build time.
    pub version: String,
    /// Override/replacement version, preferred over `version` when present.
    pub replacement: Option<String>,
}

/// Read-only access to the dependency set embedded at build time.
///
/// Injected rather than read from ambient global state so tests can
/// substitute fixed values.
pub trait BuildManifestReader {
    fn dependencies(&self) -> Result<Vec<DependencyInfo>, CompatError>;
}

/// Queries the loaded native runtime for its self-reported version.
pub trait RuntimeVersionProvider {
    fn runtime_version(&self) -> Result<String, CompatError>;
}

/// Manifest backed by a fixed dependency table.
#[derive(Debug, Clone, Default)]
pub struct StaticManifest {
    deps: Vec<DependencyInfo>,
}

impl StaticManifest {
    pub fn new(deps: Vec<DependencyInfo>) -> Self {
        Self { deps }
    }

    /// The manifest baked into this binary: the pinned VM version, with an
    /// optional build-time override (set `WASMVM_VERSION_OVERRIDE` at
    /// compile time when linking a patched VM).
    pub fn baked() -> Self {
        Self::new(vec![DependencyInfo {
            path: WASM_VM_DEPENDENCY.to_string(),
            version: BAKED_WASM_VM_VERSION.to_string(),
            replacement: option_env!("WASMVM_VERSION_OVERRIDE").map(str::to_string),
        }])
    }
}

impl BuildManifestReader for StaticManifest {
    fn dependencies(&self) -> Result<Vec<DependencyInfo>, CompatError> {
        Ok(self.deps.clone())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Compatibility-gate failures. All fatal and non-retryable: each one is a
/// build or configuration defect a human must fix.
#[derive(Debug)]
pub enum CompatError {
    /// Build metadata could not be read at all.
    ManifestUnavailable { reason: String },
    /// The VM dependency entry is absent from the manifest.
    DependencyNotFound { path: String },
    /// The VM dependency is present but carries an empty version string.
    /// Kept distinct from [`CompatError::DependencyNotFound`]: an empty
    /// entry points at broken build tooling, not a missing dependency.
    EmptyDependencyVersion { path: String },
    /// The loaded runtime could not be queried for its version.
    RuntimeUnavailable { reason: String },
    /// The runtime's reported version is not covered by the built version.
    VersionMismatch { expected: String, actual: String },
}

impl fmt::Display for CompatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatError::ManifestUnavailable { reason } => {
                write!(f, "cannot read build manifest: {}", reason)
            }
            CompatError::DependencyNotFound { path } => {
                write!(f, "dependency {} not found in build manifest", path)
            }
            CompatError::EmptyDependencyVersion { path } => {
                write!(f, "dependency {} has an empty version in build manifest", path)
            }
            CompatError::RuntimeUnavailable { reason } => {
                write!(f, "unable to query wasm VM version: {}", reason)
            }
            CompatError::VersionMismatch { expected, actual } => write!(
                f,
                "wasm VM version mismatch. got: {}; expected: {}",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for CompatError {}

// =============================================================================
// The gate
// =============================================================================

/// Resolve the VM version this binary expects, preferring a replacement
/// over the nominal version when the manifest records one.
pub fn expected_runtime_version(
    manifest: &dyn BuildManifestReader,
) -> Result<String, CompatError> {
    let deps = manifest.dependencies()?;
    let dep = deps
        .into_iter()
        .find(|d| d.path == WASM_VM_DEPENDENCY)
        .ok_or_else(|| CompatError::DependencyNotFound {
            path: WASM_VM_DEPENDENCY.to_string(),
        })?;
    let version = dep.replacement.unwrap_or(dep.version);
    if version.is_empty() {
        return Err(CompatError::EmptyDependencyVersion { path: dep.path });
    }
    Ok(version)
}

/// Compare the expected VM version against the runtime's self-reported one.
///
/// The runtime version must be a substring of the expected version, which
/// tolerates build metadata embedded around the canonical semantic version
/// (e.g. expected `1.5.2+custom` vs reported `1.5.2`).
pub fn check_runtime_compatibility(
    manifest: &dyn BuildManifestReader,
    provider: &dyn RuntimeVersionProvider,
) -> Result<(), CompatError> {
    let expected = expected_runtime_version(manifest)?;
    let actual = provider.runtime_version()?;
    if !expected.contains(&actual) {
        warn!(%expected, %actual, "wasm VM version mismatch, refusing to start");
        return Err(CompatError::VersionMismatch { expected, actual });
    }
    debug!(%expected, %actual, "wasm VM version compatible");
    Ok(())
}

// =============================================================================
// Precondition chaining
// =============================================================================

/// One startup precondition. Runs before the process accepts any work.
pub type Precondition = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Combine independent preconditions into one that executes them in
/// registration order, stopping at the first failure.
pub fn chain_preconditions(checks: Vec<Precondition>) -> Precondition {
    Box::new(move || {
        for check in &checks {
            check()?;
        }
        Ok(())
    })
}

/// The compatibility gate as a chainable precondition, for appending to
/// the host's own pre-start hook.
pub fn compatibility_precondition(
    manifest: Arc<dyn BuildManifestReader + Send + Sync>,
    provider: Arc<dyn RuntimeVersionProvider + Send + Sync>,
) -> Precondition {
    Box::new(move || {
        check_runtime_compatibility(manifest.as_ref(), provider.as_ref())?;
        Ok(())
    })
}
