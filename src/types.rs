//! Shared domain types for the wasm module lifecycle core.
//!
//! These are the pieces of persisted state the lifecycle code threads
//! through migrations and genesis handling. The keeper owns the semantics
//! of the records; this core only moves them around intact.

use serde::{Deserialize, Serialize};

/// Who may perform a permissioned action (code upload, instantiation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Nobody may perform the action.
    Nobody,
    /// Anyone may perform the action.
    Everybody,
    /// Only the addresses listed in the enclosing [`AccessConfig`].
    AnyOfAddresses,
}

/// Access policy with an optional address allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    pub permission: AccessType,
    /// Populated only for [`AccessType::AnyOfAddresses`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

impl AccessConfig {
    /// Policy allowing everybody.
    pub fn everybody() -> Self {
        Self {
            permission: AccessType::Everybody,
            addresses: Vec::new(),
        }
    }

    /// Policy allowing nobody.
    pub fn nobody() -> Self {
        Self {
            permission: AccessType::Nobody,
            addresses: Vec::new(),
        }
    }

    /// Policy restricted to the given addresses.
    pub fn any_of(addresses: Vec<String>) -> Self {
        Self {
            permission: AccessType::AnyOfAddresses,
            addresses,
        }
    }

    /// Structural validation: the address list must agree with the
    /// permission kind.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.permission {
            AccessType::AnyOfAddresses => {
                if self.addresses.is_empty() {
                    anyhow::bail!("any-of-addresses access requires at least one address");
                }
                let mut seen = std::collections::BTreeSet::new();
                for addr in &self.addresses {
                    if addr.is_empty() {
                        anyhow::bail!("access list contains an empty address");
                    }
                    if !seen.insert(addr) {
                        anyhow::bail!("duplicate address in access list: {}", addr);
                    }
                }
                Ok(())
            }
            AccessType::Nobody | AccessType::Everybody => {
                if !self.addresses.is_empty() {
                    anyhow::bail!(
                        "access list must be empty for {:?} permission",
                        self.permission
                    );
                }
                Ok(())
            }
        }
    }
}

/// On-chain parameters of the wasm module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Who may upload new code.
    pub code_upload_access: AccessConfig,
    /// Default instantiation permission stamped onto uploaded code.
    pub instantiate_default_permission: AccessType,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            code_upload_access: AccessConfig::everybody(),
            instantiate_default_permission: AccessType::Everybody,
        }
    }
}

impl Params {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.code_upload_access.validate()
    }
}

/// An opaque keeper-owned record carried through migrations unchanged
/// unless a step rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub value: serde_json::Value,
}

/// The module's stored state snapshot as seen by the migration sequencer.
///
/// `schema_version` never exceeds the module's declared consensus version
/// and only advances when a migration step is applied successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub schema_version: u64,
    pub params: Params,
    #[serde(default)]
    pub records: Vec<StoredRecord>,
}

impl ModuleState {
    /// Fresh state at the given schema version with default params.
    pub fn new(schema_version: u64) -> Self {
        Self {
            schema_version,
            params: Params::default(),
            records: Vec::new(),
        }
    }
}

/// An external participant identity designated during genesis bootstrap
/// (validator-update analog). Pass-through for this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    pub identity: String,
    pub power: i64,
}
