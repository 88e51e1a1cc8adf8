//! Genesis state bridge: (de)serialization between opaque blobs and the
//! module's typed genesis snapshot.
//!
//! The bridge owns the round trip and structural checks; semantic
//! validation belongs to the subsystem's validator, whose errors pass
//! through unmodified. Import never partially applies: a decode or
//! validation failure leaves nothing behind.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{AccessConfig, ParticipantUpdate, Params};

// =============================================================================
// Genesis data model
// =============================================================================

/// One uploaded code blob with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub code_id: u64,
    pub creator: String,
    pub code_bytes: Vec<u8>,
    pub instantiate_permission: AccessConfig,
}

/// One instantiated contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub address: String,
    pub code_id: u64,
    pub label: String,
}

/// A persisted id-generation sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id_key: String,
    pub value: u64,
}

/// Full snapshot of the module's persisted state for bootstrap and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    pub params: Params,
    #[serde(default)]
    pub codes: Vec<Code>,
    #[serde(default)]
    pub contracts: Vec<Contract>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

impl Default for GenesisState {
    fn default() -> Self {
        Self {
            params: Params::default(),
            codes: Vec::new(),
            contracts: Vec::new(),
            sequences: Vec::new(),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Genesis input errors. Both abort the boot/import operation.
#[derive(Debug)]
pub enum GenesisError {
    /// The serialized blob is malformed.
    Decode { reason: String },
    /// The blob decoded but the state is semantically invalid.
    Validation { source: anyhow::Error },
}

impl fmt::Display for GenesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenesisError::Decode { reason } => {
                write!(f, "malformed genesis state: {}", reason)
            }
            GenesisError::Validation { source } => {
                write!(f, "invalid genesis state: {}", source)
            }
        }
    }
}

impl std::error::Error for GenesisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenesisError::Validation { source } => Some(source.as_ref()),
            GenesisError::Decode { .. } => None,
        }
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Semantic validation owned by the keeper. Errors propagate unmodified.
pub trait SubsystemValidator {
    fn validate(&self, state: &GenesisState) -> anyhow::Result<()>;
}

/// Validator that accepts everything; structural checks still apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

impl SubsystemValidator for AcceptAllValidator {
    fn validate(&self, _state: &GenesisState) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Designates the initial participant set during bootstrap. The subsystem
/// computes it; the bridge only passes it through.
pub type InitHook = Box<dyn Fn(&GenesisState) -> Vec<ParticipantUpdate> + Send + Sync>;

// =============================================================================
// Structural validation
// =============================================================================

/// Structural well-formedness of a genesis snapshot: valid params, unique
/// positive code ids, and contracts referencing declared codes.
pub fn validate_genesis(state: &GenesisState) -> anyhow::Result<()> {
    state.params.validate()?;

    let mut code_ids = std::collections::BTreeSet::new();
    for code in &state.codes {
        if code.code_id == 0 {
            anyhow::bail!("code id must be positive");
        }
        if !code_ids.insert(code.code_id) {
            anyhow::bail!("duplicate code id: {}", code.code_id);
        }
        code.instantiate_permission.validate()?;
    }

    for contract in &state.contracts {
        if contract.address.is_empty() {
            anyhow::bail!("contract address must not be empty");
        }
        if !state.codes.is_empty() && !code_ids.contains(&contract.code_id) {
            anyhow::bail!(
                "contract {} references unknown code id {}",
                contract.address,
                contract.code_id
            );
        }
    }
    Ok(())
}

// =============================================================================
// Bridge
// =============================================================================

/// Converts between opaque serialized blobs and typed genesis state,
/// delegating semantic validation and participant designation.
pub struct GenesisBridge {
    validator: Box<dyn SubsystemValidator + Send + Sync>,
    init_hook: Option<InitHook>,
}

impl fmt::Debug for GenesisBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenesisBridge")
            .field("has_init_hook", &self.init_hook.is_some())
            .finish()
    }
}

impl GenesisBridge {
    pub fn new(validator: Box<dyn SubsystemValidator + Send + Sync>) -> Self {
        Self {
            validator,
            init_hook: None,
        }
    }

    /// Attach the bootstrap participant hook.
    pub fn with_init_hook(mut self, hook: InitHook) -> Self {
        self.init_hook = Some(hook);
        self
    }

    /// Default genesis blob: default params, no records.
    pub fn default_genesis() -> Vec<u8> {
        Self::encode(&GenesisState::default())
    }

    /// Serialize a genesis snapshot.
    ///
    /// Never fails: every exportable state was produced by a successful
    /// import or live operation and is well-formed by construction.
    pub fn export(&self, state: &GenesisState) -> Vec<u8> {
        debug!(
            codes = state.codes.len(),
            contracts = state.contracts.len(),
            "exporting genesis state"
        );
        Self::encode(state)
    }

    fn encode(state: &GenesisState) -> Vec<u8> {
        // Serialization of fully derived types cannot fail.
        serde_json::to_vec(state).expect("genesis state always serializes")
    }

    fn decode(bytes: &[u8]) -> Result<GenesisState, GenesisError> {
        serde_json::from_slice(bytes).map_err(|err| GenesisError::Decode {
            reason: err.to_string(),
        })
    }

    /// Decode and validate a genesis blob without applying it.
    pub fn validate_bytes(&self, bytes: &[u8]) -> Result<(), GenesisError> {
        let state = Self::decode(bytes)?;
        self.run_validators(&state)
    }

    /// Decode, validate, and hand the state to the subsystem for
    /// bootstrap. Returns the typed state together with the initial
    /// participant identities the subsystem designates.
    pub fn import(
        &self,
        bytes: &[u8],
    ) -> Result<(GenesisState, Vec<ParticipantUpdate>), GenesisError> {
        let state = Self::decode(bytes)?;
        self.run_validators(&state)?;

        let participants = match &self.init_hook {
            Some(hook) => hook(&state),
            None => Vec::new(),
        };
        info!(
            codes = state.codes.len(),
            contracts = state.contracts.len(),
            participants = participants.len(),
            "genesis state imported"
        );
        Ok((state, participants))
    }

    fn run_validators(&self, state: &GenesisState) -> Result<(), GenesisError> {
        validate_genesis(state)
            .and_then(|()| self.validator.validate(state))
            .map_err(|source| GenesisError::Validation { source })
    }
}
