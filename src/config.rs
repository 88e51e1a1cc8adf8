//! Runtime configuration resolved from host option sources.
//!
//! The host hands the module a set of loosely-typed option sources (CLI
//! flags, environment-derived settings, a persisted config file). This
//! module merges them with the declared defaults into an immutable
//! [`WasmConfig`], coercing each value to its declared type and failing
//! fast on anything that does not coerce.
//!
//! Resolution is pure: it reads the sources and nothing else, so calling
//! it twice with the same sources yields an identical result.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Option name for the in-memory wasm module cache size (MiB).
pub const FLAG_WASM_MEMORY_CACHE_SIZE: &str = "wasm.memory_cache_size";
/// Option name for the smart-query gas ceiling.
pub const FLAG_WASM_QUERY_GAS_LIMIT: &str = "wasm.query_gas_limit";
/// Option name for the simulation gas ceiling. An empty string means unset.
pub const FLAG_WASM_SIMULATION_GAS_LIMIT: &str = "wasm.simulation_gas_limit";
/// The host's generic diagnostics flag, merged in as contract debug mode.
pub const FLAG_TRACE: &str = "trace";

/// Default in-memory cache size in MiB.
pub const DEFAULT_MEMORY_CACHE_SIZE_MIB: u32 = 100;
/// Default gas ceiling for smart queries.
pub const DEFAULT_SMART_QUERY_GAS_LIMIT: u64 = 3_000_000;

// =============================================================================
// WasmConfig
// =============================================================================

/// Resolved module configuration.
///
/// Created once at startup and read-only for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmConfig {
    /// Size in MiB of the in-memory wasm module cache. 0 disables it.
    pub memory_cache_size: u32,
    /// Max gas that a smart query may spend.
    pub smart_query_gas_limit: u64,
    /// Max gas that a simulation may spend. `None` means no explicit limit
    /// was configured; `Some` means the operator set one.
    pub simulation_gas_limit: Option<u64>,
    /// Forward VM debug output, driven by the host's `trace` flag.
    pub contract_debug_mode: bool,
}

impl Default for WasmConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: DEFAULT_MEMORY_CACHE_SIZE_MIB,
            smart_query_gas_limit: DEFAULT_SMART_QUERY_GAS_LIMIT,
            simulation_gas_limit: None,
            contract_debug_mode: false,
        }
    }
}

// =============================================================================
// Option sources
// =============================================================================

/// A loosely-typed value as it arrives from an option source.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Str(String),
    Uint(u64),
    Int(i64),
    Bool(bool),
}

impl OptionValue {
    /// Coerce to an unsigned 64-bit integer. Numeric strings parse.
    pub fn coerce_u64(&self) -> Option<u64> {
        match self {
            OptionValue::Str(s) => s.trim().parse().ok(),
            OptionValue::Uint(v) => Some(*v),
            OptionValue::Int(v) => u64::try_from(*v).ok(),
            OptionValue::Bool(_) => None,
        }
    }

    /// Coerce to an unsigned 32-bit integer. Numeric strings parse.
    pub fn coerce_u32(&self) -> Option<u32> {
        self.coerce_u64().and_then(|v| u32::try_from(v).ok())
    }

    /// Coerce to a boolean. Accepts `true`/`false`, `1`/`0`, `yes`/`no`,
    /// `on`/`off` (case-insensitive) for strings and 0/1 for integers.
    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(v) => Some(*v),
            OptionValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            OptionValue::Uint(0) | OptionValue::Int(0) => Some(false),
            OptionValue::Uint(1) | OptionValue::Int(1) => Some(true),
            _ => None,
        }
    }

    /// The raw string, when the value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Str(s) => write!(f, "{:?}", s),
            OptionValue::Uint(v) => write!(f, "{}", v),
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// A read-only supplier of named option values.
///
/// The resolver owns the merge; sources are only read. The host typically
/// supplies one source per input channel (flags, env, config file).
pub trait OptionSource {
    fn get(&self, name: &str) -> Option<OptionValue>;
}

/// Map-backed option source, used for environment-derived settings, file
/// contents, and tests.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: BTreeMap<String, OptionValue>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Load a persisted JSON config file into a source. Top-level scalar
    /// fields become options; nested objects flatten with `.` separators
    /// (so `{"wasm": {"query_gas_limit": 1}}` yields `wasm.query_gas_limit`).
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parse config file {}", path.display()))?;
        let mut source = Self::new();
        flatten_json("", &value, &mut source.values);
        Ok(source)
    }
}

fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, OptionValue>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, nested) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_json(&name, nested, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), OptionValue::Str(s.clone()));
        }
        serde_json::Value::Bool(b) => {
            out.insert(prefix.to_string(), OptionValue::Bool(*b));
        }
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                out.insert(prefix.to_string(), OptionValue::Uint(v));
            } else if let Some(v) = n.as_i64() {
                out.insert(prefix.to_string(), OptionValue::Int(v));
            }
        }
        // Arrays and nulls are not representable as options.
        _ => {}
    }
}

impl OptionSource for MapSource {
    fn get(&self, name: &str) -> Option<OptionValue> {
        self.values.get(name).cloned()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// An option value could not be coerced to its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    TypeMismatch {
        option: String,
        value: String,
        expected: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TypeMismatch {
                option,
                value,
                expected,
            } => write!(
                f,
                "option {} has value {} which is not a valid {}",
                option, value, expected
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

fn type_mismatch(option: &str, value: &OptionValue, expected: &'static str) -> ConfigError {
    ConfigError::TypeMismatch {
        option: option.to_string(),
        value: value.to_string(),
        expected,
    }
}

// =============================================================================
// Resolution
// =============================================================================

fn lookup(sources: &[&dyn OptionSource], name: &str) -> Option<OptionValue> {
    sources.iter().find_map(|source| source.get(name))
}

/// Merge declared defaults with the given option sources.
///
/// For each recognized option the first source that has it wins. The
/// simulation gas limit is special: a present empty string means "leave
/// unset", any other present value must coerce to an unsigned integer.
pub fn resolve_config(sources: &[&dyn OptionSource]) -> Result<WasmConfig, ConfigError> {
    let mut cfg = WasmConfig::default();

    if let Some(value) = lookup(sources, FLAG_WASM_MEMORY_CACHE_SIZE) {
        cfg.memory_cache_size = value
            .coerce_u32()
            .ok_or_else(|| type_mismatch(FLAG_WASM_MEMORY_CACHE_SIZE, &value, "u32"))?;
    }

    if let Some(value) = lookup(sources, FLAG_WASM_QUERY_GAS_LIMIT) {
        cfg.smart_query_gas_limit = value
            .coerce_u64()
            .ok_or_else(|| type_mismatch(FLAG_WASM_QUERY_GAS_LIMIT, &value, "u64"))?;
    }

    if let Some(value) = lookup(sources, FLAG_WASM_SIMULATION_GAS_LIMIT) {
        // Empty string means the operator left the limit unset.
        if value.as_str() != Some("") {
            let limit = value
                .coerce_u64()
                .ok_or_else(|| type_mismatch(FLAG_WASM_SIMULATION_GAS_LIMIT, &value, "u64"))?;
            cfg.simulation_gas_limit = Some(limit);
        }
    }

    // Contract debugging follows the host's global trace flag.
    if let Some(value) = lookup(sources, FLAG_TRACE) {
        cfg.contract_debug_mode = value
            .coerce_bool()
            .ok_or_else(|| type_mismatch(FLAG_TRACE, &value, "bool"))?;
    }

    debug!(
        memory_cache_size = cfg.memory_cache_size,
        smart_query_gas_limit = cfg.smart_query_gas_limit,
        simulation_gas_limit = ?cfg.simulation_gas_limit,
        contract_debug_mode = cfg.contract_debug_mode,
        "resolved wasm module configuration"
    );
    Ok(cfg)
}
