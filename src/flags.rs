//! Startup flag surface for the host's start command.
//!
//! The host owns the command tree; this module only contributes the three
//! wasm options to the start command and adapts the parsed matches back
//! into an [`OptionSource`] for config resolution. Flag values stay
//! strings on the command line and are coerced during resolution, so CLI
//! input goes through the same type checks as every other source.

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::config::{
    OptionSource, OptionValue, WasmConfig, FLAG_TRACE, FLAG_WASM_MEMORY_CACHE_SIZE,
    FLAG_WASM_QUERY_GAS_LIMIT, FLAG_WASM_SIMULATION_GAS_LIMIT,
};

/// Add the module's flags to the host start command.
///
/// Defaults mirror [`WasmConfig::default`]; the simulation gas limit
/// defaults to the empty string, which resolution treats as unset.
pub fn attach_module_flags(cmd: Command) -> Command {
    let defaults = WasmConfig::default();
    cmd.arg(
        Arg::new(FLAG_WASM_MEMORY_CACHE_SIZE)
            .long(FLAG_WASM_MEMORY_CACHE_SIZE)
            .value_name("MIB")
            .default_value(defaults.memory_cache_size.to_string())
            .help("Size in MiB (NOT bytes) of the in-memory cache for wasm modules. Set to 0 to disable."),
    )
    .arg(
        Arg::new(FLAG_WASM_QUERY_GAS_LIMIT)
            .long(FLAG_WASM_QUERY_GAS_LIMIT)
            .value_name("GAS")
            .default_value(defaults.smart_query_gas_limit.to_string())
            .help("Max gas that can be spent executing a query on a wasm contract"),
    )
    .arg(
        Arg::new(FLAG_WASM_SIMULATION_GAS_LIMIT)
            .long(FLAG_WASM_SIMULATION_GAS_LIMIT)
            .value_name("GAS")
            .default_value("")
            .help("Max gas that can be spent when executing a simulation TX"),
    )
}

/// Parsed command-line matches as an option source.
///
/// Module flags come back as strings; the host's `trace` flag is a
/// boolean switch and is read as such when the host defines it.
#[derive(Debug, Clone, Copy)]
pub struct MatchesSource<'a> {
    matches: &'a ArgMatches,
}

impl<'a> MatchesSource<'a> {
    pub fn new(matches: &'a ArgMatches) -> Self {
        Self { matches }
    }
}

impl OptionSource for MatchesSource<'_> {
    fn get(&self, name: &str) -> Option<OptionValue> {
        if name == FLAG_TRACE {
            return self
                .matches
                .try_get_one::<bool>(name)
                .ok()
                .flatten()
                .copied()
                .map(OptionValue::Bool);
        }
        self.matches
            .try_get_one::<String>(name)
            .ok()
            .flatten()
            .cloned()
            .map(OptionValue::Str)
    }
}

/// A start command carrying the host's global trace switch plus the
/// module flags, for hosts that do not build their own tree.
pub fn start_command(name: &'static str) -> Command {
    attach_module_flags(
        Command::new(name).arg(
            Arg::new(FLAG_TRACE)
                .long(FLAG_TRACE)
                .action(ArgAction::SetTrue)
                .help("Print full diagnostics on errors and forward contract debug output"),
        ),
    )
}
