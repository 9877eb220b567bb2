//! Module and symbol bookkeeping.
//!
//! Symbols arrive in bulk when a module is mapped: the platform backend
//! enumerates whatever debug information the OS can find and the store
//! keeps the result, indexed by module base. Store lookups are exact
//! match; the backend's live queries cover everything else (nearest
//! symbol with displacement, names the enumeration missed).
//!
//! Records are never evicted while a session runs. A stale record after a
//! module unload still answers lookups, which keeps late diagnostics
//! (stack walks through unloaded code) best-effort instead of empty.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::Address;

/// One named location in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol
{
    /// Symbol name, as the debug information spells it.
    pub name: String,
    /// Absolute address in the target.
    pub address: Address,
    /// Base of the module that owns the symbol.
    pub module_base: Address,
    /// Source file, when the debug information carries line info.
    pub file: Option<String>,
    /// Source line, when known.
    pub line: Option<u32>,
}

/// Result of a live nearest-symbol query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol
{
    /// Name of the enclosing symbol.
    pub name: String,
    /// Start address of the enclosing symbol.
    pub address: Address,
    /// Distance from the symbol start to the queried address.
    pub displacement: u64,
}

/// One mapped module and the symbols enumerated for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord
{
    /// Load address of the module image.
    pub base: Address,
    /// Display name (image path when the OS resolved one).
    pub name: String,
    /// Symbols owned by the module, in enumeration order.
    pub symbols: Vec<Symbol>,
}

/// Listing line for a recorded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo
{
    /// Load address of the module image.
    pub base: Address,
    /// Display name (image path when the OS resolved one).
    pub name: String,
    /// Number of symbols recorded for the module.
    pub symbols: usize,
}

impl From<&ModuleRecord> for ModuleInfo
{
    fn from(record: &ModuleRecord) -> Self
    {
        Self {
            base: record.base,
            name: record.name.clone(),
            symbols: record.symbols.len(),
        }
    }
}

/// Session-wide symbol store, indexed by module base.
#[derive(Debug, Default)]
pub struct SymbolStore
{
    modules: BTreeMap<Address, ModuleRecord>,
}

impl SymbolStore
{
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Record a module and its symbols, replacing any record at the same
    /// base (a remap at the same address supersedes the old image).
    pub fn insert_module(&mut self, record: ModuleRecord)
    {
        self.modules.insert(record.base, record);
    }

    /// Drop the record for `base`, returning it if present.
    ///
    /// The engine keeps stale records on module unload; this exists so an
    /// eviction policy could be added without changing the store API.
    pub fn remove_module(&mut self, base: Address) -> Option<ModuleRecord>
    {
        self.modules.remove(&base)
    }

    /// Module record at `base`, if any.
    #[must_use]
    pub fn module(&self, base: Address) -> Option<&ModuleRecord>
    {
        self.modules.get(&base)
    }

    /// Iterate module records in base order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleRecord>
    {
        self.modules.values()
    }

    /// Listing of recorded modules in base order.
    #[must_use]
    pub fn list_modules(&self) -> Vec<ModuleInfo>
    {
        self.modules.values().map(ModuleInfo::from).collect()
    }

    /// Number of modules recorded.
    #[must_use]
    pub fn module_count(&self) -> usize
    {
        self.modules.len()
    }

    /// Total symbols across all modules.
    #[must_use]
    pub fn symbol_count(&self) -> usize
    {
        self.modules.values().map(|m| m.symbols.len()).sum()
    }

    /// Exact-match lookup by name; the first match in module base order
    /// wins.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Symbol>
    {
        self.modules
            .values()
            .flat_map(|module| module.symbols.iter())
            .find(|symbol| symbol.name == name)
    }

    /// Exact-match lookup by address; the first match in module base
    /// order wins.
    #[must_use]
    pub fn find_by_address(&self, address: Address) -> Option<&Symbol>
    {
        self.modules
            .values()
            .flat_map(|module| module.symbols.iter())
            .find(|symbol| symbol.address == address)
    }
}

/// Debug-information backend the platform provides.
///
/// `load_module` does the heavy lifting once per module; the resolve
/// methods are live queries against whatever the backend has loaded, used
/// when the store's exact-match lookups come up empty.
pub trait SymbolBackend: Send + Sync
{
    /// Load debug information for the module at `base` and enumerate its
    /// symbols. `path` helps the backend find the image; `None` lets it
    /// fall back to what the OS knows about the mapping.
    fn load_module(&self, path: Option<&str>, base: Address) -> Result<Vec<Symbol>>;

    /// Nearest enclosing symbol for `address`, with displacement.
    fn resolve_address(&self, address: Address) -> Result<ResolvedSymbol>;

    /// Address of the symbol named `name`.
    fn resolve_name(&self, name: &str) -> Result<Symbol>;
}
