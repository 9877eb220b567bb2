//! DbgHelp-backed symbol loading and resolution.
//!
//! DbgHelp keys everything off the process handle: `SymInitializeW` once
//! per session, `SymLoadModuleExW` + `SymEnumSymbolsW` per module, and
//! the `SymFrom*` family for live queries. Enumeration fills in source
//! file and line per symbol when the module carries line information;
//! symbols without it just come back with the name and address.
//!
//! DbgHelp itself is not thread-safe. The engine keeps calls coarse (bulk
//! loads on module events, queries while the target is stopped), which
//! matches how the library is expected to be used.

use std::ffi::c_void;

use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{BOOL, HANDLE};
use windows::Win32::System::Diagnostics::Debug::{
    SymCleanup, SymEnumSymbolsW, SymFromAddrW, SymFromNameW, SymGetLineFromAddrW64,
    SymInitializeW, SymLoadModuleExW, SymSetOptions, IMAGEHLP_LINEW64, MAX_SYM_NAME,
    SYMBOL_INFOW, SYMOPT_CASE_INSENSITIVE, SYMOPT_DEFERRED_LOADS, SYMOPT_LOAD_LINES,
    SYMOPT_UNDNAME, SYM_LOAD_FLAGS,
};

use crate::error::{DebuggerError, Result};
use crate::symbols::{ResolvedSymbol, Symbol, SymbolBackend};
use crate::types::Address;

/// Symbol backend over DbgHelp.
///
/// Initializes the symbol handler for the target process on construction
/// and releases it on drop.
pub struct DbgHelpSymbols
{
    process: HANDLE,
}

impl DbgHelpSymbols
{
    /// Bring up the symbol handler for `process`.
    ///
    /// Name undecoration, deferred loads, line records and
    /// case-insensitive search are enabled; modules are loaded one by one
    /// as the session observes them rather than by invading the process.
    ///
    /// ## Errors
    ///
    /// Returns [`DebuggerError::SymbolInit`] when `SymInitializeW` fails,
    /// typically because the handler is already initialized for this
    /// process handle.
    pub fn new(process: HANDLE) -> Result<Self>
    {
        unsafe {
            SymSetOptions(
                SYMOPT_CASE_INSENSITIVE | SYMOPT_DEFERRED_LOADS | SYMOPT_LOAD_LINES
                    | SYMOPT_UNDNAME,
            );
            SymInitializeW(process, PCWSTR::null(), BOOL::from(false))
                .map_err(|error| DebuggerError::SymbolInit(error.to_string()))?;
        }
        Ok(Self {
            process,
        })
    }
}

impl Drop for DbgHelpSymbols
{
    fn drop(&mut self)
    {
        if let Err(error) = unsafe { SymCleanup(self.process) } {
            debug!(%error, "Could not release the symbol handler");
        }
    }
}

impl SymbolBackend for DbgHelpSymbols
{
    fn load_module(&self, path: Option<&str>, base: Address) -> Result<Vec<Symbol>>
    {
        let display = path.unwrap_or("<unknown>").to_owned();
        let wide_path = path.map(to_wide);
        let image = wide_path
            .as_ref()
            .map_or(PCWSTR::null(), |wide| PCWSTR(wide.as_ptr()));

        let loaded = unsafe {
            SymLoadModuleExW(
                self.process,
                HANDLE::default(),
                image,
                PCWSTR::null(),
                base.value(),
                0,
                None,
                SYM_LOAD_FLAGS(0),
            )
        };
        if loaded == 0 {
            // A zero return with no last error means the module was
            // already loaded at this base.
            let error = windows::core::Error::from_win32();
            if error.code().is_err() {
                return Err(DebuggerError::SymbolLoad {
                    module: display,
                    details: error.to_string(),
                });
            }
        }

        let mut context = EnumContext {
            process: self.process,
            symbols: Vec::new(),
        };
        let mask = to_wide("*");
        let context_ptr = (&mut context as *mut EnumContext).cast::<c_void>();
        unsafe {
            SymEnumSymbolsW(
                self.process,
                base.value(),
                PCWSTR(mask.as_ptr()),
                Some(collect_symbol),
                Some(context_ptr.cast_const()),
            )
        }
        .map_err(|error| DebuggerError::SymbolLoad {
            module: display,
            details: error.to_string(),
        })?;
        Ok(context.symbols)
    }

    fn resolve_address(&self, address: Address) -> Result<ResolvedSymbol>
    {
        let mut buffer = SymbolBuffer::new();
        let mut displacement = 0u64;
        unsafe {
            SymFromAddrW(
                self.process,
                address.value(),
                Some(&mut displacement),
                buffer.info_mut(),
            )
        }
        .map_err(|_| DebuggerError::SymbolNotFound(format!("{address}")))?;
        Ok(ResolvedSymbol {
            name: buffer.name(),
            address: Address::new(buffer.info.Address),
            displacement,
        })
    }

    fn resolve_name(&self, name: &str) -> Result<Symbol>
    {
        let wide = to_wide(name);
        let mut buffer = SymbolBuffer::new();
        unsafe { SymFromNameW(self.process, PCWSTR(wide.as_ptr()), buffer.info_mut()) }
            .map_err(|_| DebuggerError::SymbolNotFound(name.to_owned()))?;
        let address = Address::new(buffer.info.Address);
        let (file, line) = line_for(self.process, address);
        Ok(Symbol {
            name: buffer.name(),
            address,
            module_base: Address::new(buffer.info.ModBase),
            file,
            line,
        })
    }
}

/// State threaded through the `SymEnumSymbolsW` callback.
struct EnumContext
{
    process: HANDLE,
    symbols: Vec<Symbol>,
}

unsafe extern "system" fn collect_symbol(
    info: *const SYMBOL_INFOW,
    _symbol_size: u32,
    user_context: *const c_void,
) -> BOOL
{
    let context = unsafe { &mut *user_context.cast::<EnumContext>().cast_mut() };
    let info = unsafe { &*info };
    let name = unsafe { read_symbol_name(info) };
    let address = Address::new(info.Address);
    let (file, line) = line_for(context.process, address);
    context.symbols.push(Symbol {
        name,
        address,
        module_base: Address::new(info.ModBase),
        file,
        line,
    });
    BOOL::from(true)
}

/// Source file and line for `address`, when line records exist.
///
/// Most symbols in a stripped module have none; failure here is the
/// common case and stays quiet.
fn line_for(process: HANDLE, address: Address) -> (Option<String>, Option<u32>)
{
    let mut line = IMAGEHLP_LINEW64 {
        SizeOfStruct: std::mem::size_of::<IMAGEHLP_LINEW64>() as u32,
        ..Default::default()
    };
    let mut displacement = 0u32;
    match unsafe { SymGetLineFromAddrW64(process, address.value(), &mut displacement, &mut line) }
    {
        Ok(()) => {
            let file = if line.FileName.is_null() {
                None
            } else {
                unsafe { line.FileName.to_string() }.ok()
            };
            (file, Some(line.LineNumber))
        }
        Err(_) => (None, None),
    }
}

/// Fixed-capacity `SYMBOL_INFOW` with the name storage DbgHelp expects to
/// follow the struct.
#[repr(C)]
struct SymbolBuffer
{
    info: SYMBOL_INFOW,
    name_tail: [u16; MAX_SYM_NAME as usize],
}

impl SymbolBuffer
{
    fn new() -> Self
    {
        let mut buffer = Self {
            info: SYMBOL_INFOW::default(),
            name_tail: [0; MAX_SYM_NAME as usize],
        };
        buffer.info.SizeOfStruct = std::mem::size_of::<SYMBOL_INFOW>() as u32;
        buffer.info.MaxNameLen = MAX_SYM_NAME;
        buffer
    }

    fn info_mut(&mut self) -> *mut SYMBOL_INFOW
    {
        // Derived from the whole buffer so DbgHelp may write into the
        // name tail past the struct head.
        (self as *mut Self).cast::<SYMBOL_INFOW>()
    }

    fn name(&self) -> String
    {
        unsafe { read_symbol_name(&self.info) }
    }
}

/// Read the inline, length-prefixed name out of a `SYMBOL_INFOW`.
///
/// ## Safety
///
/// `info.NameLen` characters starting at `info.Name` must be in bounds of
/// the allocation holding `info`, which DbgHelp guarantees for structs it
/// filled in.
unsafe fn read_symbol_name(info: &SYMBOL_INFOW) -> String
{
    let len = info.NameLen as usize;
    let name = unsafe { std::slice::from_raw_parts(info.Name.as_ptr(), len) };
    String::from_utf16_lossy(name)
}

fn to_wide(text: &str) -> Vec<u16>
{
    text.encode_utf16().chain(std::iter::once(0)).collect()
}
