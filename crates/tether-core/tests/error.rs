//! Tests for error handling

use tether_core::error::{DebuggerError, Result};

#[test]
fn test_attach_failed_carries_the_reason()
{
    let error = DebuggerError::AttachFailed("access denied (5)".to_string());
    let message = format!("{}", error);
    assert!(message.contains("Failed to attach"));
    assert!(message.contains("access denied (5)"));
}

#[test]
fn test_not_attached_display()
{
    let error = DebuggerError::NotAttached;
    let message = format!("{}", error);
    assert!(message.contains("Not attached"));
}

#[test]
fn test_no_executing_thread_display()
{
    let error = DebuggerError::NoExecutingThread;
    let message = format!("{}", error);
    assert!(message.contains("No executing thread"));
    assert!(message.contains("breakpoint or step"));
}

#[test]
fn test_wait_event_carries_the_details()
{
    let error = DebuggerError::WaitEvent("timeout".to_string());
    let message = format!("{}", error);
    assert!(message.contains("debug event"));
    assert!(message.contains("timeout"));
}

#[test]
fn test_memory_read_names_the_range()
{
    let error = DebuggerError::MemoryRead {
        address: 0x7ffe_1000,
        len: 16,
        details: "page gone".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("16 byte(s)"));
    assert!(message.contains("0x000000007ffe1000"));
    assert!(message.contains("page gone"));
}

#[test]
fn test_memory_write_names_the_range()
{
    let error = DebuggerError::MemoryWrite {
        address: 0x1000,
        len: 1,
        details: "protected".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("1 byte(s)"));
    assert!(message.contains("0x0000000000001000"));
}

#[test]
fn test_context_errors_name_the_thread()
{
    let read = DebuggerError::ContextRead {
        thread: 4242,
        details: "bad handle".to_string(),
    };
    let message = format!("{}", read);
    assert!(message.contains("4242"));
    assert!(message.contains("bad handle"));

    let write = DebuggerError::ContextWrite {
        thread: 17,
        details: "suspended".to_string(),
    };
    let message = format!("{}", write);
    assert!(message.contains("17"));
}

#[test]
fn test_duplicate_breakpoint_formats_the_address()
{
    let error = DebuggerError::DuplicateBreakpoint(0x1010);
    let message = format!("{}", error);
    assert!(message.contains("already exists"));
    assert!(message.contains("0x0000000000001010"));
}

#[test]
fn test_no_breakpoint_formats_the_address()
{
    let error = DebuggerError::NoBreakpoint(0x40_1000);
    let message = format!("{}", error);
    assert!(message.contains("No breakpoint"));
    assert!(message.contains("0x0000000000401000"));
}

#[test]
fn test_unsupported_names_the_operation()
{
    let error = DebuggerError::Unsupported("hardware breakpoints");
    let message = format!("{}", error);
    assert!(message.contains("Unsupported operation"));
    assert!(message.contains("hardware breakpoints"));
}

#[test]
fn test_symbol_not_found_names_the_symbol()
{
    let error = DebuggerError::SymbolNotFound("CreateFileW".to_string());
    let message = format!("{}", error);
    assert!(message.contains("CreateFileW"));
}

#[test]
fn test_symbol_load_names_the_module()
{
    let error = DebuggerError::SymbolLoad {
        module: "ntdll.dll".to_string(),
        details: "no pdb".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("ntdll.dll"));
    assert!(message.contains("no pdb"));
}

#[test]
fn test_decode_names_the_address()
{
    let error = DebuggerError::Decode {
        address: 0x1010,
        details: "truncated".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("0x0000000000001010"));
    assert!(message.contains("truncated"));
}

#[test]
fn test_unsupported_platform_display()
{
    let error = DebuggerError::UnsupportedPlatform;
    let message = format!("{}", error);
    assert!(message.contains("not supported"));
}

#[test]
fn test_io_errors_convert()
{
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "target.exe");
    let error: DebuggerError = io.into();

    match error {
        DebuggerError::Io(_) => {
            // Expected: io::Error should convert through the Io variant
        }
        other => panic!("Expected Io variant, got {other:?}"),
    }
}

#[test]
fn test_result_type()
{
    // Test that Result type is properly aliased
    let _result: Result<()> = Ok(());
    let _error_result: Result<()> = Err(DebuggerError::NotAttached);
}
