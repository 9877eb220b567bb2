use std::io::{self, BufRead, Write};
use std::process;
use std::thread;

use clap::{Parser, Subcommand};
use tether_core::debugger::{DEFAULT_DUMP_LEN, DEFAULT_LISTING_LEN};
use tether_core::types::{Address, ProcessId, RegisterId};
use tether_core::{native_session, Debugger, Result as DebuggerResult, SessionOptions};
use tether_utils::{format_hexdump, info, init_logging_to_file, LogLevel};

/// An interactive debugger for live Windows processes.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version)]
#[command(about = "An interactive debugger for live Windows processes", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Attach to a running process by PID and start an interactive session
    Attach
    {
        /// Process ID (PID) to attach to
        pid: u32,
        /// Kill the target process when the session ends
        #[arg(long, default_value_t = false)]
        kill_on_detach: bool,
        /// Log level for the session log file (error, warn, info, debug, trace)
        #[arg(long)]
        log_level: Option<LogLevel>,
    },
}

fn main()
{
    let cli = Cli::parse();

    match cli.command {
        Commands::Attach {
            pid,
            kill_on_detach,
            log_level,
        } => {
            // Logs go to a file so they never interleave with the prompt
            match init_logging_to_file(log_level) {
                Ok(path) => println!("Session log: {}", path.display()),
                Err(e) => {
                    eprintln!("Failed to initialize logging: {e}");
                    process::exit(1);
                }
            }

            if let Err(e) = run_session(pid, kill_on_detach) {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}

/// Attach to `pid`, pump its debug events on a dedicated thread, and drive
/// the session from the interactive command reader on this one.
fn run_session(pid: u32, kill_on_detach: bool) -> DebuggerResult<()>
{
    info!(pid, kill_on_detach, "Attaching to process");
    let options = SessionOptions {
        kill_on_detach,
        ..SessionOptions::default()
    };
    let debugger = native_session(ProcessId::from(pid), options)?;
    let events = debugger.subscribe();

    println!("Attaching to process {pid}");
    print_menu();

    thread::scope(|scope| {
        let engine = scope.spawn(|| debugger.run());

        // One line per session event, printed as the loop reports them
        scope.spawn(move || {
            while let Ok(event) = events.recv() {
                println!("* {}", event.describe());
            }
        });

        command_loop(&debugger);

        engine.join().unwrap()
    })
}

fn print_menu()
{
    println!(
        "[A]dd breakpoint.\n\
         [R]emove breakpoint.\n\
         [B]reakpoint list.\n\
         [S]tep into instruction.\n\
         Step [o]ver instruction.\n\
         [C]ontinue.\n\
         [P]rint context.\n\
         [M]odify context.\n\
         Ca[l]l stack.\n\
         Mod[u]le list.\n\
         List s[y]mbols for module.\n\
         [D]isassemble at address.\n\
         Modify at m[e]mory.\n\
         Pr[i]nt at memory.\n\
         [K]ill target.\n\
         [Q]uit."
    );
}

fn command_loop(debugger: &Debugger)
{
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let command = line.trim().to_ascii_lowercase();
        match command.as_str() {
            "a" => {
                if let Some(target) = prompt_breakpoint_target() {
                    let outcome = match target {
                        BreakpointTarget::Address(address) => {
                            debugger.add_breakpoint(address).map(|()| address)
                        }
                        BreakpointTarget::Name(name) => debugger.add_breakpoint_by_name(&name),
                    };
                    match outcome {
                        Ok(address) => println!("Breakpoint set at {address}"),
                        Err(error) => println!("Could not set breakpoint: {error}"),
                    }
                }
            }
            "r" => {
                if let Some(target) = prompt_breakpoint_target() {
                    let outcome = match target {
                        BreakpointTarget::Address(address) => {
                            debugger.remove_breakpoint(address).map(|()| address)
                        }
                        BreakpointTarget::Name(name) => debugger.remove_breakpoint_by_name(&name),
                    };
                    match outcome {
                        Ok(address) => println!("Breakpoint removed from {address}"),
                        Err(error) => println!("Could not remove breakpoint: {error}"),
                    }
                }
            }
            "b" => {
                let breakpoints = debugger.breakpoints();
                if breakpoints.is_empty() {
                    println!("No breakpoints set");
                }
                for info in breakpoints {
                    println!(
                        "{}  {}  hits={}",
                        info.address,
                        if info.enabled { "enabled " } else { "disabled" },
                        info.hits
                    );
                }
            }
            "s" => {
                if let Err(error) = debugger.step_into() {
                    println!("Could not step: {error}");
                }
            }
            "o" => {
                if let Err(error) = debugger.step_over() {
                    println!("Could not step over: {error}");
                }
            }
            "c" => debugger.resume(),
            "p" => print_context(debugger),
            "m" => modify_context(debugger),
            "l" => print_call_stack(debugger),
            "u" => {
                for module in debugger.modules() {
                    println!("{}  {:>6} symbols  {}", module.base, module.symbols, module.name);
                }
            }
            "y" => print_module_symbols(debugger),
            "d" => {
                if let Some(address) = prompt_address("Address to disassemble at: 0x") {
                    print_disassembly(debugger, address);
                }
            }
            "e" => modify_memory(debugger),
            "i" => {
                if let Some(address) = prompt_address("Address to print bytes at: 0x") {
                    match debugger.read_bytes(address, DEFAULT_DUMP_LEN) {
                        Ok(bytes) => print!("{}", format_hexdump(address.value(), &bytes, 16)),
                        Err(error) => println!("Could not read memory: {error}"),
                    }
                }
            }
            "k" => {
                match debugger.terminate(1) {
                    // The exit event arrives once the target runs again
                    Ok(()) => debugger.resume(),
                    Err(error) => println!("Could not terminate the target: {error}"),
                }
            }
            "q" | "quit" => break,
            "" => {}
            other => println!("Unknown command: {other}"),
        }
    }

    debugger.stop();
}

/// A breakpoint location as the user named it.
enum BreakpointTarget
{
    Address(Address),
    Name(String),
}

/// Ask for a breakpoint location, either a raw address or a symbol name.
fn prompt_breakpoint_target() -> Option<BreakpointTarget>
{
    let choice = prompt("[a]ddress or [s]ymbol name? ")?;
    match choice.to_ascii_lowercase().as_str() {
        "a" => prompt_address("Breakpoint address: 0x").map(BreakpointTarget::Address),
        "s" => {
            let name = prompt("Name: ")?;
            if name.is_empty() {
                return None;
            }
            Some(BreakpointTarget::Name(name))
        }
        other => {
            println!("Unknown choice: {other}");
            None
        }
    }
}

fn print_context(debugger: &Debugger)
{
    match debugger.executing_context() {
        Ok(context) => println!("{context}"),
        Err(error) => match debugger.last_context() {
            Some(context) => {
                println!("Last known context (no thread is currently broken):");
                println!("{context}");
            }
            None => println!("No context available: {error}"),
        },
    }
}

fn modify_context(debugger: &Debugger)
{
    let Some(name) = prompt("Register to change: ") else {
        return;
    };
    let id = match name.parse::<RegisterId>() {
        Ok(id) => id,
        Err(error) => {
            println!("{error}");
            return;
        }
    };
    let Some(value) = prompt_hex_u64(&format!("New value for {id}: 0x")) else {
        return;
    };
    let mut context = match debugger.executing_context() {
        Ok(context) => context,
        Err(error) => {
            println!("Could not read the executing context: {error}");
            return;
        }
    };
    context.set(id, value);
    match debugger.set_executing_context(&context) {
        Ok(()) => println!("{id} = 0x{value:x}"),
        Err(error) => println!("Could not write the context: {error}"),
    }
}

fn print_call_stack(debugger: &Debugger)
{
    match debugger.call_stack() {
        Ok(frames) => {
            for frame in frames {
                match frame.symbol {
                    Some(symbol) => println!(
                        "#{:<3} {}  {}+0x{:x}",
                        frame.index, frame.pc, symbol.name, symbol.displacement
                    ),
                    None => println!("#{:<3} {}", frame.index, frame.pc),
                }
            }
        }
        Err(error) => println!("Could not walk the stack: {error}"),
    }
}

fn print_module_symbols(debugger: &Debugger)
{
    let Some(filter) = prompt("Module name to dump symbols for: ") else {
        return;
    };
    if filter.is_empty() {
        return;
    }
    let needle = filter.to_lowercase();
    let mut matched = false;
    for module in debugger.modules() {
        if !module.name.to_lowercase().contains(&needle) {
            continue;
        }
        matched = true;
        println!("{} ({} symbols)", module.name, module.symbols);
        for symbol in debugger.module_symbols(module.base) {
            match (&symbol.file, symbol.line) {
                (Some(file), Some(line)) => {
                    println!("  {}  {} [{file}:{line}]", symbol.address, symbol.name);
                }
                _ => println!("  {}  {}", symbol.address, symbol.name),
            }
        }
    }
    if !matched {
        println!("No loaded module matches '{filter}'");
    }
}

fn print_disassembly(debugger: &Debugger, address: Address)
{
    match debugger.disassemble(address, DEFAULT_LISTING_LEN) {
        Ok(listing) => {
            for instruction in listing {
                println!("{}: {}", instruction.address, instruction.text);
            }
        }
        Err(error) => println!("Could not disassemble: {error}"),
    }
}

fn modify_memory(debugger: &Debugger)
{
    let Some(address) = prompt_address("Address to change byte at: 0x") else {
        return;
    };
    let Some(byte) = prompt_hex_u8("New byte: 0x") else {
        return;
    };
    match debugger.write_byte(address, byte) {
        Ok(()) => println!("Wrote 0x{byte:02x} to {address}"),
        Err(error) => println!("Could not write memory: {error}"),
    }
}

/// Print `text` without a newline and read one trimmed input line.
///
/// Returns `None` on end of input.
fn prompt(text: &str) -> Option<String>
{
    print!("{text}");
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_owned()),
    }
}

fn prompt_address(text: &str) -> Option<Address>
{
    let line = prompt(text)?;
    match parse_address(&line) {
        Some(address) => Some(address),
        None => {
            println!("Could not parse address: {line}");
            None
        }
    }
}

fn prompt_hex_u64(text: &str) -> Option<u64>
{
    let line = prompt(text)?;
    match parse_hex_u64(&line) {
        Some(value) => Some(value),
        None => {
            println!("Could not parse value: {line}");
            None
        }
    }
}

fn prompt_hex_u8(text: &str) -> Option<u8>
{
    let line = prompt(text)?;
    let trimmed = strip_hex_prefix(&line);
    match u8::from_str_radix(trimmed, 16) {
        Ok(byte) => Some(byte),
        Err(_) => {
            println!("Could not parse byte: {line}");
            None
        }
    }
}

/// Addresses are hexadecimal, with or without a leading `0x`.
fn parse_address(text: &str) -> Option<Address>
{
    parse_hex_u64(text).map(Address::new)
}

fn parse_hex_u64(text: &str) -> Option<u64>
{
    let trimmed = strip_hex_prefix(text);
    u64::from_str_radix(trimmed, 16).ok()
}

fn strip_hex_prefix(text: &str) -> &str
{
    let trimmed = text.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_attach_arguments_parse()
    {
        let cli = Cli::try_parse_from(["tether", "attach", "1234"]).unwrap();
        let Commands::Attach {
            pid,
            kill_on_detach,
            log_level,
        } = cli.command;
        assert_eq!(pid, 1234);
        assert!(!kill_on_detach);
        assert!(log_level.is_none());
    }

    #[test]
    fn test_attach_flags_parse()
    {
        let cli = Cli::try_parse_from([
            "tether",
            "attach",
            "99",
            "--kill-on-detach",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let Commands::Attach {
            pid,
            kill_on_detach,
            log_level,
        } = cli.command;
        assert_eq!(pid, 99);
        assert!(kill_on_detach);
        assert_eq!(log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_attach_requires_pid()
    {
        assert!(Cli::try_parse_from(["tether", "attach"]).is_err());
        assert!(Cli::try_parse_from(["tether", "attach", "not-a-pid"]).is_err());
    }

    #[test]
    fn test_parse_address_forms()
    {
        assert_eq!(parse_address("0x1000"), Some(Address::new(0x1000)));
        assert_eq!(parse_address("1000"), Some(Address::new(0x1000)));
        assert_eq!(parse_address("  0Xff  "), Some(Address::new(0xff)));
        assert_eq!(parse_address("zz"), None);
        assert_eq!(parse_address(""), None);
    }
}
