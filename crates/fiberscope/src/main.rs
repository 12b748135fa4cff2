use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use fiberscope::sim::{SimSymbolizer, SimTarget};
use fiberscope::FiberInspector;
use fiberscope_core::{FiberHandle, InspectResult, Symbolizer};
use fiberscope_utils::{init_logging, init_logging_to_file};

/// Fiber-aware introspection for stopped processes.
#[derive(Parser, Debug)]
#[command(name = "fiberscope")]
#[command(version)]
#[command(about = "Fiber-aware introspection for stopped processes", long_about = None)]
struct Cli
{
    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Explore a simulated debuggee with the full command set
    Demo,
    /// Print the fiber table of the simulated debuggee and exit
    Info
    {
        /// Group fibers whose innermost DEPTH+1 frames coincide
        #[arg(short, long)]
        depth: Option<usize>,
    },
}

fn main()
{
    let cli = Cli::parse();

    // Initialize logging (reads from RUST_LOG env var). With --log-file the
    // console stays reserved for inspection output.
    let logging = match cli.log_file.clone() {
        Some(path) => init_logging_to_file(path, None),
        None => init_logging(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> InspectResult<()>
{
    let (target, layout) = SimTarget::demo();
    let mut inspector = FiberInspector::with_layout(target, layout);
    inspector.on_stop()?;
    let symbolizer = SimSymbolizer;

    match cli.command {
        Commands::Demo => repl(&mut inspector, &symbolizer),
        Commands::Info { depth } => {
            print!("{}", inspector.info(&symbolizer, depth)?);
            Ok(())
        }
    }
}

fn repl(inspector: &mut FiberInspector<SimTarget>, symbolizer: &dyn Symbolizer) -> InspectResult<()>
{
    println!("fiberscope demo session; `help` lists commands");
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("(fiberscope) ");
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }

        match dispatch(inspector, symbolizer, line.trim()) {
            Ok(Some(output)) => print!("{output}"),
            Ok(None) => break,
            Err(err) => eprintln!("Error: {err}"),
        }
    }

    // Leave the simulated target clean even if the operator forgot to reset.
    if inspector.has_overlay() {
        print!("{}", inspector.reset()?);
    }
    Ok(())
}

/// Execute one REPL line; `Ok(None)` means quit.
fn dispatch(
    inspector: &mut FiberInspector<SimTarget>,
    symbolizer: &dyn Symbolizer,
    line: &str,
) -> InspectResult<Option<String>>
{
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(Some(String::new()));
    };
    let arg = words.next();

    let output = match command {
        "info" => {
            let depth = arg.and_then(|a| a.parse::<usize>().ok());
            inspector.info(symbolizer, depth)?
        }
        "bt" => match arg.and_then(|a| a.parse::<usize>().ok()) {
            Some(index) => inspector.backtrace_index(symbolizer, index)?,
            None => "usage: bt <index>\n".to_string(),
        },
        "btp" => match arg.and_then(parse_pointer) {
            Some(handle) => inspector.backtrace_handle(symbolizer, handle)?,
            None => "usage: btp <hex-address>\n".to_string(),
        },
        "switch" => match arg.and_then(|a| a.parse::<usize>().ok()) {
            Some(index) => inspector.switch_to_index(index)?,
            None => "usage: switch <index>\n".to_string(),
        },
        "switchp" => match arg.and_then(parse_pointer) {
            Some(handle) => inspector.switch_to_handle(handle)?,
            None => "usage: switchp <hex-address>\n".to_string(),
        },
        "reset" => inspector.reset()?,
        "stop" => {
            inspector.on_stop()?;
            "rebuilt fiber state\n".to_string()
        }
        "help" => help_text(),
        "quit" | "exit" | "q" => return Ok(None),
        other => format!("unknown command `{other}`; `help` lists commands\n"),
    };

    Ok(Some(output))
}

fn parse_pointer(text: &str) -> Option<FiberHandle>
{
    let trimmed = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(trimmed, 16).ok().map(FiberHandle::from)
}

fn help_text() -> String
{
    "\
info            list all fibers
info <depth>    group fibers by their innermost <depth>+1 frames
bt <index>      backtrace the fiber at catalog position <index>
btp <addr>      backtrace a fiber by raw handle (hex)
switch <index>  inspect a fiber's context until `reset`
switchp <addr>  inspect a fiber's context by raw handle (hex)
reset           restore the true thread state
stop            simulate a fresh stop event (rebuilds all fiber state)
quit            leave the demo
"
    .to_string()
}
