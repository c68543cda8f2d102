use clap::Parser;
use loxide::{GcStats, InterpretError, RuntimeConfig, StatsFormat, Vm};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const EXIT_USAGE: u8 = 64;
const EXIT_COMPILE_ERROR: u8 = 65;
const EXIT_RUNTIME_ERROR: u8 = 70;
const EXIT_IO_ERROR: u8 = 74;

#[derive(Parser)]
#[command(name = "loxide")]
#[command(about = "A bytecode virtual machine for Lox", long_about = None)]
struct Cli {
    /// The source file to run (starts a REPL when omitted)
    file: Option<PathBuf>,

    /// Execute code directly from command line
    #[arg(short = 'c', long, conflicts_with = "file")]
    code: Option<String>,

    /// Print the disassembly of each compiled function before running it
    #[arg(long)]
    dump_bytecode: bool,

    /// Collect garbage before every allocation
    #[arg(long)]
    gc_stress: bool,

    /// Print GC statistics at exit (human or json format)
    #[arg(long, value_enum, require_equals = true, num_args = 0..=1, default_missing_value = "human")]
    gc_stats: Option<StatsFormat>,

    /// Load runtime settings from a TOML file; flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(EXIT_USAGE);
        }
        Err(e) => {
            // --help and --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => match RuntimeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::from(EXIT_USAGE);
            }
        },
        None => RuntimeConfig::default(),
    };
    if cli.dump_bytecode {
        config.dump_bytecode = true;
    }
    if cli.gc_stress {
        config.gc.stress = true;
    }
    if cli.gc_stats.is_some() {
        config.gc_stats = cli.gc_stats;
    }

    let mut vm = Vm::with_config(config.clone());
    let code = if let Some(source) = &cli.code {
        report(vm.interpret(source))
    } else if let Some(path) = &cli.file {
        run_file(&mut vm, path)
    } else {
        repl(&mut vm)
    };

    if let Some(format) = config.gc_stats {
        print_gc_stats(vm.gc_stats(), format);
    }

    code
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_file(vm: &mut Vm, path: &Path) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Could not read file \"{}\": {}", path.display(), e);
            return ExitCode::from(EXIT_IO_ERROR);
        }
    };
    report(vm.interpret(&source))
}

/// Print a failed interpretation to stderr and map it to an exit code.
fn report(result: Result<(), InterpretError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ InterpretError::Compile(_)) => {
            eprintln!("{}", e);
            ExitCode::from(EXIT_COMPILE_ERROR)
        }
        Err(e @ InterpretError::Runtime(_)) => {
            eprintln!("{}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn repl(vm: &mut Vm) -> ExitCode {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("error: failed to start line editor: {}", e);
            return ExitCode::from(EXIT_IO_ERROR);
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                // Errors are reported and the session goes on.
                if let Err(e) = vm.interpret(&line) {
                    eprintln!("{}", e);
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::from(EXIT_IO_ERROR);
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_gc_stats(stats: &GcStats, format: StatsFormat) {
    match format {
        StatsFormat::Human => {
            eprintln!("[GC Stats]");
            eprintln!("  cycles:        {}", stats.cycles);
            eprintln!("  objects freed: {}", stats.objects_freed);
            eprintln!("  bytes freed:   {}", stats.bytes_freed);
            eprintln!("  live bytes:    {}", stats.live_bytes);
            eprintln!("  next gc:       {}", stats.next_gc);
            eprintln!("  total pause:   {}us", stats.total_pause_us);
            eprintln!("  max pause:     {}us", stats.max_pause_us);
        }
        StatsFormat::Json => match serde_json::to_string(stats) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("error: failed to serialize GC stats: {}", e),
        },
    }
}
