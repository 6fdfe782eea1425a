//! ndrgen CLI - Command line interface for the NDR format-string compiler

use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ndrgen_ast::{Function, Interface, Variable};
use ndrgen_codegen::{
    compile, proc_format_size, render_interface, required_buffer_size, type_format_size,
    CodegenConfig, CodegenError,
};

#[derive(Parser)]
#[command(name = "ndrgen")]
#[command(about = "NDR format string compiler", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Pointer width in bytes (4 or 8)
    #[arg(long, global = true)]
    pointer_size: Option<u32>,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an interface to C format tables and marshal code
    Compile {
        /// Interface file (JSON)
        file: PathBuf,
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compile an interface and output the result as JSON
    Dump {
        /// Interface file (JSON)
        file: PathBuf,
        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Show per-variable format string and buffer sizes
    Sizes {
        /// Interface file (JSON)
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.pointer_size);

    match cli.command {
        Commands::Compile { file, output } => cmd_compile(&file, output, &config),
        Commands::Dump { file, pretty } => cmd_dump(&file, pretty, &config),
        Commands::Sizes { file } => cmd_sizes(&file, &config),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, pointer_size: Option<u32>) -> CodegenConfig {
    let mut config = match path {
        Some(path) => {
            let text = read_or_exit(path);
            match serde_json::from_str::<CodegenConfig>(&text) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: invalid config {}: {}", path.display(), e);
                    std::process::exit(1);
                }
            }
        }
        None => CodegenConfig::default(),
    };
    if let Some(size) = pointer_size {
        config.pointer_size = size;
    }
    if let Err(e) = config.validate() {
        report_error(&e);
    }
    config
}

fn read_or_exit(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: reading {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn load_interface(file: &Path) -> Interface {
    let source = read_or_exit(file);
    match serde_json::from_str(&source) {
        Ok(iface) => iface,
        Err(e) => {
            eprintln!("error: invalid interface {}: {}", file.display(), e);
            std::process::exit(1);
        }
    }
}

fn report_error(err: &CodegenError) -> ! {
    eprintln!("error[{}]: {}", err.code(), err);
    std::process::exit(1);
}

fn cmd_compile(file: &Path, output: Option<PathBuf>, config: &CodegenConfig) {
    let iface = load_interface(file);
    let compiled = compile(&iface, config).unwrap_or_else(|e| report_error(&e));
    let text = render_interface(&compiled).unwrap_or_else(|e| report_error(&e));

    match output {
        Some(path) => {
            if let Err(e) = fs::write(&path, &text) {
                eprintln!("error: writing {}: {}", path.display(), e);
                std::process::exit(1);
            }
            debug!(output = %path.display(), bytes = text.len(), "wrote stub tables");
            println!(
                "Compiled {} ({} functions) to {}",
                compiled.name,
                compiled.functions.len(),
                path.display()
            );
        }
        None => print!("{}", text),
    }
}

fn cmd_dump(file: &Path, pretty: bool, config: &CodegenConfig) {
    let iface = load_interface(file);
    let compiled = compile(&iface, config).unwrap_or_else(|e| report_error(&e));
    let json = if pretty {
        serde_json::to_string_pretty(&compiled)
    } else {
        serde_json::to_string(&compiled)
    };
    match json {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("error: serializing output: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_sizes(file: &Path, config: &CodegenConfig) {
    let iface = load_interface(file);
    println!("{:<24} {:>6} {:>6} {:>8} {:>6}", "variable", "type", "proc", "buffer", "align");

    for func in &iface.functions {
        for param in &func.params {
            print_sizes(func, param, &format!("{}.{}", func.name, param.name), config);
        }
        if !func.returns_void() {
            print_sizes(func, &func.ret, &format!("{}.<return>", func.name), config);
        }
    }
}

fn print_sizes(func: &Function, var: &Variable, label: &str, config: &CodegenConfig) {
    let type_size = type_format_size(func, var, config).unwrap_or_else(|e| report_error(&e));
    let proc_size = proc_format_size(func, var, config).unwrap_or_else(|e| report_error(&e));
    let buffer = required_buffer_size(var, config).unwrap_or_else(|e| report_error(&e));
    println!(
        "{:<24} {:>6} {:>6} {:>8} {:>6}",
        label, type_size, proc_size, buffer.size, buffer.alignment
    );
}
