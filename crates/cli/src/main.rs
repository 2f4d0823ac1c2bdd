mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use envflake_lib::consts::DEFAULT_FLAKE_FILE;

use cmd::{cmd_info, cmd_package, cmd_resolve, cmd_shell, cmd_show};
use output::OutputFormat;

/// envflake - reproducible Rust build environments from a flake file
#[derive(Parser)]
#[command(name = "envflake")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the flake file
  #[arg(short, long, global = true, default_value = DEFAULT_FLAKE_FILE)]
  file: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the package output
  Package {
    /// System to build for (defaults to the current system)
    #[arg(long)]
    system: Option<String>,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Enter the development shell
  Shell {
    /// System whose shell to enter (defaults to the current system)
    #[arg(long)]
    system: Option<String>,

    /// Print the environment as a script instead of spawning a shell
    #[arg(long)]
    print: bool,

    /// Script dialect for --print: posix or fish (detected from $SHELL)
    #[arg(long, requires = "print")]
    shell: Option<String>,

    /// Command to run instead of the interactive shell
    #[arg(last = true)]
    command: Vec<String>,
  },

  /// Show the derived outputs without building anything
  Show {
    /// Only this system (defaults to every declared system)
    #[arg(long)]
    system: Option<String>,

    /// Print outputs as JSON
    #[arg(long)]
    json: bool,
  },

  /// Resolve the toolchain and print the selected artifacts
  Resolve {
    #[arg(long)]
    system: Option<String>,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show platform and directory information
  Info,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Package { system, output } => cmd_package(&cli.file, system.as_deref(), output),
    Commands::Shell {
      system,
      print,
      shell,
      command,
    } => cmd_shell(&cli.file, system.as_deref(), print, shell.as_deref(), &command),
    Commands::Show { system, json } => cmd_show(&cli.file, system.as_deref(), json),
    Commands::Resolve { system, output } => cmd_resolve(&cli.file, system.as_deref(), output),
    Commands::Info => cmd_info(),
  }
}
