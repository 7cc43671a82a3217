use std::path::PathBuf;

use clap::Parser;

/// Command line surface for the daemon: `-c`, `-h`, `-v`, `-n`, `-t` as
/// documented in the project's configuration guide. `-h`/`--help` are wired
/// up by clap automatically and exit 0 before any daemon state is built.
#[derive(Parser, Debug)]
#[command(
    name = "sonanced",
    about = "Home music-streaming daemon",
    disable_version_flag = true
)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print version and exit.
    #[arg(short = 'v')]
    pub version: bool,

    /// Disable ANSI color codes in logs.
    #[arg(short = 'n')]
    pub no_color: bool,

    /// Enable trace-level logging (debug builds only).
    #[arg(short = 't')]
    pub trace: bool,
}

pub fn print_version() {
    println!("sonanced {}", env!("CARGO_PKG_VERSION"));
}
