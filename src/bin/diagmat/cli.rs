//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use clap_complete::Shell;

use diagmat::runner::dump::DumpFormat;

/// Output format for the compiler dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MessageFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
}

impl From<MessageFormat> for DumpFormat {
    fn from(format: MessageFormat) -> Self {
        match format {
            MessageFormat::Human => DumpFormat::Human,
            MessageFormat::Json => DumpFormat::Json,
        }
    }
}

/// Diagmat - a compiler-diagnostic test harness for C and C++
#[derive(Parser)]
#[command(name = "diagmat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source files with embedded test directives
    #[arg(required_unless_present_any = ["list_compilers", "completions"])]
    pub sources: Vec<PathBuf>,

    /// Output directory for preprocessed sources (default: <source_dir>/build)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override language detection (c, gnu, c++, gnu++)
    #[arg(long)]
    pub language: Option<String>,

    /// Dump discovered compilers and their standards, then exit
    #[arg(long)]
    pub list_compilers: bool,

    /// Output format for --list-compilers
    #[arg(long, value_enum, default_value = "human")]
    pub format: MessageFormat,

    /// Enable verbose output (debug/info)
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,

    /// Generate shell completions and exit
    #[arg(long, value_enum)]
    pub completions: Option<Shell>,
}
