//! Diagmat CLI - a compiler-diagnostic test harness for C and C++

use std::io::IsTerminal;
use std::path::Path;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use diagmat::runner::dump;
use diagmat::util::Config;
use diagmat::{RunOptions, Runner};

mod cli;

use cli::Cli;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("diagmat=debug")
    } else if cli.quiet {
        EnvFilter::new("diagmat=error")
    } else {
        EnvFilter::new("diagmat=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "diagmat", &mut std::io::stdout());
        return Ok(());
    }

    if cli.list_compilers {
        return dump::list_compilers(cli.format.into());
    }

    let color = match cli.color.as_str() {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    };

    let mut all_passed = true;
    for source in &cli.sources {
        let source_dir = source.parent().unwrap_or_else(|| Path::new("."));
        let config = Config::load_layered(source_dir)?;
        let options = RunOptions {
            output: cli.output.clone(),
            language: cli.language.clone(),
            color,
        };

        let runner = Runner::new(source, &options, &config)?;
        all_passed &= runner.run()?;
    }

    // Exit contract: zero iff every assertion of every test passed.
    if !all_passed {
        std::process::exit(1);
    }
    Ok(())
}
