//! Test planning and execution.
//!
//! A [`Runner`] takes one annotated source file through the whole
//! pipeline: template expansion, writing the preprocessed source, then per
//! test x compiler group x instance x standard compilation, assertion
//! evaluation and PASS/FAIL reporting.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::report::Report;
use crate::core::standard::Dialect;
use crate::core::test::Test;
use crate::template::expand_file;
use crate::util::Config;

pub mod dump;

/// Caller-facing knobs for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Output directory for the preprocessed source; defaults to the
    /// configured one, then `<source_dir>/build`.
    pub output: Option<PathBuf>,
    /// Language override; defaults to the configured one, then extension
    /// detection.
    pub language: Option<String>,
    /// Colorize PASS/FAIL verdicts.
    pub color: bool,
}

/// Executes the tests declared by one source file.
pub struct Runner {
    source: PathBuf,
    tests: Vec<Test>,
    color: bool,
}

impl Runner {
    /// Expand `source` and materialize the preprocessed file.
    pub fn new(source: &Path, options: &RunOptions, config: &Config) -> Result<Self> {
        let dialect = detect_dialect(
            source,
            options
                .language
                .as_deref()
                .or(config.run.language.as_deref()),
        )?;

        // Usage errors already carry file:line:column.
        let expansion = expand_file(source, dialect, config)?;

        let out_dir = output_dir(source, options, config);
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("failed to create output directory `{}`", out_dir.display()))?;

        let file_name = source
            .file_name()
            .with_context(|| format!("`{}` has no file name", source.display()))?;
        let preprocessed = out_dir.join(file_name);
        std::fs::write(&preprocessed, &expansion.preprocessed)
            .with_context(|| format!("failed to write `{}`", preprocessed.display()))?;
        tracing::debug!("wrote preprocessed source to {}", preprocessed.display());

        Ok(Runner {
            source: preprocessed,
            tests: expansion.tests,
            color: options.color,
        })
    }

    /// The registered tests, in declaration order.
    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    /// Run every test; `true` means the file passed.
    pub fn run(&self) -> Result<bool> {
        let mut passed = true;
        for test in &self.tests {
            passed &= self.run_test(test)?;
        }
        Ok(passed)
    }

    fn run_test(&self, test: &Test) -> Result<bool> {
        println!("Test '{}'", test.display_name());
        let mut failed = false;

        for (group, assertions) in test.assertions() {
            if !group.is_available() {
                println!("  Compiler group {} is not available, skipping", group);
                continue;
            }
            println!("  Compiler group {}", group);

            let mut reports: Vec<Report> = Vec::new();
            for instance in &group.members {
                reports.extend(instance.execute(&self.source, test.identifier())?);
            }
            for report in &reports {
                tracing::debug!("{} finished in {:.1} ms", report.name, report.elapsed_ms());
            }

            for assertion in assertions {
                println!("    {}", assertion);
                for report in &reports {
                    let success = assertion.check(report);
                    println!("      {}: {}", report.name, self.verdict(success));
                    if !success {
                        failed = true;
                        tracing::error!("command: {}", report.command);
                        println!("STDOUT\n{}", report.stdout);
                        println!("STDERR\n{}", report.stderr);
                    }
                }
            }
        }

        Ok(!failed)
    }

    fn verdict(&self, success: bool) -> &'static str {
        match (success, self.color) {
            (true, true) => "\x1b[1;32mPASS\x1b[0m",
            (true, false) => "PASS",
            (false, true) => "\x1b[1;31mFAIL\x1b[0m",
            (false, false) => "FAIL",
        }
    }
}

/// Where the preprocessed source lands.
fn output_dir(source: &Path, options: &RunOptions, config: &Config) -> PathBuf {
    options
        .output
        .clone()
        .or_else(|| config.run.output.clone())
        .unwrap_or_else(|| {
            source
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("build")
        })
}

/// Resolve the language for a source file: explicit override first, then
/// the extension table. Unknown extensions fail closed.
fn detect_dialect(source: &Path, language: Option<&str>) -> Result<Dialect> {
    if let Some(language) = language {
        return Dialect::parse(&language.to_lowercase())
            .with_context(|| format!("unknown language `{}`", language));
    }

    let extension = source
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    match extension {
        "c" | "i" | "h" => Ok(Dialect::C),
        "cpp" | "cc" | "cxx" | "c++" | "C" | "ii" | "hpp" | "hh" | "hxx" => Ok(Dialect::Cpp),
        "" => bail!(
            "`{}` has no extension; pass --language to select one",
            source.display()
        ),
        other => bail!(
            "cannot infer a language from `.{}`; pass --language to select one",
            other
        ),
    }
}
