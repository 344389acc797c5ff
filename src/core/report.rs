//! Report model - the typed record of one compiler invocation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Instant;

use serde::Serialize;

/// Severity of a compiler diagnostic.
///
/// The set is closed; ordering exists only so severities can key a sorted
/// map and never implies escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Note,
    Warning,
    Error,
    FatalError,
}

impl Severity {
    /// Parse a severity from the spelling compilers use in their output.
    pub fn from_level(level: &str) -> Option<Self> {
        match level {
            "note" => Some(Severity::Note),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            "fatal error" => Some(Severity::FatalError),
            _ => None,
        }
    }

    /// The spelling compilers use, with a space in `fatal error`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::FatalError => "fatal error",
        }
    }

    /// The underscore spelling used in assertion display (`fatal_error`).
    pub fn identifier(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a diagnostic points into the source.
///
/// GCC and Clang omit line or column for some messages, so both stay
/// optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// One compiler message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub location: Option<SourceLocation>,
    /// Machine code such as MSVC's `C2118`; GCC and Clang emit none.
    pub error_code: Option<String>,
}

/// The outcome of one compiler invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Identifies the run within a test, e.g. `GCC 13.2.0 (c++20)`.
    pub name: String,
    /// The command line that was run, for failure output.
    pub command: String,
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub start_ns: u128,
    pub end_ns: u128,
    diagnostics: BTreeMap<Severity, Vec<Diagnostic>>,
}

impl Report {
    /// Construct a report with no diagnostics attached yet.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        start_ns: u128,
        end_ns: u128,
    ) -> Self {
        Report {
            name,
            command,
            exit_code,
            stdout,
            stderr,
            start_ns,
            end_ns,
            diagnostics: BTreeMap::new(),
        }
    }

    /// Append diagnostics, preserving emission order within each severity.
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = (Severity, Diagnostic)>) {
        for (severity, diagnostic) in diagnostics {
            self.diagnostics.entry(severity).or_default().push(diagnostic);
        }
    }

    /// Diagnostics of one severity, in emission order.
    pub fn diagnostics(&self, severity: Severity) -> &[Diagnostic] {
        self.diagnostics
            .get(&severity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All diagnostics across severities.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = (Severity, &Diagnostic)> {
        self.diagnostics
            .iter()
            .flat_map(|(severity, list)| list.iter().map(move |d| (*severity, d)))
    }

    /// Elapsed wall-clock time in nanoseconds.
    pub fn elapsed_ns(&self) -> u128 {
        self.end_ns - self.start_ns
    }

    /// Elapsed wall-clock time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ns() as f64 / 1e6
    }

    /// Elapsed wall-clock time in seconds.
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_ns() as f64 / 1e9
    }
}

static CLOCK: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Monotonic timestamp in nanoseconds, for report timing fields.
pub fn monotonic_ns() -> u128 {
    CLOCK.elapsed().as_nanos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        Report::new(
            "GCC 13.2.0 (c++17)".into(),
            "gcc -std=c++17 test.cpp".into(),
            Some(1),
            String::new(),
            String::new(),
            1_000,
            3_500_000,
        )
    }

    #[test]
    fn test_extend_preserves_order_per_severity() {
        let mut report = report();
        let diag = |message: &str| Diagnostic {
            message: message.into(),
            location: None,
            error_code: None,
        };

        report.extend([
            (Severity::Error, diag("first")),
            (Severity::Warning, diag("unused variable")),
            (Severity::Error, diag("second")),
        ]);

        let errors: Vec<_> = report
            .diagnostics(Severity::Error)
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(errors, ["first", "second"]);
        assert_eq!(report.diagnostics(Severity::Note), &[]);
    }

    #[test]
    fn test_elapsed_forms() {
        let report = report();
        assert_eq!(report.elapsed_ns(), 3_499_000);
        assert!((report.elapsed_ms() - 3.499).abs() < 1e-9);
        assert!((report.elapsed_s() - 0.003499).abs() < 1e-12);
    }

    #[test]
    fn test_severity_level_spellings() {
        assert_eq!(Severity::from_level("fatal error"), Some(Severity::FatalError));
        assert_eq!(Severity::from_level("error"), Some(Severity::Error));
        assert_eq!(Severity::from_level("ice"), None);
        assert_eq!(Severity::FatalError.to_string(), "fatal error");
    }
}
