//! Per-family diagnostic parsing.
//!
//! Each compiler family owns one regex with named groups drawn from
//! `path`, `line`, `column`, `level`, `error_code`, `message`. Streams are
//! scanned line by line; a line either matches in full (anchored at `^`)
//! or is discarded. Multi-line diagnostics are not merged.

use std::path::PathBuf;

use regex::Regex;

use crate::core::report::{Diagnostic, Severity, SourceLocation};
use crate::toolchain::CompilerFamily;

/// Lifts one compiler family's output lines into typed diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticParser {
    pattern: &'static Regex,
}

impl DiagnosticParser {
    /// The parser for `family`'s diagnostic format.
    pub fn for_family(family: CompilerFamily) -> Self {
        let pattern: &'static Regex = match family {
            // Clang mirrors GCC's diagnostic format.
            CompilerFamily::Gcc | CompilerFamily::Clang => &super::gcc::DIAGNOSTIC_PATTERN,
            CompilerFamily::Msvc => &super::msvc::DIAGNOSTIC_PATTERN,
        };
        DiagnosticParser { pattern }
    }

    /// Extract every diagnostic from `text`, in emission order.
    pub fn extract(&self, text: &str) -> Vec<(Severity, Diagnostic)> {
        text.lines()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    fn parse_line(&self, line: &str) -> Option<(Severity, Diagnostic)> {
        let captures = self.pattern.captures(line)?;

        let severity = Severity::from_level(captures.name("level")?.as_str())?;
        let location = captures
            .name("path")
            .filter(|path| !path.as_str().is_empty())
            .map(|path| SourceLocation {
                path: PathBuf::from(path.as_str()),
                line: captures.name("line").and_then(|m| m.as_str().parse().ok()),
                column: captures
                    .name("column")
                    .and_then(|m| m.as_str().parse().ok()),
            });

        let diagnostic = Diagnostic {
            message: captures.name("message")?.as_str().to_string(),
            location,
            error_code: captures
                .name("error_code")
                .map(|code| code.as_str().to_string()),
        };

        Some((severity, diagnostic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcc_error_with_full_location() {
        let parser = DiagnosticParser::for_family(CompilerFamily::Gcc);
        let parsed = parser.extract(
            "build/sample.cpp:3:13: error: cannot convert 'const char*' to 'int' in initialization",
        );

        assert_eq!(parsed.len(), 1);
        let (severity, diagnostic) = &parsed[0];
        assert_eq!(*severity, Severity::Error);
        assert_eq!(
            diagnostic.message,
            "cannot convert 'const char*' to 'int' in initialization"
        );
        let location = diagnostic.location.as_ref().unwrap();
        assert_eq!(location.path, PathBuf::from("build/sample.cpp"));
        assert_eq!(location.line, Some(3));
        assert_eq!(location.column, Some(13));
        assert_eq!(diagnostic.error_code, None);
    }

    #[test]
    fn test_gcc_message_without_location() {
        let parser = DiagnosticParser::for_family(CompilerFamily::Gcc);
        let parsed = parser.extract("error: unrecognized command-line option '-std=dummy'");

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, Severity::Error);
        assert!(parsed[0].1.location.is_none());
    }

    #[test]
    fn test_unmatched_lines_are_discarded() {
        let parser = DiagnosticParser::for_family(CompilerFamily::Gcc);
        let parsed = parser.extract(
            "In file included from sample.cpp:1:\n\
             sample.cpp: In function 'int main()':\n\
             sample.cpp:4:5: warning: unused variable 'x' [-Wunused-variable]\n\
             compilation terminated.",
        );

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, Severity::Warning);
        assert_eq!(parsed[0].1.message, "unused variable 'x' [-Wunused-variable]");
    }

    #[test]
    fn test_clang_note() {
        let parser = DiagnosticParser::for_family(CompilerFamily::Clang);
        let parsed = parser.extract("sample.cpp:7:10: note: candidate function not viable");

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, Severity::Note);
    }

    #[test]
    fn test_msvc_error_with_code() {
        let parser = DiagnosticParser::for_family(CompilerFamily::Msvc);
        let parsed =
            parser.extract("sample.cpp(12): error C2118: negative subscript");

        assert_eq!(parsed.len(), 1);
        let (severity, diagnostic) = &parsed[0];
        assert_eq!(*severity, Severity::Error);
        assert_eq!(diagnostic.error_code.as_deref(), Some("C2118"));
        assert_eq!(diagnostic.message, "negative subscript");
        let location = diagnostic.location.as_ref().unwrap();
        assert_eq!(location.line, Some(12));
        assert_eq!(location.column, None);
    }

    #[test]
    fn test_msvc_fatal_error() {
        let parser = DiagnosticParser::for_family(CompilerFamily::Msvc);
        let parsed = parser
            .extract("sample.cpp(1): fatal error C1083: Cannot open include file: 'missing.h'");

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, Severity::FatalError);
        assert_eq!(parsed[0].1.error_code.as_deref(), Some("C1083"));
    }
}
