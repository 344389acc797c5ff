//! Assertion model - expected properties of a compiler run.

use std::fmt;

use regex::Regex;

use crate::core::report::{Report, Severity};

/// How a message assertion matches diagnostic text.
///
/// Exactly one of literal text or pattern exists per assertion; the choice
/// is structural rather than two nullable fields.
#[derive(Debug, Clone)]
pub enum MessageMatch {
    /// Byte-exact equality.
    Text(String),
    /// Regex match anchored at the start of the message (no end anchor).
    Pattern { source: String, regex: Regex },
}

impl MessageMatch {
    /// A literal text matcher.
    pub fn text(text: impl Into<String>) -> Self {
        MessageMatch::Text(text.into())
    }

    /// A regex matcher. The pattern is compiled anchored at the start.
    pub fn pattern(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let source = pattern.into();
        let regex = Regex::new(&format!("^(?:{})", source))?;
        Ok(MessageMatch::Pattern { source, regex })
    }

    fn matches(&self, message: &str) -> bool {
        match self {
            MessageMatch::Text(text) => message == text,
            MessageMatch::Pattern { regex, .. } => regex.is_match(message),
        }
    }
}

/// One expected property of a [`Report`].
#[derive(Debug, Clone)]
pub enum Assertion {
    /// A diagnostic with this severity and matching message exists.
    Message {
        severity: Severity,
        matcher: MessageMatch,
    },
    /// The compiler process exited with this code.
    ReturnCode(i32),
    /// A diagnostic carrying this machine error code exists, at any severity.
    ErrorCode(String),
}

impl Assertion {
    /// Evaluate this assertion against one report.
    ///
    /// Assertions are independent; callers evaluate every assertion even
    /// after a failure.
    pub fn check(&self, report: &Report) -> bool {
        match self {
            Assertion::Message { severity, matcher } => report
                .diagnostics(*severity)
                .iter()
                .any(|diagnostic| matcher.matches(&diagnostic.message)),
            Assertion::ReturnCode(expected) => report.exit_code == Some(*expected),
            Assertion::ErrorCode(expected) => report
                .all_diagnostics()
                .any(|(_, diagnostic)| diagnostic.error_code.as_deref() == Some(expected)),
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Message {
                severity,
                matcher: MessageMatch::Text(text),
            } => write!(f, "REQUIRE {}: {}", severity.identifier(), text),
            Assertion::Message {
                severity,
                matcher: MessageMatch::Pattern { source, .. },
            } => write!(f, "REQUIRE {} MATCHES: {}", severity.identifier(), source),
            Assertion::ReturnCode(code) => write!(f, "RETURN CODE {}", code),
            Assertion::ErrorCode(code) => write!(f, "ERROR CODE {}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::Diagnostic;

    fn report_with(severity: Severity, message: &str, error_code: Option<&str>) -> Report {
        let mut report = Report::new(
            "GCC 13.2.0 (c++17)".into(),
            "gcc -std=c++17 test.cpp".into(),
            Some(1),
            String::new(),
            String::new(),
            0,
            0,
        );
        report.extend([(
            severity,
            Diagnostic {
                message: message.into(),
                location: None,
                error_code: error_code.map(Into::into),
            },
        )]);
        report
    }

    #[test]
    fn test_text_match_is_byte_exact() {
        let report = report_with(Severity::Error, "exact literal", None);

        let hit = Assertion::Message {
            severity: Severity::Error,
            matcher: MessageMatch::text("exact literal"),
        };
        let miss = Assertion::Message {
            severity: Severity::Error,
            matcher: MessageMatch::text("exact"),
        };

        assert!(hit.check(&report));
        assert!(!miss.check(&report));
    }

    #[test]
    fn test_pattern_match_is_anchored_at_start_only() {
        let report = report_with(Severity::Error, "exact literal", None);

        let prefix = Assertion::Message {
            severity: Severity::Error,
            matcher: MessageMatch::pattern("^exact").unwrap(),
        };
        let inner = Assertion::Message {
            severity: Severity::Error,
            matcher: MessageMatch::pattern("literal").unwrap(),
        };

        assert!(prefix.check(&report));
        assert!(!inner.check(&report));
    }

    #[test]
    fn test_severity_buckets_do_not_bleed() {
        let report = report_with(Severity::Warning, "unused variable", None);

        let assertion = Assertion::Message {
            severity: Severity::Error,
            matcher: MessageMatch::text("unused variable"),
        };
        assert!(!assertion.check(&report));
    }

    #[test]
    fn test_return_code() {
        let report = report_with(Severity::Error, "boom", None);
        assert!(Assertion::ReturnCode(1).check(&report));
        assert!(!Assertion::ReturnCode(0).check(&report));
    }

    #[test]
    fn test_error_code_matches_any_severity() {
        let report = report_with(Severity::Warning, "negative subscript", Some("C2118"));
        assert!(Assertion::ErrorCode("C2118".into()).check(&report));
        assert!(!Assertion::ErrorCode("C2119".into()).check(&report));
    }

    #[test]
    fn test_display_wording() {
        let assertion = Assertion::Message {
            severity: Severity::FatalError,
            matcher: MessageMatch::text("out of memory"),
        };
        assert_eq!(assertion.to_string(), "REQUIRE fatal_error: out of memory");
        assert_eq!(Assertion::ReturnCode(1).to_string(), "RETURN CODE 1");
        assert_eq!(
            Assertion::ErrorCode("C2118".into()).to_string(),
            "ERROR CODE C2118"
        );
    }
}
