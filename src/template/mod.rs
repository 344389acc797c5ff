//! Template expansion: the directive vocabulary of annotated sources.
//!
//! Expanding a source file produces the preprocessed source (every test
//! body wrapped in its `#ifdef` gate) and, as a side effect, the list of
//! registered [`Test`]s with their bound assertions.
//!
//! The directive table is fixed: `include`, `load_defaults`, `test`, the
//! severity assertions (`note`, `warning`, `error`, `fatal_error`),
//! `return_code` and `error_code`. `load_defaults` augments the compiler
//! scope, not the table: it binds one constructor per family under the
//! family's canonical name (`GCC`) and a default, already-resolved group
//! under the lowercase alias (`gcc`). A later `load_defaults` shadows the
//! names it re-injects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::core::assertion::{Assertion, MessageMatch};
use crate::core::report::Severity;
use crate::core::standard::{Dialect, StandardQuery, StandardTerm};
use crate::core::test::Test;
use crate::toolchain::{CompilerFamily, ToolchainError, ToolchainGroup, ToolchainRequest};
use crate::util::Config;

pub mod scan;

use scan::{line_col, ArgList, DirectiveCall, Expr, ScanError, Scanner, Token};

/// A malformed directive, located in its template file.
#[derive(Debug, Error, Diagnostic)]
#[error("{}:{line}:{column}: {message}", .file.display())]
#[diagnostic(code(diagmat::template::usage))]
pub struct UsageError {
    pub message: String,
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("offending directive")]
    pub span: SourceSpan,
}

impl UsageError {
    fn new(file: &Path, text: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(text, offset);
        UsageError {
            message: message.into(),
            file: file.to_path_buf(),
            line,
            column,
            src: NamedSource::new(file.display().to_string(), text.to_string()),
            span: (offset, 1).into(),
        }
    }
}

/// Failures while expanding a template.
#[derive(Debug, Error)]
pub enum ExpandError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Standard-query resolution or pinned-executable probing failed.
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error("failed to read `{}`", .path.display())]
    Include {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The result of expanding one source file.
#[derive(Debug)]
pub struct Expansion {
    /// The source with every test body gated behind its identifier.
    pub preprocessed: String,
    /// Registered tests, in declaration order.
    pub tests: Vec<Test>,
}

/// What a scope name resolves to.
#[derive(Debug, Clone)]
enum Binding {
    /// A constructor: `GCC(std=">=17")`.
    Factory {
        family: CompilerFamily,
        dialect: Dialect,
    },
    /// A resolved default group (`gcc`), callable to refine.
    Group {
        request: ToolchainRequest,
        resolved: ToolchainGroup,
    },
}

/// Expand `path` with `default_dialect` backing `load_defaults()` calls
/// that name no language.
pub fn expand_file(
    path: &Path,
    default_dialect: Dialect,
    config: &Config,
) -> Result<Expansion, ExpandError> {
    let mut expander = Expander::new(default_dialect, config);
    expander.expand(path)?;
    Ok(Expansion {
        preprocessed: expander.output,
        tests: expander.tests,
    })
}

struct Expander<'a> {
    config: &'a Config,
    default_dialect: Dialect,
    scope: HashMap<String, Binding>,
    tests: Vec<Test>,
    output: String,
}

impl<'a> Expander<'a> {
    fn new(default_dialect: Dialect, config: &'a Config) -> Self {
        Expander {
            config,
            default_dialect,
            scope: HashMap::new(),
            tests: Vec::new(),
            output: String::new(),
        }
    }

    fn expand(&mut self, path: &Path) -> Result<(), ExpandError> {
        let text = std::fs::read_to_string(path).map_err(|source| ExpandError::Include {
            path: path.to_path_buf(),
            source,
        })?;
        self.expand_text(&text, path)
    }

    fn expand_text(&mut self, text: &str, file: &Path) -> Result<(), ExpandError> {
        let mut scanner = Scanner::new(text);
        loop {
            let token = scanner
                .next_token()
                .map_err(|error| self.usage_from_scan(file, text, error))?;
            match token {
                None => return Ok(()),
                Some(Token::Literal(literal)) => self.output.push_str(literal),
                Some(Token::Directive(call)) => self.apply(call, file, text)?,
            }
        }
    }

    fn usage_from_scan(&self, file: &Path, text: &str, error: ScanError) -> ExpandError {
        UsageError::new(file, text, error.offset, error.message).into()
    }

    fn apply(&mut self, call: DirectiveCall, file: &Path, text: &str) -> Result<(), ExpandError> {
        let usage =
            |message: String| -> ExpandError { UsageError::new(file, text, call.offset, message).into() };

        match call.name.as_str() {
            "include" => {
                let [Expr::Str(target)] = call.args.positional.as_slice() else {
                    return Err(usage("@include takes one path string".into()));
                };
                let mut target = PathBuf::from(target);
                if !target.is_absolute() {
                    let base = file.parent().unwrap_or_else(|| Path::new("."));
                    target = base.join(target);
                }
                self.expand(&target)
            }
            "load_defaults" => {
                let dialect = match call.args.positional.as_slice() {
                    [] => Some(self.default_dialect),
                    [Expr::Str(language)] => Dialect::parse(&language.to_lowercase()),
                    _ => return Err(usage("@load_defaults takes one language string".into())),
                };
                let Some(dialect) = dialect else {
                    tracing::warn!(
                        "no default compilers for language requested at {}:{}",
                        file.display(),
                        line_col(text, call.offset).0
                    );
                    return Ok(());
                };
                self.load_defaults(dialect)?;
                Ok(())
            }
            "test" => self.register_test(&call, file, text),
            "note" => self.bind_message(Severity::Note, &call, file, text),
            "warning" => self.bind_message(Severity::Warning, &call, file, text),
            "error" => self.bind_message(Severity::Error, &call, file, text),
            "fatal_error" => self.bind_message(Severity::FatalError, &call, file, text),
            "return_code" => {
                let group = self.compiler_argument(&call, file, text)?;
                let code = match call.args.positional.get(1) {
                    Some(Expr::Int(code)) => *code,
                    _ => return Err(usage("@return_code takes a compiler and an integer".into())),
                };
                let code = i32::try_from(code)
                    .map_err(|_| usage("return code out of range".into()))?;
                self.bind(group, Assertion::ReturnCode(code), &call, file, text)
            }
            "error_code" => {
                let group = self.compiler_argument(&call, file, text)?;
                let Some(Expr::Str(code)) = call.args.positional.get(1) else {
                    return Err(usage("@error_code takes a compiler and a code string".into()));
                };
                self.bind(group, Assertion::ErrorCode(code.clone()), &call, file, text)
            }
            other => Err(usage(format!("unknown directive `@{}`", other))),
        }
    }

    /// Bind the family constructors and default groups for `dialect`.
    fn load_defaults(&mut self, dialect: Dialect) -> Result<(), ExpandError> {
        for family in CompilerFamily::ALL {
            self.scope.insert(
                family.display_name().to_string(),
                Binding::Factory { family, dialect },
            );

            let request = self.base_request(family, dialect);
            let resolved = request.resolve()?;
            self.scope
                .insert(family.as_str().to_string(), Binding::Group { request, resolved });
        }
        Ok(())
    }

    /// A bare request for one family, seeded with configured options.
    fn base_request(&self, family: CompilerFamily, dialect: Dialect) -> ToolchainRequest {
        let mut request = ToolchainRequest::new(family, dialect);
        request.options = self.config.family_options(family.as_str()).to_vec();
        request
    }

    fn register_test(
        &mut self,
        call: &DirectiveCall,
        file: &Path,
        text: &str,
    ) -> Result<(), ExpandError> {
        let usage =
            |message: &str| -> ExpandError { UsageError::new(file, text, call.offset, message).into() };

        let [Expr::Str(name)] = call.args.positional.as_slice() else {
            return Err(usage("@test takes one name string"));
        };
        if name.is_empty() {
            return Err(usage("test names must not be empty"));
        }

        let Some(body) = &call.block else {
            if call.spaced_block {
                return Err(usage(
                    "make sure to NOT place a space before the curly brace after @test(...)",
                ));
            }
            return Err(usage("expected `{` after @test(...)"));
        };

        let test = Test::new(name.clone());
        if self.tests.iter().any(|t| t.identifier() == test.identifier()) {
            return Err(usage(&format!(
                "duplicate test identifier `{}`",
                test.identifier()
            )));
        }

        self.output.push_str(&format!(
            "\n#ifdef {}\n{}\n#endif",
            test.identifier(),
            body
        ));
        self.tests.push(test);
        Ok(())
    }

    fn bind_message(
        &mut self,
        severity: Severity,
        call: &DirectiveCall,
        file: &Path,
        text: &str,
    ) -> Result<(), ExpandError> {
        let usage =
            |message: String| -> ExpandError { UsageError::new(file, text, call.offset, message).into() };

        let group = self.compiler_argument(call, file, text)?;

        let literal = match call.args.positional.get(1) {
            Some(Expr::Str(literal)) => Some(literal.clone()),
            Some(_) => return Err(usage("message text must be a string".into())),
            None => match call.args.keyword("text") {
                Some(Expr::Str(literal)) => Some(literal.clone()),
                Some(_) => return Err(usage("message text must be a string".into())),
                None => None,
            },
        };
        let pattern = match call.args.keyword("regex") {
            Some(Expr::Str(pattern)) => Some(pattern.clone()),
            Some(_) => return Err(usage("regex pattern must be a string".into())),
            None => None,
        };

        let matcher = match (literal, pattern) {
            (Some(literal), None) => MessageMatch::text(literal),
            (None, Some(pattern)) => MessageMatch::pattern(pattern)
                .map_err(|error| usage(format!("invalid regex: {}", error)))?,
            (Some(_), Some(_)) => {
                return Err(usage(format!(
                    "@{} takes either text or regex, not both",
                    call.name
                )))
            }
            (None, None) => {
                return Err(usage(format!(
                    "@{} requires exactly one of text or regex",
                    call.name
                )))
            }
        };

        self.bind(group, Assertion::Message { severity, matcher }, call, file, text)
    }

    fn bind(
        &mut self,
        group: ToolchainGroup,
        assertion: Assertion,
        call: &DirectiveCall,
        file: &Path,
        text: &str,
    ) -> Result<(), ExpandError> {
        let Some(test) = self.tests.last_mut() else {
            return Err(UsageError::new(
                file,
                text,
                call.offset,
                format!("@{} must follow a @test(...) block", call.name),
            )
            .into());
        };
        test.add_assertion(group, assertion);
        Ok(())
    }

    /// Evaluate the first positional argument as a compiler reference.
    fn compiler_argument(
        &mut self,
        call: &DirectiveCall,
        file: &Path,
        text: &str,
    ) -> Result<ToolchainGroup, ExpandError> {
        let Some(expr) = call.args.positional.first() else {
            return Err(UsageError::new(
                file,
                text,
                call.offset,
                format!("@{} requires a compiler argument", call.name),
            )
            .into());
        };
        self.eval_compiler(expr, call, file, text)
    }

    fn eval_compiler(
        &mut self,
        expr: &Expr,
        call: &DirectiveCall,
        file: &Path,
        text: &str,
    ) -> Result<ToolchainGroup, ExpandError> {
        let usage =
            |message: String| -> ExpandError { UsageError::new(file, text, call.offset, message).into() };

        match expr {
            Expr::Ident(name) => match self.scope.get(name) {
                Some(Binding::Group { resolved, .. }) => Ok(resolved.clone()),
                Some(Binding::Factory { family, dialect }) => {
                    Ok(self.base_request(*family, *dialect).resolve()?)
                }
                None => Err(usage(format!(
                    "unknown compiler `{}`; did @load_defaults(...) run?",
                    name
                ))),
            },
            Expr::Call { name, args } => {
                let base = match self.scope.get(name) {
                    Some(Binding::Factory { family, dialect }) => {
                        self.base_request(*family, *dialect)
                    }
                    Some(Binding::Group { request, .. }) => request.clone(),
                    None => {
                        return Err(usage(format!(
                            "unknown compiler `{}`; did @load_defaults(...) run?",
                            name
                        )))
                    }
                };
                let request = self.refine_request(base, args, call, file, text)?;
                Ok(request.resolve()?)
            }
            _ => Err(usage("expected a compiler reference".into())),
        }
    }

    /// Apply constructor keyword arguments onto a base request.
    fn refine_request(
        &self,
        mut request: ToolchainRequest,
        args: &ArgList,
        call: &DirectiveCall,
        file: &Path,
        text: &str,
    ) -> Result<ToolchainRequest, ExpandError> {
        let usage =
            |message: String| -> ExpandError { UsageError::new(file, text, call.offset, message).into() };

        if !args.positional.is_empty() {
            return Err(usage(
                "compiler constructors take keyword arguments only".into(),
            ));
        }

        for (key, value) in &args.keywords {
            match (key.as_str(), value) {
                ("language", Expr::Str(language)) => {
                    request.dialect = Dialect::parse(&language.to_lowercase())
                        .ok_or_else(|| usage(format!("unknown language `{}`", language)))?;
                }
                ("std", expr) => {
                    request.std = Some(standard_query(expr).map_err(&usage)?);
                }
                ("options", Expr::List(items)) => {
                    let mut options = Vec::with_capacity(items.len());
                    for item in items {
                        let Expr::Str(option) = item else {
                            return Err(usage("options must be a list of strings".into()));
                        };
                        options.push(option.clone());
                    }
                    request.options = options;
                }
                ("executable", Expr::Str(path)) => {
                    request.executable = Some(PathBuf::from(path));
                }
                ("version", Expr::Str(requirement)) => {
                    request.version = Some(
                        semver::VersionReq::parse(requirement)
                            .map_err(|error| usage(format!("invalid version requirement: {}", error)))?,
                    );
                }
                ("target", Expr::Str(pattern)) => {
                    request.target = Some(
                        regex::Regex::new(pattern)
                            .map_err(|error| usage(format!("invalid target pattern: {}", error)))?,
                    );
                }
                (key, _) => {
                    return Err(usage(format!("unknown constructor argument `{}`", key)));
                }
            }
        }

        Ok(request)
    }
}

/// Translate a `std=` expression into a query.
fn standard_query(expr: &Expr) -> Result<StandardQuery, String> {
    match expr {
        Expr::Int(value) => Ok(StandardQuery::Exact(int_term(*value)?)),
        Expr::Str(value) if value.starts_with('>') || value.starts_with('<') => {
            Ok(StandardQuery::Comparison(value.clone()))
        }
        Expr::Str(value) => Ok(StandardQuery::Exact(StandardTerm::Name(value.clone()))),
        Expr::List(items) => {
            let terms = items
                .iter()
                .map(|item| match item {
                    Expr::Int(value) => int_term(*value),
                    Expr::Str(value) => Ok(StandardTerm::Name(value.clone())),
                    _ => Err("std lists contain numbers or strings".to_string()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StandardQuery::List(terms))
        }
        Expr::Tuple(items) => match items.as_slice() {
            [Expr::Str(lower), Expr::Str(upper)] => Ok(StandardQuery::Range {
                lower: lower.clone(),
                upper: upper.clone(),
            }),
            _ => Err("specify ranges as (\">minimum\", \"<maximum\")".to_string()),
        },
        _ => Err("unsupported std query".to_string()),
    }
}

fn int_term(value: i64) -> Result<StandardTerm, String> {
    u32::try_from(value)
        .map(StandardTerm::Number)
        .map_err(|_| format!("standard number {} out of range", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::toolchain::ToolchainInstance;

    fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    /// An expander with `gcc` bound to a synthetic, already-resolved group
    /// so no discovery probes run.
    fn expander_with_gcc(config: &Config) -> Expander<'_> {
        let mut expander = Expander::new(Dialect::Cpp, config);
        let descriptor = crate::toolchain::tests::descriptor(CompilerFamily::Gcc);
        let group = ToolchainGroup {
            family: CompilerFamily::Gcc,
            dialect: Dialect::Cpp,
            members: vec![ToolchainInstance {
                descriptor,
                dialect: Dialect::Cpp,
                options: Vec::new(),
                selected: vec!["c++17".into()],
            }],
        };
        expander.scope.insert(
            "gcc".into(),
            Binding::Group {
                request: ToolchainRequest::new(CompilerFamily::Gcc, Dialect::Cpp),
                resolved: group,
            },
        );
        expander
    }

    fn expand_with_gcc(contents: &str) -> Result<(String, Vec<Test>), ExpandError> {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_source(tmp.path(), "sample.cpp", contents);
        let config = Config::default();
        let mut expander = expander_with_gcc(&config);
        expander.expand(&path)?;
        Ok((expander.output, expander.tests))
    }

    #[test]
    fn test_test_body_is_gated() {
        let (output, tests) = expand_with_gcc(
            "@test(\"fails\"){\n    int x = \"string\";\n}\n\
             @error(gcc, text=\"cannot convert\")\n",
        )
        .unwrap();

        assert!(output.contains("#ifdef FAILS"));
        assert!(output.contains("int x = \"string\";"));
        assert!(output.contains("#endif"));

        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].identifier(), "FAILS");
        let (group, assertions) = tests[0].assertions().next().unwrap();
        assert!(group.is_available());
        assert_eq!(assertions.len(), 1);
        assert_eq!(
            assertions[0].to_string(),
            "REQUIRE error: cannot convert"
        );
    }

    #[test]
    fn test_assertions_bind_to_most_recent_test() {
        let (_, tests) = expand_with_gcc(
            "@test(\"a\"){ int x; }\n@error(gcc, text=\"one\")\n\
             @test(\"b\"){ int y; }\n@warning(gcc, text=\"two\")\n@return_code(gcc, 1)\n",
        )
        .unwrap();

        assert_eq!(tests.len(), 2);
        let b_assertions: Vec<_> = tests[1]
            .assertions()
            .flat_map(|(_, list)| list.iter().map(|a| a.to_string()))
            .collect();
        assert_eq!(b_assertions, ["REQUIRE warning: two", "RETURN CODE 1"]);
    }

    #[test]
    fn test_text_and_regex_together_is_a_usage_error() {
        let error = expand_with_gcc(
            "@test(\"t\"){ }\n@error(gcc, text=\"a\", regex=\"b\")\n",
        )
        .unwrap_err();
        let ExpandError::Usage(usage) = error else {
            panic!("expected a usage error");
        };
        assert!(usage.message.contains("not both"));
        assert_eq!(usage.line, 2);
    }

    #[test]
    fn test_neither_text_nor_regex_is_a_usage_error() {
        let error = expand_with_gcc("@test(\"t\"){ }\n@error(gcc)\n").unwrap_err();
        let ExpandError::Usage(usage) = error else {
            panic!("expected a usage error");
        };
        assert!(usage.message.contains("exactly one"));
    }

    #[test]
    fn test_space_before_brace_is_reported() {
        let error = expand_with_gcc("@test(\"t\") { int x; }\n").unwrap_err();
        let ExpandError::Usage(usage) = error else {
            panic!("expected a usage error");
        };
        assert!(usage.message.contains("space before the curly brace"));
    }

    #[test]
    fn test_duplicate_identifier_is_rejected() {
        let error =
            expand_with_gcc("@test(\"my test\"){ }\n@test(\"MY TEST\"){ }\n").unwrap_err();
        let ExpandError::Usage(usage) = error else {
            panic!("expected a usage error");
        };
        assert!(usage.message.contains("duplicate test identifier `MY_TEST`"));
    }

    #[test]
    fn test_assertion_outside_test_is_rejected() {
        let error = expand_with_gcc("@error(gcc, text=\"x\")\n").unwrap_err();
        let ExpandError::Usage(usage) = error else {
            panic!("expected a usage error");
        };
        assert!(usage.message.contains("must follow a @test"));
    }

    #[test]
    fn test_unknown_directive_is_rejected() {
        let error = expand_with_gcc("@frobnicate(1)\n").unwrap_err();
        assert!(matches!(error, ExpandError::Usage(_)));
    }

    #[test]
    fn test_include_expands_inline() {
        let tmp = tempfile::tempdir().unwrap();
        write_source(tmp.path(), "common.h", "#define COMMON 1\n");
        let path = write_source(
            tmp.path(),
            "sample.cpp",
            "@include(\"common.h\")\nint main() {}\n",
        );

        let config = Config::default();
        let mut expander = expander_with_gcc(&config);
        expander.expand(&path).unwrap();

        assert!(expander.output.contains("#define COMMON 1"));
        assert!(expander.output.contains("int main() {}"));
    }

    #[test]
    fn test_missing_include_is_an_io_error() {
        let error = expand_with_gcc("@include(\"missing.h\")\n").unwrap_err();
        assert!(matches!(error, ExpandError::Include { .. }));
    }

    #[test]
    fn test_load_defaults_with_unknown_language_warns_and_continues() {
        let (_, tests) = expand_with_gcc("@{load_defaults(\"fortran\")}\nint main() {}\n").unwrap();
        assert!(tests.is_empty());
    }

    #[test]
    fn test_standard_query_forms() {
        assert_eq!(
            standard_query(&Expr::Int(17)).unwrap(),
            StandardQuery::Exact(StandardTerm::Number(17))
        );
        assert_eq!(
            standard_query(&Expr::Str(">=17".into())).unwrap(),
            StandardQuery::Comparison(">=17".into())
        );
        assert_eq!(
            standard_query(&Expr::Tuple(vec![
                Expr::Str(">=17".into()),
                Expr::Str("<23".into())
            ]))
            .unwrap(),
            StandardQuery::Range {
                lower: ">=17".into(),
                upper: "<23".into()
            }
        );
        assert!(standard_query(&Expr::Tuple(vec![Expr::Str(">17".into())])).is_err());
    }
}
