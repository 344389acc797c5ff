//! Toolchain abstraction for C/C++ compilers.
//!
//! A [`ToolchainDescriptor`] is the immutable identity of one installed
//! compiler (executable, version, target, supported standards). A
//! [`ToolchainInstance`] binds a descriptor to user options and a selected
//! standards list; it is the unit a test's assertions attach to. A
//! [`ToolchainGroup`] is the set of instances one template reference
//! resolved to - possibly empty, in which case the group is unavailable
//! and its assertions are skipped.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::core::report::{monotonic_ns, Report};
use crate::core::standard::{Dialect, StandardError, StandardQuery, StandardSet};
use crate::util::ProcessBuilder;

pub mod clang;
pub mod diagnostics;
pub mod discovery;
pub mod gcc;
pub mod msvc;

pub use diagnostics::DiagnosticParser;

/// The family of a compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerFamily {
    Gcc,
    Clang,
    Msvc,
}

impl CompilerFamily {
    /// All families, in discovery order.
    pub const ALL: [CompilerFamily; 3] =
        [CompilerFamily::Gcc, CompilerFamily::Clang, CompilerFamily::Msvc];

    /// The lowercase name (`gcc`), used for template bindings and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::Clang => "clang",
            CompilerFamily::Msvc => "msvc",
        }
    }

    /// The canonical display name (`GCC`), also a template binding.
    pub fn display_name(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "GCC",
            CompilerFamily::Clang => "Clang",
            CompilerFamily::Msvc => "MSVC",
        }
    }

    /// The regex a PATH candidate's file name must match.
    pub fn executable_pattern(&self) -> &'static Regex {
        match self {
            CompilerFamily::Gcc => &gcc::EXECUTABLE_PATTERN,
            CompilerFamily::Clang => &clang::EXECUTABLE_PATTERN,
            CompilerFamily::Msvc => &msvc::EXECUTABLE_PATTERN,
        }
    }

    /// The diagnostic parser for this family's output.
    pub fn diagnostic_parser(&self) -> DiagnosticParser {
        DiagnosticParser::for_family(*self)
    }
}

impl fmt::Display for CompilerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Identity of one installed compiler.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainDescriptor {
    pub family: CompilerFamily,
    pub executable: PathBuf,
    pub version: semver::Version,
    pub target: String,
    /// Supported standards per dialect, in canonical chronological order.
    pub standards: BTreeMap<Dialect, StandardSet>,
    /// Environment the executable must run under (MSVC developer
    /// environment); `None` inherits the harness environment.
    #[serde(skip)]
    pub env: Option<HashMap<String, String>>,
}

impl ToolchainDescriptor {
    /// The standards supported for `dialect`, if any.
    pub fn standards_for(&self, dialect: Dialect) -> Option<&StandardSet> {
        self.standards.get(&dialect).filter(|set| !set.is_empty())
    }
}

// Identity is the probed surface; standards and env are derived from the
// executable.
impl PartialEq for ToolchainDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family
            && self.executable == other.executable
            && self.version == other.version
            && self.target == other.target
    }
}

impl Eq for ToolchainDescriptor {}

impl Hash for ToolchainDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family.hash(state);
        self.executable.hash(state);
        self.version.hash(state);
        self.target.hash(state);
    }
}

impl fmt::Display for ToolchainDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.family.display_name(),
            self.version,
            self.target
        )
    }
}

/// A descriptor bound to user options and a selected standards list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolchainInstance {
    pub descriptor: Arc<ToolchainDescriptor>,
    pub dialect: Dialect,
    pub options: Vec<String>,
    /// Ordered subset of the descriptor's standards for this dialect.
    pub selected: Vec<String>,
}

impl ToolchainInstance {
    /// Build the compile command for one standard.
    ///
    /// GCC/Clang shape: `<exe> -std=<std> <options...> -D<TEST_ID> <source>`.
    /// MSVC shape: `<exe> /std:<std> <options...> /D<TEST_ID> <source>`,
    /// run inside the sourced developer environment.
    pub fn compile_command(&self, source: &Path, test_id: &str, standard: &str) -> ProcessBuilder {
        let mut builder = ProcessBuilder::new(&self.descriptor.executable);
        match self.descriptor.family {
            CompilerFamily::Gcc | CompilerFamily::Clang => {
                builder = builder
                    .arg(format!("-std={}", standard))
                    .args(&self.options)
                    .arg(format!("-D{}", test_id));
            }
            CompilerFamily::Msvc => {
                builder = builder
                    .arg(format!("/std:{}", standard))
                    .args(&self.options)
                    .arg(format!("/D{}", test_id));
            }
        }
        if let Some(env) = &self.descriptor.env {
            builder = builder.env_replace(env);
        }
        builder.arg(source)
    }

    /// Compile `source` once per selected standard, yielding one report each.
    ///
    /// Compilations run in parallel; the returned reports keep the selected
    /// standard order, so downstream evaluation stays deterministic.
    pub fn execute(&self, source: &Path, test_id: &str) -> Result<Vec<Report>> {
        let parser = self.descriptor.family.diagnostic_parser();

        self.selected
            .par_iter()
            .map(|standard| {
                let command = self.compile_command(source, test_id, standard);

                let start_ns = monotonic_ns();
                let output = command.exec()?;
                let end_ns = monotonic_ns();

                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let from_stderr = parser.extract(&stderr);
                let from_stdout = parser.extract(&stdout);

                let mut report = Report::new(
                    format!(
                        "{} {} ({})",
                        self.descriptor.family.display_name(),
                        self.descriptor.version,
                        standard
                    ),
                    command.display_command(),
                    output.status.code(),
                    stdout,
                    stderr,
                    start_ns,
                    end_ns,
                );
                report.extend(from_stderr);
                report.extend(from_stdout);
                Ok(report)
            })
            .collect()
    }
}

impl fmt::Display for ToolchainInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

/// The instances one template compiler reference resolved to.
///
/// Assertions bind to a whole group; an empty group means the compiler is
/// not available on this host and the bound assertions are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolchainGroup {
    pub family: CompilerFamily,
    pub dialect: Dialect,
    pub members: Vec<ToolchainInstance>,
}

impl ToolchainGroup {
    /// Whether any compiler backs this group.
    pub fn is_available(&self) -> bool {
        !self.members.is_empty()
    }
}

impl fmt::Display for ToolchainGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.members.as_slice() {
            [] => write!(f, "{} ({})", self.family.display_name(), self.dialect),
            [single] => write!(f, "{}", single),
            members => {
                let list = members
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{}]", list)
            }
        }
    }
}

/// Errors while resolving a compiler reference into a group.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error(transparent)]
    Standard(#[from] StandardError),

    #[error("failed to probe `{}`: {message}", .path.display())]
    Probe { path: PathBuf, message: String },
}

/// A compiler reference as written in a template, before resolution.
#[derive(Debug, Clone)]
pub struct ToolchainRequest {
    pub family: CompilerFamily,
    pub dialect: Dialect,
    pub std: Option<StandardQuery>,
    pub options: Vec<String>,
    /// Pin a specific binary instead of discovering.
    pub executable: Option<PathBuf>,
    /// Keep only discovered compilers matching this version requirement.
    pub version: Option<semver::VersionReq>,
    /// Keep only discovered compilers whose target triple matches.
    pub target: Option<Regex>,
}

impl ToolchainRequest {
    /// A bare reference: every discovered compiler of the family, default
    /// options, all standards.
    pub fn new(family: CompilerFamily, dialect: Dialect) -> Self {
        ToolchainRequest {
            family,
            dialect,
            std: None,
            options: Vec::new(),
            executable: None,
            version: None,
            target: None,
        }
    }

    /// Resolve against discovery into a (possibly empty) group.
    ///
    /// Descriptors that do not support the requested dialect are skipped
    /// with a debug log; an unresolvable standard query aborts the file.
    pub fn resolve(&self) -> Result<ToolchainGroup, ToolchainError> {
        let descriptors = match &self.executable {
            Some(path) => {
                // A bare name like `executable="gcc-13"` goes through PATH.
                let path = if path.components().count() == 1 {
                    which::which(path).unwrap_or_else(|_| path.clone())
                } else {
                    path.clone()
                };
                vec![discovery::probe(self.family, &path)?]
            }
            None => discovery::descriptors(self.family),
        };

        let mut members = Vec::new();
        for descriptor in descriptors {
            if let Some(requirement) = &self.version {
                if !requirement.matches(&descriptor.version) {
                    continue;
                }
            }
            if let Some(target) = &self.target {
                if !target.is_match(&descriptor.target) {
                    continue;
                }
            }
            let Some(standards) = descriptor.standards_for(self.dialect) else {
                tracing::debug!(
                    "{} does not support dialect `{}`, skipping",
                    descriptor,
                    self.dialect
                );
                continue;
            };

            let selected = standards.select(self.std.as_ref())?;
            members.push(ToolchainInstance {
                descriptor: Arc::clone(&descriptor),
                dialect: self.dialect,
                options: self.options.clone(),
                selected,
            });
        }

        Ok(ToolchainGroup {
            family: self.family,
            dialect: self.dialect,
            members,
        })
    }
}

/// Parse a compiler version leniently: up to three numeric components,
/// missing ones padded with zero (`13.2` parses as `13.2.0`).
pub(crate) fn parse_lenient_version(text: &str) -> Option<semver::Version> {
    let mut parts = [0u64; 3];
    for (slot, component) in parts.iter_mut().zip(text.split('.')) {
        *slot = component.parse().ok()?;
    }
    Some(semver::Version::new(parts[0], parts[1], parts[2]))
}
