//! Diagmat - a compiler-diagnostic test harness for C and C++
//!
//! This crate provides the core library functionality for Diagmat:
//! toolchain discovery, template expansion of annotated sources, and the
//! compile-matrix runner that checks diagnostic assertions.

pub mod core;
pub mod runner;
pub mod template;
pub mod toolchain;
pub mod util;

pub use crate::core::assertion::{Assertion, MessageMatch};
pub use crate::core::report::{Diagnostic, Report, Severity, SourceLocation};
pub use crate::core::standard::{Dialect, StandardQuery, StandardSet};
pub use crate::core::test::Test;

pub use runner::{RunOptions, Runner};
pub use toolchain::{CompilerFamily, ToolchainDescriptor, ToolchainInstance};
