//! Configuration file support.
//!
//! Two locations are consulted:
//! - Global: `~/.diagmat/config.toml` - user-wide defaults
//! - Project: `.diagmat.toml` next to the source file under test
//!
//! Project config takes precedence over global config, and command-line
//! flags override both.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Diagmat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run settings
    pub run: RunConfig,

    /// Per-family compiler settings, keyed by family name (`gcc`, `clang`,
    /// `msvc`)
    pub compilers: HashMap<String, CompilerConfig>,
}

/// Run-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Default output directory for preprocessed sources
    pub output: Option<PathBuf>,

    /// Default language when the file extension is ambiguous
    pub language: Option<String>,
}

/// Compiler-family configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Extra options appended to every invocation of this family
    pub options: Vec<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load the layered configuration for a source file.
    ///
    /// Missing files are fine; malformed files are errors.
    pub fn load_layered(project_dir: &Path) -> Result<Self> {
        let mut config = match global_config_path() {
            Some(path) if path.exists() => Config::load(&path)?,
            _ => Config::default(),
        };

        let project = project_dir.join(".diagmat.toml");
        if project.exists() {
            config.merge(Config::load(&project)?);
        }

        Ok(config)
    }

    /// Overlay `other` on top of `self`, field by field.
    pub fn merge(&mut self, other: Config) {
        if other.run.output.is_some() {
            self.run.output = other.run.output;
        }
        if other.run.language.is_some() {
            self.run.language = other.run.language;
        }
        for (family, compiler) in other.compilers {
            self.compilers.insert(family, compiler);
        }
    }

    /// Extra options configured for a compiler family.
    pub fn family_options(&self, family: &str) -> &[String] {
        self.compilers
            .get(family)
            .map(|c| c.options.as_slice())
            .unwrap_or(&[])
    }
}

/// Path of the global config file, if a home directory exists.
fn global_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".diagmat").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
            [run]
            output = "out"
            language = "c++"

            [compilers.gcc]
            options = ["-Wall", "-Wextra"]
            "#,
        )
        .unwrap();

        assert_eq!(config.run.output.as_deref(), Some(Path::new("out")));
        assert_eq!(config.run.language.as_deref(), Some("c++"));
        assert_eq!(config.family_options("gcc"), ["-Wall", "-Wextra"]);
        assert!(config.family_options("clang").is_empty());
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let mut base: Config = toml::from_str(
            r#"
            [run]
            output = "base"
            language = "c"
            "#,
        )
        .unwrap();
        let overlay: Config = toml::from_str(
            r#"
            [run]
            output = "project"
            "#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.run.output.as_deref(), Some(Path::new("project")));
        assert_eq!(base.run.language.as_deref(), Some("c"));
    }
}
