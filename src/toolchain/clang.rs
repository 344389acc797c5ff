//! Clang probing: version, target, and supported standards.
//!
//! Clang enumerates acceptable `-std=` values itself when handed an invalid
//! one, so the standards probe feeds `-std=dummy` to an empty stdin compile
//! and reads the error notes back.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;

use crate::core::standard::{Dialect, StandardGroup, StandardSet};
use crate::toolchain::{gcc, parse_lenient_version, CompilerFamily, ToolchainDescriptor};
use crate::util::ProcessBuilder;

/// PATH candidates: `clang`, `clang-18`, `clang.exe`.
pub static EXECUTABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^clang(-\d+)?(\.exe)?$").unwrap());

/// First standard name of a `note: use '<name>' ...` line.
static STANDARD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"use '(?P<standard>[^']+)'").unwrap());

/// Further aliases on the same line: `, '<alias>'` or ` or '<alias>'`.
static ALIAS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"( or|,) '(?P<alias>[^']+)'").unwrap());

/// Probe one Clang binary into a descriptor.
pub fn probe(path: &Path) -> Result<ToolchainDescriptor> {
    let version_output = ProcessBuilder::new(path).arg("--version").exec()?;
    let stdout = String::from_utf8_lossy(&version_output.stdout);
    let Some((version, target)) = gcc::parse_version_output(&stdout) else {
        bail!("`{} --version` reported no version or target", path.display());
    };
    let Some(version) = parse_lenient_version(&version) else {
        bail!("unparseable clang version `{}`", version);
    };

    let mut standards = BTreeMap::new();
    for (language, base, gnu) in [
        ("c", Dialect::C, Dialect::Gnu),
        ("c++", Dialect::Cpp, Dialect::GnuCpp),
    ] {
        let output = ProcessBuilder::new(path)
            .arg(format!("-x{}", language))
            .arg("-std=dummy")
            .arg("-")
            .stdin("")
            .exec()?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        let (plain, extended) = split_gnu(parse_standards_error(&stderr));
        standards.insert(base, StandardSet::new(base, plain));
        standards.insert(gnu, StandardSet::new(gnu, extended));
    }

    if standards.values().all(StandardSet::is_empty) {
        bail!(
            "`{} -std=dummy` enumerated no language standards",
            path.display()
        );
    }

    Ok(ToolchainDescriptor {
        family: CompilerFamily::Clang,
        executable: path.to_path_buf(),
        version,
        target,
        standards,
        env: None,
    })
}

/// Collect alias groups out of the `-std=dummy` error notes.
pub(crate) fn parse_standards_error(text: &str) -> Vec<StandardGroup> {
    let mut groups = Vec::new();

    for line in text.lines() {
        let Some(captures) = STANDARD_PATTERN.captures(line) else {
            continue;
        };
        let mut names = vec![captures["standard"].to_string()];
        names.extend(
            ALIAS_PATTERN
                .captures_iter(line)
                .map(|alias| alias["alias"].to_string()),
        );
        groups.push(StandardGroup(names));
    }

    groups
}

/// Split groups into plain and GNU-extended, preserving order.
fn split_gnu(groups: Vec<StandardGroup>) -> (Vec<StandardGroup>, Vec<StandardGroup>) {
    groups.into_iter().partition(|group| {
        !group.0.iter().any(|name| name.starts_with("gnu"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STD_DUMMY_DUMP: &str = "\
error: invalid value 'dummy' in '-std=dummy'
note: use 'c89', 'c90', or 'iso9899:1990' for 'ISO C 1990' standard
note: use 'iso9899:199409' for 'ISO C 1990 with amendment 1' standard
note: use 'gnu89' or 'gnu90' for 'ISO C 1990 with GNU extensions' standard
note: use 'c99' or 'iso9899:1999' for 'ISO C 1999' standard
note: use 'gnu99' for 'ISO C 1999 with GNU extensions' standard
note: use 'c11' or 'iso9899:2011' for 'ISO C 2011' standard
";

    #[test]
    fn test_parse_standards_error_groups_aliases() {
        let groups = parse_standards_error(STD_DUMMY_DUMP);

        assert_eq!(groups[0].0, ["c89", "c90", "iso9899:1990"]);
        assert_eq!(groups[1].0, ["iso9899:199409"]);
        assert_eq!(groups[3].0, ["c99", "iso9899:1999"]);
    }

    #[test]
    fn test_split_gnu_partitions_in_order() {
        let (plain, extended) = split_gnu(parse_standards_error(STD_DUMMY_DUMP));

        let canonicals: Vec<_> = plain.iter().map(|g| g.canonical()).collect();
        assert_eq!(canonicals, ["c89", "iso9899:199409", "c99", "c11"]);

        let gnu: Vec<_> = extended.iter().map(|g| g.canonical()).collect();
        assert_eq!(gnu, ["gnu89", "gnu99"]);
    }

    #[test]
    fn test_clang_version_output_reuses_gcc_pattern() {
        let dump = "\
Ubuntu clang version 18.1.3 (1ubuntu1)
Target: x86_64-pc-linux-gnu
Thread model: posix
";
        let (version, target) = gcc::parse_version_output(dump).unwrap();
        assert_eq!(version, "18.1.3");
        assert_eq!(target, "x86_64-pc-linux-gnu");
    }
}
