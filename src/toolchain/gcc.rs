//! GCC probing: version, target, and supported standards.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;

use crate::core::standard::{Dialect, StandardGroup, StandardSet};
use crate::toolchain::{parse_lenient_version, CompilerFamily, ToolchainDescriptor};
use crate::util::{OrderedMap, ProcessBuilder};

/// PATH candidates: `gcc`, `gcc-13`, `gcc.exe`.
pub static EXECUTABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^gcc(-\d+)?(\.exe)?$").unwrap());

/// GCC/Clang diagnostic lines: optional `path:line:column:` prefix, then
/// `error|warning|note:` and the message.
pub static DIAGNOSTIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?P<path>[a-zA-Z0-9_\-:/\\.]*?):((?P<line>[0-9]+):)?((?P<column>[0-9]+):)? )?((?P<level>error|warning|note): )(?P<message>.*)$",
    )
    .unwrap()
});

/// Version probe output (`-v --version` stderr): `Target:`, `Thread model:`
/// and `gcc version <ver>` lines, merged across matches. Clang's
/// `--version` output matches the same alternatives.
pub(crate) static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(Target: (?P<target>.*))|(Thread model: (?P<thread_model>.*))|((gcc|clang) version (?P<version>[0-9.]+))",
    )
    .unwrap()
});

/// One `-std=` row of `-v --help`: the standard name, a conformance blurb,
/// and optionally an alias at the end of the line.
static STANDARD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s+-std=(?P<standard>\S+)\s*(Conform.*((C|C\+\+)( draft)? standard)).*?((-std=(?P<alias>[^\s.)]+))|(\.$))",
    )
    .unwrap()
});

/// Probe one GCC binary into a descriptor.
pub fn probe(path: &Path) -> Result<ToolchainDescriptor> {
    let version_output = ProcessBuilder::new(path).args(["-v", "--version"]).exec()?;
    let stderr = String::from_utf8_lossy(&version_output.stderr);
    let Some((version, target)) = parse_version_output(&stderr) else {
        bail!("`{} -v --version` reported no version or target", path.display());
    };
    let Some(version) = parse_lenient_version(&version) else {
        bail!("unparseable gcc version `{}`", version);
    };

    let help_output = ProcessBuilder::new(path).args(["-v", "--help"]).exec()?;
    let stdout = String::from_utf8_lossy(&help_output.stdout);
    let standards = bucket_dialects(parse_standards_help(&stdout))?;
    if standards.is_empty() {
        bail!("`{} -v --help` listed no language standards", path.display());
    }

    Ok(ToolchainDescriptor {
        family: CompilerFamily::Gcc,
        executable: path.to_path_buf(),
        version,
        target,
        standards,
        env: None,
    })
}

/// Merge version and target out of a `-v --version` / `--version` dump.
pub(crate) fn parse_version_output(text: &str) -> Option<(String, String)> {
    let mut version = None;
    let mut target = None;
    for captures in VERSION_PATTERN.captures_iter(text) {
        if let Some(m) = captures.name("version") {
            version = Some(m.as_str().to_string());
        }
        if let Some(m) = captures.name("target") {
            target = Some(m.as_str().trim().to_string());
        }
    }
    version.zip(target)
}

/// Collect the `-std=` rows of `-v --help` into alias groups, preserving
/// the order GCC prints them in.
pub(crate) fn parse_standards_help(text: &str) -> Vec<StandardGroup> {
    let mut grouped: OrderedMap<String, Vec<String>> = OrderedMap::new();

    for line in text.lines() {
        let Some(captures) = STANDARD_LINE.captures(line) else {
            continue;
        };
        let standard = captures["standard"].to_string();
        let key = captures
            .name("alias")
            .map(|alias| alias.as_str().to_string())
            .unwrap_or_else(|| standard.clone());
        grouped.entry_or_insert_with(key, Vec::new).push(standard);
    }

    grouped
        .iter()
        .map(|(key, members)| {
            let mut names = vec![key.clone()];
            names.extend(members.iter().filter(|name| *name != key).cloned());
            StandardGroup(names)
        })
        .collect()
}

/// Split mixed alias groups into the four dialects and restore
/// chronological order for the C dialects.
pub(crate) fn bucket_dialects(
    groups: Vec<StandardGroup>,
) -> Result<BTreeMap<Dialect, StandardSet>> {
    let mut buckets: BTreeMap<Dialect, Vec<StandardGroup>> = BTreeMap::new();

    for group in groups {
        let is_gnu = group.0.iter().any(|name| name.starts_with("gnu"));
        let is_cpp = group.0.iter().any(|name| name.contains("++"));
        let dialect = match (is_gnu, is_cpp) {
            (false, false) => Dialect::C,
            (true, false) => Dialect::Gnu,
            (false, true) => Dialect::Cpp,
            (true, true) => Dialect::GnuCpp,
        };
        buckets.entry(dialect).or_default().push(group);
    }

    // GCC prints the 20th-century C standards after the current ones, and
    // iso9899:199409 after c99 even though 1994 came first. Range queries
    // depend on chronological order, so rotate and swap here.
    if let Some(groups) = buckets.get_mut(&Dialect::C) {
        restore_chronology(groups, true)?;
    }
    if let Some(groups) = buckets.get_mut(&Dialect::Gnu) {
        restore_chronology(groups, false)?;
    }

    Ok(buckets
        .into_iter()
        .map(|(dialect, groups)| (dialect, StandardSet::new(dialect, groups)))
        .collect())
}

fn restore_chronology(groups: &mut Vec<StandardGroup>, fix_iso94: bool) -> Result<()> {
    let Some(idx) = groups
        .iter()
        .position(|group| group.canonical().contains('9'))
    else {
        return Ok(());
    };

    let mut tail = groups.split_off(idx);
    if fix_iso94 {
        let iso94 = tail.iter().position(|group| group.contains("iso9899:199409"));
        let c99 = tail.iter().position(|group| group.contains("c99"));
        if let (Some(iso94), Some(c99)) = (iso94, c99) {
            if iso94 <= c99 {
                bail!(
                    "GCC listed iso9899:199409 before c99; its standards \
                     output changed shape and the chronology fix no longer applies"
                );
            }
            tail.swap(iso94, c99);
        }
    }

    tail.append(groups);
    *groups = tail;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION_DUMP: &str = "\
Using built-in specs.
COLLECT_GCC=gcc
Target: x86_64-linux-gnu
Thread model: posix
gcc version 13.2.0 (Ubuntu 13.2.0-4ubuntu3)
";

    const HELP_DUMP: &str = "\
  -std=c11                    Conform to the ISO 2011 C standard.
  -std=c17                    Conform to the ISO 2017 C standard (published in 2018).
  -std=c18                    Conform to the ISO 2017 C standard (published in 2018). Same as -std=c17.
  -std=c2x                    Conform to the ISO 202X C draft standard.
  -std=c89                    Conform to the ISO 1990 C standard.
  -std=c99                    Conform to the ISO 1999 C standard.
  -std=c++14                  Conform to the ISO 2014 C++ standard.
  -std=c++17                  Conform to the ISO 2017 C++ standard.
  -std=gnu11                  Conform to the ISO 2011 C standard with GNU extensions.
  -std=gnu99                  Conform to the ISO 1999 C standard with GNU extensions.
  -std=gnu++14                Conform to the ISO 2014 C++ standard with GNU extensions.
  -std=iso9899:199409         Conform to the ISO 1990 C standard as amended in 1994.
  -ansi                       A synonym for -std=c90.
";

    #[test]
    fn test_parse_version_output() {
        let (version, target) = parse_version_output(VERSION_DUMP).unwrap();
        assert_eq!(version, "13.2.0");
        assert_eq!(target, "x86_64-linux-gnu");
    }

    #[test]
    fn test_version_requires_both_fields() {
        assert!(parse_version_output("gcc version 13.2.0").is_none());
    }

    #[test]
    fn test_standards_help_groups_aliases() {
        let groups = parse_standards_help(HELP_DUMP);

        let c17 = groups.iter().find(|g| g.canonical() == "c17").unwrap();
        assert_eq!(c17.0, ["c17", "c18"]);

        // The -ansi synonym row is not a -std= row and must not appear.
        assert!(!groups.iter().any(|g| g.contains("c90")));
    }

    #[test]
    fn test_bucket_dialects_restores_chronology() {
        let standards = bucket_dialects(parse_standards_help(HELP_DUMP)).unwrap();

        let c: Vec<_> = standards[&Dialect::C]
            .groups()
            .iter()
            .map(|g| g.canonical())
            .collect();
        assert_eq!(c, ["c89", "iso9899:199409", "c99", "c11", "c17", "c2x"]);

        let gnu: Vec<_> = standards[&Dialect::Gnu]
            .groups()
            .iter()
            .map(|g| g.canonical())
            .collect();
        assert_eq!(gnu, ["gnu99", "gnu11"]);

        let cpp: Vec<_> = standards[&Dialect::Cpp]
            .groups()
            .iter()
            .map(|g| g.canonical())
            .collect();
        assert_eq!(cpp, ["c++14", "c++17"]);

        assert!(standards.contains_key(&Dialect::GnuCpp));
    }

    #[test]
    fn test_out_of_order_iso94_is_an_error() {
        let groups = vec![
            StandardGroup(vec!["iso9899:199409".into()]),
            StandardGroup(vec!["c99".into()]),
        ];
        assert!(bucket_dialects(groups).is_err());
    }
}
