//! MSVC probing and discovery.
//!
//! MSVC is never found by walking PATH: discovery asks `vswhere.exe` (at
//! its stable location under `Program Files (x86)`) for the installation,
//! then sources `VsDevCmd.bat -arch=<arch>` and captures the resulting
//! environment. `cl.exe` only works inside that environment, so the
//! descriptor carries the captured map and every invocation runs under it.
//! On non-Windows hosts discovery yields the empty set without error.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;

use crate::core::standard::{Dialect, StandardGroup, StandardSet};
use crate::toolchain::{parse_lenient_version, CompilerFamily, ToolchainDescriptor};
use crate::util::ProcessBuilder;

/// `cl` / `cl.exe`, for the pinned-executable path.
pub static EXECUTABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cl(\.exe)?$").unwrap());

/// MSVC diagnostic lines: `path(line): level CODE: message`.
pub static DIAGNOSTIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?P<path>[a-zA-Z0-9_\-:/\\.]*?)\((?P<line>[0-9]+)\): )((?P<level>fatal error|error|warning) )((?P<error_code>[A-Z][0-9]+): )(?P<message>.*)$",
    )
    .unwrap()
});

/// `Version 19.38.33130 for x64`, printed to stderr by `cl /help`.
static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Version (?P<version>[0-9.]+) for (?P<target>.*)").unwrap());

/// `/std:<c++14|c++17|...> C++ standard version` rows of `cl /help`.
static STANDARD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/std:<(?P<standards>.*)> (?P<language>[^ ]+)").unwrap());

/// Probe one `cl.exe` into a descriptor, running under `env` when given.
pub fn probe(path: &Path, env: Option<HashMap<String, String>>) -> Result<ToolchainDescriptor> {
    let mut command = ProcessBuilder::new(path).arg("/help");
    if let Some(env) = &env {
        command = command.env_replace(env);
    }
    let output = command.exec()?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let Some((version, target)) = parse_version_help(&stderr) else {
        bail!("`{} /help` reported no version banner", path.display());
    };
    let Some(version) = parse_lenient_version(&version) else {
        bail!("unparseable cl version `{}`", version);
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let standards = parse_standards_help(&stdout);
    if standards.is_empty() {
        bail!("`{} /help` listed no /std: options", path.display());
    }

    Ok(ToolchainDescriptor {
        family: CompilerFamily::Msvc,
        executable: path.to_path_buf(),
        version,
        target,
        standards,
        env,
    })
}

/// Version and target out of the `/help` banner on stderr.
pub(crate) fn parse_version_help(text: &str) -> Option<(String, String)> {
    let captures = VERSION_PATTERN.captures(text)?;
    Some((
        captures["version"].to_string(),
        captures["target"].trim().to_string(),
    ))
}

/// The `/std:` rows of `/help`: each pipe-separated token is its own
/// single-alias group.
pub(crate) fn parse_standards_help(text: &str) -> BTreeMap<Dialect, StandardSet> {
    let mut standards = BTreeMap::new();

    for captures in STANDARD_PATTERN.captures_iter(text) {
        let Some(dialect) = Dialect::parse(&captures["language"].to_lowercase()) else {
            continue;
        };
        let groups = captures["standards"]
            .split('|')
            .map(|name| StandardGroup(vec![name.to_string()]))
            .collect();
        standards.insert(dialect, StandardSet::new(dialect, groups));
    }

    standards
}

/// The `field: value` lines of vswhere's default text output.
pub(crate) fn parse_vswhere_output(text: &str) -> HashMap<String, String> {
    let fields = ["installationPath", "installationVersion", "displayName"];
    let mut parsed = HashMap::new();

    for line in text.lines() {
        for field in fields {
            if let Some(value) = line.strip_prefix(field).and_then(|rest| rest.strip_prefix(": ")) {
                parsed.insert(field.to_string(), value.to_string());
            }
        }
    }

    parsed
}

/// A `set` dump into an environment map.
pub(crate) fn parse_env_dump(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Architectures `VsDevCmd.bat` is sourced for.
#[cfg(windows)]
#[derive(Debug, Clone, Copy)]
enum VsArch {
    X86,
    X64,
}

#[cfg(windows)]
impl VsArch {
    const ALL: [VsArch; 2] = [VsArch::X86, VsArch::X64];

    fn as_str(&self) -> &'static str {
        match self {
            VsArch::X86 => "x86",
            VsArch::X64 => "amd64",
        }
    }
}

/// Discover installed MSVC toolchains.
#[cfg(windows)]
pub fn discover() -> Vec<ToolchainDescriptor> {
    match discover_windows() {
        Ok(descriptors) => descriptors,
        Err(error) => {
            tracing::warn!("MSVC discovery failed: {:#}", error);
            Vec::new()
        }
    }
}

/// Discover installed MSVC toolchains (none on this platform).
#[cfg(not(windows))]
pub fn discover() -> Vec<ToolchainDescriptor> {
    Vec::new()
}

#[cfg(windows)]
fn discover_windows() -> Result<Vec<ToolchainDescriptor>> {
    let program_files = std::env::var("ProgramFiles(x86)")
        .unwrap_or_else(|_| r"C:\Program Files (x86)".to_string());
    let vswhere = Path::new(&program_files)
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe");

    let output = ProcessBuilder::new(&vswhere).exec()?;
    if !output.status.success() {
        bail!("vswhere exited with {:?}", output.status.code());
    }

    let info = parse_vswhere_output(&String::from_utf8_lossy(&output.stdout));
    let Some(installation) = info.get("installationPath") else {
        bail!("vswhere reported no installationPath");
    };
    tracing::debug!(
        "discovered {} version {}",
        info.get("displayName").map(String::as_str).unwrap_or("Visual Studio"),
        info.get("installationVersion").map(String::as_str).unwrap_or("?"),
    );

    let dev_cmd = Path::new(installation)
        .join("Common7")
        .join("Tools")
        .join("VsDevCmd.bat");

    let mut descriptors = Vec::new();
    for arch in VsArch::ALL {
        let env = match source_environment(&dev_cmd, arch) {
            Ok(env) => env,
            Err(error) => {
                tracing::warn!("sourcing VsDevCmd.bat for {}: {:#}", arch.as_str(), error);
                continue;
            }
        };
        let Some(path_value) = env.get("Path") else {
            tracing::warn!("VsDevCmd.bat for {} produced no Path", arch.as_str());
            continue;
        };
        let cl = match which::which_in("cl", Some(path_value), std::env::current_dir()?) {
            Ok(cl) => cl,
            Err(_) => {
                tracing::warn!("no cl.exe in the {} developer environment", arch.as_str());
                continue;
            }
        };

        match probe(&cl, Some(env)) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(error) => tracing::warn!("probing `{}` failed: {:#}", cl.display(), error),
        }
    }

    Ok(descriptors)
}

#[cfg(windows)]
fn source_environment(dev_cmd: &Path, arch: VsArch) -> Result<HashMap<String, String>> {
    let command = format!(
        "\"{}\" -arch={} >nul 2>&1 && set",
        dev_cmd.display(),
        arch.as_str()
    );
    let output = ProcessBuilder::new("cmd.exe")
        .args(["/s", "/c", &command])
        .exec()?;
    if !output.status.success() {
        bail!("VsDevCmd.bat exited with {:?}", output.status.code());
    }

    Ok(parse_env_dump(&String::from_utf8_lossy(&output.stdout)))
}
