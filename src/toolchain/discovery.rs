//! Toolchain discovery with process-wide caching.
//!
//! GCC and Clang candidates come from walking PATH against the family's
//! filename regex; MSVC comes from the Visual Studio installer query. Every
//! per-executable probe is memoized for the lifetime of the process, keyed
//! by absolute executable path, and writes are serialized. A candidate
//! whose probe fails is logged and excluded; discovery itself never fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use crate::toolchain::{msvc, CompilerFamily, ToolchainDescriptor, ToolchainError};
use crate::util::paths::find_executables;

/// Per-executable probe results; `None` records a failed probe so the
/// warning is only emitted once.
static PROBES: LazyLock<Mutex<HashMap<PathBuf, Option<Arc<ToolchainDescriptor>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Per-family candidate enumeration.
static FAMILIES: LazyLock<Mutex<HashMap<CompilerFamily, Vec<Arc<ToolchainDescriptor>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// All usable descriptors of one family, memoized.
pub fn descriptors(family: CompilerFamily) -> Vec<Arc<ToolchainDescriptor>> {
    if let Some(cached) = FAMILIES.lock().unwrap().get(&family) {
        return cached.clone();
    }

    let discovered: Vec<Arc<ToolchainDescriptor>> = match family {
        CompilerFamily::Gcc | CompilerFamily::Clang => {
            find_executables(family.executable_pattern())
                .iter()
                .filter_map(|path| probe_cached(family, path))
                .collect()
        }
        CompilerFamily::Msvc => msvc::discover()
            .into_iter()
            .map(|descriptor| {
                let path = descriptor.executable.clone();
                let descriptor = Arc::new(descriptor);
                PROBES
                    .lock()
                    .unwrap()
                    .insert(path, Some(Arc::clone(&descriptor)));
                descriptor
            })
            .collect(),
    };

    FAMILIES
        .lock()
        .unwrap()
        .insert(family, discovered.clone());
    discovered
}

/// Every usable descriptor across all families, in family order.
pub fn discover_all() -> Vec<Arc<ToolchainDescriptor>> {
    CompilerFamily::ALL
        .into_iter()
        .flat_map(descriptors)
        .collect()
}

/// Probe one executable, caching success and failure.
fn probe_cached(family: CompilerFamily, path: &Path) -> Option<Arc<ToolchainDescriptor>> {
    // The lock is held across the probe so each key is written exactly once
    // even when groups resolve from worker threads.
    let mut probes = PROBES.lock().unwrap();
    if let Some(cached) = probes.get(path) {
        return cached.clone();
    }

    let result = match run_probe(family, path) {
        Ok(descriptor) => {
            tracing::debug!("probed {}: {}", path.display(), descriptor);
            Some(Arc::new(descriptor))
        }
        Err(error) => {
            tracing::warn!("invalid compiler `{}`: {:#}", path.display(), error);
            None
        }
    };
    probes.insert(path.to_path_buf(), result.clone());
    result
}

/// Probe a user-pinned executable; failures surface instead of degrading.
pub fn probe(family: CompilerFamily, path: &Path) -> Result<Arc<ToolchainDescriptor>, ToolchainError> {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    probe_cached(family, &path).ok_or_else(|| ToolchainError::Probe {
        path: path.clone(),
        message: "executable did not probe as a usable compiler".to_string(),
    })
}

fn run_probe(family: CompilerFamily, path: &Path) -> anyhow::Result<ToolchainDescriptor> {
    match family {
        CompilerFamily::Gcc => super::gcc::probe(path),
        CompilerFamily::Clang => super::clang::probe(path),
        // A pinned cl.exe runs in the inherited environment; discovery
        // proper goes through msvc::discover with a sourced one.
        CompilerFamily::Msvc => msvc::probe(path, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(windows))]
    fn test_msvc_discovery_is_empty_off_windows() {
        assert!(descriptors(CompilerFamily::Msvc).is_empty());
    }

    #[test]
    fn test_pinned_probe_failure_surfaces() {
        let missing = Path::new("/nonexistent/diagmat/cc-probe");
        let error = probe(CompilerFamily::Gcc, missing).unwrap_err();
        assert!(matches!(error, ToolchainError::Probe { .. }));
    }
}
