//! PATH walking for compiler candidates.

use std::path::PathBuf;

use regex::Regex;

/// Find executables on PATH whose file name matches `query`.
///
/// Every PATH entry is listed in order; matches are resolved to their real
/// path so that symlinked spellings (`cc -> gcc`) collapse to a single
/// candidate. Order of first appearance is preserved.
pub fn find_executables(query: &Regex) -> Vec<PathBuf> {
    let env_path = std::env::var_os("PATH").unwrap_or_default();
    let mut found = Vec::new();

    for dir in std::env::split_paths(&env_path) {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !query.is_match(name) {
                continue;
            }

            let path = entry.path();
            let resolved = path.canonicalize().unwrap_or(path);
            if !found.contains(&resolved) {
                found.push(resolved);
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    // PATH is process-global, so both scenarios run in one test to avoid
    // racing a parallel test over the variable.
    #[test]
    fn test_path_walk() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("gcc-13");
        std::fs::write(&real, "").unwrap();

        #[cfg(unix)]
        std::os::unix::fs::symlink(&real, tmp.path().join("gcc")).unwrap();

        let saved = std::env::var_os("PATH");
        let query = Regex::new(r"^gcc(-\d+)?(\.exe)?$").unwrap();

        // Symlinked spellings collapse to one candidate.
        std::env::set_var("PATH", tmp.path());
        let found = find_executables(&query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], real.canonicalize().unwrap());

        // Missing PATH entries are skipped without error.
        std::env::set_var("PATH", "/nonexistent-diagmat-test-dir");
        assert!(find_executables(&query).is_empty());

        match saved {
            Some(path) => std::env::set_var("PATH", path),
            None => std::env::remove_var("PATH"),
        }
    }
}
