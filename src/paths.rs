use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// How many ancestors of the executable directory are searched for the resource folder.
const RESOURCE_SEARCH_DEPTH: usize = 3;

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the directory for captures saved on recognition misses: `<exe_dir>/captures/`
pub fn get_captures_dir() -> PathBuf {
    get_exe_dir().join("captures")
}

/// Returns the config file path: `<exe_dir>/config.json`
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Returns the template resource root for the executable.
pub fn get_resource_root(resource_dir: &str) -> PathBuf {
    find_resource_root(get_exe_dir(), resource_dir)
}

/// Walks up from `start` looking for a directory named `resource_dir`.
///
/// Development builds run from `target/<profile>/`, so the resource folder
/// usually lives a few levels above the executable. Falls back to
/// `<start>/<resource_dir>` when nothing is found.
pub fn find_resource_root(start: &Path, resource_dir: &str) -> PathBuf {
    let mut current = Some(start);
    for _ in 0..RESOURCE_SEARCH_DEPTH {
        let Some(dir) = current else { break };
        let candidate = dir.join(resource_dir);
        if candidate.is_dir() {
            return candidate;
        }
        current = dir.parent();
    }
    start.join(resource_dir)
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_captures_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_root_found_in_ancestor() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("Res")).unwrap();
        let exe_dir = root.path().join("target").join("debug");
        std::fs::create_dir_all(&exe_dir).unwrap();

        assert_eq!(find_resource_root(&exe_dir, "Res"), root.path().join("Res"));
    }

    #[test]
    fn test_resource_root_falls_back_to_start() {
        let root = tempfile::tempdir().unwrap();
        let exe_dir = root.path().join("a").join("b").join("c").join("d");
        std::fs::create_dir_all(&exe_dir).unwrap();
        // Beyond the search depth
        std::fs::create_dir(root.path().join("Res")).unwrap();

        assert_eq!(find_resource_root(&exe_dir, "Res"), exe_dir.join("Res"));
    }
}
