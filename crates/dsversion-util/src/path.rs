//! Path utilities.

use std::path::{Path, PathBuf};

/// Get the dsversion data directory.
///
/// The JSON version table lives here unless configured otherwise.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("dsversion"))
}

/// Find a config file in `dir`, preferring `dsversion.jsonc` over `dsversion.json`.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    ["dsversion.jsonc", "dsversion.json"]
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_find_config_file_prefers_jsonc() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("dsversion.json"), "{}").unwrap();
        assert_eq!(
            find_config_file(dir.path()),
            Some(dir.path().join("dsversion.json"))
        );

        std::fs::write(dir.path().join("dsversion.jsonc"), "{}").unwrap();
        assert_eq!(
            find_config_file(dir.path()),
            Some(dir.path().join("dsversion.jsonc"))
        );
    }

    #[test]
    fn test_find_config_file_missing() {
        let dir = tempdir().unwrap();
        assert!(find_config_file(dir.path()).is_none());
    }
}
