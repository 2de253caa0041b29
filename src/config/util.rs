//! Configuration utility functions.

use std::path::{Path, PathBuf};

/// Find config file by searching upward from `start`
///
/// ```text
/// /home/user/app/src/routes/   ← start
/// /home/user/app/bunpack.toml  ← found
/// ```
pub fn find_config_file(config_name: &Path, start: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    start
        .ancestors()
        .map(|dir| dir.join(config_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_walks_upward() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("src/routes");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("bunpack.toml"), "").unwrap();

        let found = find_config_file(Path::new("bunpack.toml"), &nested).unwrap();
        assert_eq!(found, dir.path().join("bunpack.toml"));
    }

    #[test]
    fn test_find_config_absolute_missing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert_eq!(find_config_file(&missing, dir.path()), None);
    }
}
