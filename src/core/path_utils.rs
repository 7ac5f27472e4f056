/*
 * This module provides utility functions for locating the application's platform
 * directories: the local configuration directory (store settings) and the local data
 * directory under which profile documents live by default. Every getter makes sure the
 * directory exists before handing it out.
 */
use super::profiles::PROFILES_SUBFOLDER_NAME;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/*
 * Ensures `path` exists as a directory, creating missing parents.
 * Returns `None` (after logging) if it cannot be created.
 */
pub fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        log::trace!("PathUtils: Directory already exists: {path:?}");
        return Some(path.to_path_buf());
    }
    if let Err(e) = fs::create_dir_all(path) {
        log::error!("PathUtils: Failed to create directory {path:?}: {e}");
        return None;
    }
    log::debug!("PathUtils: Created directory: {path:?}");
    Some(path.to_path_buf())
}

/*
 * Retrieves the application's local (non-roaming) configuration directory, derived
 * without an organization qualifier (e.g. AppData/Local/<app> on Windows,
 * ~/.config/<app> on Linux).
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Resolving base app config local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| ensure_dir(proj_dirs.config_local_dir()))
}

pub fn get_base_app_data_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Resolving base app data local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| ensure_dir(proj_dirs.data_local_dir()))
}

pub fn profiles_dir_under(base: &Path) -> PathBuf {
    base.join(PROFILES_SUBFOLDER_NAME)
}

/// Default profiles directory: `<local data dir>/profiles`.
pub fn get_default_profiles_dir(app_name: &str) -> Option<PathBuf> {
    let base = get_base_app_data_local_dir(app_name)?;
    ensure_dir(&profiles_dir_under(&base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir_creates_nested_directories() {
        // Arrange
        let temp = tempdir().unwrap();
        let nested = temp.path().join("a").join("b");

        // Act
        let created = ensure_dir(&nested);

        // Assert
        assert_eq!(created, Some(nested.clone()));
        assert!(nested.is_dir());
        assert_eq!(ensure_dir(&nested), Some(nested));
    }

    #[test]
    fn test_ensure_dir_fails_when_a_file_is_in_the_way() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"not a dir").unwrap();

        assert!(ensure_dir(&blocker.join("child")).is_none());
    }

    #[test]
    fn test_profiles_dir_under_appends_subfolder() {
        let base = PathBuf::from("/data/app");
        assert_eq!(
            profiles_dir_under(&base),
            PathBuf::from("/data/app/profiles")
        );
    }
}
