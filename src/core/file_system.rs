/*
 * Low-level file operations for the profiles directory. These functions block and are
 * meant to run inside jobs on the profile `IoExecutor`, never on the owner thread.
 *
 * Writes go through a sibling temporary file that is renamed over the target once the
 * bytes are flushed and synced, so a crash mid-write leaves either the old document or
 * the new one on disk, never a truncated mix.
 */
use super::io_executor::CancellationToken;
use super::profiles::{PROFILE_FILE_EXTENSION, ProfileError, Result};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const TEMP_FILE_SUFFIX: &str = ".tmp";

pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    file_name.push(TEMP_FILE_SUFFIX);
    path.with_file_name(file_name)
}

/*
 * Writes `bytes` to `path` via a temporary sibling and an atomic rename.
 * `cancel` is honoured before the temporary file is opened and again before it is
 * committed; a cancelled write removes its temporary file and leaves `path` untouched.
 */
pub fn write_file_atomically(path: &Path, bytes: &[u8], cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        log::debug!("FileSystem: Write of {path:?} cancelled before opening.");
        return Err(ProfileError::Cancelled);
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path);
    let write_result = write_and_sync(&temp_path, bytes, cancel);
    if let Err(e) = write_result {
        if let Err(cleanup_err) = fs::remove_file(&temp_path)
            && cleanup_err.kind() != io::ErrorKind::NotFound
        {
            log::warn!("FileSystem: Failed to remove temporary file {temp_path:?}: {cleanup_err}");
        }
        return Err(e);
    }

    fs::rename(&temp_path, path)?;
    log::trace!("FileSystem: Wrote {} bytes to {path:?}.", bytes.len());
    Ok(())
}

// The file handle is closed when this returns, whatever the outcome.
fn write_and_sync(temp_path: &Path, bytes: &[u8], cancel: &CancellationToken) -> Result<()> {
    let file = File::create(temp_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    if cancel.is_cancelled() {
        log::debug!("FileSystem: Write of {temp_path:?} cancelled before commit.");
        return Err(ProfileError::Cancelled);
    }
    Ok(())
}

/*
 * Removes `path`. A missing file is not an error; returns whether a file was removed.
 */
pub fn delete_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/*
 * Reads every `*.json` file directly inside `dir`, sorted by path. A missing directory
 * yields an empty list. Per-file read failures are returned alongside the path so the
 * caller can decide how to report them.
 */
pub fn read_profile_files(dir: &Path) -> io::Result<Vec<(PathBuf, io::Result<Vec<u8>>)>> {
    if !dir.exists() {
        log::debug!("FileSystem: Profiles directory {dir:?} does not exist yet.");
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry_result in fs::read_dir(dir)? {
        let entry = entry_result?;
        let path = entry.path();
        if path.is_file()
            && let Some(ext) = path.extension()
            && ext == PROFILE_FILE_EXTENSION
        {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let contents = fs::read(&path);
            (path, contents)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_file_atomically_creates_parent_and_leaves_no_temp() {
        // Arrange
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("abc.json");

        // Act
        write_file_atomically(&target, b"{\"id\":\"abc\"}", &CancellationToken::new()).unwrap();

        // Assert
        assert_eq!(fs::read(&target).unwrap(), b"{\"id\":\"abc\"}");
        assert!(!temp_path_for(&target).exists());
    }

    #[test]
    fn test_write_file_atomically_replaces_existing_content() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("abc.json");
        fs::write(&target, b"old content that is longer").unwrap();

        write_file_atomically(&target, b"new", &CancellationToken::new()).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn test_cancelled_write_does_not_touch_filesystem() {
        // Arrange
        let dir = tempdir().unwrap();
        let target = dir.path().join("sub").join("abc.json");
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Act
        let result = write_file_atomically(&target, b"data", &cancel);

        // Assert
        assert!(matches!(result, Err(ProfileError::Cancelled)));
        assert!(!target.exists());
        assert!(!dir.path().join("sub").exists());
    }

    #[test]
    fn test_delete_file_if_exists() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("gone.json");
        fs::write(&target, b"{}").unwrap();

        assert!(delete_file_if_exists(&target).unwrap());
        assert!(!target.exists());
        assert!(!delete_file_if_exists(&target).unwrap());
    }

    #[test]
    fn test_read_profile_files_filters_and_sorts() {
        // Arrange
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.json"), b"B").unwrap();
        fs::write(dir.path().join("a.json"), b"A").unwrap();
        fs::write(dir.path().join("c.json.tmp"), b"partial").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        fs::create_dir(dir.path().join("d.json")).unwrap();

        // Act
        let files = read_profile_files(dir.path()).unwrap();

        // Assert
        let names: Vec<String> = files
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
        assert_eq!(files[0].1.as_ref().unwrap(), b"A");
    }

    #[test]
    fn test_read_profile_files_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let files = read_profile_files(&dir.path().join("missing")).unwrap();
        assert!(files.is_empty());
    }
}
