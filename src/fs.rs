//! Owner-only, crash-safe persistence for small TOML records.
//!
//! Every file spotctl writes holds something sensitive (client secret,
//! tokens, the pending OAuth nonce), so all of them go through here:
//!
//! * the containing directory is created with mode `0700`
//! * the file is written to a temporary sibling with mode `0600`, synced and
//!   then renamed over the target, so readers see either the old or the new
//!   record and never a torn one
//!
//! Concurrent writers race benignly: the last rename wins.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

/// Records are tiny; anything larger is not ours.
const MAX_FILE_SIZE: u64 = 64 * 1024;

/// Creates `dir` and its parents, restricting `dir` itself to its owner.
pub fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

/// Reads and parses a TOML record.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_toml<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    // Prevent out-of-memory condition: records should be small.
    match fs::metadata(path) {
        Ok(attributes) if attributes.len() > MAX_FILE_SIZE => {
            return Err(Error::invalid_data(format!(
                "{} is too large",
                path.display()
            )));
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let contents = fs::read_to_string(path)?;
    let record = toml::from_str(&contents).map_err(|e| {
        Error::invalid_data(format!("{} format is invalid: {e}", path.display()))
    })?;

    Ok(Some(record))
}

/// Serializes `record` as TOML and atomically replaces `path` with it.
pub fn write_toml<T>(path: &Path, record: &T) -> Result<()>
where
    T: Serialize,
{
    let contents = toml::to_string(record)?;
    write_atomic(path, contents.as_bytes())
}

/// Atomically replaces `path` with `contents`, owner-only.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::internal(format!("{} has no parent", path.display())))?;
    create_private_dir(dir)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::internal(format!("{} has no file name", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = dir.join(tmp_name);

    let result = (|| {
        let mut file = open_private(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        // Best effort: do not leave a stray copy of a secret behind.
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Removes `path`, treating an already missing file as success.
///
/// Returns whether a file was removed.
pub fn remove(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
