//! Durable credential storage
//!
//! The credential file is a JSON object mapping resource server identifiers
//! to token records. Writes go to a sibling temp file which is then renamed
//! over the target, so readers only ever see the old or the new content.
//! Only one writer process per file is supported.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::tokens::CredentialSet;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential file {} not found; run 'gxfer login' to authorize", .0.display())]
    NotFound(PathBuf),

    #[error(
        "credential file {} is corrupt ({source}); delete it and run 'gxfer login' to re-authorize",
        .path.display()
    )]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on credential file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read and parse the credential file. Never creates or modifies anything.
pub fn load(path: &Path) -> Result<CredentialSet, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let credentials: CredentialSet =
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!(
        "Loaded {} credential record(s) from {}",
        credentials.len(),
        path.display()
    );
    Ok(credentials)
}

/// Replace the credential file with `credentials`.
pub fn save(path: &Path, credentials: &CredentialSet) -> Result<(), StoreError> {
    let tmp_path = stage(path, credentials)?;
    commit(&tmp_path, path)?;

    tracing::debug!(
        "Saved {} credential record(s) to {}",
        credentials.len(),
        path.display()
    );
    Ok(())
}

/// Remove the credential file. Missing file is not an error.
pub fn remove(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Write the new content to a private temp file next to `path`.
/// The target itself is untouched until [`commit`].
fn stage(path: &Path, credentials: &CredentialSet) -> Result<PathBuf, StoreError> {
    let content = serde_json::to_vec_pretty(credentials).map_err(|e| {
        StoreError::io(path, io::Error::new(io::ErrorKind::InvalidData, e))
    })?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

    let tmp_path = temp_path_for(path, &dir);
    if let Err(e) = write_private(&tmp_path, &content) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(path, e));
    }
    Ok(tmp_path)
}

fn commit(tmp_path: &Path, path: &Path) -> Result<(), StoreError> {
    if let Err(e) = fs::rename(tmp_path, path) {
        let _ = fs::remove_file(tmp_path);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

fn temp_path_for(path: &Path, dir: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials".to_string());
    dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Write `content` to a fresh file readable only by the owner, flushed to disk.
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}
