//! Loads passwords referenced by `basic.auth.password.path` and
//! `proxy.basic.auth.password.path`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Unable to read credential file {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read the secret stored in `path`.
///
/// The file holds the password alone. A single trailing line ending is
/// dropped so files written by editors or `echo` work unchanged.
pub fn read_password(path: impl AsRef<Path>) -> Result<String, CredentialError> {
    let path = path.as_ref();
    let mut secret = fs::read_to_string(path).map_err(|source| CredentialError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    if secret.ends_with('\n') {
        secret.pop();
        if secret.ends_with('\r') {
            secret.pop();
        }
    }
    Ok(secret)
}
