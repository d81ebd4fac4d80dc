// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A file that could not be read whole into memory.
#[derive(Debug, thiserror::Error)]
#[error("failed to read {}: {source}", path.display())]
pub struct LoadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Reads a binary resource (compiled shaders, mostly) into memory.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>, LoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| LoadError {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}
