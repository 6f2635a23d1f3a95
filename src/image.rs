//! Loading and storing raw flash images.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::protocol::valid_size;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("error accessing {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid file size {0} B: must be a non-zero multiple of 16 B no larger than 8 MiB")]
    InvalidSize(usize),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ImageError + '_ {
    move |source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Load an image, checking the size before reading the contents
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, ImageError> {
    let path = path.as_ref();

    let len = fs::metadata(path).map_err(io_err(path))?.len() as usize;
    if !valid_size(len) {
        return Err(ImageError::InvalidSize(len));
    }

    let data = fs::read(path).map_err(io_err(path))?;
    if data.len() != len {
        return Err(ImageError::InvalidSize(data.len()));
    }

    debug!("Loaded {} bytes from {}", data.len(), path.display());

    Ok(data)
}

/// Store an image, replacing any existing file
pub fn store<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<(), ImageError> {
    let path = path.as_ref();

    fs::write(path, data).map_err(io_err(path))?;

    debug!("Stored {} bytes to {}", data.len(), path.display());

    Ok(())
}
