//! Content digest of model files.

use std::fs::File;
use std::io;
use std::path::Path;

use crate::util::{Error, Result};

/// Number of digest bytes kept (128 bits).
const DIGEST_BYTES: usize = 16;

/// Hex digest (32 lowercase digits) of a file's contents.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;

    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(to_hex(&hasher.finalize().as_bytes()[..DIGEST_BYTES]))
}

/// Hex digest of an in-memory buffer.
pub fn bytes_digest(data: &[u8]) -> String {
    to_hex(&blake3::hash(data).as_bytes()[..DIGEST_BYTES])
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
