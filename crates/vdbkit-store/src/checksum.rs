use crate::StoreError;
use std::fs::File;
use std::io;
use std::path::Path;

/// Hex blake3 digest of `data`.
pub fn checksum(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Hex blake3 digest of a file, streamed.
pub fn checksum_file(path: &Path) -> Result<String, StoreError> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
