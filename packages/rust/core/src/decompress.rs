//! Gzip decompression of fetched objects.

use std::io::Read;

use flate2::read::MultiGzDecoder;

use markbatch_shared::{MarkbatchError, Result};

/// Decompress a gzip payload, reading every member of a multi-member stream.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MarkbatchError::Decompress(e.to_string()))?;
    Ok(out)
}
