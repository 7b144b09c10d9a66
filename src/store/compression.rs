//! Payload compression for archive data blocks.
//!
//! Data blocks above [`COMPRESS_THRESHOLD`] bytes are zlib-compressed. Every
//! payload starts with a flag byte so readers never have to guess.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Payloads smaller than this are stored raw.
pub const COMPRESS_THRESHOLD: usize = 256;

const RAW: u8 = 0;
const ZLIB: u8 = 1;

/// Upper bound accepted for a declared uncompressed size.
const MAX_UNCOMPRESSED: u64 = 1 << 32;

/// Encode a payload.
///
/// Format: `[flag: u8]` then either the raw bytes, or
/// `[uncompressed_size: u64 LE][zlib stream]`.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    if level > 0 && data.len() >= COMPRESS_THRESHOLD {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        // Only use compression if it actually saves space
        if compressed.len() + 8 < data.len() {
            let mut out = Vec::with_capacity(9 + compressed.len());
            out.push(ZLIB);
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(&compressed);
            return Ok(out);
        }
    }

    let mut out = Vec::with_capacity(1 + data.len());
    out.push(RAW);
    out.extend_from_slice(data);
    Ok(out)
}

/// Decode a payload written by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let (&flag, body) = data
        .split_first()
        .ok_or_else(|| Error::invalid("empty data block"))?;
    match flag {
        RAW => Ok(body.to_vec()),
        ZLIB => {
            if body.len() < 8 {
                return Err(Error::invalid("truncated compressed block"));
            }
            let mut size = [0u8; 8];
            size.copy_from_slice(&body[..8]);
            let size = u64::from_le_bytes(size);
            if size > MAX_UNCOMPRESSED {
                return Err(Error::Allocation(format!("compressed block claims {} bytes", size)));
            }
            let mut out = Vec::with_capacity(size as usize);
            ZlibDecoder::new(&body[8..]).read_to_end(&mut out)?;
            if out.len() as u64 != size {
                return Err(Error::invalid(format!(
                    "compressed block inflated to {} bytes, expected {}",
                    out.len(),
                    size
                )));
            }
            Ok(out)
        }
        other => Err(Error::invalid(format!("unknown block encoding {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let original = b"equilibrium/time_slice/profiles_1d ".repeat(100);
        let compressed = compress(&original, 6).unwrap();
        assert_eq!(compressed[0], ZLIB);
        assert!(compressed.len() < original.len());
        assert_eq!(decompress(&compressed).unwrap(), original);
    }

    #[test]
    fn test_small_payload_stays_raw() {
        let original = b"Short data";
        let encoded = compress(original, 9).unwrap();
        assert_eq!(encoded[0], RAW);
        assert_eq!(&encoded[1..], original);
        assert_eq!(decompress(&encoded).unwrap(), original);
    }

    #[test]
    fn test_level_zero() {
        let original = vec![7u8; 4096];
        assert_eq!(compress(&original, 0).unwrap()[0], RAW);
    }

    #[test]
    fn test_corrupt_block() {
        assert!(decompress(&[]).is_err());
        assert!(decompress(&[ZLIB, 1, 2]).is_err());
        assert!(decompress(&[9, 0]).is_err());
    }

    #[test]
    fn test_oversized_claim() {
        let mut block = vec![ZLIB];
        block.extend_from_slice(&(MAX_UNCOMPRESSED + 1).to_le_bytes());
        assert!(matches!(decompress(&block), Err(Error::Allocation(_))));
    }
}
