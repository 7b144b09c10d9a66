//! Archive file reader.
//!
//! Files are memory-mapped and decoded into an in-memory [`GroupNode`]
//! tree in one pass; the map is dropped afterwards so the file can be
//! rewritten on flush.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use super::compression::decompress;
use super::format::*;
use super::node::{Dataset, GroupNode, Node};
use crate::util::{Error, Result};

/// Nesting limit when walking group records.
const MAX_DEPTH: usize = 256;

/// Read-only view over an archive file.
pub struct IStreams {
    mmap: Mmap,
    version: u16,
    frozen: bool,
}

impl IStreams {
    /// Open a file for reading with memory mapping.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        // Safety: the file is opened read-only and the map is dropped before
        // the archive is ever rewritten by this process.
        let mmap = unsafe { Mmap::map(&file) }?;
        let (version, frozen) = Self::parse_header(&mmap)?;
        Ok(Self { mmap, version, frozen })
    }

    /// Parse and validate the archive header.
    fn parse_header(data: &[u8]) -> Result<(u16, bool)> {
        if data.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof(data.len() as u64));
        }
        if &data[0..5] != ARCHIVE_MAGIC {
            return Err(Error::InvalidMagic);
        }
        let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;
        let version = u16::from_le_bytes([data[VERSION_OFFSET], data[VERSION_OFFSET + 1]]);
        if version > CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok((version, frozen))
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Root group position from the header.
    pub fn root_pos(&self) -> Result<u64> {
        self.read_u64(ROOT_POS_OFFSET as u64)
    }

    /// Borrow `len` bytes at `pos`.
    pub fn slice(&self, pos: u64, len: u64) -> Result<&[u8]> {
        let end = pos.checked_add(len).ok_or(Error::UnexpectedEof(u64::MAX))?;
        if end > self.size() {
            return Err(Error::UnexpectedEof(end));
        }
        Ok(&self.mmap[pos as usize..end as usize])
    }

    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.slice(pos, 8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_u32(&self, pos: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.slice(pos, 4)?);
        Ok(u32::from_le_bytes(buf))
    }

    /// Decode the whole group tree.
    pub fn load_tree(&self) -> Result<GroupNode> {
        if !self.frozen {
            return Err(Error::invalid("archive was not closed cleanly"));
        }
        self.read_group(self.root_pos()?, 0)
    }

    fn read_group(&self, pos: u64, depth: usize) -> Result<GroupNode> {
        if depth > MAX_DEPTH {
            return Err(Error::invalid("group nesting too deep"));
        }
        if pos < HEADER_SIZE as u64 {
            return Err(Error::invalid(format!("group position {} inside header", pos)));
        }

        let count = self.read_u64(pos)?;
        let mut cursor = pos + 8;
        let mut group = GroupNode::default();
        for _ in 0..count {
            let name_len = self.read_u32(cursor)? as u64;
            cursor += 4;
            let name = String::from_utf8(self.slice(cursor, name_len)?.to_vec())?;
            cursor += name_len;
            let child = self.read_u64(cursor)?;
            cursor += 8;

            let child_pos = extract_offset(child);
            let node = if is_data_offset(child) {
                Node::Data(self.read_data(child_pos)?)
            } else {
                Node::Group(self.read_group(child_pos, depth + 1)?)
            };
            if group.children.insert(name.clone(), node).is_some() {
                return Err(Error::invalid(format!("duplicate link {:?}", name)));
            }
        }
        Ok(group)
    }

    fn read_data(&self, pos: u64) -> Result<Dataset> {
        let size = self.read_u64(pos)?;
        let payload = decompress(self.slice(pos + 8, size)?)?;
        Dataset::decode(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parsing() {
        let mut header = [0u8; 16];
        header[0..5].copy_from_slice(ARCHIVE_MAGIC);
        header[FROZEN_OFFSET] = FROZEN_FLAG;
        header[VERSION_OFFSET] = 1;

        let (version, frozen) = IStreams::parse_header(&header).unwrap();
        assert_eq!(version, 1);
        assert!(frozen);
    }

    #[test]
    fn test_invalid_magic() {
        let header = [0u8; 16];
        assert!(matches!(IStreams::parse_header(&header), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_future_version() {
        let mut header = [0u8; 16];
        header[0..5].copy_from_slice(ARCHIVE_MAGIC);
        header[VERSION_OFFSET] = 9;
        assert!(matches!(IStreams::parse_header(&header), Err(Error::UnsupportedVersion(9))));
    }
}
