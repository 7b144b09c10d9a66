//! Positioned archive output.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::store::format::{
    ARCHIVE_MAGIC, CURRENT_VERSION, FROZEN_FLAG, FROZEN_OFFSET, NOT_FROZEN_FLAG, ROOT_POS_OFFSET,
};
use crate::util::Result;

/// Buffered archive file writer that knows its current offset.
pub struct OStream {
    writer: BufWriter<File>,
    pos: u64,
}

impl OStream {
    /// Truncate `path` and write a header with no root and the frozen flag
    /// cleared.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        let mut out = Self { writer: BufWriter::with_capacity(256 * 1024, file), pos: 0 };
        out.write_bytes(ARCHIVE_MAGIC)?;
        out.writer.write_u8(NOT_FROZEN_FLAG)?;
        out.writer.write_u16::<LittleEndian>(CURRENT_VERSION)?;
        out.pos += 3;
        out.write_u64(0)?;
        Ok(out)
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.pos += 4;
        Ok(())
    }

    /// Point the header at the root group, mark the file frozen and sync.
    ///
    /// The flag goes last so a file cut short by a crash never reads as
    /// complete.
    pub fn finish(mut self, root_pos: u64) -> Result<()> {
        self.writer.seek(SeekFrom::Start(ROOT_POS_OFFSET as u64))?;
        self.writer.write_u64::<LittleEndian>(root_pos)?;
        self.writer.flush()?;
        self.writer.seek(SeekFrom::Start(FROZEN_OFFSET as u64))?;
        self.writer.write_u8(FROZEN_FLAG)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}
