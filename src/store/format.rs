//! Archive format constants.

/// Magic bytes at the start of an archive file.
pub const ARCHIVE_MAGIC: &[u8; 5] = b"IDSAR";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the root group position in the header.
pub const ROOT_POS_OFFSET: usize = 8;

/// Current archive format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value once the archive has been completely written.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Frozen flag value while the archive is being written.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// MSB of a child position: set for data, clear for groups.
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

/// Mask to extract the actual position from a child pointer.
pub const OFFSET_MASK: u64 = !(1 << 63);

/// Dataset kind tags inside a data payload.
pub const KIND_FIXED: u8 = 1;
pub const KIND_VLEN: u8 = 2;

/// zlib level used for data payloads.
pub const COMPRESSION_LEVEL: u32 = 6;

#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) == 0
}

#[inline]
pub const fn is_data_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) != 0
}

#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & OFFSET_MASK
}

#[inline]
pub const fn make_group_offset(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

#[inline]
pub const fn make_data_offset(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets() {
        let group = make_group_offset(0x1234);
        assert!(is_group_offset(group));
        assert!(!is_data_offset(group));
        assert_eq!(extract_offset(group), 0x1234);

        let data = make_data_offset(0x5678);
        assert!(is_data_offset(data));
        assert_eq!(extract_offset(data), 0x5678);
        assert_eq!(data, 0x8000000000005678);
    }
}
