//! VMA/file-offset conversion and whole-image checks for the ROM byte buffer.

use crate::error::{Error, Result};

/// Base virtual address the target executable is linked at.
pub const ROM_BASE: u32 = 0x0800_0000;
/// Largest file offset a VMA in this address space can map to.
pub const ROM_MAX_OFFSET: u32 = 0x01FF_FFFF;

/// Known-stock CRC-32 of the unmodified ROM image; mismatch is warning-only (§6).
pub const EXPECTED_ROM_CRC32: u32 = 0x318A_1E9B;

/// Converts a virtual address to a file offset, validating it falls within the
/// addressable window `[ROM_BASE, ROM_BASE + ROM_MAX_OFFSET]`.
pub fn vma_to_offset(vma: u32) -> Result<u32> {
    let offset = vma
        .checked_sub(ROM_BASE)
        .ok_or_else(|| Error::InvalidArgument(format!("vma {vma:#x} precedes ROM_BASE")))?;
    if offset > ROM_MAX_OFFSET {
        return Err(Error::InvalidArgument(format!(
            "vma {vma:#x} is outside the addressable ROM window"
        )));
    }
    Ok(offset)
}

/// Inverse of [`vma_to_offset`].
pub fn offset_to_vma(offset: u32) -> Result<u32> {
    if offset > ROM_MAX_OFFSET {
        return Err(Error::InvalidArgument(format!(
            "offset {offset:#x} is outside the addressable ROM window"
        )));
    }
    Ok(ROM_BASE + offset)
}

/// Returns `rom[offset..offset+len]`, failing with `OutOfBounds` rather than panicking.
pub fn slice(rom: &[u8], offset: u32, len: usize) -> Result<&[u8]> {
    let offset = offset as usize;
    let end = offset
        .checked_add(len)
        .ok_or(Error::OutOfBounds { offset: offset as u64, size: rom.len() as u64 })?;
    rom.get(offset..end)
        .ok_or(Error::OutOfBounds { offset: offset as u64, size: rom.len() as u64 })
}

/// Reads a little-endian `u32` at `offset`, explicitly field-by-field rather
/// than overlaying a packed struct on the buffer.
pub fn read_u32(rom: &[u8], offset: u32) -> Result<u32> {
    let bytes = slice(rom, offset, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Reads a little-endian `u16` at `offset`.
pub fn read_u16(rom: &[u8], offset: u32) -> Result<u16> {
    let bytes = slice(rom, offset, 2)?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

/// Overwrites the little-endian `u32` at `offset`. Used to patch pointer/size
/// fields during embedding (§4.H).
pub fn patch_u32(rom: &mut [u8], offset: u32, value: u32) -> Result<()> {
    let offset = offset as usize;
    let rom_len = rom.len() as u64;
    let dst = rom
        .get_mut(offset..offset + 4)
        .ok_or(Error::OutOfBounds { offset: offset as u64, size: rom_len })?;
    dst.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Computes the CRC-32 of the whole image and compares it to [`EXPECTED_ROM_CRC32`].
/// Returns `true` when the ROM matches the known-stock checksum; a mismatch is
/// reported by the caller as a warning, never as a hard failure.
pub fn matches_stock_checksum(rom: &[u8]) -> bool {
    let mut crc = flate2::Crc::new();
    crc.update(rom);
    crc.sum() == EXPECTED_ROM_CRC32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vma_round_trips_through_offset() {
        let vma = 0x0823_16DC;
        let offset = vma_to_offset(vma).unwrap();
        assert_eq!(offset, 0x0023_16DC);
        assert_eq!(offset_to_vma(offset).unwrap(), vma);
    }

    #[test]
    fn vma_below_base_is_rejected() {
        assert!(vma_to_offset(0x0100_0000).is_err());
    }

    #[test]
    fn vma_past_window_is_rejected() {
        assert!(vma_to_offset(ROM_BASE + ROM_MAX_OFFSET + 1).is_err());
    }

    #[test]
    fn patch_u32_round_trips() {
        let mut rom = vec![0u8; 8];
        patch_u32(&mut rom, 2, 0xDEAD_BEEF).unwrap();
        assert_eq!(read_u32(&rom, 2).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn checksum_mismatch_on_empty_buffer() {
        assert!(!matches_stock_checksum(&[]));
    }
}
