//! Bytecode command model, header, and known-script registry (component E).

pub mod asm;
pub mod disasm;
pub mod handlers;

pub use asm::{assemble, Arg, Statement};
pub use disasm::disassemble;

use crate::error::{Error, Result};
use crate::rom;

/// One past the largest valid opcode.
pub const OP_MAX: u16 = 118;

/// A 4-byte packed command record: `op` in the low 12 bits, `arg` in the high 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub op: u16,
    pub arg: u32,
}

impl Command {
    pub fn unpack(ival: u32) -> Command {
        Command { op: (ival & 0x0FFF) as u16, arg: ival >> 12 }
    }

    pub fn pack(&self) -> u32 {
        (self.arg << 12) | (self.op as u32 & 0x0FFF)
    }

    /// Number of 16-bit inline argument words following this command's record.
    pub fn arg_words(&self) -> u32 {
        self.arg
    }

    /// Total on-disk size of this command, record plus arg block.
    pub fn record_len(&self) -> u32 {
        4 + 2 * self.arg
    }
}

pub fn is_jump(op: u16) -> bool {
    op == 1
}

pub fn is_branch(op: u16) -> bool {
    (4..=6).contains(&op)
}

pub fn can_be_branched_to(op: u16) -> bool {
    (5..=7).contains(&op)
}

pub fn uses_menu_strtab(op: u16) -> bool {
    op == 0x11 || op == 0x35
}

pub fn uses_script_strtab(op: u16) -> bool {
    op == 0x0C
}

pub fn is_choice_idx(op: u16) -> bool {
    op == 0x35
}

pub fn is_nop(op: u16) -> bool {
    op == 0x00 || op == 0x07
}

/// 6-byte little-endian script header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptHeader {
    pub branch_info_offs: u16,
    pub branch_info_sz: u16,
    pub bytes_to_end: u16,
}

pub const SCRIPT_HEADER_SIZE: u32 = 6;

impl ScriptHeader {
    pub fn read(buf: &[u8]) -> Result<ScriptHeader> {
        Ok(ScriptHeader {
            branch_info_offs: rom::read_u16(buf, 0)?,
            branch_info_sz: rom::read_u16(buf, 2)?,
            bytes_to_end: rom::read_u16(buf, 4)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.branch_info_offs.to_le_bytes());
        out.extend_from_slice(&self.branch_info_sz.to_le_bytes());
        out.extend_from_slice(&self.bytes_to_end.to_le_bytes());
    }

    pub fn total_size(&self) -> u32 {
        self.branch_info_offs as u32 + self.branch_info_sz as u32 + self.bytes_to_end as u32
    }
}

/// Returns the `w`-th (1-indexed) 16-bit inline argument word for a command
/// whose arg block starts at `args`. `high` is the command's `arg >> 16`
/// nibble; per the original interpreter this selects a reserved indirection
/// path that has never been observed in practice (see Design Notes).
pub fn next_cmd_arg(high: u16, w: u16, args: &[u8]) -> Result<u16> {
    if w == 0 {
        return Err(Error::InvalidArgument("cmd arg index is 1-based".into()));
    }
    if w <= 16 && high & (0x8000u16 >> (w - 1)) != 0 {
        return Err(Error::InvalidArgument(
            "reserved indirect cmd-arg path is not supported".into(),
        ));
    }
    let off = 2 * (w as usize - 1);
    let bytes = args
        .get(off..off + 2)
        .ok_or_else(|| Error::OutOfBounds { offset: off as u64, size: args.len() as u64 })?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// A known script, named so the CLI doesn't require explicit VMAs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub name: &'static str,
    pub vma: u32,
    pub strtab_vma: u32,
    pub size: usize,
    pub checksum: u16,
}

/// Built-in registry, seeded from the original tool's own static script table.
/// `checksum` is carried as documentation only; it is never verified at
/// runtime (the per-script checksum check is out of scope — see DESIGN.md).
pub const KNOWN_SCRIPTS: &[ScriptDescriptor] = &[ScriptDescriptor {
    name: "Harry",
    vma: 0x0823_16DC,
    strtab_vma: 0x0853_E908,
    size: 0xd3e4,
    checksum: 0xba64,
}];

/// Prefix-matches `name` against [`KNOWN_SCRIPTS`], mirroring the original's
/// `strncmp(name, scripts[i].name, strlen(scripts[i].name))` lookup.
pub fn script_by_name(name: &str) -> Option<&'static ScriptDescriptor> {
    KNOWN_SCRIPTS.iter().find(|d| name.starts_with(d.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips() {
        let cmd = Command { op: 0x0C, arg: 1 };
        assert_eq!(Command::unpack(cmd.pack()), cmd);
    }

    #[test]
    fn classification_predicates() {
        assert!(is_jump(1));
        assert!(is_branch(4) && is_branch(5) && is_branch(6));
        assert!(!is_branch(7));
        assert!(can_be_branched_to(5) && can_be_branched_to(6) && can_be_branched_to(7));
        assert!(!can_be_branched_to(4));
        assert!(uses_menu_strtab(0x11) && uses_menu_strtab(0x35));
        assert!(uses_script_strtab(0x0C));
        assert!(is_choice_idx(0x35) && !is_choice_idx(0x11));
        assert!(is_nop(0) && is_nop(7) && !is_nop(1));
    }

    #[test]
    fn header_round_trips() {
        let hdr = ScriptHeader { branch_info_offs: 6, branch_info_sz: 0, bytes_to_end: 10 };
        let mut buf = Vec::new();
        hdr.write(&mut buf);
        assert_eq!(ScriptHeader::read(&buf).unwrap(), hdr);
        assert_eq!(hdr.total_size(), 16);
    }

    #[test]
    fn script_by_name_prefix_matches() {
        assert_eq!(script_by_name("Harry").unwrap().vma, 0x0823_16DC);
        assert_eq!(script_by_name("HarryChapter2").unwrap().name, "Harry");
        assert!(script_by_name("Unknown").is_none());
    }

    #[test]
    fn next_cmd_arg_reads_le_word() {
        let args = [0x34, 0x12, 0x00, 0x00];
        assert_eq!(next_cmd_arg(0, 1, &args).unwrap(), 0x1234);
    }
}
