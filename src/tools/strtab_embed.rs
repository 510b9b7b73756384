use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use vnpatch::embed::{embed_strtab, IdentityTranscoder, StrtabKind};
use vnpatch::rom;

pub fn strtab_embed(rom_path: &PathBuf, strtab_vma: u32, input: &PathBuf, size: u32, kind: StrtabKind, out: &PathBuf) -> Result<()> {
    let mut rom_bytes = fs::read(rom_path).with_context(|| format!("reading ROM {}", rom_path.display()))?;
    let index_file = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;

    let encoded = embed_strtab(&index_file, kind, size as usize, &IdentityTranscoder)?;
    let offset = rom::vma_to_offset(strtab_vma)? as usize;
    rom_bytes[offset..offset + encoded.len()].copy_from_slice(&encoded);

    fs::write(out, rom_bytes).with_context(|| format!("writing {}", out.display()))
}
