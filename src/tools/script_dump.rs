use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use vnpatch::rom;
use vnpatch::script::{disassemble, ScriptHeader, SCRIPT_HEADER_SIZE};

use crate::ResolvedScript;

pub fn script_dump(rom_path: &PathBuf, resolved: &ResolvedScript, out: &Option<PathBuf>) -> Result<()> {
    let rom_bytes = fs::read(rom_path).with_context(|| format!("reading ROM {}", rom_path.display()))?;

    let script_offset = rom::vma_to_offset(resolved.script_vma)?;
    let hdr_bytes = rom::slice(&rom_bytes, script_offset, SCRIPT_HEADER_SIZE as usize)?;
    let header = ScriptHeader::read(hdr_bytes)?;
    let total = SCRIPT_HEADER_SIZE + header.total_size();
    let script_bytes = rom::slice(&rom_bytes, script_offset, total as usize)?;
    let cmds = &script_bytes[SCRIPT_HEADER_SIZE as usize..(SCRIPT_HEADER_SIZE + header.branch_info_offs as u32) as usize];

    let strtab_script_offset = rom::vma_to_offset(resolved.strtab_script_vma)?;
    let strtab_menu_offset = rom::vma_to_offset(resolved.strtab_menu_vma)?;
    let strtab_script = &rom_bytes[strtab_script_offset as usize..];
    let strtab_menu = &rom_bytes[strtab_menu_offset as usize..];

    let disasm = disassemble(cmds, Some(strtab_script), Some(strtab_menu))?;

    match out {
        Some(path) => fs::write(path, disasm.text).with_context(|| format!("writing {}", path.display())),
        None => {
            print!("{}", disasm.text);
            Ok(())
        }
    }
}
