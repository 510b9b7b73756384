use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use vnpatch::embed::{embed_script, EmbedScriptRequest, IdentityTranscoder};

use crate::statement_text::parse_statements;
use crate::ResolvedScript;

#[allow(clippy::too_many_arguments)]
pub fn script_embed(
    rom_path: &PathBuf,
    resolved: &ResolvedScript,
    input: &PathBuf,
    use_rom_strtab: bool,
    script_size: u32,
    strtab_script_file: &PathBuf,
    strtab_menu_file: &PathBuf,
    strtab_script_size: u32,
    strtab_menu_size: u32,
    out: &PathBuf,
) -> Result<()> {
    let rom_bytes = fs::read(rom_path).with_context(|| format!("reading ROM {}", rom_path.display()))?;
    let source = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let statements = parse_statements(&source)?;

    let strtab_script_index_file = if use_rom_strtab {
        String::new()
    } else {
        fs::read_to_string(strtab_script_file).with_context(|| format!("reading {}", strtab_script_file.display()))?
    };
    let strtab_menu_index_file = if use_rom_strtab {
        String::new()
    } else {
        fs::read_to_string(strtab_menu_file).with_context(|| format!("reading {}", strtab_menu_file.display()))?
    };

    let transcoder = IdentityTranscoder;
    let req = EmbedScriptRequest {
        statements,
        use_rom_strtab,
        script_vma: resolved.script_vma,
        script_size_ptr_vma: resolved.script_size_ptr_vma,
        script_max_size: script_size as usize,
        strtab_script_vma: resolved.strtab_script_vma,
        strtab_script_index_file: &strtab_script_index_file,
        strtab_script_max_size: strtab_script_size as usize,
        strtab_menu_vma: resolved.strtab_menu_vma,
        strtab_menu_index_file: &strtab_menu_index_file,
        strtab_menu_max_size: strtab_menu_size as usize,
        transcoder: &transcoder,
    };

    let result = embed_script(&rom_bytes, req)?;
    if !result.stock_checksum_matched {
        eprintln!("warning: patched ROM did not match the known-stock checksum before patching");
    }
    fs::write(out, result.rom).with_context(|| format!("writing {}", out.display()))
}
