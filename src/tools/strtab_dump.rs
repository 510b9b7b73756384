use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use vnpatch::rom;
use vnpatch::strtab::{decode_all, decode_index};

const DECODE_MAX_LEN: usize = 4096;

pub fn strtab_dump(rom_path: &PathBuf, strtab_vma: u32, out: &Option<PathBuf>, idx: &Option<u32>) -> Result<()> {
    let rom_bytes = fs::read(rom_path).with_context(|| format!("reading ROM {}", rom_path.display()))?;
    let offset = rom::vma_to_offset(strtab_vma)?;
    let strtab = &rom_bytes[offset as usize..];

    let messages = match idx {
        Some(i) => vec![decode_index(strtab, *i, DECODE_MAX_LEN)?],
        None => decode_all(strtab, DECODE_MAX_LEN)?,
    };

    let mut text = String::new();
    for (i, msg) in messages.iter().enumerate() {
        text.push_str(&format!("{i}: {}\n", String::from_utf8_lossy(msg)));
    }

    match out {
        Some(path) => fs::write(path, text).with_context(|| format!("writing {}", path.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}
