//! Embed orchestrator: splices an assembled script and its two strtabs into
//! a ROM byte image, and the strtab index-file format that feeds it
//! (component H).

use crate::error::{Error, Result};
use crate::layout::hard_wrap_sjis;
use crate::rom;
use crate::script::asm::{assemble, Statement, StrtabBuilder};
use crate::strtab::{make_strtab, MAX_ENTRIES};

/// Unicode→Shift-JIS injection seam. The transcoding tables themselves are
/// out of scope (§1); callers supply an implementation.
pub trait Transcoder {
    fn transcode(&self, text: &str) -> Result<Vec<u8>>;
}

/// A transcoder that assumes its input is already encoded as the target
/// byte set (e.g. plain ASCII test fixtures). Not suitable for real
/// Shift-JIS text; useful for tests and as a CLI default until a real
/// transcoder is wired in.
pub struct IdentityTranscoder;

impl Transcoder for IdentityTranscoder {
    fn transcode(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Which strtab an `embed` invocation targets, per the §6 CLI grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrtabKind {
    Script,
    Menu,
}

/// One piece of an index-file entry's text: literal source text (passed
/// through the transcoder) or a raw byte escape (emitted verbatim).
#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPiece {
    Literal(String),
    Raw(u8),
}

fn parse_index(s: &str) -> Result<u32> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|_| Error::InvalidArgument(format!("invalid strtab index {s:?}")))
}

/// Decodes the escape set `\n \r \" \xHH`, with `¥` accepted as an alternate
/// backslash (the common rendering of JIS X 0201 byte `0x5C` in source text).
fn decode_escapes(s: &str) -> Result<Vec<TextPiece>> {
    let mut out = Vec::new();
    let mut literal = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' && c != '¥' {
            literal.push(c);
            continue;
        }
        if !literal.is_empty() {
            out.push(TextPiece::Literal(std::mem::take(&mut literal)));
        }
        match chars.next() {
            Some('n') => out.push(TextPiece::Raw(b'\n')),
            Some('r') => out.push(TextPiece::Raw(b'\r')),
            Some('"') => out.push(TextPiece::Raw(b'"')),
            Some('\\') => out.push(TextPiece::Raw(b'\\')),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = u8::from_str_radix(&hex, 16)
                    .map_err(|_| Error::InvalidArgument(format!("bad \\x escape in {s:?}")))?;
                out.push(TextPiece::Raw(byte));
            }
            Some(other) => literal.push(other),
            None => {}
        }
    }
    if !literal.is_empty() {
        out.push(TextPiece::Literal(literal));
    }
    Ok(out)
}

fn render_pieces(pieces: &[TextPiece], transcoder: &dyn Transcoder) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for piece in pieces {
        match piece {
            TextPiece::Literal(s) => out.extend(transcoder.transcode(s)?),
            TextPiece::Raw(b) => out.push(*b),
        }
    }
    Ok(out)
}

/// Parses a strtab index file: one `<index>: <text>` entry per non-blank
/// line, filling unreferenced slots up to `max_index` with the empty
/// placeholder, per §4.H.
pub fn parse_index_file(src: &str, transcoder: &dyn Transcoder) -> Result<Vec<Vec<u8>>> {
    let mut slots: Vec<Option<Vec<u8>>> = Vec::new();
    for (lineno, raw_line) in src.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let (idx_str, rest) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidArgument(format!("line {}: missing ':' separator", lineno + 1)))?;
        let idx = parse_index(idx_str.trim())?;
        if idx >= MAX_ENTRIES {
            return Err(Error::EmbedIndexOutOfRange(idx));
        }
        let text_src = rest.strip_prefix(' ').unwrap_or(rest);
        let text = render_pieces(&decode_escapes(text_src)?, transcoder)?;

        let idx = idx as usize;
        if slots.len() <= idx {
            slots.resize(idx + 1, None);
        }
        slots[idx] = Some(text);
    }
    Ok(slots.into_iter().map(|s| s.unwrap_or_default()).collect())
}

/// Builds a standalone strtab from an index file (the `strtab embed` verb):
/// parses, hard-wraps Script-kind entries, and encodes.
pub fn embed_strtab(index_file: &str, kind: StrtabKind, max_size: usize, transcoder: &dyn Transcoder) -> Result<Vec<u8>> {
    let messages = parse_index_file(index_file, transcoder)?;
    let messages: Vec<Vec<u8>> = match kind {
        StrtabKind::Script => messages.into_iter().map(|m| hard_wrap_sjis(&m)).collect(),
        StrtabKind::Menu => messages,
    };
    let encoded = make_strtab(&messages)?;
    if encoded.len() > max_size {
        return Err(Error::BufferTooSmall { needed: encoded.len(), have: max_size });
    }
    Ok(encoded)
}

/// Fixed ROM pointer fields patched by `script embed` (§6).
pub const STRTAB_SCRIPT_PTR_VMA: u32 = 0x0800_4B9C;
pub const STRTAB_MENU_PTR_VMA: u32 = 0x0800_4C24;

/// Everything `embed_script` needs: the pre-built statement list (component
/// G's input, per Open Question 4), the two strtab index files, the target
/// ROM locations, and capacity limits.
pub struct EmbedScriptRequest<'a> {
    pub statements: Vec<Statement>,
    pub use_rom_strtab: bool,
    pub script_vma: u32,
    pub script_size_ptr_vma: u32,
    pub script_max_size: usize,
    pub strtab_script_vma: u32,
    pub strtab_script_index_file: &'a str,
    pub strtab_script_max_size: usize,
    pub strtab_menu_vma: u32,
    pub strtab_menu_index_file: &'a str,
    pub strtab_menu_max_size: usize,
    pub transcoder: &'a dyn Transcoder,
}

/// Outcome of a successful `embed_script`: the patched ROM plus whether the
/// input ROM matched the known-stock checksum before patching (warning-only,
/// §6).
pub struct EmbedResult {
    pub rom: Vec<u8>,
    pub stock_checksum_matched: bool,
}

/// Splices an assembled script and its two strtabs into `rom`, patching the
/// script-strtab pointer, menu-strtab pointer, and per-script size fields.
/// A CRC-32 mismatch against the known-stock image is a warning, not a
/// failure (§6).
pub fn embed_script(rom: &[u8], req: EmbedScriptRequest) -> Result<EmbedResult> {
    let stock_checksum_matched = rom::matches_stock_checksum(rom);
    if !stock_checksum_matched {
        eprintln!("warning: ROM does not match the known-stock CRC-32 ({:#x})", rom::EXPECTED_ROM_CRC32);
    }

    let mut out = rom.to_vec();

    if req.use_rom_strtab {
        let bytecode = {
            let mut script_strtab = StrtabBuilder::new();
            let mut menu_strtab = StrtabBuilder::new();
            assemble(req.statements, &mut script_strtab, &mut menu_strtab)?
        };
        if bytecode.len() > req.script_max_size {
            return Err(Error::BufferTooSmall { needed: bytecode.len(), have: req.script_max_size });
        }
        let script_offset = rom::vma_to_offset(req.script_vma)?;
        out[script_offset as usize..script_offset as usize + bytecode.len()].copy_from_slice(&bytecode);
        rom::patch_u32(&mut out, rom::vma_to_offset(req.script_size_ptr_vma)?, bytecode.len() as u32)?;
        return Ok(EmbedResult { rom: out, stock_checksum_matched });
    }

    let mut script_strtab = StrtabBuilder::new();
    let mut menu_strtab = StrtabBuilder::new();

    let script_messages = parse_index_file(req.strtab_script_index_file, req.transcoder)?;
    for (i, msg) in script_messages.into_iter().enumerate() {
        script_strtab.deposit(i as u32, hard_wrap_sjis(&msg))?;
    }
    let menu_messages = parse_index_file(req.strtab_menu_index_file, req.transcoder)?;
    for (i, msg) in menu_messages.into_iter().enumerate() {
        menu_strtab.deposit(i as u32, msg)?;
    }

    let bytecode = assemble(req.statements, &mut script_strtab, &mut menu_strtab)?;
    if bytecode.len() > req.script_max_size {
        return Err(Error::BufferTooSmall { needed: bytecode.len(), have: req.script_max_size });
    }

    let script_strtab_bytes = make_strtab(&script_strtab.into_messages())?;
    if script_strtab_bytes.len() > req.strtab_script_max_size {
        return Err(Error::BufferTooSmall { needed: script_strtab_bytes.len(), have: req.strtab_script_max_size });
    }
    let menu_strtab_bytes = make_strtab(&menu_strtab.into_messages())?;
    if menu_strtab_bytes.len() > req.strtab_menu_max_size {
        return Err(Error::BufferTooSmall { needed: menu_strtab_bytes.len(), have: req.strtab_menu_max_size });
    }

    let script_offset = rom::vma_to_offset(req.script_vma)?;
    out[script_offset as usize..script_offset as usize + bytecode.len()].copy_from_slice(&bytecode);

    let strtab_script_offset = rom::vma_to_offset(req.strtab_script_vma)?;
    out[strtab_script_offset as usize..strtab_script_offset as usize + script_strtab_bytes.len()]
        .copy_from_slice(&script_strtab_bytes);

    let strtab_menu_offset = rom::vma_to_offset(req.strtab_menu_vma)?;
    out[strtab_menu_offset as usize..strtab_menu_offset as usize + menu_strtab_bytes.len()]
        .copy_from_slice(&menu_strtab_bytes);

    rom::patch_u32(&mut out, rom::vma_to_offset(STRTAB_SCRIPT_PTR_VMA)?, req.strtab_script_vma)?;
    rom::patch_u32(&mut out, rom::vma_to_offset(STRTAB_MENU_PTR_VMA)?, req.strtab_menu_vma)?;
    rom::patch_u32(&mut out, rom::vma_to_offset(req.script_size_ptr_vma)?, bytecode.len() as u32)?;

    Ok(EmbedResult { rom: out, stock_checksum_matched })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::asm::{Arg, StatementBody};

    #[test]
    fn index_file_fills_gaps_with_placeholder() {
        let src = "0: hello\n2: world\n";
        let messages = parse_index_file(src, &IdentityTranscoder).unwrap();
        assert_eq!(messages, vec![b"hello".to_vec(), Vec::new(), b"world".to_vec()]);
    }

    #[test]
    fn index_file_decodes_escapes_and_yen_backslash() {
        let src = "0: a\\nb\\x41¥\"end\n";
        let messages = parse_index_file(src, &IdentityTranscoder).unwrap();
        assert_eq!(messages[0], b"a\nbA\"end");
    }

    #[test]
    fn index_beyond_max_entries_is_rejected() {
        let src = "10000: x\n";
        let err = parse_index_file(src, &IdentityTranscoder).unwrap_err();
        assert!(matches!(err, Error::EmbedIndexOutOfRange(10000)));
    }

    #[test]
    fn embed_strtab_hard_wraps_script_entries_not_menu() {
        let long = "aaaaaaaaaaaa bbbbbbbbbbbb cccccccccccc dddddddddddd";
        let src = format!("0: {long}\n");
        let script = embed_strtab(&src, StrtabKind::Script, 4096, &IdentityTranscoder).unwrap();
        let decoded = crate::strtab::decode_index(&script, 0, 4096).unwrap();
        assert!(decoded.contains(&b'\n'));
    }

    #[test]
    fn embed_script_patches_pointer_fields() {
        let mut rom = vec![0u8; 0x10000];
        let script_vma = rom::ROM_BASE + 0x8000;
        let strtab_script_vma = rom::ROM_BASE + 0x9000;
        let strtab_menu_vma = rom::ROM_BASE + 0xA000;
        let script_size_ptr_vma = rom::ROM_BASE + 0x100;

        let statements = vec![Statement {
            label: None,
            body: StatementBody::Op { opcode_index: 0x0C, args: vec![Arg::Str(b"Hi".to_vec())] },
        }];

        let req = EmbedScriptRequest {
            statements,
            use_rom_strtab: false,
            script_vma,
            script_size_ptr_vma,
            script_max_size: 0x1000,
            strtab_script_vma,
            strtab_script_index_file: "",
            strtab_script_max_size: 0x1000,
            strtab_menu_vma,
            strtab_menu_index_file: "0: Yes\n1: No\n",
            strtab_menu_max_size: 0x1000,
            transcoder: &IdentityTranscoder,
        };
        rom.resize(0x20000, 0);
        let result = embed_script(&rom, req).unwrap();
        assert!(!result.stock_checksum_matched);

        let patched_script_ptr =
            rom::read_u32(&result.rom, rom::vma_to_offset(STRTAB_SCRIPT_PTR_VMA).unwrap()).unwrap();
        assert_eq!(patched_script_ptr, strtab_script_vma);
    }
}
