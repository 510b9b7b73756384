//! Assembler: emits bytecode from a `Statement` list (component G).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::layout::{sjis_break_frame_at, sjis_nglyphs, sjis_nrows, MAX_GLYPHS_PER_FRAME, MAX_ROWS_PER_FRAME};
use crate::strtab::{MAX_ENTRIES, PLACEHOLDER_IDX};

use super::{can_be_branched_to, is_branch, Command, ScriptHeader};

/// One statement argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Num(u16),
    Label(String),
    /// A string not yet assigned a strtab index (folded away in the pre-pass).
    Str(Vec<u8>),
    NumberedStr { index: u32, text: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementBody {
    Op { opcode_index: u16, args: Vec<Arg> },
    Byte { n: u8, value: u64 },
    SectionMark { name: String, begin: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub label: Option<String>,
    pub body: StatementBody,
}

/// Builds a dense strtab message list from sparse, possibly out-of-order
/// index assignments, matching the original's "unused slots hold the
/// placeholder" rule.
#[derive(Debug, Default)]
pub struct StrtabBuilder {
    slots: Vec<Option<Vec<u8>>>,
}

impl StrtabBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_len(&mut self, n: usize) {
        if self.slots.len() < n {
            self.slots.resize(n, None);
        }
    }

    fn lowest_unused(&self) -> usize {
        self.slots.iter().position(|s| s.is_none()).unwrap_or(self.slots.len())
    }

    /// Deposits `text` at a caller-chosen `index`, warning (not failing) if a
    /// non-placeholder slot is overwritten, per the §4.G pre-pass rule.
    pub fn deposit(&mut self, index: u32, text: Vec<u8>) -> Result<()> {
        if index >= MAX_ENTRIES {
            return Err(Error::EmbedIndexOutOfRange(index));
        }
        let idx = index as usize;
        self.ensure_len(idx + 1);
        if let Some(prev) = &self.slots[idx] {
            if !prev.is_empty() {
                eprintln!("warning: strtab index {index} overwritten during string folding");
            }
        }
        self.slots[idx] = Some(text);
        Ok(())
    }

    /// Assigns `text` the lowest unused index and deposits it there.
    pub fn alloc(&mut self, text: Vec<u8>) -> u32 {
        let idx = self.lowest_unused();
        self.ensure_len(idx + 1);
        self.slots[idx] = Some(text);
        idx as u32
    }

    /// Flattens into a dense message list, one entry per index up to the
    /// highest allocated, empty placeholders filling the gaps. A builder with
    /// nothing deposited still yields the single reserved placeholder entry
    /// at index 0 (§3), so a strtab with no live strings is still encodable.
    pub fn into_messages(mut self) -> Vec<Vec<u8>> {
        self.ensure_len(1);
        self.slots.into_iter().map(|s| s.unwrap_or_default()).collect()
    }
}

fn is_menu_op(op: u16) -> bool {
    super::uses_menu_strtab(op)
}

/// Pre-pass: folds every `Str` arg into a `NumberedStr` at the lowest unused
/// index of its target strtab (script or menu, by opcode classification),
/// and deposits any already-numbered string at its given index.
pub fn fold_strings(
    statements: &mut [Statement],
    script_strtab: &mut StrtabBuilder,
    menu_strtab: &mut StrtabBuilder,
) -> Result<()> {
    for stmt in statements.iter_mut() {
        let StatementBody::Op { opcode_index, args } = &mut stmt.body else { continue };
        let menu = is_menu_op(*opcode_index);
        for arg in args.iter_mut() {
            match arg {
                Arg::Str(text) => {
                    let text = std::mem::take(text);
                    let idx = if menu { menu_strtab.alloc(text.clone()) } else { script_strtab.alloc(text.clone()) };
                    *arg = Arg::NumberedStr { index: idx, text };
                }
                Arg::NumberedStr { index, text } => {
                    if menu {
                        menu_strtab.deposit(*index, text.clone())?;
                    } else {
                        script_strtab.deposit(*index, text.clone())?;
                    }
                }
                Arg::Num(_) | Arg::Label(_) => {}
            }
        }
    }
    Ok(())
}

/// Splits every `ShowText` whose string crosses a frame boundary (§4.C) into
/// `ShowText; HandleInput; ShowText; …`, each segment a fresh strtab entry.
pub fn split_show_text(statements: Vec<Statement>, script_strtab: &mut StrtabBuilder) -> Vec<Statement> {
    let mut out = Vec::with_capacity(statements.len());
    for stmt in statements {
        let is_overlong_show_text = matches!(
            &stmt.body,
            StatementBody::Op { opcode_index: 0x0C, args }
                if matches!(args.as_slice(), [Arg::NumberedStr { text, .. }] if sjis_break_frame_at(text) != 0)
        );
        if !is_overlong_show_text {
            out.push(stmt);
            continue;
        }
        let StatementBody::Op { args, .. } = stmt.body else { unreachable!() };
        let Arg::NumberedStr { index, text } = args.into_iter().next().unwrap() else { unreachable!() };

        let mut segments = Vec::new();
        let mut rest = text.as_slice();
        loop {
            let brk = sjis_break_frame_at(rest);
            if brk == 0 {
                segments.push(rest.to_vec());
                break;
            }
            segments.push(rest[..=brk].to_vec());
            rest = &rest[brk + 1..];
        }

        let last = segments.len() - 1;
        for (i, seg) in segments.into_iter().enumerate() {
            let seg_idx = if i == 0 {
                script_strtab.deposit(index, seg.clone()).ok();
                index
            } else {
                script_strtab.alloc(seg.clone())
            };
            out.push(Statement {
                label: if i == 0 { stmt.label.clone() } else { None },
                body: StatementBody::Op { opcode_index: 0x0C, args: vec![Arg::NumberedStr { index: seg_idx, text: seg }] },
            });
            if i != last {
                out.push(Statement { label: None, body: StatementBody::Op { opcode_index: 0x10, args: Vec::new() } });
            }
        }
    }
    out
}

/// Splits an overlong `Choice`/`ChoiceIdx` by hoisting its pretext argument
/// into a preceding `ShowText; HandleInput` pair, per §4.C's row/glyph caps.
pub fn split_choice_stmts(statements: Vec<Statement>, script_strtab: &mut StrtabBuilder) -> Vec<Statement> {
    let mut out = Vec::with_capacity(statements.len());
    for mut stmt in statements {
        let StatementBody::Op { opcode_index, args } = &mut stmt.body else {
            out.push(stmt);
            continue;
        };
        let op = *opcode_index;
        if op != 0x11 && op != 0x35 {
            out.push(stmt);
            continue;
        }

        let total_glyphs: u32 = args
            .iter()
            .filter_map(|a| if let Arg::NumberedStr { text, .. } = a { Some(sjis_nglyphs(text)) } else { None })
            .sum();
        let total_rows: u32 = args
            .iter()
            .filter_map(|a| if let Arg::NumberedStr { text, .. } = a { Some(sjis_nrows(text)) } else { None })
            .sum();
        if total_rows <= MAX_ROWS_PER_FRAME && total_glyphs <= MAX_GLYPHS_PER_FRAME {
            out.push(stmt);
            continue;
        }

        let pretext_pos = if op == 0x11 { 0 } else { 1 };
        let Some(Arg::NumberedStr { text: pretext, .. }) = args.get(pretext_pos).cloned() else {
            eprintln!("warning: choice at cannot be split to fit, emitting as-is");
            out.push(stmt);
            continue;
        };

        let show_idx = script_strtab.alloc(pretext.clone());
        let label = stmt.label.take();
        args[pretext_pos] = Arg::Num(PLACEHOLDER_IDX as u16);

        out.push(Statement {
            label,
            body: StatementBody::Op { opcode_index: 0x0C, args: vec![Arg::NumberedStr { index: show_idx, text: pretext }] },
        });
        out.push(Statement { label: None, body: StatementBody::Op { opcode_index: 0x10, args: Vec::new() } });
        out.push(stmt);
    }
    out
}

/// Validates and patches in Nop landing pads for every branch target, per
/// the §4.G branch-target insertion rules.
fn insert_branch_landing_pads(statements: &mut Vec<Statement>) -> Result<()> {
    let mut label_pos: HashMap<String, usize> = HashMap::new();
    for (i, s) in statements.iter().enumerate() {
        if let Some(name) = &s.label {
            label_pos.insert(name.clone(), i);
        }
    }

    let mut needs_pad = Vec::new();
    for (i, s) in statements.iter().enumerate() {
        let StatementBody::Op { opcode_index, args } = &s.body else { continue };
        if !is_branch(*opcode_index) {
            continue;
        }
        let Some(Arg::Label(name)) = args.first() else { continue };
        let &label_idx = label_pos
            .get(name)
            .ok_or_else(|| Error::InvalidArgument(format!("branch target label {name} is never defined")))?;
        if label_idx <= i {
            return Err(Error::BackwardBranch { branch: i as u16, label: label_idx as u16 });
        }
        for (mid, mid_stmt) in statements.iter().enumerate().take(label_idx).skip(i + 1) {
            if let StatementBody::Op { opcode_index: mid_op, .. } = &mid_stmt.body {
                if can_be_branched_to(*mid_op) {
                    return Err(Error::IntermediateBranchTarget {
                        branch: i as u16,
                        label: label_idx as u16,
                        intercepted: mid as u16,
                    });
                }
            }
        }
        let label_is_landing_pad = matches!(
            &statements[label_idx].body,
            StatementBody::Op { opcode_index, .. } if can_be_branched_to(*opcode_index)
        );
        if !label_is_landing_pad {
            needs_pad.push(label_idx);
        }
    }

    needs_pad.sort_unstable();
    needs_pad.dedup();
    for idx in needs_pad.into_iter().rev() {
        let label = statements[idx].label.take();
        statements.insert(idx, Statement { label, body: StatementBody::Op { opcode_index: 0x07, args: Vec::new() } });
    }
    Ok(())
}

fn compute_nargs(op: u16, args: &[Arg]) -> usize {
    args.iter().filter(|a| !(is_branch(op) && matches!(a, Arg::Label(_)))).count()
}

fn emit_args(
    op: u16,
    args: &[Arg],
    out: &mut Vec<u8>,
    label_offsets: &HashMap<String, u16>,
    pending: &mut HashMap<String, Vec<usize>>,
) -> Result<()> {
    for arg in args {
        match arg {
            Arg::Label(name) => {
                if is_branch(op) {
                    continue; // structural only; the disassembler recomputes it via branch_dst
                }
                if let Some(&offs) = label_offsets.get(name) {
                    out.extend_from_slice(&offs.to_le_bytes());
                } else {
                    pending.entry(name.clone()).or_default().push(out.len());
                    out.extend_from_slice(&0u16.to_le_bytes());
                }
            }
            Arg::Num(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::NumberedStr { index, .. } => {
                let idx: u16 = (*index)
                    .try_into()
                    .map_err(|_| Error::InvalidArgument(format!("strtab index {index} does not fit in 16 bits")))?;
                out.extend_from_slice(&idx.to_le_bytes());
            }
            Arg::Str(_) => {
                return Err(Error::InvalidArgument("Str arg reached emission unfolded".into()));
            }
        }
    }
    Ok(())
}

/// Emit pass: walks the (already folded, split, and pad-inserted) statement
/// list, writing the command buffer and finally the 6-byte script header.
fn emit(statements: Vec<Statement>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut label_offsets: HashMap<String, u16> = HashMap::new();
    let mut pending: HashMap<String, Vec<usize>> = HashMap::new();
    let mut branch_info_begin = None;
    let mut branch_info_end = None;

    for stmt in &statements {
        if out.len() > 0xFFFF {
            return Err(Error::JumpOutOfRange(out.len() as u32));
        }
        let cursor = out.len() as u16;

        if let Some(name) = &stmt.label {
            label_offsets.insert(name.clone(), cursor);
            if let Some(positions) = pending.remove(name) {
                for pos in positions {
                    out[pos..pos + 2].copy_from_slice(&cursor.to_le_bytes());
                }
            }
        }

        match &stmt.body {
            StatementBody::SectionMark { name, begin } if name == "branch_info" => {
                if *begin {
                    branch_info_begin = Some(cursor);
                } else {
                    branch_info_end = Some(cursor);
                }
            }
            StatementBody::SectionMark { .. } => {}
            StatementBody::Byte { n, value } => match n {
                1 => out.push(*value as u8),
                2 => out.extend_from_slice(&(*value as u16).to_le_bytes()),
                4 => out.extend_from_slice(&(*value as u32).to_le_bytes()),
                8 => out.extend_from_slice(&value.to_le_bytes()),
                other => return Err(Error::InvalidArgument(format!("unsupported byte directive width {other}"))),
            },
            StatementBody::Op { opcode_index, args } => {
                let nargs = compute_nargs(*opcode_index, args);
                let ival = Command { op: *opcode_index, arg: nargs as u32 }.pack();
                out.extend_from_slice(&ival.to_le_bytes());
                emit_args(*opcode_index, args, &mut out, &label_offsets, &mut pending)?;
            }
        }
    }

    let (begin, end) = match (branch_info_begin, branch_info_end) {
        (Some(b), Some(e)) => (b, e),
        _ => return Err(Error::MissingBranchInfo),
    };
    let total = out.len() as u16;
    let header = ScriptHeader { branch_info_offs: begin, branch_info_sz: end - begin, bytes_to_end: total - end };

    let mut final_out = Vec::with_capacity(out.len() + 6);
    header.write(&mut final_out);
    final_out.extend_from_slice(&out);
    Ok(final_out)
}

/// Runs the full assembler pipeline: string folding, text-fit splitting,
/// branch landing-pad insertion, and emission.
pub fn assemble(
    mut statements: Vec<Statement>,
    script_strtab: &mut StrtabBuilder,
    menu_strtab: &mut StrtabBuilder,
) -> Result<Vec<u8>> {
    fold_strings(&mut statements, script_strtab, menu_strtab)?;
    let statements = split_show_text(statements, script_strtab);
    let statements = split_choice_stmts(statements, script_strtab);
    let mut statements = statements;
    insert_branch_landing_pads(&mut statements)?;
    emit(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(opcode_index: u16, args: Vec<Arg>) -> Statement {
        Statement { label: None, body: StatementBody::Op { opcode_index, args } }
    }

    fn section(name: &str, begin: bool) -> Statement {
        Statement { label: None, body: StatementBody::SectionMark { name: name.to_string(), begin } }
    }

    #[test]
    fn show_text_assembles_per_scenario_four() {
        let statements = vec![
            op(0x0C, vec![Arg::Str(b"Hello".to_vec())]),
            section("branch_info", true),
            section("branch_info", false),
        ];
        let mut script_strtab = StrtabBuilder::new();
        let mut menu_strtab = StrtabBuilder::new();
        let out = assemble(statements, &mut script_strtab, &mut menu_strtab).unwrap();

        assert_eq!(&out[0..2], &6u16.to_le_bytes()); // branch_info_offs
        assert_eq!(&out[2..4], &0u16.to_le_bytes()); // branch_info_sz
        let ival = u32::from_le_bytes(out[6..10].try_into().unwrap());
        assert_eq!(Command::unpack(ival), Command { op: 0x0C, arg: 1 });
        assert_eq!(&out[10..12], &0u16.to_le_bytes());
        assert_eq!(script_strtab.into_messages(), vec![b"Hello".to_vec()]);
    }

    #[test]
    fn forward_jump_resolves_label_offset() {
        let statements = vec![
            op(1, vec![Arg::Label("L_end".into())]),
            Statement { label: Some("L_end".into()), body: StatementBody::Op { opcode_index: 7, args: vec![] } },
            section("branch_info", true),
            section("branch_info", false),
        ];
        let mut script_strtab = StrtabBuilder::new();
        let mut menu_strtab = StrtabBuilder::new();
        let out = assemble(statements, &mut script_strtab, &mut menu_strtab).unwrap();
        // Destinations are offsets from the start of the command buffer (after
        // the 6-byte header): the Jump record occupies buffer bytes [0,4), so
        // its dest word at buffer offset 4 (final_out offset 10) patches to 6,
        // the buffer offset where the labeled Nop lands.
        assert_eq!(&out[10..12], &6u16.to_le_bytes());
    }

    #[test]
    fn backward_branch_is_rejected() {
        let statements = vec![
            Statement { label: Some("L_top".into()), body: StatementBody::Op { opcode_index: 7, args: vec![] } },
            op(4, vec![Arg::Label("L_top".into())]),
            section("branch_info", true),
            section("branch_info", false),
        ];
        let mut script_strtab = StrtabBuilder::new();
        let mut menu_strtab = StrtabBuilder::new();
        let err = assemble(statements, &mut script_strtab, &mut menu_strtab).unwrap_err();
        assert!(matches!(err, Error::BackwardBranch { .. }));
    }

    #[test]
    fn branch_to_non_landing_pad_inserts_nop() {
        let statements = vec![
            op(4, vec![Arg::Label("L_dst".into())]),
            Statement {
                label: Some("L_dst".into()),
                body: StatementBody::Op { opcode_index: 0x63, args: vec![Arg::Num(0), Arg::Num(0)] },
            },
            section("branch_info", true),
            section("branch_info", false),
        ];
        let mut script_strtab = StrtabBuilder::new();
        let mut menu_strtab = StrtabBuilder::new();
        let out = assemble(statements, &mut script_strtab, &mut menu_strtab).unwrap();
        // header(6) + branch record(4, no dest word since structural) = 10: the
        // inserted Nop record should start there.
        let ival = u32::from_le_bytes(out[10..14].try_into().unwrap());
        assert_eq!(Command::unpack(ival), Command { op: 0x07, arg: 0 });
    }

    #[test]
    fn missing_branch_info_section_fails() {
        let statements = vec![op(0x10, vec![])];
        let mut script_strtab = StrtabBuilder::new();
        let mut menu_strtab = StrtabBuilder::new();
        let err = assemble(statements, &mut script_strtab, &mut menu_strtab).unwrap_err();
        assert!(matches!(err, Error::MissingBranchInfo));
    }

    #[test]
    fn strtab_builder_fills_gaps_with_placeholder() {
        let mut b = StrtabBuilder::new();
        b.deposit(2, b"two".to_vec()).unwrap();
        let messages = b.into_messages();
        assert_eq!(messages, vec![Vec::new(), Vec::new(), b"two".to_vec()]);
    }
}
