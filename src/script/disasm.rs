//! Two-phase label-discovering disassembler (component F).

use std::collections::{BTreeSet, VecDeque};

use crate::error::Result;

use super::asm::{Arg, Statement, StatementBody};
use super::{can_be_branched_to, is_branch, is_jump, is_nop, next_cmd_arg, Command, OP_MAX};

/// Commands a single disassembly pass may process before giving up, shared
/// across both the label-discovery and emission phases as a termination
/// guarantee on pathological input.
pub const SCRIPT_DUMP_NCMDS_MAX: u32 = 15000;

/// Result of disassembling one command buffer: a human-readable dump text
/// (§6 `script dump` output) and the `Statement` list an assembler can
/// consume directly (Open Question 4 — this crate has no textual parser).
pub struct DisasmOutput {
    pub text: String,
    pub statements: Vec<Statement>,
}

fn read_ival(cmds: &[u8], offset: usize) -> Option<u32> {
    let bytes = cmds.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Skips forward over commands whose opcode is in `can_be_branched_to`,
/// landing on the first command that isn't — the interpreter's fixed-point
/// branch destination.
fn branch_dst(cmds: &[u8], mut offset: u16) -> u16 {
    loop {
        let Some(ival) = read_ival(cmds, offset as usize) else { return offset };
        let cmd = Command::unpack(ival);
        if cmd.op >= OP_MAX || !can_be_branched_to(cmd.op) {
            return offset;
        }
        offset = offset.saturating_add(cmd.record_len() as u16);
    }
}

/// Phase 1: discovers every label reachable from offset 0 by following Jump
/// and Branch destinations.
fn discover_labels(cmds: &[u8]) -> BTreeSet<u16> {
    let mut labels = BTreeSet::new();
    labels.insert(0u16);
    let mut queue = VecDeque::new();
    queue.push_back(0u16);
    let mut visited_starts = BTreeSet::new();
    let mut budget = SCRIPT_DUMP_NCMDS_MAX;

    while let Some(start) = queue.pop_front() {
        if !visited_starts.insert(start) {
            continue;
        }
        let mut offset = start as usize;
        loop {
            if budget == 0 || offset >= cmds.len() {
                break;
            }
            if offset != start as usize && labels.contains(&(offset as u16)) {
                break;
            }
            let Some(ival) = read_ival(cmds, offset) else { break };
            budget -= 1;
            let cmd = Command::unpack(ival);
            if cmd.op >= OP_MAX {
                offset += 4;
                continue;
            }
            let args_start = offset + 4;
            let args_end = args_start + 2 * cmd.arg as usize;
            if args_end > cmds.len() {
                offset += 4;
                continue;
            }
            let args = &cmds[args_start..args_end];

            if is_jump(cmd.op) {
                if let Ok(dst) = next_cmd_arg(0, 1, args) {
                    if labels.insert(dst) {
                        queue.push_back(dst);
                    }
                }
            } else if is_branch(cmd.op) {
                let dst = branch_dst(cmds, args_end as u16);
                if labels.insert(dst) {
                    queue.push_back(dst);
                }
            }
            offset = args_end;
        }
    }
    labels
}

fn escape_for_display(bytes: &[u8]) -> String {
    let mut s = String::new();
    for &b in bytes {
        match b {
            b'"' => s.push_str("\\\""),
            b'\\' => s.push_str("\\\\"),
            0x20..=0x7e => s.push(b as char),
            _ => s.push_str(&format!("\\x{b:02x}")),
        }
    }
    s
}

fn strtab_text(strtab: Option<&[u8]>, idx: u16) -> Result<Vec<u8>> {
    match strtab {
        Some(bytes) => crate::strtab::decode_index(bytes, idx as u32, 4096),
        None => Ok(Vec::new()),
    }
}

/// Renders one command's source text and `Statement` args, or `None` when
/// `cmd.arg` doesn't actually carry the operand words this opcode needs (a
/// truncated/malformed command). Per §4.E/§4.F this is not a hard error: the
/// caller falls back to a raw `.4byte` emission for this one command and
/// keeps walking, rather than aborting the whole disassembly.
///
/// `dst` is supplied for Branch opcodes (computed structurally by the caller
/// via [`branch_dst`]); Jump opcodes compute their own destination from the
/// arg block.
fn render_command(
    cmd: Command,
    args: &[u8],
    branch_target: Option<u16>,
    strtab_script: Option<&[u8]>,
    strtab_menu: Option<&[u8]>,
) -> Option<(String, Vec<Arg>)> {
    let high = (cmd.arg >> 16) as u16;

    if is_nop(cmd.op) {
        let name = format!("Nop{}", cmd.op);
        return Some((format!("{name}()"), Vec::new()));
    }

    if is_jump(cmd.op) {
        let dst = next_cmd_arg(high, 1, args).ok()?;
        let label = format!("L_0x{dst:x}");
        return Some((format!("Jump({label})"), vec![Arg::Label(label)]));
    }

    if is_branch(cmd.op) {
        let dst = branch_target.unwrap_or(0);
        let label = format!("L_0x{dst:x}");
        return Some((format!("OP_0x{:x}({label})", cmd.op), vec![Arg::Label(label)]));
    }

    if cmd.op == 0x0C {
        let idx = next_cmd_arg(high, 1, args).ok()?;
        let text = strtab_text(strtab_script, idx).ok()?;
        return Some((
            format!("ShowText(({idx})\"{}\")", escape_for_display(&text)),
            vec![Arg::NumberedStr { index: idx as u32, text }],
        ));
    }

    if cmd.op == 0x10 {
        return Some(("HandleInput()".to_string(), Vec::new()));
    }

    if cmd.op == 0x11 {
        // 1-10 menu-strtab indices (spec.md:67); arg==0 is not "zero choices",
        // it's a malformed command.
        if !(1..=10).contains(&cmd.arg) {
            return None;
        }
        let mut parts = Vec::new();
        let mut args_out = Vec::new();
        for w in 1..=cmd.arg as u16 {
            let idx = next_cmd_arg(high, w, args).ok()?;
            let text = strtab_text(strtab_menu, idx).ok()?;
            parts.push(format!("({idx})\"{}\"", escape_for_display(&text)));
            args_out.push(Arg::NumberedStr { index: idx as u32, text });
        }
        return Some((format!("Choice({})", parts.join(", ")), args_out));
    }

    if cmd.op == 0x35 {
        // destination word plus 1-10 menu-strtab indices, same cap as Choice.
        if !(2..=11).contains(&cmd.arg) {
            return None;
        }
        let dst = next_cmd_arg(high, 1, args).ok()?;
        let mut parts = vec![format!("0x{dst:x}")];
        let mut args_out = vec![Arg::Num(dst)];
        for w in 2..=cmd.arg as u16 {
            let idx = next_cmd_arg(high, w, args).ok()?;
            let text = strtab_text(strtab_menu, idx).ok()?;
            parts.push(format!("({idx})\"{}\"", escape_for_display(&text)));
            args_out.push(Arg::NumberedStr { index: idx as u32, text });
        }
        return Some((format!("ChoiceIdx({})", parts.join(", ")), args_out));
    }

    let a0 = (cmd.arg >> 16) as u16;
    let a1 = (cmd.arg & 0xFFFF) as u16;
    Some((format!("OP_0x{:x}(0x{a0:x}, 0x{a1:x})", cmd.op), vec![Arg::Num(a0), Arg::Num(a1)]))
}

/// Phase 2 and driver: disassembles `cmds` (the script's command-buffer
/// prefix, ending at `branch_info_offs`), producing both the textual dump
/// and the `Statement` list the assembler can round-trip from.
pub fn disassemble(
    cmds: &[u8],
    strtab_script: Option<&[u8]>,
    strtab_menu: Option<&[u8]>,
) -> Result<DisasmOutput> {
    let labels = discover_labels(cmds);

    let mut text = String::new();
    let mut statements = Vec::new();
    let mut offset = 0usize;
    let mut budget = SCRIPT_DUMP_NCMDS_MAX;

    while offset < cmds.len() {
        if budget == 0 {
            break;
        }
        let label_here = if labels.contains(&(offset as u16)) {
            let name = format!("L_0x{offset:x}");
            text.push_str(&format!("{name}:\n"));
            Some(name)
        } else {
            None
        };

        let Some(ival) = read_ival(cmds, offset) else { break };
        let cmd = Command::unpack(ival);
        budget -= 1;

        if cmd.op >= OP_MAX {
            text.push_str(&format!(".4byte 0x{ival:08x} // 0x{offset:x}\n"));
            statements.push(Statement {
                label: label_here,
                body: StatementBody::Byte { n: 4, value: ival as u64 },
            });
            offset += 4;
            continue;
        }

        let args_start = offset + 4;
        let args_end = args_start + 2 * cmd.arg as usize;

        // An operand count the buffer can't back up, or an operand/strtab
        // index render_command can't make sense of, means this one command
        // is undisassemblable — not that the whole buffer is. Emit it as a
        // raw word and keep walking (§4.F), the same fallback already used
        // above for an out-of-range opcode.
        let rendered = if args_end > cmds.len() {
            None
        } else {
            let args = &cmds[args_start..args_end];
            let branch_target = is_branch(cmd.op).then(|| branch_dst(cmds, args_end as u16));
            render_command(cmd, args, branch_target, strtab_script, strtab_menu)
        };

        match rendered {
            Some((rendered_text, stmt_args)) => {
                text.push_str(&format!("{rendered_text}; // 0x{offset:x}: {ival:08x}\n"));
                statements.push(Statement {
                    label: label_here,
                    body: StatementBody::Op { opcode_index: cmd.op, args: stmt_args },
                });
                offset = args_end;
            }
            None => {
                text.push_str(&format!(".4byte 0x{ival:08x} // 0x{offset:x}\n"));
                statements.push(Statement {
                    label: label_here,
                    body: StatementBody::Byte { n: 4, value: ival as u64 },
                });
                offset += 4;
            }
        }
    }

    Ok(DisasmOutput { text, statements })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_then_nop_matches_scenario() {
        // op=1 (Jump), arg=1 word follows: the word 0x0008 is the destination.
        let mut cmds = Vec::new();
        cmds.extend_from_slice(&0x0010_0001u32.to_le_bytes());
        cmds.extend_from_slice(&0x0008u16.to_le_bytes());
        cmds.extend_from_slice(&0x0000_0000u32.to_le_bytes()); // Nop at offset 8

        let out = disassemble(&cmds, None, None).unwrap();
        assert_eq!(out.text, "Jump(L_0x8); // 0x0: 00100001\nL_0x8:\nNop0(); // 0x8: 00000000\n");
    }

    #[test]
    fn empty_command_buffer_disassembles_to_nothing() {
        let out = disassemble(&[], None, None).unwrap();
        assert!(out.text.is_empty());
        assert!(out.statements.is_empty());
    }

    #[test]
    fn show_text_resolves_against_strtab() {
        let strtab = crate::strtab::make_strtab(&[b"Hello".to_vec()]).unwrap();
        let mut cmds = Vec::new();
        cmds.extend_from_slice(&0x0010_000Cu32.to_le_bytes()); // op=0xC, arg=1
        cmds.extend_from_slice(&0x0000u16.to_le_bytes());

        let out = disassemble(&cmds, Some(&strtab), None).unwrap();
        assert!(out.text.contains("ShowText((0)\"Hello\")"));
    }

    #[test]
    fn branch_destination_skips_can_be_branched_to_chain() {
        // Branch (op 4) with zero args at offset 0; Nop (op 7, can_be_branched_to)
        // at offset 4; the real landing pad (op 0x0C-like generic, not
        // branchable) at offset 8.
        let mut cmds = Vec::new();
        cmds.extend_from_slice(&0x0000_0004u32.to_le_bytes()); // op=4, arg=0
        cmds.extend_from_slice(&0x0000_0007u32.to_le_bytes()); // op=7 (Nop), arg=0
        cmds.extend_from_slice(&0x0000_0063u32.to_le_bytes()); // op=0x63, arg=0

        let out = disassemble(&cmds, None, None).unwrap();
        assert!(out.text.contains("L_0x8:"));
        assert!(out.text.starts_with("OP_0x4(L_0x8)"));
    }

    #[test]
    fn jump_with_missing_operand_falls_back_to_raw_word() {
        // op=1 (Jump), arg=0: no destination word follows, so the command
        // can't be rendered. This must not abort the whole disassembly.
        let mut cmds = Vec::new();
        cmds.extend_from_slice(&0x0000_0001u32.to_le_bytes());
        cmds.extend_from_slice(&0x0000_0000u32.to_le_bytes()); // Nop at offset 4

        let out = disassemble(&cmds, None, None).unwrap();
        assert_eq!(out.text, ".4byte 0x00000001 // 0x0\nNop0(); // 0x4: 00000000\n");
        assert!(matches!(&out.statements[0].body, StatementBody::Byte { n: 4, value: 1 }));
    }

    #[test]
    fn choice_with_zero_args_falls_back_to_raw_word() {
        // op=0x11 (Choice), arg=0: spec requires 1-10 indices, so this isn't
        // "a choice with nothing in it" — it's malformed.
        let mut cmds = Vec::new();
        cmds.extend_from_slice(&0x0000_0011u32.to_le_bytes());

        let out = disassemble(&cmds, None, None).unwrap();
        assert_eq!(out.text, ".4byte 0x00000011 // 0x0\n");
        assert!(!out.text.contains("Choice("));
    }
}
