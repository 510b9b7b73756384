//! Minimal line-based encoding for a `Statement` list, read by `script embed`.
//!
//! This is deliberately not a full script-source grammar (Open Question 4):
//! it exists only so the CLI has something concrete to read before handing a
//! `Vec<Statement>` to [`vnpatch::script::assemble`]. One statement per
//! non-blank line:
//!
//! ```text
//! L_top:                        // attaches a label to the next statement
//! Op 0x0c Str("Hello")
//! Op 0x01 Label(L_top)
//! Byte4 0xdeadbeef
//! Section begin branch_info
//! Section end branch_info
//! ```
//!
//! Args: a bare number is `Num`, `Label(name)` a branch/jump target,
//! `Str("...")` an unfolded string (same escapes as the strtab index file),
//! `NumberedStr(idx, "...")` a string already pinned to a strtab slot.

use anyhow::{anyhow, bail, Context, Result};

use vnpatch::script::asm::{Arg, Statement, StatementBody};

use super::numeric::parse_num;

fn parse_quoted(s: &str) -> Result<Vec<u8>> {
    let inner = s
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| anyhow!("expected a quoted string, got {s:?}"))?;
    let mut out = Vec::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('"') => out.push(b'"'),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(u8::from_str_radix(&hex, 16).map_err(|_| anyhow!("bad \\x escape in {s:?}"))?);
            }
            Some(other) => out.push(other as u8),
            None => bail!("dangling escape in {s:?}"),
        }
    }
    Ok(out)
}

fn parse_arg(tok: &str) -> Result<Arg> {
    let tok = tok.trim();
    if let Some(inner) = tok.strip_prefix("Label(").and_then(|s| s.strip_suffix(')')) {
        return Ok(Arg::Label(inner.to_string()));
    }
    if let Some(inner) = tok.strip_prefix("Str(").and_then(|s| s.strip_suffix(')')) {
        return Ok(Arg::Str(parse_quoted(inner)?));
    }
    if let Some(inner) = tok.strip_prefix("NumberedStr(").and_then(|s| s.strip_suffix(')')) {
        let (idx, text) = inner
            .split_once(',')
            .ok_or_else(|| anyhow!("NumberedStr needs index,text, got {inner:?}"))?;
        return Ok(Arg::NumberedStr { index: parse_num(idx).map_err(|e| anyhow!(e))?, text: parse_quoted(text.trim())? });
    }
    Ok(Arg::Num(parse_num(tok).map_err(|e| anyhow!(e))? as u16))
}

/// Splits a statement line on top-level whitespace, treating `"..."` and
/// `(...)` spans as atomic so `Str("a b")` stays one token.
fn split_tokens(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                cur.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                cur.push(c);
            }
            ')' if !in_quotes => {
                depth -= 1;
                cur.push(c);
            }
            c if c.is_whitespace() && depth == 0 && !in_quotes => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

pub fn parse_statements(src: &str) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    let mut pending_label: Option<String> = None;

    for (lineno, raw) in src.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_suffix(':') {
            pending_label = Some(name.trim().to_string());
            continue;
        }

        let mut tokens = split_tokens(line).into_iter();
        let head = tokens.next().ok_or_else(|| anyhow!("line {}: empty statement", lineno + 1))?;

        let body = if head == "Section" {
            let which = tokens.next().ok_or_else(|| anyhow!("line {}: Section needs begin/end", lineno + 1))?;
            let name = tokens.next().ok_or_else(|| anyhow!("line {}: Section needs a name", lineno + 1))?;
            let begin = match which.as_str() {
                "begin" => true,
                "end" => false,
                other => bail!("line {}: unknown Section marker {other:?}", lineno + 1),
            };
            StatementBody::SectionMark { name, begin }
        } else if let Some(width) = head.strip_prefix("Byte") {
            let n: u8 = width.parse().with_context(|| format!("line {}: bad Byte width {width:?}", lineno + 1))?;
            let value_tok = tokens.next().ok_or_else(|| anyhow!("line {}: Byte needs a value", lineno + 1))?;
            let value = parse_num(&value_tok).map_err(|e| anyhow!(e))? as u64;
            StatementBody::Byte { n, value }
        } else if head == "Op" {
            let op_tok = tokens.next().ok_or_else(|| anyhow!("line {}: Op needs an opcode", lineno + 1))?;
            let opcode_index = parse_num(&op_tok).map_err(|e| anyhow!(e))? as u16;
            let args = tokens.map(|t| parse_arg(&t)).collect::<Result<Vec<_>>>()?;
            StatementBody::Op { opcode_index, args }
        } else {
            bail!("line {}: unknown statement keyword {head:?}", lineno + 1);
        };

        statements.push(Statement { label: pending_label.take(), body });
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_text_and_jump() {
        let src = "L_top:\nOp 0x0c Str(\"Hello\")\nOp 0x01 Label(L_top)\nSection begin branch_info\nSection end branch_info\n";
        let statements = parse_statements(src).unwrap();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0].label.as_deref(), Some("L_top"));
        assert!(matches!(&statements[1].body, StatementBody::Op { opcode_index: 0x01, args } if matches!(&args[0], Arg::Label(l) if l == "L_top")));
    }

    #[test]
    fn rejects_unknown_keyword() {
        assert!(parse_statements("Frobnicate 1 2\n").is_err());
    }
}
