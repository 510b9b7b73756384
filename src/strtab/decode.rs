use crate::bits::BitReader;
use crate::error::{Error, Result};
use crate::rom;

use super::{DictNode, Header};

/// Decodes entry `idx` from `strtab`, returning raw Shift-JIS bytes (with the
/// `\n` leaf emitted as the literal two ASCII bytes `\` `n`, matching the
/// on-disk convention so the index-file escape set round-trips). `max_len`
/// bounds the output to guard against a corrupt or adversarial dictionary.
pub fn decode_index(strtab: &[u8], idx: u32, max_len: usize) -> Result<Vec<u8>> {
    let header = Header::read(strtab)?;
    if idx >= header.nentries {
        return Err(Error::InvalidIndex { index: idx, nentries: header.nentries });
    }

    let offs_pos = header
        .msgs_offs
        .checked_add(3 * idx)
        .ok_or_else(|| Error::MalformedStrtab("message index overflowed".into()))?;
    let offs_bytes = rom::slice(strtab, offs_pos, 3)?;
    let msg_offs = offs_bytes[0] as u32 | (offs_bytes[1] as u32) << 8 | (offs_bytes[2] as u32) << 16;

    let msg_start = header
        .msgs_offs
        .checked_add(msg_offs)
        .ok_or_else(|| Error::MalformedStrtab("message offset overflowed".into()))?;
    let msg_bytes = strtab
        .get(msg_start as usize..)
        .ok_or_else(|| Error::MalformedStrtab(format!("message at {msg_start:#x} leaves the strtab")))?;

    let mut reader = BitReader::new(msg_bytes);
    let mut out = Vec::new();

    loop {
        let mut rel = 0u32;
        loop {
            let node = DictNode::read(strtab, header.dict_offs, rel)?;
            match node {
                DictNode::Leaf { byte: 0 } => return Ok(out),
                DictNode::Leaf { byte: b'\n' } => {
                    if out.len() + 2 > max_len {
                        return Err(Error::BufferTooSmall { needed: out.len() + 2, have: max_len });
                    }
                    out.push(b'\\');
                    out.push(b'n');
                    break;
                }
                DictNode::Leaf { byte } => {
                    if out.len() + 1 > max_len {
                        return Err(Error::BufferTooSmall { needed: out.len() + 1, have: max_len });
                    }
                    out.push(byte);
                    break;
                }
                DictNode::Internal { offs_l, offs_r } => {
                    let bit = reader.read_bit().map_err(|_| {
                        Error::MalformedStrtab("bit stream exhausted mid-message".into())
                    })?;
                    rel = if bit == 1 { offs_r } else { offs_l };
                }
            }
        }
    }
}

/// Decodes every entry in `strtab`, in index order.
pub fn decode_all(strtab: &[u8], max_len: usize) -> Result<Vec<Vec<u8>>> {
    let header = Header::read(strtab)?;
    (0..header.nentries).map(|i| decode_index(strtab, i, max_len)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strtab::make_strtab;

    #[test]
    fn decodes_single_string() {
        let strtab = make_strtab(&[b"AB".to_vec()]).unwrap();
        assert_eq!(decode_index(&strtab, 0, 512).unwrap(), b"AB");
    }

    #[test]
    fn invalid_index_fails() {
        let strtab = make_strtab(&[b"AB".to_vec()]).unwrap();
        assert!(matches!(
            decode_index(&strtab, 5, 512),
            Err(Error::InvalidIndex { .. })
        ));
    }

    #[test]
    fn newline_leaf_emits_literal_backslash_n() {
        let strtab = make_strtab(&[b"a\nb".to_vec()]).unwrap();
        assert_eq!(decode_index(&strtab, 0, 512).unwrap(), b"a\\nb");
    }
}
