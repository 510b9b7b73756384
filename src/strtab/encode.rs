use std::collections::HashMap;

use crate::bits::BitWriter;
use crate::error::{Error, Result};

use super::{DictNode, Header, MAX_ENTRIES, NODE_SIZE};

/// A node of the in-memory Huffman tree being built, before linearization.
enum BuildNode {
    Leaf(u8),
    Internal(Box<BuildNode>, Box<BuildNode>),
}

/// Counts byte frequencies across every string plus one implicit NUL
/// terminator per string, in first-seen order (first-seen order is the
/// deterministic Huffman merge tie-break).
fn count_frequencies(strings: &[Vec<u8>]) -> Vec<(u8, u64)> {
    let mut order = Vec::new();
    let mut freq: HashMap<u8, u64> = HashMap::new();
    let mut bump = |b: u8, order: &mut Vec<u8>, freq: &mut HashMap<u8, u64>| {
        let entry = freq.entry(b).or_insert_with(|| {
            order.push(b);
            0
        });
        *entry += 1;
    };
    for s in strings {
        for &b in s {
            bump(b, &mut order, &mut freq);
        }
        bump(0, &mut order, &mut freq);
    }
    order.into_iter().map(|b| (b, freq[&b])).collect()
}

/// Builds the Huffman tree by repeatedly merging the two lowest-frequency
/// roots, breaking ties by first-seen order.
fn build_tree(leaves: Vec<(u8, u64)>) -> BuildNode {
    struct Root {
        freq: u64,
        seq: u64,
        node: BuildNode,
    }

    let mut roots: Vec<Root> = leaves
        .into_iter()
        .enumerate()
        .map(|(seq, (byte, freq))| Root { freq, seq: seq as u64, node: BuildNode::Leaf(byte) })
        .collect();
    let mut next_seq = roots.len() as u64;

    while roots.len() > 1 {
        let mut lo = 0;
        let mut hi = 1;
        if (roots[hi].freq, roots[hi].seq) < (roots[lo].freq, roots[lo].seq) {
            std::mem::swap(&mut lo, &mut hi);
        }
        for i in 2..roots.len() {
            let key = (roots[i].freq, roots[i].seq);
            if key < (roots[lo].freq, roots[lo].seq) {
                hi = lo;
                lo = i;
            } else if key < (roots[hi].freq, roots[hi].seq) {
                hi = i;
            }
        }
        let (first, second) = if lo < hi { (lo, hi) } else { (hi, lo) };
        let b = roots.remove(second);
        let a = roots.remove(first);
        roots.push(Root {
            freq: a.freq + b.freq,
            seq: next_seq,
            node: BuildNode::Internal(Box::new(a.node), Box::new(b.node)),
        });
        next_seq += 1;
    }

    roots.pop().expect("at least one leaf").node
}

/// Flattens the Huffman tree into pre-order on-disk nodes satisfying the
/// left-child-follows-parent invariant.
fn linearize(root: &BuildNode) -> Vec<DictNode> {
    fn visit(n: &BuildNode, nodes: &mut Vec<DictNode>) -> usize {
        match n {
            BuildNode::Leaf(byte) => {
                let idx = nodes.len();
                nodes.push(DictNode::Leaf { byte: *byte });
                idx
            }
            BuildNode::Internal(left, right) => {
                let self_idx = nodes.len();
                nodes.push(DictNode::Internal { offs_l: 0, offs_r: 0 });
                visit(left, nodes);
                let right_idx = visit(right, nodes);
                nodes[self_idx] = DictNode::Internal {
                    offs_l: NODE_SIZE * (self_idx as u32 + 1),
                    offs_r: NODE_SIZE * right_idx as u32,
                };
                self_idx
            }
        }
    }
    let mut nodes = Vec::new();
    visit(root, &mut nodes);
    nodes
}

/// Per-byte MSB-first code table, derived by walking the linearized
/// dictionary from the root.
fn build_codes(nodes: &[DictNode]) -> Result<HashMap<u8, (u32, u8)>> {
    fn visit(
        nodes: &[DictNode],
        idx: usize,
        code: u32,
        len: u8,
        codes: &mut HashMap<u8, (u32, u8)>,
    ) -> Result<()> {
        match nodes[idx] {
            DictNode::Leaf { byte } => {
                if len > 16 {
                    return Err(Error::DictTooLarge);
                }
                codes.insert(byte, (code, len));
                Ok(())
            }
            DictNode::Internal { offs_r, .. } => {
                visit(nodes, idx + 1, code << 1, len + 1, codes)?;
                visit(nodes, (offs_r / NODE_SIZE) as usize, (code << 1) | 1, len + 1, codes)
            }
        }
    }
    let mut codes = HashMap::new();
    visit(nodes, 0, 0, 0, &mut codes)?;
    Ok(codes)
}

/// Builds a complete strtab image from an ordered list of strings (the
/// terminating NUL is implicit; callers do not include it).
///
/// Duplicate strings (by content) share a single emitted message, matching
/// the decoder property `decode(encode(S))[i] == S[i]` while keeping encoded
/// size proportional to the number of distinct messages.
pub fn make_strtab(strings: &[Vec<u8>]) -> Result<Vec<u8>> {
    if strings.is_empty() {
        return Err(Error::OutOfSpace);
    }
    if strings.len() as u32 > MAX_ENTRIES {
        return Err(Error::OutOfSpace);
    }

    let leaves = count_frequencies(strings);
    if leaves.len() < 2 {
        return Err(Error::DictTooLarge);
    }

    let tree = build_tree(leaves);
    let nodes = linearize(&tree);
    let codes = build_codes(&nodes)?;

    let nentries = strings.len() as u32;
    let index_table_size = 3 * nentries;

    let mut messages = Vec::new();
    let mut first_emit: HashMap<&[u8], u32> = HashMap::new();
    let mut offsets = Vec::with_capacity(strings.len());

    for s in strings {
        if let Some(&offs) = first_emit.get(s.as_slice()) {
            offsets.push(offs);
            continue;
        }

        let rel_offset = index_table_size + messages.len() as u32;
        if rel_offset > 0x00FF_FFFF {
            return Err(Error::OffsetOverflow(rel_offset));
        }

        let mut writer = BitWriter::new();
        for &b in s.iter().chain(std::iter::once(&0u8)) {
            let (code, len) = codes.get(&b).copied().ok_or(Error::DictTooLarge)?;
            writer.write_bits(code as u32, len);
        }
        messages.extend(writer.finish());

        first_emit.insert(s.as_slice(), rel_offset);
        offsets.push(rel_offset);
    }

    let header = Header { dict_offs: super::HEADER_SIZE, msgs_offs: super::HEADER_SIZE + NODE_SIZE * nodes.len() as u32, nentries };

    let mut out = Vec::new();
    header.write(&mut out);
    for node in &nodes {
        node.write(&mut out);
    }
    for offs in &offsets {
        out.extend_from_slice(&offs.to_le_bytes()[..3]);
    }
    out.extend_from_slice(&messages);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strtab::decode_index;

    #[test]
    fn round_trips_simple_string() {
        let strtab = make_strtab(&[b"AB".to_vec()]).unwrap();
        assert_eq!(decode_index(&strtab, 0, 512).unwrap(), b"AB");
    }

    #[test]
    fn dictionary_satisfies_left_child_invariant() {
        let strtab = make_strtab(&[b"hello world".to_vec(), b"goodbye".to_vec()]).unwrap();
        let header = Header::read(&strtab).unwrap();
        let mut rel = 0u32;
        loop {
            match DictNode::read(&strtab, header.dict_offs, rel).unwrap() {
                DictNode::Leaf { .. } => break,
                DictNode::Internal { offs_l, .. } => {
                    assert_eq!(offs_l, rel + NODE_SIZE);
                    rel = offs_l;
                }
            }
        }
    }

    #[test]
    fn duplicate_messages_share_one_emission() {
        let strtab = make_strtab(&[b"AB".to_vec(), b"AB".to_vec()]).unwrap();
        let header = Header::read(&strtab).unwrap();
        let offs0 = &strtab[header.msgs_offs as usize..header.msgs_offs as usize + 3];
        let offs1 = &strtab[header.msgs_offs as usize + 3..header.msgs_offs as usize + 6];
        assert_eq!(offs0, offs1);
    }

    #[test]
    fn single_distinct_byte_is_rejected() {
        // Only "\0" itself would be a distinct byte once the implicit
        // terminator is added to an already-empty string; with one string of
        // all the same byte plus its terminator there are exactly two
        // distinct bytes, so force the degenerate one-leaf case by passing a
        // string whose body is empty.
        let result = make_strtab(&[Vec::new()]);
        assert!(matches!(result, Err(Error::DictTooLarge)));
    }

    #[test]
    fn every_message_offset_fits_in_three_bytes() {
        let strings: Vec<Vec<u8>> = (0..50).map(|i| format!("line {i}").into_bytes()).collect();
        let strtab = make_strtab(&strings).unwrap();
        for i in 0..strings.len() {
            assert!(decode_index(&strtab, i as u32, 512).is_ok());
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(make_strtab(&[]), Err(Error::OutOfSpace)));
    }
}
