//! Opcode handler table: name, argument count, and variadic-text flag per
//! opcode, mirroring the original tool's `init_script_handlers` table for the
//! opcodes this crate distinguishes (see the Opcode semantics table in the
//! data model). Every other valid opcode gets the same generic entry the
//! original assigns by default before any override.

/// One opcode's static metadata. `name` is `None` for opcodes printed as
/// `OP_0xNN`; `has_va` marks opcodes whose arguments are formatted by
/// [`crate::script::disasm`] rather than printed as raw hex words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerEntry {
    pub name: Option<&'static str>,
    pub nargs: u8,
    pub has_va: bool,
}

const GENERIC: HandlerEntry = HandlerEntry { name: None, nargs: 2, has_va: false };

/// Looks up the static metadata for `op`. Opcodes outside `[0, OP_MAX)` still
/// return the generic entry; callers are responsible for bounds-checking `op`
/// against [`super::OP_MAX`] before deciding whether a command is valid.
pub fn handler_for(op: u16) -> HandlerEntry {
    match op {
        0x01 => HandlerEntry { name: Some("Jump"), nargs: 0, has_va: true },
        0x04..=0x06 => HandlerEntry { name: None, nargs: 0, has_va: true },
        0x0C => HandlerEntry { name: Some("ShowText"), nargs: 0, has_va: true },
        0x10 => HandlerEntry { name: Some("HandleInput"), nargs: 0, has_va: false },
        0x11 => HandlerEntry { name: Some("Choice"), nargs: 0, has_va: true },
        0x35 => HandlerEntry { name: Some("ChoiceIdx"), nargs: 0, has_va: true },
        0x00 | 0x07 => HandlerEntry { name: Some("Nop"), nargs: 0, has_va: false },
        _ => GENERIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, Some("Jump"))]
    #[case(0x0C, Some("ShowText"))]
    #[case(0x10, Some("HandleInput"))]
    #[case(0x11, Some("Choice"))]
    #[case(0x35, Some("ChoiceIdx"))]
    #[case(0, Some("Nop"))]
    #[case(7, Some("Nop"))]
    #[case(0x63, None)]
    fn names_match_known_opcodes(#[case] op: u16, #[case] expected: Option<&str>) {
        assert_eq!(handler_for(op).name, expected);
    }

    #[test]
    fn branch_family_has_no_name_but_is_variadic() {
        for op in 4..=6 {
            let h = handler_for(op);
            assert_eq!(h.name, None);
            assert!(h.has_va);
        }
    }
}
