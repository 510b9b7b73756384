//! Shared `0x`-hex-or-decimal argument parsing for VMA/size CLI arguments.

pub fn parse_num(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("bad hex number {s:?}: {e}"))
    } else {
        s.parse::<u32>().map_err(|e| format!("bad number {s:?}: {e}"))
    }
}
