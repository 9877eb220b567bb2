//! # Formatting Utilities
//!
//! Hex formatting for the console front end.

/// Formats bytes into a traditional hex + ASCII view.
///
/// `base` is the address printed for the first row; `width` bytes are shown
/// per row and clamped to `8..=32`.
pub fn format_hexdump(base: u64, bytes: &[u8], width: usize) -> String
{
    let width = width.clamp(8, 32);
    let mut out = String::new();
    for (offset, chunk) in bytes.chunks(width).enumerate() {
        let addr = base.saturating_add((offset * width) as u64);
        out.push_str(&format!("{addr:016x}: "));

        for i in 0..width {
            if i < chunk.len() {
                out.push_str(&format!("{:02x} ", chunk[i]));
            } else {
                out.push_str("   ");
            }
        }

        out.push(' ');
        for byte in chunk {
            let ch = if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            };
            out.push(ch);
        }
        out.push('\n');
    }
    out
}
