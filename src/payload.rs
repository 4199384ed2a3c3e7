use crate::cpu::{Op, decode};
use crate::encoder::{AccessKind, encode, encode_bx};

pub const PAYLOAD_LEN: usize = 36;

pub const PATCH_OFFSET: usize = 0;
pub const PROBE_OFFSET: usize = 2;
pub const RETURN_OFFSET: usize = 4;
pub const FILLER_OFFSET: usize = 6;
pub const DATA_OFFSET: usize = 0x16;

/// Placeholder in the patch slot: `ldrb r0, [r0, #2]`.
pub const DEFAULT_PATCH: u16 = encode(AccessKind::LoadByte, 0, 0, 2);
pub const PROBE: u16 = encode(AccessKind::LoadWord, 0, 1, 0);
pub const RETURN: u16 = encode_bx(14);

const FILLER: [u8; 2] = [0xED, 0xFE];
pub const DATA: [u8; PAYLOAD_LEN - DATA_OFFSET] = [
    0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0xBB, 0xAA, 0xDD, 0xCC, 0xFF, 0xEE,
];

/// The relocatable probe program, copied in full before every case.
///
/// ```text
/// 0x00  patch slot          <- per-case load/store, r0 = data, r3 = input
/// 0x02  ldr r0, [r1]        r1 = unmapped address, reads the open bus
/// 0x04  bx lr
/// 0x06  ED FE x 8           filler
/// 0x16  11 22 33 44 55 66 77 88 BB AA DD CC FF EE
/// ```
///
/// Installed at a word-aligned address the code slots sit on lanes 0/2/0
/// and the data starts on lane 2; installed two bytes later everything
/// shifts by one halfword lane. No two adjacent data bytes are equal so any
/// byte that shows up on the bus can be traced back to its source.
pub const TEMPLATE: [u8; PAYLOAD_LEN] = template();

const fn put_half(bytes: &mut [u8; PAYLOAD_LEN], offset: usize, word: u16) {
    let le = word.to_le_bytes();
    bytes[offset] = le[0];
    bytes[offset + 1] = le[1];
}

/// Build the unpatched template.
pub const fn template() -> [u8; PAYLOAD_LEN] {
    let mut bytes = [0u8; PAYLOAD_LEN];
    put_half(&mut bytes, PATCH_OFFSET, DEFAULT_PATCH);
    put_half(&mut bytes, PROBE_OFFSET, PROBE);
    put_half(&mut bytes, RETURN_OFFSET, RETURN);

    let mut i = FILLER_OFFSET;
    while i < DATA_OFFSET {
        bytes[i] = FILLER[(i - FILLER_OFFSET) % 2];
        i += 1;
    }
    let mut j = 0;
    while j < DATA.len() {
        bytes[DATA_OFFSET + j] = DATA[j];
        j += 1;
    }
    bytes
}

/// A fresh copy of the template with `patch` in the first slot.
pub fn patched(patch: u16) -> [u8; PAYLOAD_LEN] {
    let mut bytes = TEMPLATE;
    put_half(&mut bytes, PATCH_OFFSET, patch);
    bytes
}

/// Render the three code slots of an installed payload, one per line.
pub fn disassemble(bytes: &[u8], base: u32) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for slot in [PATCH_OFFSET, PROBE_OFFSET, RETURN_OFFSET] {
        let Some(pair) = bytes.get(slot..slot + 2) else {
            break;
        };
        let word = u16::from_le_bytes([pair[0], pair[1]]);
        let addr = base.wrapping_add(slot as u32);
        let text = match decode(word) {
            Op::LoadStore { kind, rd, rb, offset } => format!(
                "{} r{rd}, [r{rb}, #{}]",
                kind.mnemonic(),
                offset as u32 * kind.width_bytes()
            ),
            Op::BranchExchange { rs: 14 } => "bx lr".to_string(),
            Op::BranchExchange { rs } => format!("bx r{rs}"),
            Op::Undefined(_) => "???".to_string(),
        };
        let _ = writeln!(out, "{addr:08X}: {word:04X}  {text}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_bytes() {
        assert_eq!(
            TEMPLATE,
            [
                0x80, 0x78, 0x08, 0x68, 0x70, 0x47, //
                0xED, 0xFE, 0xED, 0xFE, 0xED, 0xFE, 0xED, 0xFE, //
                0xED, 0xFE, 0xED, 0xFE, 0xED, 0xFE, 0xED, 0xFE, //
                0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, //
                0xBB, 0xAA, 0xDD, 0xCC, 0xFF, 0xEE,
            ]
        );
    }

    #[test]
    fn data_bytes_are_recognizable() {
        for pair in DATA.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        for b in DATA {
            assert!(!FILLER.contains(&b), "{b:#04x} collides with filler");
        }
    }

    #[test]
    fn patch_touches_only_first_slot() {
        let bytes = patched(0x71C3);
        assert_eq!(&bytes[..2], &[0xC3, 0x71]);
        assert_eq!(&bytes[2..], &TEMPLATE[2..]);
    }

    #[test]
    fn disassembly() {
        let text = disassemble(&patched(encode(AccessKind::LoadHalf, 0, 0, 3)), 0x0300_4000);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "03004000: 88C0  ldrh r0, [r0, #6]",
                "03004002: 6808  ldr r0, [r1, #0]",
                "03004004: 4770  bx lr",
            ]
        );
    }

    #[test]
    fn disassemble_short_buffer() {
        assert_eq!(disassemble(&[0x70, 0x47], 0).lines().count(), 1);
        assert!(disassemble(&[], 0).is_empty());
    }
}
