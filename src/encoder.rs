/// Thumb load/store instruction encoder.
///
/// Builds 16-bit Thumb words for the immediate-offset load/store forms:
///
/// - byte and word: `011 B L imm5 Rb Rd` (bit 12 = B, bit 11 = L)
/// - halfword:      `1000 L imm5 Rb Rd`
///
/// `offset` is the raw imm5 field, counted in units of the access width:
/// bytes for byte access, halfwords for halfword access, words for word
/// access. Registers are low registers (r0-r7).
///
/// Everything here is `const fn` so the test registry can be built at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    LoadByte,
    StoreByte,
    LoadHalf,
    StoreHalf,
    LoadWord,
    StoreWord,
}

impl AccessKind {
    pub const ALL: [AccessKind; 6] = [
        AccessKind::LoadByte,
        AccessKind::StoreByte,
        AccessKind::LoadHalf,
        AccessKind::StoreHalf,
        AccessKind::LoadWord,
        AccessKind::StoreWord,
    ];

    pub const fn is_store(self) -> bool {
        matches!(
            self,
            AccessKind::StoreByte | AccessKind::StoreHalf | AccessKind::StoreWord
        )
    }

    /// Access width in bytes. The imm5 field is scaled by this.
    pub const fn width_bytes(self) -> u32 {
        match self {
            AccessKind::LoadByte | AccessKind::StoreByte => 1,
            AccessKind::LoadHalf | AccessKind::StoreHalf => 2,
            AccessKind::LoadWord | AccessKind::StoreWord => 4,
        }
    }

    /// True for the narrow forms the test batteries are built from.
    pub const fn is_narrow(self) -> bool {
        self.width_bytes() < 4
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            AccessKind::LoadByte => "ldrb",
            AccessKind::StoreByte => "strb",
            AccessKind::LoadHalf => "ldrh",
            AccessKind::StoreHalf => "strh",
            AccessKind::LoadWord => "ldr",
            AccessKind::StoreWord => "str",
        }
    }
}

const LOW_REG_MASK: u16 = 0x7;
const IMM5_MASK: u16 = 0x1F;

/// Encode `<kind> rD, [rB, #offset * width]`.
///
/// Register numbers must be 0-7 and `offset` must fit in five bits.
/// Anything else is a caller bug; debug builds panic, release builds mask
/// the fields.
pub const fn encode(kind: AccessKind, rd: u8, rb: u8, offset: u8) -> u16 {
    debug_assert!(rd < 8 && rb < 8, "Thumb load/store takes low registers only");
    debug_assert!(offset < 32, "imm5 offset out of range");

    let rd = rd as u16 & LOW_REG_MASK;
    let rb = rb as u16 & LOW_REG_MASK;
    let imm5 = offset as u16 & IMM5_MASK;
    let load = (!kind.is_store()) as u16;

    let opcode = match kind {
        AccessKind::LoadByte | AccessKind::StoreByte => (0b011 << 13) | (1 << 12) | (load << 11),
        AccessKind::LoadWord | AccessKind::StoreWord => (0b011 << 13) | (load << 11),
        AccessKind::LoadHalf | AccessKind::StoreHalf => (0b1000 << 12) | (load << 11),
    };
    opcode | (imm5 << 6) | (rb << 3) | rd
}

/// Encode `bx rS` for any of r0-r15.
pub const fn encode_bx(rs: u8) -> u16 {
    debug_assert!(rs < 16, "register out of range");
    0x4700 | ((rs as u16 & 0xF) << 3)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::cpu::{Op, decode};
    use proptest::prelude::*;

    fn any_kind() -> impl Strategy<Value = AccessKind> {
        prop::sample::select(AccessKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn decoder_recovers_fields(kind in any_kind(), rd in 0u8..8, rb in 0u8..8, offset in 0u8..32) {
            let word = encode(kind, rd, rb, offset);
            prop_assert_eq!(decode(word), Op::LoadStore { kind, rd, rb, offset });
        }

        #[test]
        fn distinct_inputs_distinct_words(
            a in (any_kind(), 0u8..8, 0u8..8, 0u8..8),
            b in (any_kind(), 0u8..8, 0u8..8, 0u8..8),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(encode(a.0, a.1, a.2, a.3), encode(b.0, b.1, b.2, b.3));
        }
    }
}
