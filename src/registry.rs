use serde::Serialize;

use crate::bus::{Bus, IWRAM_SIZE};
use crate::cpu::{Op, decode};
use crate::encoder::AccessKind::{LoadByte, LoadHalf, StoreByte};
use crate::encoder::{AccessKind, encode};
use crate::payload::PAYLOAD_LEN;

/// Installing here puts the data region at `0x0300_4016`, lane 2.
pub const ALIGNED: u32 = 0x0300_4000;
/// Installing here puts the data region at `0x0300_4118`, lane 0.
pub const UNALIGNED: u32 = 0x0300_4102;

/// Register that carries the input byte into the payload.
pub const INPUT_REG: u8 = 3;

/// One measured experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub title: &'static str,
    /// Thumb word written into the payload's first slot.
    pub patch: u16,
    /// Where the payload is installed.
    pub location: u32,
    /// r0 as measured on hardware.
    pub expected: u32,
    /// Value placed in r3. Only store patches look at it.
    pub input: u8,
}

impl TestCase {
    const fn load(title: &'static str, kind: AccessKind, offset: u8, location: u32, expected: u32) -> Self {
        Self {
            title,
            patch: encode(kind, 0, 0, offset),
            location,
            expected,
            input: 0,
        }
    }

    const fn store(
        title: &'static str,
        kind: AccessKind,
        offset: u8,
        location: u32,
        expected: u32,
        input: u8,
    ) -> Self {
        Self {
            title,
            patch: encode(kind, INPUT_REG, 0, offset),
            location,
            expected,
            input,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Battery {
    pub title: &'static str,
    pub cases: &'static [TestCase],
}

static LDRB: [TestCase; 16] = [
    TestCase::load("LDRB #0 A", LoadByte, 0, ALIGNED, 0x4770_FEED),
    TestCase::load("LDRB #1 A", LoadByte, 1, ALIGNED, 0x4770_FEED),
    TestCase::load("LDRB #2 A", LoadByte, 2, ALIGNED, 0x4733_FEED),
    TestCase::load("LDRB #3 A", LoadByte, 3, ALIGNED, 0x4470_FEED),
    TestCase::load("LDRB #4 A", LoadByte, 4, ALIGNED, 0x4770_FEED),
    TestCase::load("LDRB #5 A", LoadByte, 5, ALIGNED, 0x4770_FEED),
    TestCase::load("LDRB #6 A", LoadByte, 6, ALIGNED, 0x4777_FEED),
    TestCase::load("LDRB #7 A", LoadByte, 7, ALIGNED, 0x8870_FEED),
    TestCase::load("LDRB #0 U", LoadByte, 0, UNALIGNED, 0xFEED_4770),
    TestCase::load("LDRB #1 U", LoadByte, 1, UNALIGNED, 0xFEED_4770),
    TestCase::load("LDRB #2 U", LoadByte, 2, UNALIGNED, 0xFEED_4733),
    TestCase::load("LDRB #3 U", LoadByte, 3, UNALIGNED, 0xFEED_4470),
    TestCase::load("LDRB #4 U", LoadByte, 4, UNALIGNED, 0xFEED_4770),
    TestCase::load("LDRB #5 U", LoadByte, 5, UNALIGNED, 0xFEED_4770),
    TestCase::load("LDRB #6 U", LoadByte, 6, UNALIGNED, 0xFEED_4777),
    TestCase::load("LDRB #7 U", LoadByte, 7, UNALIGNED, 0xFEED_8870),
];

// The input bytes equal the data bytes at each offset, so a lane that
// shows the input cannot be told apart from one that shows the old data.
// Offset 0 leaves the observed word untouched; that is measured, not a typo.
static STRB: [TestCase; 16] = [
    TestCase::store("STRB #0 A", StoreByte, 0, ALIGNED, 0x4770_FEED, 0x11),
    TestCase::store("STRB #1 A", StoreByte, 1, ALIGNED, 0x4770_FEED, 0x22),
    TestCase::store("STRB #2 A", StoreByte, 2, ALIGNED, 0x4733_FEED, 0x33),
    TestCase::store("STRB #3 A", StoreByte, 3, ALIGNED, 0x4470_FEED, 0x44),
    TestCase::store("STRB #4 A", StoreByte, 4, ALIGNED, 0x4770_FEED, 0x55),
    TestCase::store("STRB #5 A", StoreByte, 5, ALIGNED, 0x4770_FEED, 0x66),
    TestCase::store("STRB #6 A", StoreByte, 6, ALIGNED, 0x4777_FEED, 0x77),
    TestCase::store("STRB #7 A", StoreByte, 7, ALIGNED, 0x8870_FEED, 0x88),
    TestCase::store("STRB #0 U", StoreByte, 0, UNALIGNED, 0xFEED_4770, 0x11),
    TestCase::store("STRB #1 U", StoreByte, 1, UNALIGNED, 0xFEED_4770, 0x22),
    TestCase::store("STRB #2 U", StoreByte, 2, UNALIGNED, 0xFEED_4733, 0x33),
    TestCase::store("STRB #3 U", StoreByte, 3, UNALIGNED, 0xFEED_4470, 0x44),
    TestCase::store("STRB #4 U", StoreByte, 4, UNALIGNED, 0xFEED_4770, 0x55),
    TestCase::store("STRB #5 U", StoreByte, 5, UNALIGNED, 0xFEED_4770, 0x66),
    TestCase::store("STRB #6 U", StoreByte, 6, UNALIGNED, 0xFEED_4777, 0x77),
    TestCase::store("STRB #7 U", StoreByte, 7, UNALIGNED, 0xFEED_8870, 0x88),
];

// #7 reads the halfword just past the payload, which is never written.
static LDRH: [TestCase; 16] = [
    TestCase::load("LDRH #0 A", LoadHalf, 0, ALIGNED, 0x4770_FEED),
    TestCase::load("LDRH #1 A", LoadHalf, 1, ALIGNED, 0x4433_FEED),
    TestCase::load("LDRH #2 A", LoadHalf, 2, ALIGNED, 0x4770_FEED),
    TestCase::load("LDRH #3 A", LoadHalf, 3, ALIGNED, 0x8877_FEED),
    TestCase::load("LDRH #4 A", LoadHalf, 4, ALIGNED, 0x4770_FEED),
    TestCase::load("LDRH #5 A", LoadHalf, 5, ALIGNED, 0xCCDD_FEED),
    TestCase::load("LDRH #6 A", LoadHalf, 6, ALIGNED, 0x4770_FEED),
    TestCase::load("LDRH #7 A", LoadHalf, 7, ALIGNED, 0x0000_FEED),
    TestCase::load("LDRH #0 U", LoadHalf, 0, UNALIGNED, 0xFEED_4770),
    TestCase::load("LDRH #1 U", LoadHalf, 1, UNALIGNED, 0xFEED_4433),
    TestCase::load("LDRH #2 U", LoadHalf, 2, UNALIGNED, 0xFEED_4770),
    TestCase::load("LDRH #3 U", LoadHalf, 3, UNALIGNED, 0xFEED_8877),
    TestCase::load("LDRH #4 U", LoadHalf, 4, UNALIGNED, 0xFEED_4770),
    TestCase::load("LDRH #5 U", LoadHalf, 5, UNALIGNED, 0xFEED_CCDD),
    TestCase::load("LDRH #6 U", LoadHalf, 6, UNALIGNED, 0xFEED_4770),
    TestCase::load("LDRH #7 U", LoadHalf, 7, UNALIGNED, 0xFEED_0000),
];

pub static REGISTRY: &[Battery] = &[
    Battery {
        title: "IWRAM OPEN BUS - LDRB",
        cases: &LDRB,
    },
    Battery {
        title: "IWRAM OPEN BUS - STRB",
        cases: &STRB,
    },
    Battery {
        title: "IWRAM OPEN BUS - LDRH",
        cases: &LDRH,
    },
];

/// Total number of cases across `batteries`.
pub fn case_count(batteries: &[Battery]) -> usize {
    batteries.iter().map(|b| b.cases.len()).sum()
}

/// A case that cannot be run as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub title: &'static str,
    pub reason: String,
}

/// Check every case against the authoring rules:
///
/// - the patch is a byte/halfword load or store based on r0 with an
///   immediate field in `0..=7`,
/// - the payload fits in IWRAM at `location` without wrapping.
pub fn validate(batteries: &[Battery]) -> Vec<Violation> {
    let mut out = Vec::new();
    for case in batteries.iter().flat_map(|b| b.cases.iter()) {
        if let Err(reason) = check_case(case) {
            out.push(Violation {
                title: case.title,
                reason,
            });
        }
    }
    out
}

fn check_case(case: &TestCase) -> Result<(), String> {
    match decode(case.patch) {
        Op::LoadStore { kind, rb, offset, .. } => {
            if !kind.is_narrow() {
                return Err(format!("{} is not a byte or halfword access", kind.mnemonic()));
            }
            if rb != 0 {
                return Err(format!("base register r{rb}, expected r0"));
            }
            if offset > 7 {
                return Err(format!("offset {offset} outside 0..=7"));
            }
        }
        other => return Err(format!("patch {:#06x} decodes to {other:?}", case.patch)),
    }

    let start = Bus::iwram_offset(case.location)
        .ok_or_else(|| format!("location {:#010x} is outside IWRAM", case.location))?;
    if start + PAYLOAD_LEN > IWRAM_SIZE {
        return Err(format!("payload at {:#010x} wraps the IWRAM mirror", case.location));
    }
    Ok(())
}
