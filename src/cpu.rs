use thiserror::Error;

use crate::bus::{Bus, Width};
use crate::encoder::AccessKind;

/// A Thumb-state ARM7TDMI core, reduced to what the payload executes.
///
/// Supported instructions:
/// - `ldr/str/ldrb/strb rD, [rB, #imm5]` (format 9)
/// - `ldrh/strh rD, [rB, #imm5]` (format 10)
/// - `bx rS` (format 5)
///
/// Everything else decodes as [`Op::Undefined`] and stops execution.
///
/// The three-stage pipeline matters here because instruction fetches go over
/// the same data bus as loads and stores, and the open-bus latch records
/// whichever was last. While the instruction at `pc` executes, the core has
/// already fetched `pc + 2` and fetches `pc + 4` before any data access the
/// instruction makes. Reading r15 yields `pc + 4`.
///
/// A call ends when `bx` jumps to the address that was in lr on entry.
pub struct Cpu {
    pub regs: [u32; 16],
}

pub const LR: usize = 14;
pub const PC: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    LoadStore {
        kind: AccessKind,
        rd: u8,
        rb: u8,
        offset: u8,
    },
    BranchExchange {
        rs: u8,
    },
    Undefined(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("undefined instruction {word:#06x} at {pc:#010x}")]
    Undefined { pc: u32, word: u16 },
    #[error("branch to ARM state at {target:#010x} from {pc:#010x}")]
    ArmState { pc: u32, target: u32 },
    #[error("no return after {limit} steps")]
    StepLimit { limit: usize },
}

/// Decode a Thumb word into the handful of forms the core understands.
pub fn decode(word: u16) -> Op {
    let rd = (word & 0x7) as u8;
    let rb = ((word >> 3) & 0x7) as u8;
    let offset = ((word >> 6) & 0x1F) as u8;
    let load = word & (1 << 11) != 0;

    if word >> 13 == 0b011 {
        let byte = word & (1 << 12) != 0;
        let kind = match (byte, load) {
            (true, true) => AccessKind::LoadByte,
            (true, false) => AccessKind::StoreByte,
            (false, true) => AccessKind::LoadWord,
            (false, false) => AccessKind::StoreWord,
        };
        return Op::LoadStore { kind, rd, rb, offset };
    }
    if word >> 12 == 0b1000 {
        let kind = if load {
            AccessKind::LoadHalf
        } else {
            AccessKind::StoreHalf
        };
        return Op::LoadStore { kind, rd, rb, offset };
    }
    // BX only; H1 set would be BLX, which this core predates.
    if word & 0xFF87 == 0x4700 {
        return Op::BranchExchange {
            rs: ((word >> 3) & 0xF) as u8,
        };
    }
    Op::Undefined(word)
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self { regs: [0; 16] }
    }

    /// Branch-exchange into `entry` and run until control returns to lr.
    ///
    /// Returns the number of instructions executed. The caller reads the
    /// result out of `regs` afterwards.
    pub fn call(&mut self, bus: &mut Bus, entry: u32, step_limit: usize) -> Result<usize, ExecError> {
        let ret = self.regs[LR];
        if entry & 1 == 0 {
            return Err(ExecError::ArmState {
                pc: ret,
                target: entry,
            });
        }

        let mut pc = entry & !1;
        let mut decoded = bus.fetch_half(pc);
        let mut fetched = bus.fetch_half(pc.wrapping_add(2));
        let mut steps = 0;

        loop {
            if steps >= step_limit {
                return Err(ExecError::StepLimit { limit: step_limit });
            }
            steps += 1;
            self.regs[PC] = pc.wrapping_add(4);

            let prefetched = bus.fetch_half(pc.wrapping_add(4));
            let op = decode(decoded);
            tracing::trace!(pc = format_args!("{pc:#010x}"), word = format_args!("{decoded:#06x}"), ?op, "step");

            match op {
                Op::LoadStore { kind, rd, rb, offset } => {
                    self.load_store(bus, kind, rd as usize, rb as usize, offset);
                }
                Op::BranchExchange { rs } => {
                    let target = self.regs[rs as usize];
                    if target == ret {
                        return Ok(steps);
                    }
                    if target & 1 == 0 {
                        return Err(ExecError::ArmState { pc, target });
                    }
                    pc = target & !1;
                    decoded = bus.fetch_half(pc);
                    fetched = bus.fetch_half(pc.wrapping_add(2));
                    continue;
                }
                Op::Undefined(word) => return Err(ExecError::Undefined { pc, word }),
            }

            pc = pc.wrapping_add(2);
            decoded = fetched;
            fetched = prefetched;
        }
    }

    fn load_store(&mut self, bus: &mut Bus, kind: AccessKind, rd: usize, rb: usize, offset: u8) {
        let addr = self.regs[rb].wrapping_add(offset as u32 * kind.width_bytes());
        match kind {
            AccessKind::LoadByte => self.regs[rd] = bus.read(addr, Width::Byte),
            // Misaligned halfword and word loads rotate the aligned value.
            AccessKind::LoadHalf => {
                self.regs[rd] = bus.read(addr, Width::Half).rotate_right(8 * (addr & 1));
            }
            AccessKind::LoadWord => {
                self.regs[rd] = bus.read(addr, Width::Word).rotate_right(8 * (addr & 3));
            }
            AccessKind::StoreByte => bus.write(addr, Width::Byte, self.regs[rd]),
            AccessKind::StoreHalf => bus.write(addr, Width::Half, self.regs[rd]),
            AccessKind::StoreWord => bus.write(addr, Width::Word, self.regs[rd]),
        }
    }
}
