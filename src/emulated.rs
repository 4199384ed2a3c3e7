use crate::bus::{Bus, IWRAM_SIZE, Width};
use crate::config::EmulatorConfig;
use crate::cpu::{Cpu, LR};
use crate::error::TargetError;
use crate::trampoline::{CallFrame, Target};

/// A [`Target`] backed by the emulated IWRAM bus and Thumb core.
///
/// Memory persists across calls, like the real region does, so store cases
/// leave their bytes behind until the next install overwrites them. The
/// core is fresh for every call.
pub struct EmulatedTarget {
    bus: Bus,
    config: EmulatorConfig,
}

impl Default for EmulatedTarget {
    fn default() -> Self {
        Self::new(EmulatorConfig::default())
    }
}

impl EmulatedTarget {
    pub fn new(config: EmulatorConfig) -> Self {
        Self {
            bus: Bus::new(),
            config,
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}

impl Target for EmulatedTarget {
    fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<(), TargetError> {
        let start = Bus::iwram_offset(addr).ok_or(TargetError::Unwritable { addr })?;
        if start + bytes.len() > IWRAM_SIZE {
            return Err(TargetError::Wraps {
                addr,
                len: bytes.len(),
            });
        }
        // Byte stores, the way a copy loop on the device would do it.
        for (i, &b) in bytes.iter().enumerate() {
            self.bus.write(addr + i as u32, Width::Byte, b as u32);
        }
        Ok(())
    }

    fn call(&mut self, frame: &CallFrame) -> Result<u32, TargetError> {
        let mut cpu = Cpu::new();
        cpu.regs[0] = frame.subject;
        cpu.regs[1] = frame.aux;
        cpu.regs[2] = frame.entry;
        cpu.regs[3] = frame.arg;
        cpu.regs[LR] = frame.ret;

        let steps = cpu.call(&mut self.bus, frame.entry, self.config.step_limit)?;
        tracing::trace!(
            entry = format_args!("{:#010x}", frame.entry),
            steps,
            r0 = format_args!("{:#010x}", cpu.regs[0]),
            "payload returned"
        );
        Ok(cpu.regs[0])
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, TargetError> {
        self.bus.peek_word(addr).ok_or(TargetError::Unwritable { addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{AccessKind, encode};
    use crate::payload::{DATA_OFFSET, TEMPLATE};
    use crate::registry::{ALIGNED, REGISTRY, UNALIGNED};
    use crate::trampoline::{install, run_case};

    #[test]
    fn every_registry_case_matches() {
        let mut target = EmulatedTarget::default();
        for battery in REGISTRY {
            for case in battery.cases {
                let result = run_case(&mut target, case).unwrap();
                assert_eq!(
                    result.actual, case.expected,
                    "{}: got {:#010x}, want {:#010x}",
                    case.title, result.actual, case.expected
                );
            }
        }
    }

    #[test]
    fn ldrb_2_aligned_and_unaligned() {
        let patch = encode(AccessKind::LoadByte, 0, 0, 2);
        let mut target = EmulatedTarget::default();
        assert_eq!(install(&mut target, ALIGNED, patch).unwrap().fire(0).unwrap(), 0x4733_FEED);
        assert_eq!(install(&mut target, UNALIGNED, patch).unwrap().fire(0).unwrap(), 0xFEED_4733);
    }

    #[test]
    fn probe_sees_latch_rotated() {
        let patch = encode(AccessKind::LoadByte, 0, 0, 3);
        let mut target = EmulatedTarget::default();
        let actual = install(&mut target, ALIGNED, patch).unwrap().fire(0).unwrap();
        assert_eq!(actual, 0x4470_FEED);
        // bx lr prefetched filler into lanes 0-1 after the probe read.
        assert_eq!(target.bus().latch(), 0xFEED_FEED);
    }

    #[test]
    fn strb_0_leaves_observed_word_alone() {
        let patch = encode(AccessKind::StoreByte, 3, 0, 0);
        let mut target = EmulatedTarget::default();
        assert_eq!(install(&mut target, ALIGNED, patch).unwrap().fire(0x11).unwrap(), 0x4770_FEED);
    }

    #[test]
    fn reinstall_is_idempotent() {
        let mut target = EmulatedTarget::default();
        for battery in REGISTRY {
            for case in battery.cases {
                let first = run_case(&mut target, case).unwrap();
                let second = run_case(&mut target, case).unwrap();
                assert_eq!(first, second, "{}", case.title);
            }
        }
    }

    #[test]
    fn store_lands_in_enclosing_word() {
        let mut target = EmulatedTarget::default();
        for location in [ALIGNED, UNALIGNED] {
            for offset in 0..8u8 {
                let input = 0xA0 | offset;
                let patch = encode(AccessKind::StoreByte, 3, 0, offset);
                install(&mut target, location, patch).unwrap().fire(input).unwrap();

                let addr = location + DATA_OFFSET as u32 + offset as u32;
                let word_addr = addr & !3;
                let word = target.read_word(word_addr).unwrap().to_le_bytes();
                for (lane, &got) in word.iter().enumerate() {
                    let byte_addr = word_addr + lane as u32;
                    let want = if byte_addr == addr {
                        input
                    } else {
                        // Everything else is still the template.
                        TEMPLATE[(byte_addr - location) as usize]
                    };
                    assert_eq!(got, want, "location {location:#x} offset {offset} lane {lane}");
                }
            }
        }
    }

    #[test]
    fn store_half_lands_in_memory() {
        let mut target = EmulatedTarget::default();
        let patch = encode(AccessKind::StoreHalf, 3, 0, 1);
        install(&mut target, ALIGNED, patch).unwrap().fire(0xBE).unwrap();
        // Data starts at 0x03004016; halfword #1 is 0x03004018.
        assert_eq!(target.read_word(0x0300_4018).unwrap(), 0x6655_00BE);
    }

    #[test]
    fn install_outside_iwram_fails() {
        let mut target = EmulatedTarget::default();
        assert_eq!(
            install(&mut target, 0x0200_0000, 0).err(),
            Some(TargetError::Unwritable { addr: 0x0200_0000 })
        );
        assert_eq!(
            install(&mut target, 0x0300_7FF0, 0).err(),
            Some(TargetError::Wraps { addr: 0x0300_7FF0, len: 36 })
        );
    }

    #[test]
    fn bad_patch_is_a_fault_not_a_panic() {
        let mut target = EmulatedTarget::default();
        // swi 0
        let err = install(&mut target, ALIGNED, 0xDF00).unwrap().fire(0).unwrap_err();
        assert!(matches!(err, TargetError::Exec(_)));
    }
}
