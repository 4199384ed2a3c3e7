pub const IWRAM_BASE: u32 = 0x0300_0000;
pub const IWRAM_SIZE: usize = 0x8000;

const REGION_SHIFT: u32 = 24;
const IWRAM_REGION: u32 = IWRAM_BASE >> REGION_SHIFT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }

    /// Mask of the lanes an access of this width at `addr` drives.
    fn lane_mask(self, addr: u32) -> u32 {
        match self {
            Width::Byte => 0xFF << (8 * (addr & 3)),
            Width::Half => 0xFFFF << (8 * (addr & 2)),
            Width::Word => 0xFFFF_FFFF,
        }
    }

    /// Shift of the lowest lane this access drives.
    fn lane_shift(self, addr: u32) -> u32 {
        match self {
            Width::Byte => 8 * (addr & 3),
            Width::Half => 8 * (addr & 2),
            Width::Word => 0,
        }
    }

    fn value_mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Half => 0xFFFF,
            Width::Word => 0xFFFF_FFFF,
        }
    }
}

/// Emulated GBA memory bus: 32 KiB of IWRAM plus open-bus behaviour.
///
/// IWRAM sits on a 32-bit data bus. Every access drives only the byte lanes
/// it touches (`addr & 3` for bytes, `addr & 2` for halfwords, all four for
/// words), and the bus keeps whatever was last driven on each lane. A read
/// from an address nothing decodes returns those latched lanes instead of
/// real data. That latch is the "open bus" value the harness measures.
///
/// Only the IWRAM region (`0x03xx_xxxx`, mirrored every 32 KiB) is backed
/// by memory. Everything else reads as open bus and drops writes.
pub struct Bus {
    iwram: Box<[u8]>,
    latch: u32,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Zero-filled IWRAM with an idle (all-zero) bus.
    pub fn new() -> Self {
        Self {
            iwram: vec![0u8; IWRAM_SIZE].into_boxed_slice(),
            latch: 0,
        }
    }

    /// Offset into IWRAM for `addr`, or `None` when nothing decodes it.
    pub fn iwram_offset(addr: u32) -> Option<usize> {
        if addr >> REGION_SHIFT == IWRAM_REGION {
            Some(addr as usize % IWRAM_SIZE)
        } else {
            None
        }
    }

    /// The value currently held on the four byte lanes.
    pub fn latch(&self) -> u32 {
        self.latch
    }

    /// Read `width` bytes at `addr`, force-aligned to the access width.
    ///
    /// The result is the raw bus value for the access, zero-extended. Any
    /// rotation a misaligned load applies is the CPU's business.
    pub fn read(&mut self, addr: u32, width: Width) -> u32 {
        let aligned = addr & !(width.bytes() - 1);
        let shift = width.lane_shift(aligned);
        match Self::iwram_offset(aligned) {
            Some(offset) => {
                let value = self.load_le(offset, width);
                self.drive(aligned, width, value);
                value
            }
            None => {
                let value = (self.latch >> shift) & width.value_mask();
                tracing::trace!(
                    addr = format_args!("{addr:#010x}"),
                    value = format_args!("{value:#x}"),
                    "open bus read"
                );
                value
            }
        }
    }

    /// Write the low `width` bytes of `value` at `addr`, force-aligned.
    ///
    /// The CPU drives the lanes whether or not anything decodes the
    /// address, so the latch updates even when the write is dropped.
    pub fn write(&mut self, addr: u32, width: Width, value: u32) {
        let aligned = addr & !(width.bytes() - 1);
        let value = value & width.value_mask();
        self.drive(aligned, width, value);
        if let Some(offset) = Self::iwram_offset(aligned) {
            let bytes = value.to_le_bytes();
            for (i, &b) in bytes.iter().take(width.bytes() as usize).enumerate() {
                self.iwram[(offset + i) % IWRAM_SIZE] = b;
            }
        }
    }

    /// Halfword instruction fetch. Uses the data bus like any other read.
    pub fn fetch_half(&mut self, addr: u32) -> u16 {
        self.read(addr, Width::Half) as u16
    }

    /// Inspect a word without touching the bus latch.
    pub fn peek_word(&self, addr: u32) -> Option<u32> {
        let offset = Self::iwram_offset(addr & !3)?;
        Some(self.load_le(offset, Width::Word))
    }

    fn load_le(&self, offset: usize, width: Width) -> u32 {
        let mut value = 0u32;
        for i in 0..width.bytes() as usize {
            value |= (self.iwram[(offset + i) % IWRAM_SIZE] as u32) << (8 * i);
        }
        value
    }

    fn drive(&mut self, aligned: u32, width: Width, value: u32) {
        let mask = width.lane_mask(aligned);
        let shift = width.lane_shift(aligned);
        self.latch = (self.latch & !mask) | ((value << shift) & mask);
    }
}
