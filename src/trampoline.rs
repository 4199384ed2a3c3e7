use serde::Serialize;

use crate::error::TargetError;
use crate::payload::{self, PAYLOAD_LEN};
use crate::registry::TestCase;

/// Unmapped address the probe instruction reads through r1. Bits 0-1 are
/// `0b10`, so the word load rotates the open-bus value by 16.
pub const BAD_ADDRESS: u32 = 0xABAD_1DEA;

/// Link address handed to the payload. Even, so `bx lr` leaves Thumb state
/// and the call is over.
pub const HOST_RETURN: u32 = 0x0800_0100;

/// Register setup for one call into an installed payload.
///
/// | reg | value |
/// |-----|-------|
/// | r0  | `location + DATA_OFFSET` (subject of the patched access; result on return) |
/// | r1  | [`BAD_ADDRESS`] |
/// | r2  | `location \| 1` (entry, Thumb state) |
/// | r3  | case input byte (stored by `strb`/`strh` patches) |
/// | lr  | [`HOST_RETURN`] |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub entry: u32,
    pub subject: u32,
    pub aux: u32,
    pub arg: u32,
    pub ret: u32,
}

impl CallFrame {
    pub fn for_location(location: u32, input: u8) -> Self {
        Self {
            entry: location | 1,
            subject: location.wrapping_add(payload::DATA_OFFSET as u32),
            aux: BAD_ADDRESS,
            arg: input as u32,
            ret: HOST_RETURN,
        }
    }
}

/// Memory a payload can be installed into and executed from.
///
/// Implementations must make a `write` at `A` visible to a later `call`
/// that executes or reads `A`.
pub trait Target {
    /// Copy `bytes` to `addr`.
    fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<(), TargetError>;

    /// Transfer control to `frame.entry` and return r0 once the payload
    /// branches back to `frame.ret`.
    fn call(&mut self, frame: &CallFrame) -> Result<u32, TargetError>;

    /// Read a word without executing anything.
    fn read_word(&mut self, addr: u32) -> Result<u32, TargetError>;
}

/// A freshly installed payload, ready to run exactly once.
///
/// The only way to get one is [`install`], and [`Armed::fire`] consumes
/// it, so every call is preceded by a full re-copy of the template.
#[must_use = "an installed payload does nothing until fired"]
pub struct Armed<'t, T: Target + ?Sized> {
    target: &'t mut T,
    location: u32,
}

/// Write the whole template to `location` with `patch` in the first slot.
pub fn install<T: Target + ?Sized>(
    target: &mut T,
    location: u32,
    patch: u16,
) -> Result<Armed<'_, T>, TargetError> {
    if location.checked_add(PAYLOAD_LEN as u32 - 1).is_none() {
        return Err(TargetError::Wraps {
            addr: location,
            len: PAYLOAD_LEN,
        });
    }
    target.write(location, &payload::patched(patch))?;
    Ok(Armed { target, location })
}

impl<T: Target + ?Sized> Armed<'_, T> {
    pub fn location(&self) -> u32 {
        self.location
    }

    /// Run the payload with `input` in r3 and return the final r0.
    pub fn fire(self, input: u8) -> Result<u32, TargetError> {
        let frame = CallFrame::for_location(self.location, input);
        self.target.call(&frame)
    }
}

/// Outcome of one case. A mismatch is information, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub actual: u32,
    pub passed: bool,
}

impl RunResult {
    pub fn compare(actual: u32, expected: u32) -> Self {
        Self {
            actual,
            passed: actual == expected,
        }
    }
}

/// Install, patch, call, compare.
pub fn run_case<T: Target + ?Sized>(target: &mut T, case: &TestCase) -> Result<RunResult, TargetError> {
    let actual = install(target, case.location, case.patch)?.fire(case.input)?;
    Ok(RunResult::compare(actual, case.expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every write and call instead of executing anything.
    #[derive(Default)]
    struct Recorder {
        writes: Vec<(u32, Vec<u8>)>,
        calls: Vec<CallFrame>,
    }

    impl Target for Recorder {
        fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<(), TargetError> {
            self.writes.push((addr, bytes.to_vec()));
            Ok(())
        }

        fn call(&mut self, frame: &CallFrame) -> Result<u32, TargetError> {
            self.calls.push(*frame);
            Ok(frame.arg)
        }

        fn read_word(&mut self, _addr: u32) -> Result<u32, TargetError> {
            Ok(0)
        }
    }

    #[test]
    fn frame_for_aligned_location() {
        let frame = CallFrame::for_location(0x0300_4000, 0x22);
        assert_eq!(frame.entry, 0x0300_4001);
        assert_eq!(frame.subject, 0x0300_4016);
        assert_eq!(frame.aux, 0xABAD_1DEA);
        assert_eq!(frame.arg, 0x22);
        assert_eq!(frame.ret & 1, 0);
    }

    #[test]
    fn frame_for_unaligned_location() {
        let frame = CallFrame::for_location(0x0300_4102, 0);
        assert_eq!(frame.entry, 0x0300_4103);
        assert_eq!(frame.subject, 0x0300_4118);
        assert_eq!(frame.subject & 3, 0);
    }

    #[test]
    fn install_writes_full_template_then_fire_calls() {
        let mut rec = Recorder::default();
        let armed = install(&mut rec, 0x0300_4000, 0x71C3).unwrap();
        assert_eq!(armed.location(), 0x0300_4000);
        assert_eq!(armed.fire(0x88).unwrap(), 0x88);

        assert_eq!(rec.writes.len(), 1);
        assert_eq!(rec.writes[0].0, 0x0300_4000);
        assert_eq!(rec.writes[0].1, payload::patched(0x71C3).to_vec());
        assert_eq!(rec.calls, vec![CallFrame::for_location(0x0300_4000, 0x88)]);
    }

    #[test]
    fn run_case_reinstalls_every_time() {
        let mut rec = Recorder::default();
        let case = TestCase {
            title: "probe",
            patch: 0x7880,
            location: 0x0300_4000,
            expected: 0x33,
            input: 0x33,
        };
        assert_eq!(run_case(&mut rec, &case).unwrap(), RunResult { actual: 0x33, passed: true });
        assert_eq!(run_case(&mut rec, &case).unwrap(), RunResult { actual: 0x33, passed: true });
        assert_eq!(rec.writes.len(), 2);
        assert_eq!(rec.calls.len(), 2);
    }

    #[test]
    fn wrapping_location_is_refused() {
        let mut rec = Recorder::default();
        let err = install(&mut rec, 0xFFFF_FFF0, 0).err();
        assert_eq!(err, Some(TargetError::Wraps { addr: 0xFFFF_FFF0, len: PAYLOAD_LEN }));
        assert!(rec.writes.is_empty());
    }

    #[test]
    fn payload_may_end_on_last_address() {
        let mut rec = Recorder::default();
        let last_fit = u32::MAX - (PAYLOAD_LEN as u32 - 1);
        assert!(install(&mut rec, last_fit, 0).is_ok());
        assert_eq!(
            install(&mut rec, last_fit + 1, 0).err(),
            Some(TargetError::Wraps { addr: last_fit + 1, len: PAYLOAD_LEN })
        );
        assert_eq!(rec.writes.len(), 1);
    }

    #[test]
    fn mismatch_is_not_an_error() {
        let result = RunResult::compare(0x4770_FEED, 0x4733_FEED);
        assert!(!result.passed);
        assert_eq!(result.actual, 0x4770_FEED);
    }
}
