use crate::io::KEY_A;

/// Configuration for the sweep loop.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// KEYINPUT bit that advances past a pause.
    pub key_mask: u16,
    /// Wait for the key after every battery page, not only after the summary.
    pub pause_between_batteries: bool,
    /// Stop `run` after this many sweeps (`None` loops forever).
    pub max_sweeps: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            key_mask: KEY_A,
            pause_between_batteries: true,
            max_sweeps: None,
        }
    }
}

/// Configuration for the emulated target.
#[derive(Debug, Clone, Copy)]
pub struct EmulatorConfig {
    /// Max instructions per call before the core gives up.
    pub step_limit: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self { step_limit: 1 << 8 }
    }
}
