use tracing::{debug, error, info};

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::io::{Console, Keypad, wait_for_key};
use crate::registry::{Battery, TestCase};
use crate::report::{self, BatteryReport, CaseReport, RunTally, SweepReport};
use crate::trampoline::{Target, run_case};

/// Where the runner is in its cycle.
///
/// ```text
/// Setup -> RunBattery(0) [-> BatteryPause(0)] -> ... -> Report -> AwaitInput -> Setup
/// ```
///
/// There is no terminal state. `BatteryPause` only appears when the config
/// asks for a key press between battery pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Setup,
    RunBattery(usize),
    BatteryPause(usize),
    Report,
    AwaitInput,
}

pub struct Runner<'r, T, C, K> {
    target: T,
    console: C,
    keypad: K,
    registry: &'r [Battery],
    config: RunnerConfig,
    state: State,
    tally: RunTally,
    report: SweepReport,
    sweeps: u64,
}

impl<'r, T: Target, C: Console, K: Keypad> Runner<'r, T, C, K> {
    pub fn new(target: T, console: C, keypad: K, registry: &'r [Battery], config: RunnerConfig) -> Self {
        Self {
            target,
            console,
            keypad,
            registry,
            config,
            state: State::Setup,
            tally: RunTally::default(),
            report: SweepReport::default(),
            sweeps: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Tally of the current (or just finished) sweep.
    pub fn tally(&self) -> RunTally {
        self.tally
    }

    /// Number of sweeps that reached `Report`.
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    pub fn into_parts(self) -> (T, C, K) {
        (self.target, self.console, self.keypad)
    }

    /// Run exactly one sweep and return what it saw, without ever waiting
    /// on the keypad.
    pub fn sweep(&mut self) -> Result<SweepReport> {
        self.state = State::Setup;
        while self.state != State::AwaitInput {
            self.advance(false)?;
        }
        Ok(self.report.clone())
    }

    /// Sweep, report, wait for the key, repeat. Only returns on a
    /// collaborator failure or once `max_sweeps` sweeps have been reported.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if matches!(self.state, State::Setup | State::AwaitInput)
                && self.config.max_sweeps.is_some_and(|max| self.sweeps >= max)
            {
                return Ok(());
            }
            self.advance(true)?;
        }
    }

    /// Perform the work of the current state and move to the next one.
    pub fn advance(&mut self, interactive: bool) -> Result<State> {
        let next = match self.state {
            State::Setup => {
                self.tally = RunTally::default();
                self.report = SweepReport {
                    sweep: self.sweeps,
                    ..SweepReport::default()
                };
                self.first_battery()
            }
            State::RunBattery(i) => {
                self.run_battery(i)?;
                if interactive && self.config.pause_between_batteries {
                    State::BatteryPause(i)
                } else {
                    self.after_battery(i)
                }
            }
            State::BatteryPause(i) => {
                wait_for_key(&mut self.keypad, self.config.key_mask)?;
                self.after_battery(i)
            }
            State::Report => {
                self.report.tally = self.tally;
                self.console.clear()?;
                self.console.line(&report::summary_line(&self.tally))?;
                info!(
                    sweep = self.sweeps,
                    passed = self.tally.passed,
                    total = self.tally.total,
                    "sweep finished"
                );
                self.sweeps += 1;
                State::AwaitInput
            }
            State::AwaitInput => {
                wait_for_key(&mut self.keypad, self.config.key_mask)?;
                State::Setup
            }
        };
        self.state = next;
        Ok(next)
    }

    fn first_battery(&self) -> State {
        if self.registry.is_empty() {
            State::Report
        } else {
            State::RunBattery(0)
        }
    }

    fn after_battery(&self, i: usize) -> State {
        if i + 1 < self.registry.len() {
            State::RunBattery(i + 1)
        } else {
            State::Report
        }
    }

    fn run_battery(&mut self, index: usize) -> Result<()> {
        let battery = self.registry[index];
        self.console.clear()?;
        self.console
            .line(&report::header_line(battery.title, index, self.registry.len()))?;
        self.console.line("")?;

        let mut cases = Vec::with_capacity(battery.cases.len());
        for case in battery.cases {
            let case_report = self.run_one(case);
            self.tally.record(case_report.passed);
            self.console.line(&report::case_line(&case_report))?;
            cases.push(case_report);
        }
        self.report.batteries.push(BatteryReport {
            title: battery.title,
            cases,
        });
        Ok(())
    }

    fn run_one(&mut self, case: &TestCase) -> CaseReport {
        match run_case(&mut self.target, case) {
            Ok(result) => {
                debug!(
                    case = case.title,
                    actual = format_args!("{:#010x}", result.actual),
                    expected = format_args!("{:#010x}", case.expected),
                    passed = result.passed,
                    "case"
                );
                CaseReport::from_result(case, &result)
            }
            Err(err) => {
                error!(case = case.title, %err, "target fault");
                CaseReport::from_fault(case, err.to_string())
            }
        }
    }
}
