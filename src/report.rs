use serde::Serialize;

use crate::registry::TestCase;
use crate::trampoline::RunResult;

/// Pass/total counts for one sweep, accumulated across every battery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTally {
    pub passed: usize,
    pub total: usize,
}

impl RunTally {
    pub fn record(&mut self, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    pub title: &'static str,
    pub location: u32,
    pub patch: u16,
    pub expected: u32,
    /// `None` when the target faulted.
    pub actual: Option<u32>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl CaseReport {
    pub fn from_result(case: &TestCase, result: &RunResult) -> Self {
        Self {
            title: case.title,
            location: case.location,
            patch: case.patch,
            expected: case.expected,
            actual: Some(result.actual),
            passed: result.passed,
            fault: None,
        }
    }

    pub fn from_fault(case: &TestCase, fault: String) -> Self {
        Self {
            title: case.title,
            location: case.location,
            patch: case.patch,
            expected: case.expected,
            actual: None,
            passed: false,
            fault: Some(fault),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatteryReport {
    pub title: &'static str,
    pub cases: Vec<CaseReport>,
}

/// Everything one sweep observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sweep: u64,
    pub batteries: Vec<BatteryReport>,
    pub tally: RunTally,
}

impl SweepReport {
    pub fn mismatches(&self) -> impl Iterator<Item = &CaseReport> {
        self.batteries
            .iter()
            .flat_map(|b| b.cases.iter())
            .filter(|c| !c.passed)
    }
}

pub fn header_line(title: &str, index: usize, count: usize) -> String {
    format!("{title} ({}/{count})", index + 1)
}

pub fn case_line(report: &CaseReport) -> String {
    match (report.actual, &report.fault) {
        (Some(actual), _) if report.passed => format!("{} {actual:08x} OK", report.title),
        (Some(actual), _) => format!("{} {actual:08x} ! {:08x}", report.title, report.expected),
        (None, fault) => format!(
            "{} FAULT {}",
            report.title,
            fault.as_deref().unwrap_or("unknown")
        ),
    }
}

pub fn summary_line(tally: &RunTally) -> String {
    format!("passed: {} total: {}", tally.passed, tally.total)
}
