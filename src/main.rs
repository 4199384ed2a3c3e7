use std::io::{self as stdio, Write};

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use openbus::config::{EmulatorConfig, RunnerConfig};
use openbus::emulated::EmulatedTarget;
use openbus::error::{KeypadError, RunnerError};
use openbus::io::{KEY_A, StdinKeypad, TextConsole};
use openbus::payload;
use openbus::registry::{self, REGISTRY};
use openbus::runner::Runner;

#[derive(Parser)]
#[command(name = "openbus", about = "IWRAM open-bus load/store test batteries")]
struct Cli {
    /// Stop after this many sweeps. Text mode loops forever without it.
    #[arg(long)]
    sweeps: Option<u64>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Only wait for Enter after the summary, not after every battery page.
    #[arg(long)]
    no_pause: bool,

    /// Max instructions per payload call on the emulated target.
    #[arg(long, default_value_t = EmulatorConfig::default().step_limit)]
    step_limit: usize,

    /// Print each case's installed payload and exit.
    #[arg(long)]
    disassemble: bool,

    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Console pages, waiting for Enter between them.
    Text,
    /// One JSON sweep report per line, no waiting.
    Json,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(stdio::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    for violation in registry::validate(REGISTRY) {
        tracing::warn!(case = violation.title, reason = %violation.reason, "invalid test case");
    }

    if cli.disassemble {
        print_disassembly();
        return Ok(());
    }

    let target = EmulatedTarget::new(EmulatorConfig {
        step_limit: cli.step_limit,
    });

    match cli.format {
        Format::Text => run_text(&cli, target),
        Format::Json => run_json(&cli, target),
    }
}

fn run_text(cli: &Cli, target: EmulatedTarget) -> anyhow::Result<()> {
    let config = RunnerConfig {
        key_mask: KEY_A,
        pause_between_batteries: !cli.no_pause,
        max_sweeps: cli.sweeps,
    };
    let keypad = StdinKeypad::new(stdio::stdin().lock(), KEY_A);
    let console = TextConsole::new(stdio::stdout());
    let mut runner = Runner::new(target, console, keypad, REGISTRY, config);

    match runner.run() {
        Ok(()) => Ok(()),
        Err(RunnerError::Keypad(KeypadError::Closed)) => {
            tracing::info!(sweeps = runner.sweeps(), "input closed, stopping");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_json(cli: &Cli, target: EmulatedTarget) -> anyhow::Result<()> {
    let keypad = StdinKeypad::new(stdio::empty(), KEY_A);
    let console = TextConsole::new(stdio::sink());
    let mut runner = Runner::new(target, console, keypad, REGISTRY, RunnerConfig::default());

    let mut out = stdio::stdout().lock();
    for _ in 0..cli.sweeps.unwrap_or(1) {
        let report = runner.sweep()?;
        serde_json::to_writer(&mut out, &report)?;
        writeln!(out)?;
    }
    Ok(())
}

fn print_disassembly() {
    for battery in REGISTRY {
        println!("{}", battery.title);
        for case in battery.cases {
            println!("  {} (input {:#04x})", case.title, case.input);
            let bytes = payload::patched(case.patch);
            for line in payload::disassemble(&bytes, case.location).lines() {
                println!("    {line}");
            }
        }
    }
}
