//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;
use vent_config::{LimitsCfg, PositionSourceKind, Range};
use vent_core::{BreathPhase, TargetField};

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "ventctl", version, about = "Ventilator control CLI")]
pub struct Cli {
    /// Path to config TOML (typed). Built-in defaults when omitted.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Operator settings file; overrides [settings].path
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Log and report as JSON instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Current
        } else {
            Self::None
        }
    }
}

/// Paddle position feedback.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SourceArg {
    /// Integrated stepper counts
    Steps,
    /// Absolute shaft encoder
    Encoder,
}

impl From<SourceArg> for PositionSourceKind {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Steps => Self::Steps,
            SourceArg::Encoder => Self::Encoder,
        }
    }
}

/// Operator-adjustable breath target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TargetArg {
    /// Breaths per minute
    Bpm,
    /// Tidal volume, ml
    Vt,
    /// Inspiration term of the I:E ratio
    IeI,
    /// Expiration term of the I:E ratio
    IeE,
    /// PEEP, cmH2O
    Peep,
    /// PIP limit, cmH2O
    Pip,
    /// Inspiratory plateau, ms
    Plateau,
}

impl TargetArg {
    pub const fn field(self) -> TargetField {
        match self {
            Self::Bpm => TargetField::BreathsPerMinute,
            Self::Vt => TargetField::TidalVolumeMl,
            Self::IeI => TargetField::IeInspiration,
            Self::IeE => TargetField::IeExpiration,
            Self::Peep => TargetField::PeepCmh2o,
            Self::Pip => TargetField::PipCmh2o,
            Self::Plateau => TargetField::PlateauTimeMs,
        }
    }

    pub const fn range(self, limits: &LimitsCfg) -> Range {
        match self {
            Self::Bpm => limits.bpm,
            Self::Vt => limits.tidal_volume_ml,
            Self::IeI | Self::IeE => limits.ie,
            Self::Peep => limits.peep_cmh2o,
            Self::Pip => limits.pip_cmh2o,
            Self::Plateau => limits.plateau_ms,
        }
    }

    /// Reject values outside the configured operator limits.
    pub fn check(self, value: f64, limits: &LimitsCfg) -> eyre::Result<()> {
        let r = self.range(limits);
        if !r.contains(value) {
            let name = self
                .to_possible_value()
                .map_or_else(|| format!("{self:?}"), |v| v.get_name().to_string());
            eyre::bail!("{name} = {value} is outside the allowed range [{}, {}]", r.min, r.max);
        }
        Ok(())
    }
}

/// Which machine to drive and where its paddle feedback comes from.
#[derive(Args, Debug, Clone, Copy)]
pub struct MachineArgs {
    /// Position source; defaults to [actuator].position_source
    #[arg(long, value_enum, value_name = "SOURCE")]
    pub source: Option<SourceArg>,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct RtArgs {
    /// Enable real-time mode for the control thread (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode for the control tick thread.\n\nLinux: requests SCHED_FIFO for the control thread, pins it to one CPU and calls mlockall to keep the process resident. This reduces tick jitter but can starve other work and usually needs CAP_SYS_NICE / CAP_IPC_LOCK or root.\n\nmacOS: only mlockall is applied.\n\nAlso enabled by [runner].realtime in the config."
    )]
    pub rt: bool,
    /// SCHED_FIFO priority for the control thread (Linux only)
    #[arg(
        long,
        value_name = "PRIO",
        long_help = "SCHED_FIFO priority when real-time mode is enabled (Linux only). Clamped to the platform range, usually 1..=99. Defaults to [runner].rt_priority."
    )]
    pub rt_prio: Option<i32>,
    /// Memory locking mode for --rt: none, current, or all
    #[arg(
        long,
        value_enum,
        value_name = "MODE",
        long_help = "Select memory locking mode when real-time mode is enabled.\n- none: do not lock memory.\n- current: lock currently resident pages (mlockall(MCL_CURRENT)).\n- all: lock current and future pages (mlockall(MCL_CURRENT|MCL_FUTURE)).\nDefault: all when [runner].lock_memory is set, otherwise current on Linux and none elsewhere."
    )]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin the control thread to (Linux only)
    #[arg(
        long,
        value_name = "CPU",
        long_help = "CPU index to pin the control thread to when real-time mode is enabled (Linux only). Defaults to [runner].cpu, then 0. The CPU must be allowed by the current affinity mask; otherwise affinity is left unchanged and a warning is logged."
    )]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ventilate in real time until the duration ends or Ctrl-C
    Run {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_name = "SECS")]
        seconds: Option<f64>,
        /// Start in Off and wait for a console command instead of breathing
        #[arg(long, action = ArgAction::SetTrue)]
        idle: bool,
        /// Accept operator commands on stdin (type `help`)
        #[arg(long, action = ArgAction::SetTrue)]
        console: bool,
        /// Write a CSV breath trace to this file
        #[arg(long, value_name = "FILE")]
        trace: Option<PathBuf>,
        /// Print control loop timing stats
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
        #[command(flatten)]
        machine: MachineArgs,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Run the simulated machine on a virtual clock, as fast as possible
    Simulate {
        /// Simulated seconds of ventilation after startup
        #[arg(long, value_name = "SECS", default_value_t = 60.0)]
        seconds: f64,
        /// Write a CSV breath trace to this file
        #[arg(long, value_name = "FILE")]
        trace: Option<PathBuf>,
        /// Open the breathing circuit this many seconds in
        #[arg(long, value_name = "SECS")]
        disconnect_at: Option<f64>,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Home the paddle and report where it stopped
    Home {
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Re-reference the paddle zero at its current position and persist it
    Zero {
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Change a breath target in the operator settings
    Set {
        #[arg(value_enum)]
        field: TargetArg,
        value: f64,
    },
    /// Show the stored operator settings
    Show,
    /// Switch phase, let the machine run, and report
    Phase {
        /// Phase wire name or alias (see `ventctl phases`)
        phase: BreathPhase,
        /// How long to run after switching
        #[arg(long, value_name = "SECS", default_value_t = 0.5)]
        seconds: f64,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Force a fault by numeric code (1 actuator, 2 waveform, 3 hardware)
    Fault {
        code: u8,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// List phase wire names
    Phases,
    /// Dump control-thread diagnostics
    Diag {
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Quick health check (config, settings, a simulated breath)
    SelfCheck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TargetArg::Bpm, 12.0, true)]
    #[case(TargetArg::Bpm, 31.0, false)]
    #[case(TargetArg::Vt, 1_060.0, true)]
    #[case(TargetArg::IeE, 0.4, false)]
    #[case(TargetArg::Plateau, f64::NAN, false)]
    fn limits_are_inclusive(#[case] field: TargetArg, #[case] value: f64, #[case] ok: bool) {
        assert_eq!(field.check(value, &LimitsCfg::default()).is_ok(), ok);
    }

    #[test]
    fn out_of_range_message_names_the_field() {
        let err = TargetArg::Peep
            .check(25.0, &LimitsCfg::default())
            .unwrap_err();
        assert!(err.to_string().starts_with("peep = 25"), "{err}");
    }

    #[test]
    fn cli_parses_phase_aliases() {
        let cli = Cli::try_parse_from(["ventctl", "phase", "peep-pause"]).unwrap();
        match cli.cmd {
            Commands::Phase { phase, .. } => assert_eq!(phase, BreathPhase::PeepPause),
            other => panic!("unexpected {other:?}"),
        }
    }
}
