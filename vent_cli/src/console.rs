//! Operator console: one command per stdin line, applied to a running machine.

use clap::ValueEnum;
use eyre::WrapErr;
use vent_config::LimitsCfg;
use vent_core::{BreathPhase, FaultCode, Request};

use crate::cli::TargetArg;

pub const HELP: &str = "\
commands:
  status                  latest snapshot
  diag                    control-thread diagnostics
  phase <name>            switch phase (see `ventctl phases`)
  home                    home the paddle
  set <field> <value>     bpm | vt | ie-i | ie-e | peep | pip | plateau
  ie <i> <e>              both I:E terms
  jog <deg> [deg/s]       relative paddle move (Off, jog or debug only)
  zero                    re-reference the paddle zero here
  fault <code>            force a fault (1 actuator, 2 waveform, 3 hardware)
  snooze                  silence audible alarms
  mute                    toggle the snooze
  quit                    shut down";

/// Default jog speed, deg/s.
const JOG_DEG_PER_S: f64 = 20.0;

#[derive(Debug)]
pub enum ConsoleCmd {
    /// Queue these on the control thread, in order.
    Requests(Vec<Request>),
    Zero,
    Diag,
    Status,
    Help,
    Quit,
}

fn number(word: Option<&str>, what: &str) -> eyre::Result<f64> {
    let w = word.ok_or_else(|| eyre::eyre!("missing {what}"))?;
    w.parse::<f64>()
        .wrap_err_with(|| format!("{what} must be a number, got '{w}'"))
}

fn target(field: TargetArg, value: f64, limits: &LimitsCfg) -> eyre::Result<Request> {
    field.check(value, limits)?;
    Ok(Request::SetTarget(field.field(), value))
}

/// Parse one console line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str, limits: &LimitsCfg) -> eyre::Result<Option<ConsoleCmd>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    if head.starts_with('#') {
        return Ok(None);
    }
    let cmd = match head.to_ascii_lowercase().as_str() {
        "help" | "?" => ConsoleCmd::Help,
        "status" => ConsoleCmd::Status,
        "diag" => ConsoleCmd::Diag,
        "zero" => ConsoleCmd::Zero,
        "quit" | "exit" => ConsoleCmd::Quit,
        "snooze" => ConsoleCmd::Requests(vec![Request::Snooze]),
        "mute" => ConsoleCmd::Requests(vec![Request::ToggleSnooze]),
        "home" => ConsoleCmd::Requests(vec![Request::ChangePhase(BreathPhase::ActuatorHome)]),
        "phase" => {
            let name = words.next().ok_or_else(|| eyre::eyre!("missing phase name"))?;
            let phase = name.parse::<BreathPhase>().map_err(|e| eyre::eyre!(e))?;
            ConsoleCmd::Requests(vec![Request::ChangePhase(phase)])
        }
        "set" => {
            let name = words.next().ok_or_else(|| eyre::eyre!("missing target field"))?;
            let field = TargetArg::from_str(name, true)
                .map_err(|_| eyre::eyre!("unknown target field '{name}'"))?;
            let value = number(words.next(), "value")?;
            ConsoleCmd::Requests(vec![target(field, value, limits)?])
        }
        "ie" => {
            let i = number(words.next(), "inspiration term")?;
            let e = number(words.next(), "expiration term")?;
            ConsoleCmd::Requests(vec![
                target(TargetArg::IeI, i, limits)?,
                target(TargetArg::IeE, e, limits)?,
            ])
        }
        "jog" => {
            let delta_deg = number(words.next(), "angle")?;
            let deg_per_s = match words.next() {
                Some(w) => number(Some(w), "speed")?,
                None => JOG_DEG_PER_S,
            };
            if deg_per_s <= 0.0 {
                eyre::bail!("jog speed must be > 0");
            }
            ConsoleCmd::Requests(vec![Request::Jog {
                delta_deg,
                deg_per_s,
            }])
        }
        "fault" => {
            let raw = words.next().ok_or_else(|| eyre::eyre!("missing fault code"))?;
            let code = raw
                .parse::<u8>()
                .ok()
                .and_then(FaultCode::from_code)
                .ok_or_else(|| eyre::eyre!("unknown fault code '{raw}'"))?;
            ConsoleCmd::Requests(vec![Request::ForceFault(code)])
        }
        other => eyre::bail!("unknown command '{other}' (try `help`)"),
    };
    if let Some(extra) = words.next() {
        eyre::bail!("unexpected argument '{extra}'");
    }
    Ok(Some(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use vent_core::TargetField;

    fn parse(line: &str) -> eyre::Result<Option<ConsoleCmd>> {
        parse_line(line, &LimitsCfg::default())
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("# comment")]
    fn blank_lines_are_ignored(#[case] line: &str) {
        assert!(parse(line).unwrap().is_none());
    }

    #[test]
    fn phase_accepts_wire_names_and_aliases() {
        for line in ["phase ST_OFF", "phase off", "PHASE Off"] {
            match parse(line).unwrap() {
                Some(ConsoleCmd::Requests(r)) => {
                    assert!(matches!(r[..], [Request::ChangePhase(BreathPhase::Off)]));
                }
                other => panic!("{line}: {other:?}"),
            }
        }
    }

    #[test]
    fn set_checks_limits() {
        match parse("set bpm 12").unwrap() {
            Some(ConsoleCmd::Requests(r)) => assert!(matches!(
                r[..],
                [Request::SetTarget(TargetField::BreathsPerMinute, v)] if (v - 12.0).abs() < 1e-12
            )),
            other => panic!("{other:?}"),
        }
        let err = parse("set bpm 60").unwrap_err();
        assert!(err.to_string().contains("outside"), "{err}");
    }

    #[test]
    fn ie_sets_both_terms() {
        match parse("ie 1 2").unwrap() {
            Some(ConsoleCmd::Requests(r)) => {
                assert_eq!(r.len(), 2);
                assert!(matches!(r[0], Request::SetTarget(TargetField::IeInspiration, _)));
                assert!(matches!(r[1], Request::SetTarget(TargetField::IeExpiration, _)));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn jog_defaults_its_speed() {
        match parse("jog -5").unwrap() {
            Some(ConsoleCmd::Requests(r)) => assert!(matches!(
                r[..],
                [Request::Jog { delta_deg, deg_per_s }]
                    if (delta_deg + 5.0).abs() < 1e-12 && (deg_per_s - JOG_DEG_PER_S).abs() < 1e-12
            )),
            other => panic!("{other:?}"),
        }
    }

    #[rstest]
    #[case("fault 9", "unknown fault code")]
    #[case("fault", "missing fault code")]
    #[case("jog x", "must be a number")]
    #[case("jog 5 0", "speed must be > 0")]
    #[case("phase nowhere", "unknown phase")]
    #[case("set flux 1", "unknown target field")]
    #[case("status now", "unexpected argument")]
    #[case("launch", "unknown command")]
    fn bad_lines_explain_themselves(#[case] line: &str, #[case] needle: &str) {
        let err = parse(line).unwrap_err();
        assert!(format!("{err:#}").contains(needle), "{line}: {err:#}");
    }

    #[test]
    fn fault_codes_map_to_fault_kinds() {
        match parse("fault 2").unwrap() {
            Some(ConsoleCmd::Requests(r)) => {
                assert!(matches!(r[..], [Request::ForceFault(FaultCode::WaveformCalcError)]));
            }
            other => panic!("{other:?}"),
        }
    }
}
