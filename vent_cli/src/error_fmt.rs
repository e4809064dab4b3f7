//! Human-readable error descriptions and structured JSON error formatting.

use serde_json::json;
use vent_core::{BuildError, FaultCode, VentError, WaveformCalcError};

use crate::session::Faulted;

/// First error of type `T` anywhere in the report's chain.
fn find<T: std::error::Error + 'static>(err: &eyre::Report) -> Option<&T> {
    err.chain().find_map(|e| e.downcast_ref::<T>())
}

fn waveform_help(w: &WaveformCalcError) -> String {
    format!(
        "What happened: The breath targets cannot be timed ({w}).\nLikely causes: The plateau time does not fit inside the inspiratory time, or a rate / I:E term is zero.\nHow to fix: Lower the plateau (`ventctl set plateau ...`), lower the rate, or give inspiration a larger share of the I:E ratio."
    )
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(Faulted(code)) = find::<Faulted>(err) {
        return match code {
            FaultCode::ActuatorFault => "What happened: The ventilator entered Fault: actuator fault (1).\nLikely causes: The paddle did not move while homing (stalled or disabled drive), homing ran out of time, or the fault was forced.\nHow to fix: Check the motor wiring, enable pin and mechanics, then home again with `ventctl home`.".to_string(),
            FaultCode::WaveformCalcError => "What happened: The ventilator entered Fault: waveform calculation error (2).\nLikely causes: The stored breath targets cannot be timed.\nHow to fix: Review the targets with `ventctl show` and correct them with `ventctl set`.".to_string(),
            FaultCode::HardwareFault => "What happened: The ventilator entered Fault: hardware fault (3).\nLikely causes: The stepper drive or a sensor bus stopped responding.\nHow to fix: Check [pins] in the config, wiring and power, then restart.".to_string(),
        };
    }

    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range or inconsistent values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/ventctl.toml for a sample."
            ),
            BuildError::InvalidTarget(msg) => format!(
                "What happened: Invalid breath target ({msg}).\nLikely causes: The settings file holds a zero or non-numeric target.\nHow to fix: Correct it with `ventctl set`, or delete the settings file to restore defaults."
            ),
        };
    }

    if let Some(w) = find::<WaveformCalcError>(err) {
        return waveform_help(w);
    }

    if let Some(ve) = find::<VentError>(err) {
        return match ve {
            VentError::Waveform(w) => waveform_help(w),
            VentError::State(msg) => format!(
                "What happened: The request is not allowed right now ({msg}).\nLikely causes: The machine is breathing, faulted, or already shutting down.\nHow to fix: Switch to Off first (`phase off`), then retry."
            ),
            VentError::Hardware(msg) | VentError::HardwareFault(msg) => format!(
                "What happened: A hardware operation failed ({msg}).\nLikely causes: Wiring, power, or bus permissions.\nHow to fix: Check [pins] in the config and the device permissions, then retry."
            ),
            VentError::Config(msg) => format!(
                "What happened: Invalid value ({msg}).\nLikely causes: A non-finite or out-of-range number.\nHow to fix: Re-enter the value."
            ),
        };
    }

    if let Some(hw) = find::<vent_hardware::error::HwError>(err) {
        return format!(
            "What happened: Failed to open the ventilator hardware ({hw}).\nLikely causes: Incorrect pin numbers, SPI disabled, or insufficient GPIO/SPI permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access /dev/gpiomem and /dev/spidev*."
        );
    }

    if let Some(te) = find::<toml::de::Error>(err) {
        return format!(
            "What happened: The config file is not valid TOML.\nLikely causes: A typo, a wrong value type, or an unknown enum value.\nHow to fix: Fix the file at the reported position: {}",
            te.message()
        );
    }

    // String-based heuristics for errors built with eyre! / bail!
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") {
        let detail = err.root_cause().to_string();
        return format!(
            "What happened: Configuration is invalid ({detail}).\nLikely causes: A value outside its allowed range.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("outside the allowed range") {
        return format!(
            "What happened: Value rejected ({}).\nLikely causes: The operator limits in [limits] do not allow it.\nHow to fix: Choose a value in range, or widen [limits] in the config.",
            err.root_cause()
        );
    }

    if lower.contains("read config") || lower.contains("create trace") {
        return format!(
            "What happened: A file could not be opened ({msg}).\nLikely causes: Wrong path or missing permissions.\nHow to fix: Check the path and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Faults map to 10 + fault code; every other error is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    find::<Faulted>(err).map_or(1, |Faulted(code)| 10 + i32::from(code.code()))
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let message = humanize(err);
    match find::<Faulted>(err) {
        Some(Faulted(code)) => json!({
            "reason": "Fault",
            "code": code.code(),
            "fault": code.as_str(),
            "message": message,
        }),
        None => json!({ "reason": "Error", "message": message }),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn faults_have_distinct_exit_codes() {
        for (code, exit) in [
            (FaultCode::ActuatorFault, 11),
            (FaultCode::WaveformCalcError, 12),
            (FaultCode::HardwareFault, 13),
        ] {
            let err = eyre::Report::new(Faulted(code));
            assert_eq!(exit_code_for_error(&err), exit);
        }
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn wrapped_errors_are_still_recognised() {
        let inner: Result<(), VentError> = Err(VentError::State("cannot zero actuator in ST_INSPR".into()));
        let err = inner.wrap_err("zero").wrap_err("command failed").unwrap_err();
        let text = humanize(&err);
        assert!(text.contains("not allowed right now"), "{text}");
    }

    #[test]
    fn infeasible_timing_explains_the_plateau() {
        let err = eyre::Report::new(WaveformCalcError::NegativeDuration {
            inspiration_s: -0.2,
            expiration_s: 1.5,
        });
        assert!(humanize(&err).contains("plateau"));
    }

    #[test]
    fn bad_toml_is_reported_as_toml() {
        let err = eyre::Report::new(vent_config::load_toml("timing = 3").unwrap_err());
        assert!(humanize(&err).contains("not valid TOML"));
    }

    #[test]
    fn json_error_carries_fault_code() {
        let err = eyre::Report::new(Faulted(FaultCode::ActuatorFault));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Fault");
        assert_eq!(v["code"], 1);
    }

    #[test]
    fn generic_json_error() {
        let v: serde_json::Value =
            serde_json::from_str(&format_error_json(&eyre::eyre!("boom"))).unwrap();
        assert_eq!(v["reason"], "Error");
        assert!(v["message"].as_str().unwrap().contains("boom"));
    }
}
