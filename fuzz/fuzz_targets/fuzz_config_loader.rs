#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = vent_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A validated config must convert without panicking.
            let _ = vent_core::VentCfg::from(&cfg);
        }
    }
});
