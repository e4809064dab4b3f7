use vent_config::{FileSettingsStore, Settings, SettingsStore};

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSettingsStore::new(dir.path().join("nope.toml"));
    assert!(store.try_load().is_err());
    assert_eq!(store.load(), Settings::default());
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSettingsStore::new(dir.path().join("settings.toml"));
    let s = Settings {
        tidal_volume: 450,
        respiration_rate: 14,
        actuator_home_offset: 1234,
        ie_ratio_right: 2.0,
        ..Settings::default()
    };
    store.save(&s).unwrap();
    assert_eq!(store.try_load().unwrap(), s);
    assert_eq!(store.load(), s);
}

#[test]
fn save_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSettingsStore::new(dir.path().join("var").join("settings.toml"));
    store.save(&Settings::default()).unwrap();
    assert!(store.path().exists());
}

#[test]
fn tampered_record_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    let store = FileSettingsStore::new(&path);
    let s = Settings {
        peep_limit: 12,
        ..Settings::default()
    };
    store.save(&s).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let tampered = text.replace("peep_limit = 12", "peep_limit = 13");
    assert_ne!(text, tampered);
    std::fs::write(&path, tampered).unwrap();

    let err = store.try_load().unwrap_err();
    assert!(format!("{err}").contains("checksum mismatch"));
    assert_eq!(store.load(), Settings::default());
}

#[test]
fn garbage_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "this is not toml = = =").unwrap();
    let store = FileSettingsStore::new(&path);
    assert_eq!(store.load(), Settings::default());
}
