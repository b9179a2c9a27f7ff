use std::io::Write;

use shellyfleet_config::{load, load_raw_file};

#[test]
fn load_with_missing_file_falls_back_to_defaults() {
    let cfg = load(None).expect("should load defaults without error");
    assert_eq!(cfg.server.port, shellyfleet_config::AppConfig::default().server.port);
}

#[test]
fn load_raw_file_parses_yaml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "server:\n  port: 9090\n  host: 127.0.0.1\nstorage:\n  provider: redb\n  path: /tmp/shellyfleet.redb\n"
    )
    .unwrap();

    let raw = load_raw_file(file.path()).expect("should parse");
    assert_eq!(raw.server.port, Some(9090));
    assert_eq!(raw.storage.provider.as_deref(), Some("redb"));
}

#[test]
fn load_raw_file_missing_path_returns_empty_default() {
    let raw = load_raw_file(std::path::Path::new("/no/such/file.yaml")).unwrap();
    assert_eq!(raw.server.port, None);
}

#[test]
fn load_merges_file_with_process_env() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "export:\n  output_directory: /data/export\n").unwrap();

    let cfg = load(Some(file.path())).expect("should load");
    assert_eq!(cfg.export.output_directory, "/data/export");
}
