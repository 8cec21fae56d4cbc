// tests/config_loading.rs

use std::io::Write;
use std::path::Path;

use omws::config::load_and_validate;
use omws::errors::OmwsError;
use omws::server::JobService;
use omws::types::ServiceStatus;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_minimal_config_gets_defaults() {
    let file = config_file(
        r#"
[store]
ticket_directory = "/var/lib/omws/tickets"
"#,
    );
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.store.ticket_directory, Path::new("/var/lib/omws/tickets"));
    assert_eq!(cfg.store.ticket_attempts, 100);
    assert_eq!(cfg.server.address, "127.0.0.1:8085");
    assert_eq!(cfg.server.workers, 8);
    assert_eq!(cfg.server.status, ServiceStatus::Available);
    assert_eq!(cfg.server.max_request_bytes, 4 * 1024 * 1024);
}

#[test]
fn test_full_config_is_read_verbatim() {
    let file = config_file(
        r#"
[store]
ticket_directory = "tickets"
ticket_attempts = 5

[server]
address = "0.0.0.0:9000"
workers = 1
status = "unavailable"
max_request_bytes = 65536
"#,
    );
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.store.ticket_attempts, 5);
    assert_eq!(cfg.server.address, "0.0.0.0:9000");
    assert_eq!(cfg.server.workers, 1);
    assert_eq!(cfg.server.status, ServiceStatus::Unavailable);
    assert_eq!(cfg.server.max_request_bytes, 65536);
}

#[test]
fn test_invalid_values_return_config_error() {
    let cases = [
        ("zero workers", "[store]\nticket_directory = \"t\"\n[server]\nworkers = 0\n"),
        ("zero attempts", "[store]\nticket_directory = \"t\"\nticket_attempts = 0\n"),
        ("empty directory", "[store]\nticket_directory = \"\"\n"),
        ("zero request size", "[store]\nticket_directory = \"t\"\n[server]\nmax_request_bytes = 0\n"),
        ("bad address", "[store]\nticket_directory = \"t\"\n[server]\naddress = \"localhost\"\n"),
    ];

    for (name, contents) in cases {
        let file = config_file(contents);
        match load_and_validate(file.path()) {
            Err(OmwsError::ConfigError(_)) => {}
            Err(e) => panic!("{name}: expected ConfigError, got: {e:?}"),
            Ok(_) => panic!("{name}: expected error, got Ok"),
        }
    }
}

#[test]
fn test_malformed_toml_returns_toml_error() {
    let cases = [
        ("missing store", "[server]\nworkers = 2\n"),
        ("unknown field", "[store]\nticket_directory = \"t\"\nspool = \"x\"\n"),
        ("bad status", "[store]\nticket_directory = \"t\"\n[server]\nstatus = \"maybe\"\n"),
    ];

    for (name, contents) in cases {
        let file = config_file(contents);
        let result = load_and_validate(file.path());
        assert!(
            matches!(result, Err(OmwsError::TomlError(_))),
            "{name}: expected TomlError, got: {result:?}"
        );
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let result = load_and_validate("/definitely/not/here/Omws.toml");
    assert!(matches!(result, Err(OmwsError::IoError(_))));
}

#[test]
fn test_service_from_config_creates_ticket_directory() {
    let dir = tempfile::tempdir().unwrap();
    let tickets = dir.path().join("spool").join("tickets");
    let file = config_file(&format!(
        "[store]\nticket_directory = {:?}\n",
        tickets.to_string_lossy()
    ));
    let cfg = load_and_validate(file.path()).unwrap();

    let service = JobService::from_config(&cfg).unwrap();
    assert!(tickets.is_dir());
    assert_eq!(service.store().dir(), tickets.as_path());
}
