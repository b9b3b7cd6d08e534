use std::fs;

use tempfile::tempdir;

use super::{AppendLog, DurableLog};
use crate::utils::PersistenceError;

#[test]
fn test_open_creates_directory_and_file() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("store");

    let log = AppendLog::open(&dir, "broker.log").unwrap();
    assert!(dir.is_dir());
    assert!(log.path().is_file());
    assert_eq!(log.appended(), 0);
}

#[test]
fn test_append_writes_frames_verbatim_in_order() {
    let tmp = tempdir().unwrap();
    let mut log = AppendLog::open(tmp.path(), "broker.log").unwrap();

    log.append(br#"{"msgId":"1","topic":"orders"}"#).unwrap();
    log.append(br#"{"msgId":"2","topic":"orders"}"#).unwrap();

    let contents = fs::read_to_string(log.path()).unwrap();
    assert_eq!(
        contents,
        "{\"msgId\":\"1\",\"topic\":\"orders\"}\n{\"msgId\":\"2\",\"topic\":\"orders\"}\n"
    );
    assert_eq!(log.appended(), 2);
}

#[test]
fn test_reopen_appends_instead_of_truncating() {
    let tmp = tempdir().unwrap();
    {
        let mut log = AppendLog::open(tmp.path(), "broker.log").unwrap();
        log.append(b"first").unwrap();
    }
    let mut log = AppendLog::open(tmp.path(), "broker.log").unwrap();
    log.append(b"second").unwrap();

    let contents = fs::read_to_string(log.path()).unwrap();
    assert_eq!(contents.lines().collect::<Vec<_>>(), vec!["first", "second"]);
}

#[test]
fn test_open_fails_when_directory_is_a_file() {
    let tmp = tempdir().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    fs::write(&blocker, b"").unwrap();

    let err = AppendLog::open(&blocker, "broker.log").unwrap_err();
    assert!(matches!(err, PersistenceError::Open { .. }));
}
