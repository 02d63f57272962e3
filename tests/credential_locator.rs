use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use streamkey::credentials::CredentialLocator;
use streamkey::error::Error;

const NEW_TOKEN: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

fn write_aged(dir: &Path, name: &str, content: &[u8], age_secs: u64) {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    let file = File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

fn entry(token: &str) -> String {
    format!(r#"{{"apiToken":"{}","user":"x"}}"#, token)
}

#[test]
fn newest_file_wins_and_last_match_inside_it() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(dir.path(), "000003.log", entry("aaaa1111").as_bytes(), 3_600);

    let mut newest = b"\x00\x01binary".to_vec();
    newest.extend_from_slice(entry("bbbb2222").as_bytes());
    newest.extend_from_slice(b"\xff\xfe");
    newest.extend_from_slice(entry(NEW_TOKEN).as_bytes());
    write_aged(dir.path(), "000005.log", &newest, 10);

    let locator = CredentialLocator::with_dir(dir.path()).unwrap();
    let report = locator.scan().unwrap();
    assert_eq!(report.token.as_deref(), Some(NEW_TOKEN));
    assert_eq!(report.scanned, 1);
    assert_eq!(locator.find_token().unwrap(), NEW_TOKEN);
}

#[test]
fn falls_back_to_older_files() {
    let dir = tempfile::tempdir().unwrap();
    let old = format!("{}\n{}", entry("cafe0041"), entry("cafe0042"));
    write_aged(dir.path(), "old.log", old.as_bytes(), 7_200);
    write_aged(dir.path(), "new.log", b"nothing useful here", 5);

    let locator = CredentialLocator::with_dir(dir.path()).unwrap();
    let report = locator.scan().unwrap();
    assert_eq!(report.token.as_deref(), Some("cafe0042"));
    assert_eq!(report.scanned, 2);
}

#[test]
fn only_log_files_are_scanned() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(dir.path(), "000007.ldb", entry("dead0001").as_bytes(), 1);
    write_aged(dir.path(), "LOG", entry("dead0002").as_bytes(), 1);
    fs::create_dir(dir.path().join("nested.log")).unwrap();

    let locator = CredentialLocator::with_dir(dir.path()).unwrap();
    assert!(matches!(locator.find_token(), Err(Error::NotFound(_))));
}

#[test]
fn unreadable_files_are_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(dir.path(), "good.log", entry("beef0003").as_bytes(), 1);

    let locator = CredentialLocator::with_dir(dir.path()).unwrap();
    let files = vec![dir.path().join("gone.log"), dir.path().join("good.log")];
    let report = locator.scan_files(&files);

    assert_eq!(report.token.as_deref(), Some("beef0003"));
    assert_eq!(report.unreadable.len(), 1);
    assert_eq!(report.unreadable[0].0, files[0]);
}

