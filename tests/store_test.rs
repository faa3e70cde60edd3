mod helpers;

use helpers::policy_dir;
use pcheck::policy::{DirectoryStore, PolicySource};
use pcheck::Error;

#[test]
fn loads_supported_files_in_filename_order() {
    let dir = policy_dir(&[
        ("b_travel.md", "# Travel\nBook economy class."),
        ("a_expenses.txt", "Expenses\nSubmit receipts within 30 days."),
        ("c_security.json", r#"{"id": "SEC-1", "title": "Security", "body": "Lock your screen."}"#),
    ]);

    let report = DirectoryStore::new(dir.path(), false).load().unwrap();
    let ids: Vec<&str> = report.policies.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a-expenses", "b-travel", "SEC-1"]);
    assert_eq!(report.policies[1].title, "Travel");
    assert!(report.policies.iter().all(|p| !p.is_embedded()));
    assert!(report.policies.iter().all(|p| p.modified.is_some()));
    assert!(report.warnings.is_empty());
}

#[test]
fn ignores_hidden_and_unsupported_files() {
    let dir = policy_dir(&[
        ("leave.md", "# Leave\n25 days per year."),
        (".draft.md", "# Draft\nnot yet approved"),
        ("scan.pdf", "%PDF-1.4"),
        ("NOTES", "loose notes"),
    ]);
    std::fs::create_dir(dir.path().join("archive.md")).unwrap();

    let report = DirectoryStore::new(dir.path(), false).load().unwrap();
    assert_eq!(report.policies.len(), 1);
    assert_eq!(report.policies[0].id, "leave");
    assert!(report.warnings.is_empty(), "ignored files are not warnings");
}

#[test]
fn non_strict_skips_bad_file_with_warning() {
    let dir = policy_dir(&[
        ("good1.md", "# Good One\nfirst"),
        ("good2.txt", "Good Two\nsecond"),
        ("empty.txt", "   \n"),
    ]);
    let bad = dir.path().join("corrupt.md");
    std::fs::write(&bad, [0xff, 0xfe, 0x00, 0xc3]).unwrap();

    let report = DirectoryStore::new(dir.path(), false).load().unwrap();
    let ids: Vec<&str> = report.policies.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["good1", "good2"]);

    assert_eq!(report.warnings.len(), 2);
    let warned: Vec<&std::path::Path> = report.warnings.iter().map(|w| w.path.as_path()).collect();
    assert!(warned.contains(&bad.as_path()));
    assert!(warned.contains(&dir.path().join("empty.txt").as_path()));
}

#[test]
fn strict_fails_on_first_bad_file() {
    let dir = policy_dir(&[("good.md", "# Good\nfine"), ("broken.json", "{ not json")]);

    let err = DirectoryStore::new(dir.path(), true).load().unwrap_err();
    match err {
        Error::Load { path, reason } => {
            assert_eq!(path, dir.path().join("broken.json"));
            assert!(reason.contains("JSON"));
        }
        other => panic!("expected Load error, got {other:?}"),
    }
}

#[test]
fn duplicate_ids_conflict() {
    let dir = policy_dir(&[
        ("Travel.md", "# Travel\nv1"),
        ("travel.txt", "Travel\nv2"),
    ]);

    let err = DirectoryStore::new(dir.path(), false).load().unwrap_err();
    match err {
        Error::Conflict { id, first, second } => {
            assert_eq!(id, "travel");
            assert_eq!(first, dir.path().join("Travel.md"));
            assert_eq!(second, dir.path().join("travel.txt"));
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[test]
fn explicit_json_id_can_conflict_with_filename_id() {
    let dir = policy_dir(&[
        ("a.json", r#"{"id": "remote", "body": "Two days a week."}"#),
        ("remote.md", "# Remote\nThree days a week."),
    ]);
    assert!(matches!(
        DirectoryStore::new(dir.path(), false).load(),
        Err(Error::Conflict { .. })
    ));
}

#[test]
fn empty_directory_is_load_error() {
    let dir = policy_dir(&[]);
    assert!(matches!(
        DirectoryStore::new(dir.path(), false).load(),
        Err(Error::Load { .. })
    ));
}

#[test]
fn directory_of_only_bad_files_is_load_error() {
    let dir = policy_dir(&[("a.txt", ""), ("b.json", "{}")]);
    let err = DirectoryStore::new(dir.path(), false).load().unwrap_err();
    assert!(matches!(err, Error::Load { ref reason, .. } if reason.contains("2 file(s) skipped")));
}

#[test]
fn missing_directory_is_load_error() {
    let dir = policy_dir(&[]);
    let missing = dir.path().join("nope");
    let err = DirectoryStore::new(&missing, false).load().unwrap_err();
    assert!(matches!(err, Error::Load { ref path, .. } if path == &missing));
}

#[cfg(unix)]
#[test]
fn non_utf8_file_name_is_reported_not_ignored() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = policy_dir(&[("leave.md", "# Leave\n25 days per year.")]);
    let odd = dir.path().join(OsStr::from_bytes(b"bonus-\xff.md"));
    std::fs::write(&odd, "# Bonus\nPaid in March.").unwrap();

    let report = DirectoryStore::new(dir.path(), false).load().unwrap();
    assert_eq!(report.policies.len(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].path, odd);
    assert!(report.warnings[0].reason.contains("UTF-8"));

    let err = DirectoryStore::new(dir.path(), true).load().unwrap_err();
    assert!(matches!(err, Error::Load { ref path, .. } if path == &odd));
}
