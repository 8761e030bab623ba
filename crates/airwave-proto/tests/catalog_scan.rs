use airwave_proto::catalog::{Catalog, CatalogError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn touch(root: &Path, rel: &str) {
    let p = root.join(rel);
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(p, b"not really audio").unwrap();
}

fn mp3() -> Vec<String> {
    vec!["mp3".to_string()]
}

#[test]
fn scans_recursively_and_sorts() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "b.mp3");
    touch(dir.path(), "a.MP3");
    touch(dir.path(), "nested/c.mp3");
    touch(dir.path(), "nested/cover.jpg");
    touch(dir.path(), "notes.txt");

    let catalog = Catalog::scan(dir.path(), &mp3(), true).unwrap();
    assert_eq!(catalog.tracks(), &["a.MP3", "b.mp3", "nested/c.mp3"]);
    assert_eq!(catalog.path_of(2), Some(dir.path().join("nested/c.mp3")));
}

#[test]
fn flat_scan_ignores_subdirectories() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "top.mp3");
    touch(dir.path(), "nested/deep.mp3");

    let catalog = Catalog::scan(dir.path(), &mp3(), false).unwrap();
    assert_eq!(catalog.tracks(), &["top.mp3"]);
}

#[test]
fn extra_extensions_are_picked_up() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "a.flac");
    touch(dir.path(), "b.mp3");
    touch(dir.path(), "c.ogg");

    let exts = vec!["mp3".to_string(), "flac".to_string()];
    let catalog = Catalog::scan(dir.path(), &exts, true).unwrap();
    assert_eq!(catalog.tracks(), &["a.flac", "b.mp3"]);
}

#[test]
fn missing_folder_is_fatal() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    let err = Catalog::scan(&missing, &mp3(), true).unwrap_err();
    assert!(matches!(err, CatalogError::MissingSource(p) if p == missing));
}

#[test]
fn file_instead_of_folder_is_fatal() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "song.mp3");
    let err = Catalog::scan(&dir.path().join("song.mp3"), &mp3(), true).unwrap_err();
    assert!(matches!(err, CatalogError::NotADirectory(_)));
}

#[test]
fn empty_folder_is_fatal() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "readme.txt");
    let err = Catalog::scan(dir.path(), &mp3(), true).unwrap_err();
    assert!(matches!(err, CatalogError::Empty(_)));
    assert!(err.to_string().contains("no playable files"));
}

// Linux filesystems accept names that are not UTF-8.
#[cfg(target_os = "linux")]
#[test]
fn unusual_file_names_stay_playable() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = TempDir::new().unwrap();
    touch(dir.path(), "AC\\DC - Thunder.mp3");
    let latin1 = OsStr::from_bytes(b"caf\xe9.mp3");
    fs::write(dir.path().join(latin1), b"not really audio").unwrap();

    let catalog = Catalog::scan(dir.path(), &mp3(), true).unwrap();
    assert_eq!(catalog.len(), 2);
    for idx in 0..catalog.len() {
        let path = catalog.path_of(idx).unwrap();
        assert!(path.exists(), "{:?} does not point at a file", path);
    }

    // The backslash is part of the name, not a separator.
    assert!(catalog.tracks().iter().any(|t| t == "AC\\DC - Thunder.mp3"));
    assert_eq!(catalog.path_of(0), Some(dir.path().join("AC\\DC - Thunder.mp3")));
    assert_eq!(catalog.path_of(1), Some(dir.path().join(latin1)));
    assert!(catalog.tracks()[1].starts_with("caf"));
}
