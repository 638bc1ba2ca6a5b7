use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use geo_upload_sanitizer::error::SanitizeError;
use geo_upload_sanitizer::staging::OutputDirectory;
use geo_upload_sanitizer::upload::UploadedFile;

#[test]
fn staged_bytes_round_trip() {
    let mut out = OutputDirectory::create(None).unwrap();
    let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let leaf = UploadedFile::new("bundle/rasters/dem.tif", content.clone());

    let staged = out.stage(&leaf).unwrap();
    assert_eq!(staged.name, "dem.tif");
    assert_eq!(staged.path, out.path().join("dem.tif"));
    assert_eq!(staged.size, leaf.size());
    assert_eq!(fs::read(staged.path.as_std_path()).unwrap(), content);
    assert!(staged.container.is_none());
    assert_eq!(staged.inspect_path(), staged.path.as_path());
}

#[test]
fn collisions_are_rejected_not_overwritten() {
    let mut out = OutputDirectory::create(None).unwrap();
    out.stage(&UploadedFile::new("one/roads.prj", b"first".to_vec()))
        .unwrap();

    let err = out
        .stage(&UploadedFile::new("two/roads.prj", b"second".to_vec()))
        .unwrap_err();
    assert_matches!(err, SanitizeError::NameCollision { name } if name == "roads.prj");
    assert_eq!(
        fs::read(out.path().join("roads.prj").as_std_path()).unwrap(),
        b"first"
    );
}

#[test]
fn geodatabase_members_keep_their_directory() {
    let mut out = OutputDirectory::create(None).unwrap();
    let staged = out
        .stage(&UploadedFile::new(
            "export/city.gdb/a00000001.gdbtable",
            b"table".to_vec(),
        ))
        .unwrap();

    assert_eq!(staged.name, "a00000001.gdbtable");
    assert_eq!(staged.path, out.path().join("city.gdb/a00000001.gdbtable"));
    assert_eq!(staged.inspect_path(), out.path().join("city.gdb").as_path());
    assert!(staged.path.as_std_path().is_file());
}

#[test]
fn unsafe_names_are_refused() {
    let mut out = OutputDirectory::create(None).unwrap();
    let err = out
        .stage(&UploadedFile::new("../", b"x".to_vec()))
        .unwrap_err();
    assert_matches!(err, SanitizeError::UnsafeName(_));
}

#[test]
fn kept_directory_survives() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let mut out = OutputDirectory::create(Some(&root)).unwrap();
    out.stage(&UploadedFile::new("a.sld", b"<sld/>".to_vec()))
        .unwrap();

    let kept = out.keep();
    assert!(kept.starts_with(&root));
    assert!(kept.join("a.sld").as_std_path().is_file());
}
