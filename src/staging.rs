use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::{Builder, TempDir};

use crate::error::SanitizeError;
use crate::extensions::{basename, gdb_container};
use crate::upload::UploadedFile;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StagedFile {
    pub name: String,
    pub path: Utf8PathBuf,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<Utf8PathBuf>,
}

impl StagedFile {
    pub fn inspect_path(&self) -> &Utf8Path {
        self.container.as_deref().unwrap_or(&self.path)
    }
}

/// Request-scoped scratch directory. Dropping it removes everything staged.
#[derive(Debug)]
pub struct OutputDirectory {
    dir: TempDir,
    root: Utf8PathBuf,
    staged: BTreeSet<String>,
}

impl OutputDirectory {
    pub fn create(parent: Option<&Utf8Path>) -> Result<Self, SanitizeError> {
        let mut builder = Builder::new();
        builder.prefix("geo-upload-");
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| SanitizeError::Filesystem(err.to_string()))?;
                builder.tempdir_in(parent.as_std_path())
            }
            None => builder.tempdir(),
        }
        .map_err(|err| SanitizeError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|_| SanitizeError::Filesystem("non-utf8 output directory".to_string()))?;
        Ok(Self {
            dir,
            root,
            staged: BTreeSet::new(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.root
    }

    pub fn stage(&mut self, leaf: &UploadedFile) -> Result<StagedFile, SanitizeError> {
        let relative = staged_name(leaf.name())?;
        if self.staged.contains(&relative) {
            return Err(SanitizeError::NameCollision { name: relative });
        }

        let target = self.root.join(&relative);
        let parent = target.parent().unwrap_or(self.root.as_path()).to_owned();
        let io_err = |err: io::Error| SanitizeError::StagingIo {
            name: leaf.name().to_string(),
            reason: err.to_string(),
        };

        fs::create_dir_all(parent.as_std_path()).map_err(io_err)?;
        let mut temp = Builder::new()
            .prefix(".staging")
            .tempfile_in(parent.as_std_path())
            .map_err(io_err)?;
        temp.write_all(leaf.content()).map_err(io_err)?;
        temp.flush().map_err(io_err)?;
        temp.persist_noclobber(target.as_std_path())
            .map_err(|err| match err.error.kind() {
                io::ErrorKind::AlreadyExists => SanitizeError::NameCollision {
                    name: relative.clone(),
                },
                _ => io_err(err.error),
            })?;

        let size = fs::metadata(target.as_std_path()).map_err(io_err)?.len();
        let container = gdb_container(&relative).map(|segment| self.root.join(segment));
        self.staged.insert(relative);

        Ok(StagedFile {
            name: basename(leaf.name()).to_string(),
            path: target,
            size,
            container,
        })
    }

    pub fn discard(self) -> Result<(), SanitizeError> {
        self.dir
            .close()
            .map_err(|err| SanitizeError::Filesystem(err.to_string()))
    }

    pub fn keep(self) -> Utf8PathBuf {
        let _ = self.dir.keep();
        self.root
    }
}

pub fn staged_name(leaf_name: &str) -> Result<String, SanitizeError> {
    let file = basename(leaf_name);
    check_segment(file, leaf_name)?;
    match gdb_container(leaf_name) {
        Some(container) => {
            check_segment(container, leaf_name)?;
            Ok(format!("{container}/{file}"))
        }
        None => Ok(file.to_string()),
    }
}

fn check_segment(segment: &str, full: &str) -> Result<(), SanitizeError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\0') {
        return Err(SanitizeError::UnsafeName(full.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn staged_names_drop_directories() {
        assert_eq!(staged_name("bundle/roads/roads.shp").unwrap(), "roads.shp");
        assert_eq!(
            staged_name("bundle/city.gdb/a00000001.gdbtable").unwrap(),
            "city.gdb/a00000001.gdbtable"
        );
        assert_matches!(staged_name("bundle/.."), Err(SanitizeError::UnsafeName(_)));
        assert_matches!(staged_name(""), Err(SanitizeError::UnsafeName(_)));
    }

    #[test]
    fn discard_removes_directory() {
        let mut out = OutputDirectory::create(None).unwrap();
        let root = out.path().to_owned();
        out.stage(&UploadedFile::new("a.prj", "PROJCS")).unwrap();
        assert!(root.as_std_path().exists());
        out.discard().unwrap();
        assert!(!root.as_std_path().exists());
    }
}
