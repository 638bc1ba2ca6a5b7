use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::SanitizeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    name: String,
    content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn from_reader(name: impl Into<String>, mut reader: impl Read) -> Result<Self, SanitizeError> {
        let name = name.into();
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|err| SanitizeError::Filesystem(format!("read {name}: {err}")))?;
        Ok(Self { name, content })
    }

    pub fn from_path(path: &Path, name: impl Into<String>) -> Result<Self, SanitizeError> {
        let content = fs::read(path)
            .map_err(|err| SanitizeError::Filesystem(format!("read {}: {err}", path.display())))?;
        Ok(Self::new(name, content))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

pub fn collect_uploads(inputs: &[PathBuf]) -> Result<Vec<UploadedFile>, SanitizeError> {
    let mut uploads = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let root = input.parent().unwrap_or(Path::new(""));
            let mut files = walk_files(input)?;
            files.sort();
            for file in files {
                let relative = file.strip_prefix(root).unwrap_or(&file);
                uploads.push(UploadedFile::from_path(&file, path_name(relative))?);
            }
        } else {
            let name = input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| SanitizeError::UnsafeName(input.display().to_string()))?;
            uploads.push(UploadedFile::from_path(input, name)?);
        }
    }
    Ok(uploads)
}

fn path_name(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>, SanitizeError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| SanitizeError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| SanitizeError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    Ok(items)
}
