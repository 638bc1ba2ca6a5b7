use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const DEFAULT_DATA_EXTENSIONS: &[&str] = &[
    "shp", "kml", "geojson", "json", "tif", "tiff", "gpkg", "csv", "gdb",
];

pub const DEFAULT_SIDECAR_EXTENSIONS: &[&str] = &["shx", "prj", "dbf", "xml", "sld", "cpg"];

static GDB_MEMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/)([^/]+\.gdb)/").expect("valid gdb member regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileClass {
    Data,
    Sidecar,
    Rejected,
}

impl fmt::Display for FileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileClass::Data => write!(f, "data"),
            FileClass::Sidecar => write!(f, "sidecar"),
            FileClass::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPolicy {
    data: BTreeSet<String>,
    sidecar: BTreeSet<String>,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_EXTENSIONS, DEFAULT_SIDECAR_EXTENSIONS)
    }
}

impl ExtensionPolicy {
    pub fn new<D, S>(data: D, sidecar: S) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        Self {
            data: data.into_iter().map(|ext| normalize(ext.as_ref())).collect(),
            sidecar: sidecar
                .into_iter()
                .map(|ext| normalize(ext.as_ref()))
                .collect(),
        }
    }

    pub fn data_extensions(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(String::as_str)
    }

    pub fn sidecar_extensions(&self) -> impl Iterator<Item = &str> {
        self.sidecar.iter().map(String::as_str)
    }

    pub fn all_ok_extensions(&self) -> BTreeSet<&str> {
        self.data_extensions()
            .chain(self.sidecar_extensions())
            .collect()
    }

    pub fn is_sidecar(&self, name: &str) -> bool {
        self.sidecar.contains(&extension_of(name))
    }

    pub fn classify(&self, name: &str) -> FileClass {
        if gdb_container(name).is_some() && self.data.contains("gdb") {
            return FileClass::Data;
        }
        let extension = extension_of(name);
        if self.data.contains(&extension) {
            FileClass::Data
        } else if self.sidecar.contains(&extension) {
            FileClass::Sidecar
        } else {
            FileClass::Rejected
        }
    }
}

pub fn split_extension(name: &str) -> (&str, &str) {
    let file_start = name.rfind(['/', '\\']).map(|idx| idx + 1).unwrap_or(0);
    let file = &name[file_start..];
    let leading_dots = file.len() - file.trim_start_matches('.').len();
    match file.rfind('.') {
        Some(dot) if dot >= leading_dots => {
            let split = file_start + dot;
            (&name[..split], &name[split + 1..])
        }
        _ => (name, ""),
    }
}

pub fn extension_of(name: &str) -> String {
    split_extension(name).1.to_lowercase()
}

pub fn basename(name: &str) -> &str {
    let trimmed = name.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}

pub fn gdb_container(name: &str) -> Option<&str> {
    GDB_MEMBER
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|segment| segment.as_str())
}

fn normalize(ext: &str) -> String {
    ext.trim().trim_start_matches('.').trim_end_matches('/').to_lowercase()
}
