use std::io::{self, Cursor, Read};

use flate2::read::GzDecoder;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::SanitizeError;
use crate::extensions::{ExtensionPolicy, FileClass, basename, extension_of};
use crate::upload::UploadedFile;

const ZIP_SIGNATURES: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
const GZIP_SIGNATURE: &[u8] = &[0x1f, 0x8b];
const RESOURCE_FORK_PREFIX: &str = "__MACOSX/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Zip,
    Gzip,
}

pub fn detect_container(content: &[u8]) -> Option<ContainerKind> {
    if ZIP_SIGNATURES.iter().any(|sig| content.starts_with(sig)) {
        Some(ContainerKind::Zip)
    } else if content.starts_with(GZIP_SIGNATURE) {
        Some(ContainerKind::Gzip)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub max_depth: usize,
    pub max_total_bytes: u64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_total_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default)]
pub struct Flattened {
    pub leaves: Vec<UploadedFile>,
    pub dropped: Vec<SanitizeError>,
}

impl Flattened {
    pub fn leaf_names(&self) -> impl Iterator<Item = &str> {
        self.leaves.iter().map(UploadedFile::name)
    }
}

pub struct Flattener<'a> {
    policy: &'a ExtensionPolicy,
    limits: ExtractionLimits,
}

impl<'a> Flattener<'a> {
    pub fn new(policy: &'a ExtensionPolicy, limits: ExtractionLimits) -> Self {
        Self { policy, limits }
    }

    pub fn flatten(&self, upload: UploadedFile) -> Flattened {
        self.flatten_all(vec![upload])
    }

    pub fn flatten_all(&self, uploads: Vec<UploadedFile>) -> Flattened {
        let mut result = Flattened::default();
        let mut budget = self.limits.max_total_bytes;
        let mut stack: Vec<(UploadedFile, usize)> =
            uploads.into_iter().rev().map(|upload| (upload, 0)).collect();

        while let Some((file, depth)) = stack.pop() {
            let Some(kind) = detect_container(file.content()) else {
                self.accept_leaf(file, &mut result);
                continue;
            };

            if depth >= self.limits.max_depth {
                let err = SanitizeError::ArchiveLimit {
                    name: file.name().to_string(),
                    reason: format!("nested deeper than {} levels", self.limits.max_depth),
                };
                warn!("{err}");
                result.dropped.push(err);
                continue;
            }

            let members = match kind {
                ContainerKind::Zip => expand_zip(&file, &mut budget),
                ContainerKind::Gzip => expand_gzip(&file, &mut budget).map(|member| vec![member]),
            };
            match members {
                Ok(members) => {
                    stack.extend(members.into_iter().rev().map(|member| (member, depth + 1)));
                }
                Err(err) => {
                    warn!("{err}");
                    result.dropped.push(err);
                }
            }
        }

        result
    }

    fn accept_leaf(&self, file: UploadedFile, result: &mut Flattened) {
        if file.name().starts_with(RESOURCE_FORK_PREFIX) {
            debug!(name = file.name(), "skipping resource fork entry");
            return;
        }
        if self.policy.classify(file.name()) == FileClass::Rejected {
            let err = SanitizeError::RejectedExtension {
                name: basename(file.name()).to_string(),
                extension: extension_of(file.name()),
            };
            warn!("{err}");
            result.dropped.push(err);
            return;
        }
        result.leaves.push(file);
    }
}

fn expand_zip(file: &UploadedFile, budget: &mut u64) -> Result<Vec<UploadedFile>, SanitizeError> {
    let archive_err = |reason: String| SanitizeError::Archive {
        name: file.name().to_string(),
        reason,
    };
    let mut archive =
        ZipArchive::new(Cursor::new(file.content())).map_err(|err| archive_err(err.to_string()))?;

    let mut members = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|err| archive_err(err.to_string()))?;
        if entry.is_dir() {
            debug!(archive = file.name(), entry = entry.name(), "skipping directory entry");
            continue;
        }
        let name = entry.name().to_string();
        let content = read_bounded(entry, budget, file.name(), &name)?;
        members.push(UploadedFile::new(name, content));
    }
    Ok(members)
}

fn expand_gzip(file: &UploadedFile, budget: &mut u64) -> Result<UploadedFile, SanitizeError> {
    let decoder = GzDecoder::new(file.content());
    let header_name = decoder
        .header()
        .and_then(|header| header.filename())
        .map(|raw| String::from_utf8_lossy(raw).into_owned());
    let name = gzip_member_name(file.name(), header_name.as_deref());
    let content = read_bounded(decoder, budget, file.name(), &name)?;
    Ok(UploadedFile::new(name, content))
}

fn gzip_member_name(outer: &str, header_name: Option<&str>) -> String {
    let split = outer.len().saturating_sub(3);
    if let (Some(stem), Some(suffix)) = (outer.get(..split), outer.get(split..)) {
        if suffix.eq_ignore_ascii_case(".gz") && !stem.is_empty() {
            return stem.to_string();
        }
    }
    match header_name {
        Some(inner) => {
            let trimmed = outer.trim_end_matches(['/', '\\']);
            let prefix = trimmed.strip_suffix(basename(outer)).unwrap_or("");
            format!("{prefix}{}", basename(inner))
        }
        None => outer.to_string(),
    }
}

fn read_bounded(
    reader: impl Read,
    budget: &mut u64,
    archive: &str,
    member: &str,
) -> Result<Vec<u8>, SanitizeError> {
    let mut content = Vec::new();
    reader
        .take(budget.saturating_add(1))
        .read_to_end(&mut content)
        .map_err(|err: io::Error| SanitizeError::Archive {
            name: archive.to_string(),
            reason: format!("{member}: {err}"),
        })?;
    let read = content.len() as u64;
    if read > *budget {
        return Err(SanitizeError::ArchiveLimit {
            name: archive.to_string(),
            reason: format!("decompressed content exceeds {} bytes", *budget),
        });
    }
    *budget -= read;
    Ok(content)
}
