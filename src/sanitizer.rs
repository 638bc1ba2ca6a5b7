use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::archive::Flattener;
use crate::config::SanitizerConfig;
use crate::error::SanitizeError;
use crate::extensions::split_extension;
use crate::gate::ReadabilityGate;
use crate::inspector::FormatInspector;
use crate::quota::{QuotaStore, check_quota};
use crate::shapefile::missing_shapefile_parts;
use crate::staging::{OutputDirectory, StagedFile};
use crate::upload::UploadedFile;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Outcome of one upload request.
///
/// While the submission holds its output directory, dropping the submission
/// removes the directory. Use [`Submission::take_output`] to keep it for
/// downstream processing.
#[derive(Debug, Serialize)]
pub struct Submission {
    pub accepted: Vec<StagedFile>,
    pub total_size: u64,
    pub warnings: Vec<String>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SanitizeError>,
    #[serde(skip)]
    output: Option<OutputDirectory>,
}

impl Submission {
    fn rejected(error: SanitizeError, total_size: u64, warnings: Vec<String>) -> Self {
        Self {
            accepted: Vec::new(),
            total_size,
            warnings,
            error: Some(error),
            output: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.error.is_none()
    }

    pub fn output_path(&self) -> Option<&Utf8Path> {
        self.output.as_ref().map(OutputDirectory::path)
    }

    pub fn take_output(&mut self) -> Option<OutputDirectory> {
        self.output.take()
    }
}

fn serialize_error<S>(error: &Option<SanitizeError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

pub struct Sanitizer<I: FormatInspector, Q: QuotaStore> {
    config: SanitizerConfig,
    inspector: I,
    quota: Q,
}

impl<I: FormatInspector, Q: QuotaStore> Sanitizer<I, Q> {
    pub fn new(config: SanitizerConfig, inspector: I, quota: Q) -> Self {
        Self {
            config,
            inspector,
            quota,
        }
    }

    /// Only infrastructure failures (no output directory, quota store down)
    /// come back as `Err`. Rejected submissions are `Ok` with `error` set and
    /// their output directory already removed.
    pub fn sanitize(
        &self,
        user: &str,
        uploads: Vec<UploadedFile>,
        sink: &dyn ProgressSink,
    ) -> Result<Submission, SanitizeError> {
        let start = Instant::now();
        let mut output = OutputDirectory::create(self.config.output_root.as_deref())?;
        let mut warnings = Vec::new();

        sink.event(ProgressEvent {
            message: format!("phase=Flatten; {} uploaded files", uploads.len()),
            elapsed: None,
        });
        let flattener = Flattener::new(&self.config.policy, self.config.limits);
        let flattened = flattener.flatten_all(uploads);
        warnings.extend(flattened.dropped.iter().map(ToString::to_string));

        let mut blocking = None;
        let missing = missing_shapefile_parts(flattened.leaf_names());
        if !missing.is_empty() {
            let err = SanitizeError::IncompleteShapefileGroup { bases: missing };
            warn!("{err}");
            if self.config.strict_shapefile_validation {
                blocking = Some(err);
            } else {
                warnings.push(err.to_string());
            }
        }

        sink.event(ProgressEvent {
            message: format!("phase=Stage; {} files", flattened.leaves.len()),
            elapsed: None,
        });
        let mut staged = Vec::with_capacity(flattened.leaves.len());
        for leaf in &flattened.leaves {
            match output.stage(leaf) {
                Ok(file) => staged.push(file),
                Err(err) => {
                    warn!("{err}");
                    warnings.push(err.to_string());
                }
            }
        }

        sink.event(ProgressEvent {
            message: format!("phase=Inspect; {} staged files", staged.len()),
            elapsed: None,
        });
        let (accepted, total_size) = self.inspect(&staged, &mut warnings);

        if let Some(err) = blocking {
            discard(output);
            return Ok(Submission::rejected(err, total_size, warnings));
        }

        if let Some(quota) = self.config.quota_bytes {
            sink.event(ProgressEvent {
                message: format!("phase=Quota; checking usage for {user}"),
                elapsed: None,
            });
            let used = self.quota.usage_for(user)?;
            if let Err(err) = check_quota(quota, used, total_size) {
                warn!(user, "{err}");
                discard(output);
                return Ok(Submission::rejected(err, total_size, warnings));
            }
        }

        let elapsed = start.elapsed();
        info!(
            user,
            accepted = accepted.len(),
            total_size,
            warnings = warnings.len(),
            "upload sanitized"
        );
        sink.event(ProgressEvent {
            message: format!("phase=Done; {} files accepted", accepted.len()),
            elapsed: Some(elapsed),
        });

        Ok(Submission {
            accepted,
            total_size,
            warnings,
            error: None,
            output: Some(output),
        })
    }

    fn inspect(&self, staged: &[StagedFile], warnings: &mut Vec<String>) -> (Vec<StagedFile>, u64) {
        let gate = ReadabilityGate::new(&self.config.policy, &self.inspector);
        let names: HashSet<&str> = staged.iter().map(|file| file.name.as_str()).collect();
        let mut verdicts: HashMap<Utf8PathBuf, bool> = HashMap::new();
        let mut accepted: Vec<StagedFile> = Vec::new();
        let mut total_size = 0u64;

        for file in staged {
            let target = file.inspect_path();
            let readable = match verdicts.get(target) {
                Some(readable) => *readable,
                None => {
                    let result = gate.check(target);
                    if let Err(err) = &result {
                        warn!("{err}");
                        warnings.push(err.to_string());
                    }
                    verdicts.insert(target.to_owned(), result.is_ok());
                    result.is_ok()
                }
            };
            if !readable {
                continue;
            }

            total_size += file.size;
            if is_suppressed_sidecar(&file.name, &names) {
                debug!(name = file.name.as_str(), "metadata sidecar covered by its shapefile");
                continue;
            }
            if !accepted.contains(file) {
                accepted.push(file.clone());
            }
        }

        (accepted, total_size)
    }
}

pub fn is_suppressed_sidecar(name: &str, staged_names: &HashSet<&str>) -> bool {
    let (stem, extension) = split_extension(name);
    if extension != "xml" {
        return false;
    }
    staged_names.contains(format!("{stem}.shp").as_str())
        || (stem.contains(".shp") && staged_names.contains(stem))
}

fn discard(output: OutputDirectory) {
    let path = output.path().to_owned();
    if let Err(err) = output.discard() {
        warn!(path = path.as_str(), "failed to remove output directory: {err}");
    }
}
