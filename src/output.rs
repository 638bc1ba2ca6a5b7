use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::extensions::FileClass;
use crate::sanitizer::{ProgressEvent, ProgressSink, Submission};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyEntry {
    pub name: String,
    pub class: FileClass,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShapefileReport {
    pub complete: bool,
    pub missing: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionReport<'a> {
    #[serde(flatten)]
    pub submission: &'a Submission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kept_path: Option<&'a Utf8Path>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_submission(result: &Submission, kept_path: Option<&Utf8Path>) -> io::Result<()> {
        Self::print_json(&SubmissionReport {
            submission: result,
            kept_path,
        })
    }

    pub fn print_classify(result: &[ClassifyEntry]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_shapefile_report(result: &ShapefileReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::debug!("{}", event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::config::SanitizerConfig;
    use crate::inspector::HeaderInspector;
    use crate::quota::StaticQuotaStore;
    use crate::sanitizer::Sanitizer;
    use crate::upload::UploadedFile;

    #[test]
    fn submission_report_carries_kept_path() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let config = SanitizerConfig {
            output_root: Some(root.clone()),
            ..SanitizerConfig::default()
        };
        let sanitizer = Sanitizer::new(config, HeaderInspector, StaticQuotaStore::new());
        let uploads = vec![UploadedFile::new("roads.prj", "PROJCS")];
        let mut submission = sanitizer.sanitize("alice", uploads, &JsonOutput).unwrap();
        let kept = submission.take_output().unwrap().keep();

        let value = serde_json::to_value(SubmissionReport {
            submission: &submission,
            kept_path: Some(kept.as_path()),
        })
        .unwrap();
        assert_eq!(value["kept_path"], kept.as_str());
        assert_eq!(value["accepted"][0]["name"], "roads.prj");
        assert!(value["error"].is_null());

        let value = serde_json::to_value(SubmissionReport {
            submission: &submission,
            kept_path: None,
        })
        .unwrap();
        assert!(value.get("kept_path").is_none());
    }
}
