use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SanitizeError {
    #[error("{name}: \"{extension}\" is not an accepted data or sidecar extension")]
    RejectedExtension { name: String, extension: String },

    #[error(
        "shapefiles must include .shp, .dbf, .shx and .prj; incomplete sets: {}",
        bases.join(", ")
    )]
    #[diagnostic(help("upload every part of each shapefile together"))]
    IncompleteShapefileGroup { bases: Vec<String> },

    #[error("problem staging {name}: {reason}")]
    StagingIo { name: String, reason: String },

    #[error("{name} collides with an already staged file")]
    NameCollision { name: String },

    #[error("unsafe file name: {0:?}")]
    UnsafeName(String),

    #[error("inspector could not read {path}: {reason}")]
    UnreadableContent { path: String, reason: String },

    #[error("User Quota Exceeded. Quota: {quota} Used: {used} Adding: {adding}")]
    #[diagnostic(help("remove earlier uploads or ask for a larger quota"))]
    QuotaExceeded {
        quota: String,
        used: String,
        adding: String,
    },

    #[error("failed to read archive {name}: {reason}")]
    Archive { name: String, reason: String },

    #[error("archive {name} exceeds extraction limits: {reason}")]
    ArchiveLimit { name: String, reason: String },

    #[error("quota store failed: {0}")]
    QuotaStore(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
