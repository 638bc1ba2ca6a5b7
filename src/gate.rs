use camino::Utf8Path;

use crate::error::SanitizeError;
use crate::extensions::ExtensionPolicy;
use crate::inspector::{FormatInspector, InspectError};

pub struct ReadabilityGate<'a, I: FormatInspector> {
    policy: &'a ExtensionPolicy,
    inspector: &'a I,
}

impl<'a, I: FormatInspector> ReadabilityGate<'a, I> {
    pub fn new(policy: &'a ExtensionPolicy, inspector: &'a I) -> Self {
        Self { policy, inspector }
    }

    pub fn can_read(&self, path: &Utf8Path) -> bool {
        self.check(path).is_ok()
    }

    pub fn check(&self, path: &Utf8Path) -> Result<(), SanitizeError> {
        if self.policy.is_sidecar(path.as_str()) {
            return Ok(());
        }

        let unreadable = |reason: String| SanitizeError::UnreadableContent {
            path: path.to_string(),
            reason,
        };

        let source = self.inspector.open(path).map_err(|err| match err {
            InspectError::NoDataSourceFound(_) => unreadable("no data source found".to_string()),
            InspectError::Open { reason, .. } => unreadable(reason),
        })?;

        let invalid = source.invalid_geometry_types();
        for field in source.describe_fields() {
            if field.raster {
                continue;
            }
            if let Some(geom_type) = field.geom_type.filter(|kind| invalid.contains(kind)) {
                return Err(unreadable(format!(
                    "layer {} has unsupported geometry type {geom_type}",
                    field.name
                )));
            }
        }
        Ok(())
    }
}
