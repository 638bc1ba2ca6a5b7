use std::cell::Cell;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use geo_upload_sanitizer::extensions::ExtensionPolicy;
use geo_upload_sanitizer::gate::ReadabilityGate;
use geo_upload_sanitizer::inspector::{
    DataSource, DescribedSource, FieldDescription, FormatInspector, GeometryType,
    HeaderInspector, InspectError,
};

struct FixedInspector {
    result: fn() -> Result<Vec<FieldDescription>, InspectError>,
    calls: Cell<usize>,
}

impl FixedInspector {
    fn new(result: fn() -> Result<Vec<FieldDescription>, InspectError>) -> Self {
        Self {
            result,
            calls: Cell::new(0),
        }
    }
}

impl FormatInspector for FixedInspector {
    fn open(&self, _path: &Utf8Path) -> Result<Box<dyn DataSource>, InspectError> {
        self.calls.set(self.calls.get() + 1);
        let fields = (self.result)()?;
        Ok(Box::new(DescribedSource { fields }))
    }
}

struct StrictSource;

impl DataSource for StrictSource {
    fn describe_fields(&self) -> Vec<FieldDescription> {
        vec![FieldDescription::vector("pts", GeometryType::Unknown)]
    }

    fn invalid_geometry_types(&self) -> &[GeometryType] {
        &[GeometryType::None, GeometryType::Unknown]
    }
}

struct StrictInspector;

impl FormatInspector for StrictInspector {
    fn open(&self, _path: &Utf8Path) -> Result<Box<dyn DataSource>, InspectError> {
        Ok(Box::new(StrictSource))
    }
}

#[test]
fn sidecars_are_never_opened() {
    let policy = ExtensionPolicy::default();
    let inspector = FixedInspector::new(|| Err(InspectError::NoDataSourceFound("x".into())));
    let gate = ReadabilityGate::new(&policy, &inspector);

    for name in ["a.prj", "a.DBF", "a.shx", "a.xml", "a.sld", "a.cpg"] {
        assert!(gate.can_read(Utf8Path::new(name)), "{name}");
    }
    assert_eq!(inspector.calls.get(), 0);
}

#[test]
fn open_failures_are_unreadable() {
    let policy = ExtensionPolicy::default();
    let missing = FixedInspector::new(|| Err(InspectError::NoDataSourceFound("x".into())));
    assert!(!ReadabilityGate::new(&policy, &missing).can_read(Utf8Path::new("a.shp")));

    let corrupt = FixedInspector::new(|| {
        Err(InspectError::Open {
            path: "a.tif".into(),
            reason: "bad tiff".into(),
        })
    });
    assert!(!ReadabilityGate::new(&policy, &corrupt).can_read(Utf8Path::new("a.tif")));
}

#[test]
fn invalid_geometry_rejects_vector_layers_only() {
    let policy = ExtensionPolicy::default();
    let no_geometry =
        FixedInspector::new(|| Ok(vec![FieldDescription::vector("t", GeometryType::None)]));
    assert!(!ReadabilityGate::new(&policy, &no_geometry).can_read(Utf8Path::new("t.csv")));

    let raster = FixedInspector::new(|| {
        Ok(vec![FieldDescription {
            name: "band".into(),
            raster: true,
            geom_type: Some(GeometryType::None),
        }])
    });
    assert!(ReadabilityGate::new(&policy, &raster).can_read(Utf8Path::new("dem.tif")));

    let polygons =
        FixedInspector::new(|| Ok(vec![FieldDescription::vector("p", GeometryType::Polygon)]));
    assert!(ReadabilityGate::new(&policy, &polygons).can_read(Utf8Path::new("p.geojson")));
}

#[test]
fn invalid_set_comes_from_the_data_source() {
    let policy = ExtensionPolicy::default();
    let gate = ReadabilityGate::new(&policy, &StrictInspector);
    assert!(!gate.can_read(Utf8Path::new("layer.gpkg")));
}

#[test]
fn header_inspector_behind_the_gate() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let policy = ExtensionPolicy::default();
    let gate = ReadabilityGate::new(&policy, &HeaderInspector);

    let garbage = root.join("roads.geojson");
    fs::write(garbage.as_std_path(), b"\x00\x01garbage").unwrap();
    assert!(!gate.can_read(&garbage));

    let empty_layer = root.join("empty.geojson");
    fs::write(
        empty_layer.as_std_path(),
        r#"{"type":"FeatureCollection","features":[]}"#,
    )
    .unwrap();
    assert!(!gate.can_read(&empty_layer));

    let gdb = root.join("city.gdb");
    fs::create_dir_all(gdb.as_std_path()).unwrap();
    fs::write(gdb.join("gdb").as_std_path(), b"marker").unwrap();
    assert!(gate.can_read(&gdb));

    let sidecar = root.join("roads.prj");
    fs::write(sidecar.as_std_path(), b"anything at all").unwrap();
    assert!(gate.can_read(&sidecar));
}
