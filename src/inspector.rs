use std::fmt;
use std::fs;
use std::io::Read;

use camino::Utf8Path;
use serde::Serialize;
use thiserror::Error;

use crate::extensions::extension_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GeometryType {
    Unknown,
    None,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryType::Unknown => "Unknown",
            GeometryType::None => "None",
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::GeometryCollection => "GeometryCollection",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescription {
    pub name: String,
    pub raster: bool,
    pub geom_type: Option<GeometryType>,
}

impl FieldDescription {
    pub fn vector(name: impl Into<String>, geom_type: GeometryType) -> Self {
        Self {
            name: name.into(),
            raster: false,
            geom_type: Some(geom_type),
        }
    }

    pub fn raster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raster: true,
            geom_type: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("no data source found at {0}")]
    NoDataSourceFound(String),

    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },
}

pub trait DataSource {
    fn describe_fields(&self) -> Vec<FieldDescription>;

    fn invalid_geometry_types(&self) -> &[GeometryType] {
        &[GeometryType::None]
    }
}

pub trait FormatInspector {
    fn open(&self, path: &Utf8Path) -> Result<Box<dyn DataSource>, InspectError>;
}

impl<T: FormatInspector + ?Sized> FormatInspector for &T {
    fn open(&self, path: &Utf8Path) -> Result<Box<dyn DataSource>, InspectError> {
        (**self).open(path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DescribedSource {
    pub fields: Vec<FieldDescription>,
}

impl DataSource for DescribedSource {
    fn describe_fields(&self) -> Vec<FieldDescription> {
        self.fields.clone()
    }
}

const SHAPEFILE_CODE: [u8; 4] = [0x00, 0x00, 0x27, 0x0a];
const SHAPEFILE_HEADER_LEN: usize = 100;
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";
const SNIFF_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderInspector;

impl FormatInspector for HeaderInspector {
    fn open(&self, path: &Utf8Path) -> Result<Box<dyn DataSource>, InspectError> {
        let layer = path.file_stem().unwrap_or(path.as_str()).to_string();
        let fields = if path.as_std_path().is_dir() {
            inspect_directory(path, &layer)?
        } else {
            match extension_of(path.as_str()).as_str() {
                "shp" => vec![inspect_shapefile(path, &layer)?],
                "geojson" | "json" => vec![inspect_geojson(path, &layer)?],
                "gpkg" => vec![inspect_geopackage(path, &layer)?],
                "kml" => vec![inspect_kml(path, &layer)?],
                "csv" => vec![inspect_csv(path, &layer)?],
                _ => vec![inspect_raster(path, &layer)?],
            }
        };
        Ok(Box::new(DescribedSource { fields }))
    }
}

fn open_err(path: &Utf8Path, reason: impl Into<String>) -> InspectError {
    InspectError::Open {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn read_prefix(path: &Utf8Path, len: usize) -> Result<Vec<u8>, InspectError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|_| InspectError::NoDataSourceFound(path.to_string()))?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|err| open_err(path, err.to_string()))?;
    if buf.is_empty() {
        return Err(InspectError::NoDataSourceFound(path.to_string()));
    }
    Ok(buf)
}

fn inspect_shapefile(path: &Utf8Path, layer: &str) -> Result<FieldDescription, InspectError> {
    let header = read_prefix(path, SHAPEFILE_HEADER_LEN)?;
    if header.len() < SHAPEFILE_HEADER_LEN || header[..4] != SHAPEFILE_CODE {
        return Err(open_err(path, "not a shapefile main file"));
    }
    let shape_type = i32::from_le_bytes([header[32], header[33], header[34], header[35]]);
    let geom_type = match shape_type {
        0 => GeometryType::None,
        1 | 11 | 21 => GeometryType::Point,
        3 | 13 | 23 => GeometryType::LineString,
        5 | 15 | 25 => GeometryType::Polygon,
        8 | 18 | 28 => GeometryType::MultiPoint,
        31 => GeometryType::GeometryCollection,
        other => return Err(open_err(path, format!("unsupported shape type {other}"))),
    };
    Ok(FieldDescription::vector(layer, geom_type))
}

fn inspect_geojson(path: &Utf8Path, layer: &str) -> Result<FieldDescription, InspectError> {
    let content = fs::read(path.as_std_path())
        .map_err(|_| InspectError::NoDataSourceFound(path.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_slice(&content).map_err(|err| open_err(path, err.to_string()))?;

    let geometry = match value.get("type").and_then(|kind| kind.as_str()) {
        Some("FeatureCollection") => value
            .get("features")
            .and_then(|features| features.as_array())
            .and_then(|features| features.first())
            .and_then(|feature| feature.get("geometry")),
        Some("Feature") => value.get("geometry"),
        Some(_) => Some(&value),
        None => return Err(InspectError::NoDataSourceFound(path.to_string())),
    };
    let geom_type = geometry
        .and_then(|geometry| geometry.get("type"))
        .and_then(|kind| kind.as_str())
        .map(geojson_geometry_type)
        .unwrap_or(GeometryType::None);
    Ok(FieldDescription::vector(layer, geom_type))
}

fn geojson_geometry_type(kind: &str) -> GeometryType {
    match kind {
        "Point" => GeometryType::Point,
        "LineString" => GeometryType::LineString,
        "Polygon" => GeometryType::Polygon,
        "MultiPoint" => GeometryType::MultiPoint,
        "MultiLineString" => GeometryType::MultiLineString,
        "MultiPolygon" => GeometryType::MultiPolygon,
        "GeometryCollection" => GeometryType::GeometryCollection,
        _ => GeometryType::Unknown,
    }
}

fn inspect_geopackage(path: &Utf8Path, layer: &str) -> Result<FieldDescription, InspectError> {
    let header = read_prefix(path, SQLITE_HEADER.len())?;
    if header != SQLITE_HEADER {
        return Err(open_err(path, "missing SQLite header"));
    }
    Ok(FieldDescription::vector(layer, GeometryType::Unknown))
}

fn inspect_kml(path: &Utf8Path, layer: &str) -> Result<FieldDescription, InspectError> {
    let prefix = read_prefix(path, SNIFF_LEN)?;
    let text = String::from_utf8_lossy(&prefix);
    if !text.contains("<kml") {
        return Err(open_err(path, "missing <kml> root element"));
    }
    Ok(FieldDescription::vector(layer, GeometryType::Unknown))
}

const CSV_X_COLUMNS: &[&str] = &["x", "lon", "long", "lng", "longitude", "easting"];
const CSV_Y_COLUMNS: &[&str] = &["y", "lat", "latitude", "northing"];
const CSV_GEOMETRY_COLUMNS: &[&str] = &["wkt", "geometry", "the_geom", "geom"];

fn inspect_csv(path: &Utf8Path, layer: &str) -> Result<FieldDescription, InspectError> {
    let prefix = read_prefix(path, SNIFF_LEN)?;
    let text = match std::str::from_utf8(&prefix) {
        Ok(text) => text,
        // a multi-byte character cut by the sniff window is fine
        Err(err) if err.error_len().is_none() => {
            std::str::from_utf8(&prefix[..err.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return Err(open_err(path, "not UTF-8 text")),
    };
    let header = text.lines().next().unwrap_or_default();
    Ok(FieldDescription::vector(layer, csv_geometry_type(header)))
}

fn csv_geometry_type(header: &str) -> GeometryType {
    let columns: Vec<String> = header
        .trim_start_matches('\u{feff}')
        .split([',', ';', '\t'])
        .map(|column| column.trim().trim_matches('"').to_lowercase())
        .collect();
    let has_any = |names: &[&str]| columns.iter().any(|column| names.contains(&column.as_str()));
    if has_any(CSV_GEOMETRY_COLUMNS) {
        GeometryType::Unknown
    } else if has_any(CSV_X_COLUMNS) && has_any(CSV_Y_COLUMNS) {
        GeometryType::Point
    } else {
        GeometryType::None
    }
}

fn inspect_raster(path: &Utf8Path, layer: &str) -> Result<FieldDescription, InspectError> {
    let prefix = read_prefix(path, SNIFF_LEN)?;
    match infer::get(&prefix) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {
            Ok(FieldDescription::raster(layer))
        }
        _ => Err(InspectError::NoDataSourceFound(path.to_string())),
    }
}

fn inspect_directory(path: &Utf8Path, layer: &str) -> Result<Vec<FieldDescription>, InspectError> {
    let entries = fs::read_dir(path.as_std_path()).map_err(|err| open_err(path, err.to_string()))?;
    let mut tables = 0usize;
    let mut has_marker = false;
    for entry in entries {
        let entry = entry.map_err(|err| open_err(path, err.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "gdb" {
            has_marker = true;
        } else if extension_of(&name) == "gdbtable" {
            tables += 1;
        }
    }
    if !has_marker && tables == 0 {
        return Err(InspectError::NoDataSourceFound(path.to_string()));
    }
    Ok(vec![FieldDescription::vector(layer, GeometryType::Unknown)])
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn shapefile_header(shape_type: i32) -> Vec<u8> {
        let mut header = vec![0u8; SHAPEFILE_HEADER_LEN];
        header[..4].copy_from_slice(&SHAPEFILE_CODE);
        header[32..36].copy_from_slice(&shape_type.to_le_bytes());
        header
    }

    #[test]
    fn shapefile_shape_types() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let polygons = root.join("parcels.shp");
        fs::write(polygons.as_std_path(), shapefile_header(5)).unwrap();
        let source = HeaderInspector.open(&polygons).unwrap();
        assert_eq!(
            source.describe_fields(),
            vec![FieldDescription::vector("parcels", GeometryType::Polygon)]
        );

        let null_shapes = root.join("empty.shp");
        fs::write(null_shapes.as_std_path(), shapefile_header(0)).unwrap();
        let source = HeaderInspector.open(&null_shapes).unwrap();
        assert_eq!(source.describe_fields()[0].geom_type, Some(GeometryType::None));
    }

    #[test]
    fn garbage_is_not_a_data_source() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let tif = root.join("dem.tif");
        fs::write(tif.as_std_path(), b"definitely not a tiff").unwrap();
        assert!(matches!(
            HeaderInspector.open(&tif),
            Err(InspectError::NoDataSourceFound(_))
        ));

        let shp = root.join("roads.shp");
        fs::write(shp.as_std_path(), b"nope").unwrap();
        assert!(matches!(HeaderInspector.open(&shp), Err(InspectError::Open { .. })));
    }

    #[test]
    fn csv_needs_coordinate_columns() {
        assert_eq!(csv_geometry_type("id,name,lat,lon"), GeometryType::Point);
        assert_eq!(csv_geometry_type("\"X\";\"Y\";label"), GeometryType::Point);
        assert_eq!(csv_geometry_type("id,WKT"), GeometryType::Unknown);
        assert_eq!(csv_geometry_type("id,lat,name"), GeometryType::None);
        assert_eq!(csv_geometry_type("id,name"), GeometryType::None);

        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("stations.csv");
        fs::write(path.as_std_path(), "station,latitude,longitude\nA,1.0,2.0\n").unwrap();
        let source = HeaderInspector.open(&path).unwrap();
        assert_eq!(source.describe_fields()[0].geom_type, Some(GeometryType::Point));
    }

    #[test]
    fn geojson_reports_first_feature_geometry() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("sites.geojson");
        fs::write(
            path.as_std_path(),
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{}}]}"#,
        )
        .unwrap();
        let source = HeaderInspector.open(&path).unwrap();
        assert_eq!(source.describe_fields()[0].geom_type, Some(GeometryType::Point));
    }
}
