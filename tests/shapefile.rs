use geo_upload_sanitizer::shapefile::{missing_shapefile_parts, shapefiles_have_all_parts};

#[test]
fn complete_set_reports_nothing() {
    let names = ["a.shp", "a.dbf", "a.shx", "a.prj"];
    assert!(shapefiles_have_all_parts(names));
    assert!(missing_shapefile_parts(names).is_empty());
}

#[test]
fn empty_input_is_complete() {
    let names: [&str; 0] = [];
    assert!(shapefiles_have_all_parts(names));
    assert!(missing_shapefile_parts(names).is_empty());
}

#[test]
fn each_incomplete_base_is_reported_once() {
    let names = [
        "roads.shp",
        "roads.dbf",
        "roads.shx",
        "roads.prj",
        "rivers.shp",
        "rivers.prj",
        "lakes.dbf",
        "lakes.dbf",
    ];
    assert!(!shapefiles_have_all_parts(names));
    assert_eq!(missing_shapefile_parts(names), vec!["lakes", "rivers"]);
}

#[test]
fn directory_prefixes_are_part_of_the_base_name() {
    let names = ["a/roads.shp", "a/roads.dbf", "a/roads.shx", "b/roads.prj"];
    assert_eq!(missing_shapefile_parts(names), vec!["a/roads", "b/roads"]);
}
