use std::collections::BTreeSet;

use crate::extensions::split_extension;

pub const REQUIRED_PARTS: [&str; 4] = ["shp", "dbf", "shx", "prj"];

#[derive(Debug, Default)]
struct PartGroups<'a> {
    parts: [BTreeSet<&'a str>; 4],
}

impl<'a> PartGroups<'a> {
    fn collect<I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut groups = Self::default();
        for name in names {
            let (base, extension) = split_extension(name);
            let extension = extension.to_lowercase();
            if let Some(idx) = REQUIRED_PARTS.iter().position(|part| *part == extension) {
                groups.parts[idx].insert(base);
            }
        }
        groups
    }

    fn all_equal(&self) -> bool {
        self.parts.windows(2).all(|pair| pair[0] == pair[1])
    }
}

pub fn shapefiles_have_all_parts<'a, I>(names: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    PartGroups::collect(names).all_equal()
}

pub fn missing_shapefile_parts<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let groups = PartGroups::collect(names);
    if groups.all_equal() {
        return Vec::new();
    }
    let touched: BTreeSet<&str> = groups.parts.iter().flatten().copied().collect();
    touched
        .into_iter()
        .filter(|base| groups.parts.iter().any(|part| !part.contains(base)))
        .map(str::to_string)
        .collect()
}
