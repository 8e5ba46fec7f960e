//! Reverse geocoding against a GeoNames gazetteer.
//!
//! Records are filtered to populated places and administrative divisions at
//! load time and indexed in an R-tree keyed on `(latitude, longitude)`. The
//! tree measures plain Euclidean distance in degrees, so near the poles or
//! across wide longitude spans the "nearest" place may not be the closest one
//! on the ground. [`haversine_km`](super::coordinate::haversine_km) is only
//! used to report how far away the chosen place is.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use tracing::{debug, info};

use super::coordinate::Coordinate;
use crate::error::{IndexError, Result};

lazy_static::lazy_static! {
    /// Feature codes kept from the gazetteer: populated places and
    /// administrative divisions (current and historical).
    static ref ALLOWED_FEATURE_CODES: HashSet<&'static str> = [
        "PPL", "PPLA", "PPLA2", "PPLA3", "PPLA5", "PPLF", "PPLG", "PPLL", "PPLQ", "PPLS", "PPLW",
        "PPLX", "ADM1", "ADM1H", "ADM2", "ADM2H", "ADM3", "ADM3H", "ADM4", "ADM4H", "ADM5",
        "ADM5H", "ADMD", "ADMDH",
    ]
    .into_iter()
    .collect();
}

const MIN_FIELDS: usize = 9;
const FIELD_NAME: usize = 1;
const FIELD_LATITUDE: usize = 4;
const FIELD_LONGITUDE: usize = 5;
const FIELD_FEATURE_CODE: usize = 7;
const FIELD_COUNTRY_CODE: usize = 8;

pub fn is_allowed_feature_code(code: &str) -> bool {
    ALLOWED_FEATURE_CODES.contains(code)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub country_code: String,
    pub feature_code: String,
}

impl PlaceRecord {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Parses one tab-separated GeoNames line. Returns `None` for short lines,
    /// unparsable coordinates and feature codes outside the allowed set.
    pub fn from_geonames_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < MIN_FIELDS {
            return None;
        }

        let latitude = parts[FIELD_LATITUDE].trim().parse::<f64>().ok()?;
        let longitude = parts[FIELD_LONGITUDE].trim().parse::<f64>().ok()?;
        // "nan" and "inf" parse as floats but cannot be indexed
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }

        let raw_code = parts[FIELD_FEATURE_CODE];
        let code = raw_code.strip_prefix('\'').unwrap_or(raw_code);
        let code = code.strip_suffix('\'').unwrap_or(code);
        if !is_allowed_feature_code(code) {
            return None;
        }

        Some(PlaceRecord {
            latitude,
            longitude,
            name: parts[FIELD_NAME].to_string(),
            country_code: parts[FIELD_COUNTRY_CODE].to_string(),
            feature_code: code.to_string(),
        })
    }
}

/// Position of a [`PlaceRecord`] inside the R-tree.
#[derive(Debug, Clone, Copy)]
struct IndexedPlace {
    idx: usize,
    lat: f64,
    lon: f64,
}

impl RTreeObject for IndexedPlace {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lon])
    }
}

impl PointDistance for IndexedPlace {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlon = self.lon - point[1];
        dlat * dlat + dlon * dlon
    }
}

/// Read-only nearest-place lookup. Safe to share between worker threads once
/// built.
pub struct Gazetteer {
    records: Vec<PlaceRecord>,
    tree: RTree<IndexedPlace>,
}

impl std::fmt::Debug for Gazetteer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gazetteer")
            .field("records", &self.records.len())
            .finish()
    }
}

impl Gazetteer {
    /// Loads every `*.txt` file in `folder`, in file-name order.
    pub fn load_dir(folder: &Utf8Path) -> Result<Vec<PlaceRecord>> {
        if !folder.is_dir() {
            return Err(IndexError::SourceNotFound {
                path: folder.to_path_buf(),
            });
        }

        let entries = fs::read_dir(folder).map_err(|e| IndexError::from_io(folder, e))?;
        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| IndexError::from_io(folder, e))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                debug!("skipping non-UTF8 gazetteer path {:?}", entry.path());
                continue;
            };
            if path.extension() == Some("txt") && path.is_file() {
                sources.push(path);
            }
        }
        sources.sort();

        Self::load(&sources)
    }

    /// Loads and merges the given GeoNames dump files.
    pub fn load<P: AsRef<Utf8Path>>(sources: &[P]) -> Result<Vec<PlaceRecord>> {
        let mut records = Vec::new();

        for source in sources {
            let path = source.as_ref();
            info!("Loading location data from {path}");

            let file = File::open(path).map_err(|e| IndexError::from_io(path, e))?;
            let before = records.len();
            let mut skipped = 0usize;
            let mut undecodable = 0usize;

            for line in BufReader::new(file).split(b'\n') {
                let line = line.map_err(|e| IndexError::SourceRead {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                let Ok(line) = std::str::from_utf8(&line) else {
                    undecodable += 1;
                    skipped += 1;
                    continue;
                };
                match PlaceRecord::from_geonames_line(line.trim_end_matches(['\r', '\n'])) {
                    Some(record) => records.push(record),
                    None => skipped += 1,
                }
            }

            if undecodable > 0 {
                debug!("{undecodable} lines in {path} are not valid UTF-8");
            }
            info!(
                "Loaded {} locations from {path} ({skipped} lines skipped)",
                records.len() - before
            );
        }

        Ok(records)
    }

    pub fn build(records: Vec<PlaceRecord>) -> Self {
        let indexed: Vec<IndexedPlace> = records
            .iter()
            .enumerate()
            .map(|(i, r)| IndexedPlace {
                idx: i,
                lat: r.latitude,
                lon: r.longitude,
            })
            .collect();

        Gazetteer {
            records,
            tree: RTree::bulk_load(indexed),
        }
    }

    /// Convenience for `build(load_dir(folder)?)`.
    pub fn from_dir(folder: &Utf8Path) -> Result<Self> {
        Ok(Self::build(Self::load_dir(folder)?))
    }

    /// The place closest to `(lat, lon)` in planar degrees, with no distance
    /// cutoff. `None` only when the gazetteer is empty.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<&PlaceRecord> {
        self.tree
            .nearest_neighbor(&[lat, lon])
            .map(|p| &self.records[p.idx])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn place(lat: f64, lon: f64, name: &str) -> PlaceRecord {
        PlaceRecord {
            latitude: lat,
            longitude: lon,
            name: name.to_string(),
            country_code: "PT".to_string(),
            feature_code: "PPL".to_string(),
        }
    }

    fn portugal() -> Gazetteer {
        Gazetteer::build(vec![
            place(38.7169, -9.1399, "Lisbon"),
            place(41.1579, -8.6291, "Porto"),
        ])
    }

    #[test]
    fn test_load_filters_feature_codes() {
        let records = Gazetteer::load(&["test_data/geonames/PT.txt"]).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Lisbon", "Porto", "Coimbra", "Distrito de Faro"]);
        assert!(
            records
                .iter()
                .all(|r| is_allowed_feature_code(&r.feature_code))
        );
    }

    #[test]
    fn test_load_strips_quoted_feature_code() {
        let records = Gazetteer::load(&["test_data/geonames/PT.txt"]).unwrap();
        let coimbra = records.iter().find(|r| r.name == "Coimbra").unwrap();
        assert_eq!(coimbra.feature_code, "PPLA");
        assert_eq!(coimbra.country_code, "PT");
    }

    #[test]
    fn test_load_dir_merges_txt_files() {
        let records = Gazetteer::load_dir(Utf8Path::new("test_data/geonames")).unwrap();
        assert!(records.iter().any(|r| r.name == "Lisbon"));
        assert!(records.iter().any(|r| r.name == "Madrid"));
        // README.md in the folder is not a gazetteer source
        assert_eq!(records.len(), 5);
    }

    #[test]
    fn test_load_missing_source() {
        let err = Gazetteer::load(&["test_data/geonames/nowhere.txt"]).unwrap_err();
        assert!(matches!(err, IndexError::SourceNotFound { .. }));
    }

    #[test]
    fn test_load_dir_missing_folder() {
        let err = Gazetteer::load_dir(Utf8Path::new("test_data/no_such_folder")).unwrap_err();
        assert!(matches!(err, IndexError::SourceNotFound { .. }));
    }

    #[test]
    fn test_load_skips_invalid_utf8_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"1\tBad\xff\tBad\t\t1.0\t2.0\tP\tPPL\tXX\n")
            .unwrap();
        file.write_all(b"2\tGood\tGood\t\t3.0\t4.0\tP\tPPL\tXX\r\n")
            .unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let records = Gazetteer::load(&[path]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Good");
        assert_eq!(records[0].country_code, "XX");
    }

    #[test]
    fn test_from_geonames_line_skips_malformed() {
        assert!(PlaceRecord::from_geonames_line("1\tShort\tShort\t\t1.0").is_none());
        assert!(
            PlaceRecord::from_geonames_line("1\tX\tX\t\tnorth\t2.0\tP\tPPL\tXX").is_none()
        );
        assert!(
            PlaceRecord::from_geonames_line("1\tHill\tHill\t\t1.0\t2.0\tT\tHLL\tXX").is_none()
        );
        for (lat, lon) in [("nan", "2.0"), ("1.0", "NaN"), ("inf", "2.0"), ("1.0", "-inf")] {
            let line = format!("1\tNowhere\tNowhere\t\t{lat}\t{lon}\tP\tPPL\tXX");
            assert!(PlaceRecord::from_geonames_line(&line).is_none(), "{lat},{lon}");
        }
        assert!(PlaceRecord::from_geonames_line("1\tX\tX\t\t1.0\t2.0\tP\tPPL\tXX").is_some());
    }

    #[test]
    fn test_build_survives_non_finite_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..200 {
            writeln!(file, "{i}\tPlace {i}\tPlace\t\t{}.5\t{}.5\tP\tPPL\tXX", i % 90, i % 180)
                .unwrap();
        }
        writeln!(file, "999\tNowhere\tNowhere\t\tnan\t2.0\tP\tPPL\tXX").unwrap();
        writeln!(file, "998\tFaraway\tFaraway\t\t1.0\tinf\tP\tPPL\tXX").unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();

        let gazetteer = Gazetteer::build(Gazetteer::load(&[path]).unwrap());
        assert_eq!(gazetteer.len(), 200);
        assert_eq!(gazetteer.nearest(0.5, 0.5).unwrap().name, "Place 0");
    }

    #[test]
    fn test_nearest_exact_match() {
        let gazetteer = portugal();
        let porto = gazetteer.nearest(41.1579, -8.6291).unwrap();
        assert_eq!(porto.name, "Porto");
        assert_eq!(porto.coordinate().distance_km(&Coordinate::new(41.1579, -8.6291)), 0.0);
    }

    #[test]
    fn test_nearest_lisbon() {
        let gazetteer = portugal();
        assert_eq!(gazetteer.nearest(38.71, -9.13).unwrap().name, "Lisbon");
    }

    #[test]
    fn test_nearest_has_no_cutoff() {
        let gazetteer = portugal();
        // Tokyo still resolves to something
        assert!(gazetteer.nearest(35.68, 139.69).is_some());
    }

    #[test]
    fn test_nearest_empty() {
        let gazetteer = Gazetteer::build(Vec::new());
        assert!(gazetteer.is_empty());
        assert!(gazetteer.nearest(0.0, 0.0).is_none());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let records = Gazetteer::load_dir(Utf8Path::new("test_data/geonames")).unwrap();
        let first = Gazetteer::build(records.clone());
        let second = Gazetteer::build(records);
        for (lat, lon) in [(40.0, -8.5), (39.0, -5.0), (37.0, -8.0)] {
            assert_eq!(first.nearest(lat, lon), second.nearest(lat, lon));
        }
    }

    #[test]
    fn test_planar_metric_is_not_great_circle() {
        // At 80N a degree of longitude is ~19 km: East is ~29 km away on the
        // ground and North ~111 km, but North is nearer in degrees.
        let gazetteer = Gazetteer::build(vec![
            place(81.0, 0.0, "North"),
            place(80.0, 1.5, "East"),
        ]);
        let query = Coordinate::new(80.0, 0.0);
        let chosen = gazetteer.nearest(query.lat, query.lon).unwrap();
        assert_eq!(chosen.name, "North");
        let east = Coordinate::new(80.0, 1.5);
        let north = Coordinate::new(81.0, 0.0);
        assert!(query.distance_km(&east) < query.distance_km(&north));
    }
}
