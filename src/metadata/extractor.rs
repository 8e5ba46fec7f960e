//! Read side of the photo metadata: EXIF GPS and the capture-date fallback
//! chain (EXIF tags, then file name, then modification time).

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use chrono::{DateTime, NaiveDateTime, Utc};
use nom_exif::{EntryValue, Exif, ExifIter, ExifTag, MediaParser, MediaSource};
use regex::Regex;
use std::fs;

use super::context::{CaptureDate, DateSource, SourceContext};
use super::coordinate::Coordinate;

struct DatePattern {
    regex: Regex,
    format: &'static str,
}

impl DatePattern {
    fn new(pattern: &str, format: &'static str) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap(),
            format,
        }
    }
}

lazy_static::lazy_static! {
    static ref DATE_PATTERNS: [DatePattern; 4] = [
        // 2024-11-10_18-17-59, optionally followed by -suffix
        DatePattern::new(r"(?P<date>\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})", "%Y-%m-%d_%H-%M-%S"),
        // IMG_20190509_154733
        DatePattern::new(
            r"(?P<date>(20|19|18)\d{2}(0[1-9]|1[0-2])[0-3]\d_\d{6})",
            "%Y%m%d_%H%M%S",
        ),
        // Screenshot_20190919-053857
        DatePattern::new(
            r"(?P<date>(20|19|18)\d{2}(0[1-9]|1[0-2])[0-3]\d-\d{6})",
            "%Y%m%d-%H%M%S",
        ),
        // 2016_01_30_11_49_15
        DatePattern::new(
            r"(?P<date>(20|19|18)\d{2}_(0[1-9]|1[0-2])_[0-3]\d_\d{2}_\d{2}_\d{2})",
            "%Y_%m_%d_%H_%M_%S",
        ),
    ];
}

pub fn extract_source_info(path: &Utf8Path) -> Result<SourceContext> {
    let metadata = fs::metadata(path).with_context(|| format!("Failed to stat {path}"))?;
    if !metadata.is_file() {
        bail!("{path} is not a regular file");
    }

    Ok(SourceContext {
        name: path.file_stem().unwrap_or("unknown").to_string(),
        extension: path.extension().unwrap_or("").to_string(),
        original: path.file_name().unwrap_or("unknown").to_string(),
    })
}

/// Runs the capture-date fallback chain. Fails only when the file cannot
/// even be stat'ed.
pub fn extract_capture_date(path: &Utf8Path) -> Result<CaptureDate> {
    if let Some(dt) = date_from_exif(path) {
        return Ok(CaptureDate::new(dt, DateSource::Exif));
    }
    if let Some(dt) = path.file_name().and_then(date_from_filename) {
        return Ok(CaptureDate::new(dt, DateSource::Filename));
    }
    let dt = date_from_modified(path)?;
    Ok(CaptureDate::new(dt, DateSource::Modified))
}

/// `DateTimeOriginal`, then `CreateDate`. `None` when the file has no EXIF
/// block or neither tag parses.
pub fn date_from_exif(path: &Utf8Path) -> Option<DateTime<Utc>> {
    let exif = read_exif(path).ok()??;
    [ExifTag::DateTimeOriginal, ExifTag::CreateDate]
        .into_iter()
        .find_map(|tag| exif.get(tag).and_then(entry_to_datetime))
}

/// First recognised date pattern in a file name, read as UTC.
pub fn date_from_filename(file_name: &str) -> Option<DateTime<Utc>> {
    DATE_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.regex.captures(file_name)?;
        let date = caps.name("date")?;
        NaiveDateTime::parse_from_str(date.as_str(), pattern.format)
            .ok()
            .map(|dt| dt.and_utc())
    })
}

pub fn date_from_modified(path: &Utf8Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {path}"))?;
    Ok(modified.into())
}

/// GPS position from EXIF, if present.
pub fn extract_gps(path: &Utf8Path) -> Result<Option<Coordinate>> {
    let ms = MediaSource::file_path(path.as_std_path())
        .with_context(|| format!("Failed to open {path}"))?;
    if !ms.has_exif() {
        return Ok(None);
    }

    let mut parser = MediaParser::new();
    let iter = parser.parse::<_, _, ExifIter>(ms)?;
    let Some(gps_info) = iter.parse_gps_info()? else {
        return Ok(None);
    };

    let lat = convert_gps_coordinate(gps_info.latitude, gps_info.latitude_ref == 'S');
    let lon = convert_gps_coordinate(gps_info.longitude, gps_info.longitude_ref == 'W');
    if !lat.is_finite() || !lon.is_finite() {
        return Ok(None);
    }

    Ok(Some(Coordinate::new(lat, lon)))
}

fn read_exif(path: &Utf8Path) -> Result<Option<Exif>> {
    let ms = MediaSource::file_path(path.as_std_path())?;
    if !ms.has_exif() {
        return Ok(None);
    }
    let mut parser = MediaParser::new();
    let iter = parser.parse::<_, _, ExifIter>(ms)?;
    Ok(Some(iter.into()))
}

fn entry_to_datetime(value: &EntryValue) -> Option<DateTime<Utc>> {
    match value {
        EntryValue::Time(dt) => Some(dt.with_timezone(&Utc)),
        EntryValue::NaiveDateTime(dt) => Some(dt.and_utc()),
        other => other.as_str().and_then(parse_exif_datetime),
    }
}

fn convert_gps_coordinate(coord: nom_exif::LatLng, negative: bool) -> f64 {
    let degrees = coord.0.0 as f64 / coord.0.1 as f64;
    let minutes = coord.1.0 as f64 / coord.1.1 as f64;
    let seconds = coord.2.0 as f64 / coord.2.1 as f64;

    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if negative { -decimal } else { decimal }
}

/// EXIF datetime, `YYYY:MM:DD HH:MM:SS` with optional fraction, read as UTC.
pub fn parse_exif_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim().trim_end_matches('\0');
    ["%Y:%m:%d %H:%M:%S%.f", "%Y:%m:%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_date_from_filename_dashed() {
        let expected = Utc.with_ymd_and_hms(2024, 11, 10, 18, 17, 59).unwrap();
        assert_eq!(
            date_from_filename("2024-11-10_18-17-59-tlha2535.jpg"),
            Some(expected)
        );
        assert_eq!(
            date_from_filename("2024-11-10_18-17-59.jpg"),
            Some(expected)
        );
        assert_eq!(
            date_from_filename("2014-10-06_05-09-48-9976.jpg"),
            Some(Utc.with_ymd_and_hms(2014, 10, 6, 5, 9, 48).unwrap())
        );
    }

    #[test]
    fn test_date_from_filename_camera_patterns() {
        assert_eq!(
            date_from_filename("IMG_20190509_154733.jpg"),
            Some(Utc.with_ymd_and_hms(2019, 5, 9, 15, 47, 33).unwrap())
        );
        assert_eq!(
            date_from_filename("Screenshot_20190919-053857.png"),
            Some(Utc.with_ymd_and_hms(2019, 9, 19, 5, 38, 57).unwrap())
        );
        assert_eq!(
            date_from_filename("2016_01_30_11_49_15.mp4"),
            Some(Utc.with_ymd_and_hms(2016, 1, 30, 11, 49, 15).unwrap())
        );
    }

    #[test]
    fn test_date_from_filename_no_match() {
        assert!(date_from_filename("random_photo.jpg").is_none());
        // Pattern matches but the date is impossible
        assert!(date_from_filename("2024-13-45_99-99-99.jpg").is_none());
    }

    #[test]
    fn test_parse_exif_datetime() {
        let expected = Utc.with_ymd_and_hms(2023, 4, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_exif_datetime("2023:04:01 12:30:00"), Some(expected));
        assert_eq!(
            parse_exif_datetime("2023:04:01 12:30:00.250").map(|d| d.timestamp()),
            Some(expected.timestamp())
        );
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("").is_none());
    }

    #[test]
    fn test_capture_date_falls_back_to_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2021-07-04_10-00-00.jpg");
        fs::File::create(&path)
            .unwrap()
            .write_all(b"not really a jpeg")
            .unwrap();

        let date = extract_capture_date(Utf8Path::from_path(&path).unwrap()).unwrap();
        assert_eq!(date.source, DateSource::Filename);
        assert_eq!(date.label, "2021-07-Jul");
    }

    #[test]
    fn test_capture_date_falls_back_to_modified_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holiday.jpg");
        fs::File::create(&path)
            .unwrap()
            .write_all(b"not really a jpeg")
            .unwrap();

        let date = extract_capture_date(Utf8Path::from_path(&path).unwrap()).unwrap();
        assert_eq!(date.source, DateSource::Modified);
        assert!((Utc::now() - date.timestamp).num_minutes().abs() < 5);
    }

    #[test]
    fn test_capture_date_missing_file() {
        assert!(extract_capture_date(Utf8Path::new("test_data/missing.jpg")).is_err());
    }

    #[test]
    fn test_extract_source_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beach.jpeg");
        fs::File::create(&path).unwrap().write_all(b"1234").unwrap();

        let info = extract_source_info(Utf8Path::from_path(&path).unwrap()).unwrap();
        assert_eq!(info.name, "beach");
        assert_eq!(info.extension, "jpeg");
        assert_eq!(info.original, "beach.jpeg");

        assert!(extract_source_info(Utf8Path::from_path(dir.path()).unwrap()).is_err());
    }
}
