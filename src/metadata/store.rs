use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use std::process::Command;
use tracing::debug;

use super::context::CaptureDate;
use super::coordinate::Coordinate;
use super::extractor::{extract_capture_date, extract_gps};

/// Per-file photo metadata: GPS position and capture date.
///
/// Implementations are shared across workers. Callers guarantee that no two
/// writes target the same file concurrently.
pub trait MetadataStore: Send + Sync {
    fn coordinate(&self, path: &Utf8Path) -> Result<Option<Coordinate>>;
    fn set_coordinate(&self, path: &Utf8Path, coordinate: Coordinate) -> Result<()>;
    fn capture_date(&self, path: &Utf8Path) -> Result<CaptureDate>;
    fn set_capture_date(&self, path: &Utf8Path, at: DateTime<Utc>) -> Result<()>;
}

/// Reads EXIF in-process and writes through the `exiftool` program.
#[derive(Debug, Clone)]
pub struct ExifStore {
    exiftool: String,
}

impl Default for ExifStore {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExifStore {
    pub fn new(exiftool: impl Into<String>) -> Self {
        Self {
            exiftool: exiftool.into(),
        }
    }

    fn run(&self, args: &[String], path: &Utf8Path) -> Result<()> {
        debug!("{} {} {path}", self.exiftool, args.join(" "));
        let output = Command::new(&self.exiftool)
            .args(args)
            .arg("-overwrite_original")
            .arg(path.as_str())
            .output()
            .with_context(|| format!("Failed to execute {}", self.exiftool))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} failed on {path}: {}", self.exiftool, stderr.trim());
        }

        Ok(())
    }
}

pub fn gps_tag_args(coordinate: Coordinate) -> Vec<String> {
    let lat_ref = if coordinate.lat >= 0.0 { 'N' } else { 'S' };
    let lon_ref = if coordinate.lon >= 0.0 { 'E' } else { 'W' };
    vec![
        format!("-GPSLatitude={}", coordinate.lat.abs()),
        format!("-GPSLatitudeRef={lat_ref}"),
        format!("-GPSLongitude={}", coordinate.lon.abs()),
        format!("-GPSLongitudeRef={lon_ref}"),
    ]
}

pub fn date_tag_args(at: DateTime<Utc>) -> Vec<String> {
    vec![format!(
        "-DateTimeOriginal={}",
        at.format("%Y:%m:%d %H:%M:%S")
    )]
}

impl MetadataStore for ExifStore {
    fn coordinate(&self, path: &Utf8Path) -> Result<Option<Coordinate>> {
        extract_gps(path)
    }

    fn set_coordinate(&self, path: &Utf8Path, coordinate: Coordinate) -> Result<()> {
        self.run(&gps_tag_args(coordinate), path)
    }

    fn capture_date(&self, path: &Utf8Path) -> Result<CaptureDate> {
        extract_capture_date(path)
    }

    fn set_capture_date(&self, path: &Utf8Path, at: DateTime<Utc>) -> Result<()> {
        self.run(&date_tag_args(at), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_gps_tag_args_hemispheres() {
        let args = gps_tag_args(Coordinate::new(-33.8688, 151.2093));
        assert_eq!(
            args,
            vec![
                "-GPSLatitude=33.8688",
                "-GPSLatitudeRef=S",
                "-GPSLongitude=151.2093",
                "-GPSLongitudeRef=E",
            ]
        );

        let args = gps_tag_args(Coordinate::new(38.7169, -9.1399));
        assert_eq!(args[1], "-GPSLatitudeRef=N");
        assert_eq!(args[3], "-GPSLongitudeRef=W");
    }

    #[test]
    fn test_date_tag_args() {
        let at = Utc.with_ymd_and_hms(2024, 11, 10, 18, 17, 59).unwrap();
        assert_eq!(date_tag_args(at), vec!["-DateTimeOriginal=2024:11:10 18:17:59"]);
    }

    #[test]
    fn test_missing_exiftool_is_an_error() {
        let store = ExifStore::new("exiftool-that-does-not-exist");
        let result = store.set_coordinate(Utf8Path::new("photo.jpg"), Coordinate::new(1.0, 2.0));
        assert!(result.is_err());
    }
}
