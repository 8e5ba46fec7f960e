//! Per-photo resolution of a capture date, a position and a place name.
//!
//! GPS embedded in the file always wins. Without it, the position is taken
//! from the location history at the capture time and written back to the
//! file so later runs see it as embedded.

use anyhow::Result;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::metadata::{
    CaptureDate, Coordinate, DateSource, Gazetteer, LocationHistory, MetadataStore, PlaceRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSource {
    /// Read from the file's own metadata.
    Embedded,
    /// Derived from the location history.
    History,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub date: CaptureDate,
    pub coordinate: Option<Coordinate>,
    pub coordinate_source: CoordinateSource,
    pub place: Option<PlaceRecord>,
}

impl Resolution {
    /// Place name, or `""` when nothing could be resolved.
    pub fn place_name(&self) -> &str {
        self.place.as_ref().map_or("", |p| p.name.as_str())
    }
}

/// Read-only after construction; share one instance across workers.
#[derive(Debug)]
pub struct Resolver {
    gazetteer: Gazetteer,
    history: Option<LocationHistory>,
    write_back: bool,
}

impl Resolver {
    pub fn new(gazetteer: Gazetteer, history: Option<LocationHistory>) -> Self {
        Self {
            gazetteer,
            history,
            write_back: true,
        }
    }

    /// Disables persisting derived coordinates and dates (dry runs).
    pub fn with_write_back(mut self, enabled: bool) -> Self {
        self.write_back = enabled;
        self
    }

    pub fn resolve_coordinate(
        &self,
        existing: Option<Coordinate>,
        at: &DateTime<Utc>,
    ) -> Option<Coordinate> {
        if existing.is_some() {
            return existing;
        }
        self.history.as_ref()?.locate(at)
    }

    pub fn resolve_place(&self, coordinate: Option<Coordinate>) -> Option<&PlaceRecord> {
        let coordinate = coordinate?;
        self.gazetteer.nearest(coordinate.lat, coordinate.lon)
    }

    pub fn resolve_place_name(&self, coordinate: Option<Coordinate>) -> String {
        self.resolve_place(coordinate)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    /// Resolves one file. Only a missing capture date (the file cannot be
    /// read at all) is an error; write-back failures are logged.
    pub fn resolve(&self, store: &dyn MetadataStore, path: &Utf8Path) -> Result<Resolution> {
        let date = store.capture_date(path)?;

        if date.source == DateSource::Filename && self.write_back {
            match store.set_capture_date(path, date.timestamp) {
                Ok(()) => info!("Set capture date of {path} to {}", date.timestamp),
                Err(e) => warn!("Could not write capture date to {path}: {e:#}"),
            }
        }

        let existing = store.coordinate(path).unwrap_or_else(|e| {
            debug!("No readable GPS in {path}: {e:#}");
            None
        });
        let coordinate = self.resolve_coordinate(existing, &date.timestamp);

        let coordinate_source = match (existing, coordinate) {
            (Some(_), _) => CoordinateSource::Embedded,
            (None, Some(_)) => CoordinateSource::History,
            (None, None) => CoordinateSource::Unknown,
        };

        if let (CoordinateSource::History, Some(derived)) = (coordinate_source, coordinate) {
            if self.write_back {
                match store.set_coordinate(path, derived) {
                    Ok(()) => info!("Set coordinates of {path} to {derived}"),
                    Err(e) => warn!("Could not write coordinates to {path}: {e:#}"),
                }
            }
        }

        let place = self.resolve_place(coordinate).cloned();
        match (&place, coordinate) {
            (Some(place), Some(c)) => debug!(
                "{path}: {} ({}), {:.2} km away",
                place.name,
                place.country_code,
                c.distance_km(&place.coordinate())
            ),
            (None, Some(_)) => debug!("{path}: no nearby location in the loaded data"),
            _ => debug!("{path}: no coordinates"),
        }

        Ok(Resolution {
            date,
            coordinate,
            coordinate_source,
            place,
        })
    }
}
