// Location History Module
// Parses a Google Timeline export and answers "where was I at time T?".

use std::fs;

use camino::Utf8Path;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::coordinate::Coordinate;
use crate::error::{IndexError, Result};

/// A single timestamped sample along a [`RecordKind::Path`].
#[derive(Debug, Clone, PartialEq)]
pub struct PathSample {
    pub offset_minutes: i64,
    pub point: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    /// One resolved place for the whole interval.
    Visit { point: Coordinate },
    /// Samples dated relative to `anchor_start_ts`.
    Path {
        anchor_start_ts: f64,
        points: Vec<PathSample>,
    },
    /// An entry that covers time but carries no usable position, such as an
    /// activity segment or an empty path.
    Unlocated,
}

/// One timeline entry. Timestamps are UTC epoch seconds with
/// `start_ts <= end_ts`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRecord {
    pub start_ts: f64,
    pub end_ts: f64,
    pub kind: RecordKind,
}

impl TimelineRecord {
    /// The position this record implies at `timestamp`.
    ///
    /// Visits return their point. Paths return the sample whose absolute time
    /// is closest to `timestamp` (the earlier sample on ties), or `None` when
    /// the path has no samples. Unlocated entries always return `None`.
    pub fn extract_coordinate(&self, timestamp: f64) -> Option<Coordinate> {
        match &self.kind {
            RecordKind::Visit { point } => Some(*point),
            RecordKind::Path {
                anchor_start_ts,
                points,
            } => {
                let mut closest: Option<(f64, Coordinate)> = None;
                for sample in points {
                    let sample_ts = anchor_start_ts + sample.offset_minutes as f64 * 60.0;
                    let diff = (timestamp - sample_ts).abs();
                    if closest.is_none_or(|(best, _)| diff < best) {
                        closest = Some((diff, sample.point));
                    }
                }
                closest.map(|(_, point)| point)
            }
            RecordKind::Unlocated => None,
        }
    }
}

// Private structs for deserializing the JSON file.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    start_time: String,
    end_time: String,
    visit: Option<RawVisit>,
    timeline_path: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVisit {
    top_candidate: Option<RawCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    place_location: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPathPoint {
    point: String,
    #[serde(default)]
    duration_minutes_offset_from_start_time: Option<MinuteOffset>,
}

/// Exports write the offset either as a number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum MinuteOffset {
    Number(i64),
    Text(String),
}

impl MinuteOffset {
    fn minutes(&self) -> Option<i64> {
        match self {
            MinuteOffset::Number(n) => Some(*n),
            MinuteOffset::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Parses an ISO-8601 timestamp into UTC epoch seconds. Timestamps without an
/// offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    let utc = match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc(),
    };
    Some(epoch_seconds(&utc))
}

pub fn epoch_seconds(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
}

impl RawEntry {
    fn into_record(self) -> Option<TimelineRecord> {
        let start_ts = parse_timestamp(&self.start_time)?;
        let end_ts = parse_timestamp(&self.end_time)?;
        if start_ts > end_ts {
            return None;
        }

        let place_location = self
            .visit
            .and_then(|v| v.top_candidate)
            .and_then(|c| c.place_location);

        let kind = if let Some(location) = place_location {
            RecordKind::Visit {
                point: Coordinate::parse_geo_uri(&location)?,
            }
        } else {
            match self.timeline_path {
                Some(raw) if !raw.is_empty() => {
                    let points: Vec<PathSample> =
                        raw.into_iter().filter_map(parse_path_sample).collect();
                    // every sample was unreadable
                    if points.is_empty() {
                        return None;
                    }
                    RecordKind::Path {
                        anchor_start_ts: start_ts,
                        points,
                    }
                }
                _ => RecordKind::Unlocated,
            }
        };

        Some(TimelineRecord {
            start_ts,
            end_ts,
            kind,
        })
    }
}

fn parse_path_sample(value: serde_json::Value) -> Option<PathSample> {
    let raw: RawPathPoint = serde_json::from_value(value).ok()?;
    let offset_minutes = match raw.duration_minutes_offset_from_start_time {
        Some(offset) => offset.minutes()?,
        None => 0,
    };
    Some(PathSample {
        offset_minutes,
        point: Coordinate::parse_geo_uri(&raw.point)?,
    })
}

/// Holds the timeline plus two sorted `(timestamp, record index)` lists, one
/// over interval starts and one over interval ends.
#[derive(Debug, Default)]
pub struct LocationHistory {
    records: Vec<TimelineRecord>,
    starts: Vec<(f64, usize)>,
    ends: Vec<(f64, usize)>,
    min_start: f64,
    max_end: f64,
}

impl LocationHistory {
    /// Loads timeline records from a JSON export, keeping file order.
    /// Entries with unparsable timestamps or geo strings are skipped. Entries
    /// that are neither a visit nor a path are kept as
    /// [`RecordKind::Unlocated`] so they still claim their interval.
    pub fn load(path: &Utf8Path) -> Result<Vec<TimelineRecord>> {
        info!("Loading location history from {path}");
        let content = fs::read_to_string(path).map_err(|e| IndexError::from_io(path, e))?;
        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| IndexError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let total = entries.len();
        let records: Vec<TimelineRecord> = entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| {
                let record = serde_json::from_value::<RawEntry>(value)
                    .ok()
                    .and_then(RawEntry::into_record);
                if record.is_none() {
                    debug!("skipping timeline entry #{i}");
                }
                record
            })
            .collect();

        info!(
            "Loaded {} timeline records ({} skipped)",
            records.len(),
            total - records.len()
        );
        Ok(records)
    }

    pub fn build(records: Vec<TimelineRecord>) -> Self {
        let mut starts: Vec<(f64, usize)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.start_ts, i))
            .collect();
        let mut ends: Vec<(f64, usize)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.end_ts, i))
            .collect();
        starts.sort_by(|a, b| a.0.total_cmp(&b.0));
        ends.sort_by(|a, b| a.0.total_cmp(&b.0));

        let min_start = starts.first().map_or(f64::INFINITY, |s| s.0);
        let max_end = ends.last().map_or(f64::NEG_INFINITY, |e| e.0);

        LocationHistory {
            records,
            starts,
            ends,
            min_start,
            max_end,
        }
    }

    pub fn from_json_file(path: &Utf8Path) -> Result<Self> {
        Ok(Self::build(Self::load(path)?))
    }

    /// The record whose start or end is closest to `timestamp`; the start
    /// side wins ties.
    ///
    /// Only timestamps outside `[earliest start, latest end]` are rejected.
    /// A timestamp in a gap between records still matches the nearest
    /// record boundary.
    pub fn nearest_record(&self, timestamp: f64) -> Option<&TimelineRecord> {
        if self.records.is_empty() || timestamp < self.min_start || timestamp > self.max_end {
            return None;
        }

        let (dist_s, idx_s) = find_closest(&self.starts, timestamp)?;
        let (dist_e, idx_e) = find_closest(&self.ends, timestamp)?;

        if dist_s <= dist_e {
            self.records.get(idx_s)
        } else {
            self.records.get(idx_e)
        }
    }

    /// Position implied by the timeline at `at`, if any record is near enough.
    pub fn locate(&self, at: &DateTime<Utc>) -> Option<Coordinate> {
        let timestamp = epoch_seconds(at);
        self.nearest_record(timestamp)?
            .extract_coordinate(timestamp)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Nearest entry of a sorted `(timestamp, index)` list as
/// `(distance, index)`. The earlier entry wins ties.
fn find_closest(sorted: &[(f64, usize)], target: f64) -> Option<(f64, usize)> {
    let insert_at = sorted.partition_point(|(ts, _)| *ts < target);
    let before = insert_at.checked_sub(1).and_then(|i| sorted.get(i));
    let after = sorted.get(insert_at);

    match (before, after) {
        (Some(&(b, bi)), Some(&(a, ai))) => {
            if target - b <= a - target {
                Some((target - b, bi))
            } else {
                Some((a - target, ai))
            }
        }
        (Some(&(b, bi)), None) => Some((target - b, bi)),
        (None, Some(&(a, ai))) => Some((a - target, ai)),
        (None, None) => None,
    }
}
