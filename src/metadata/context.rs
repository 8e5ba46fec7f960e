use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a capture date came from, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    Exif,
    Filename,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureDate {
    /// Folder label, e.g. `2023-04-Apr`.
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub source: DateSource,
}

impl CaptureDate {
    pub const LABEL_FORMAT: &'static str = "%Y-%m-%b";

    pub fn new(timestamp: DateTime<Utc>, source: DateSource) -> Self {
        Self {
            label: timestamp.format(Self::LABEL_FORMAT).to_string(),
            timestamp,
            source,
        }
    }
}

/// Everything a destination template can refer to.
#[derive(Debug, Default, Clone)]
pub struct MediaContext {
    pub date: DateContext,
    pub place: PlaceContext,
    pub source: SourceContext,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DateContext {
    pub label: String,
    pub yyyy: String,
    pub mm: String,
    pub dd: String,
    pub month_name: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<&CaptureDate> for DateContext {
    fn from(date: &CaptureDate) -> Self {
        let dt = date.timestamp;
        DateContext {
            label: date.label.clone(),
            yyyy: dt.format("%Y").to_string(),
            mm: dt.format("%m").to_string(),
            dd: dt.format("%d").to_string(),
            month_name: dt.format("%B").to_string(),
            timestamp: Some(dt),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PlaceContext {
    pub name: String,
    pub country_code: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SourceContext {
    pub name: String,
    pub extension: String,
    pub original: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_capture_date_label() {
        let dt = Utc.with_ymd_and_hms(2023, 4, 9, 18, 17, 59).unwrap();
        let date = CaptureDate::new(dt, DateSource::Exif);
        assert_eq!(date.label, "2023-04-Apr");

        let ctx = DateContext::from(&date);
        assert_eq!(ctx.yyyy, "2023");
        assert_eq!(ctx.mm, "04");
        assert_eq!(ctx.dd, "09");
        assert_eq!(ctx.month_name, "April");
    }
}
