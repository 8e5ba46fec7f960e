pub mod context;
pub mod coordinate;
pub mod extractor;
pub mod location;
pub mod location_history;
pub mod store;

pub use context::{CaptureDate, DateSource, MediaContext};
pub use coordinate::{Coordinate, haversine_km};
pub use location::{Gazetteer, PlaceRecord};
pub use location_history::{LocationHistory, RecordKind, TimelineRecord};
pub use store::{ExifStore, MetadataStore};
