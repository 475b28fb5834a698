pub mod entity;
pub mod record;
pub mod result;

// Re-export commonly used types
pub use entity::{BestReading, ExternalTrackId, PlateEntity, TrackId, TrackedPlate};
pub use record::{
    BoxCoords, Detection, DetectionItem, InferenceResponse, RawBox, Record, RecordError,
};
pub use result::ResultSet;

pub const SCHEMA_VERSION: &str = "0.1.0";
