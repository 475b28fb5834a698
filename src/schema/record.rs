use crate::config::TextSource;
use crate::geometry::{BoundingBox, BoxError, parse_bbox};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de};
use serde_json::Value;
use thiserror::Error;

use super::ExternalTrackId;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RecordError {
    #[error("invalid box: {0}")]
    Box(#[from] BoxError),
    #[error("plate record has no box")]
    MissingBox,
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Response body of the inference service.
///
/// Records are kept as raw JSON so that one off-type field only costs that
/// record. Each is typed when it is converted to a [`Record`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl InferenceResponse {
    /// Parse either `{"filename": .., "results": [..]}` or a bare record array.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str(input)? {
            Value::Array(results) => Ok(InferenceResponse {
                filename: None,
                results,
            }),
            envelope @ Value::Object(_) => serde_json::from_value(envelope),
            _ => Err(de::Error::custom(
                "expected an object with `results` or an array of records",
            )),
        }
    }

    /// Frame rate, as reported on the first record only.
    pub fn fps(&self) -> Option<f64> {
        self.results
            .first()
            .and_then(|item| item.get("fps"))
            .and_then(Value::as_f64)
    }
}

/// One observation as reported on the wire. Every field is optional here;
/// defaults are applied when converting to a [`Record`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectionItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<ExternalTrackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lp_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_filtered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoxCoords>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_tracked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_raw: Option<BoxCoords>,
}

/// Box coordinates, either flat or wrapped in a list of boxes (first wins).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BoxCoords {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

impl BoxCoords {
    pub fn parse(&self) -> Result<BoundingBox, BoxError> {
        match self {
            BoxCoords::Flat(coords) => parse_bbox(coords),
            BoxCoords::Nested(boxes) => match boxes.first() {
                Some(coords) => parse_bbox(coords),
                None => Err(BoxError::Arity(0)),
            },
        }
    }
}

/// A single per-frame sighting of a plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    pub text: String,
    pub filtered_text: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub bbox: BoundingBox,
    pub frame: u32,
    /// Came from tracker continuation rather than a fresh detection.
    pub tracked: bool,
}

impl Detection {
    pub fn reading(&self, source: TextSource) -> &str {
        match source {
            TextSource::Raw => &self.text,
            TextSource::Filtered => &self.filtered_text,
        }
    }
}

/// Unconsolidated debug box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawBox {
    pub frame: u32,
    pub bbox: BoundingBox,
}

/// A wire record after defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Detection {
        track_id: Option<ExternalTrackId>,
        detection: Detection,
    },
    Failure {
        message: String,
    },
    RawBox(RawBox),
}

impl TryFrom<&Value> for Record {
    type Error = RecordError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let item = DetectionItem::deserialize(value)
            .map_err(|err| RecordError::Malformed(err.to_string()))?;
        Record::try_from(&item)
    }
}

impl TryFrom<&DetectionItem> for Record {
    type Error = RecordError;

    fn try_from(item: &DetectionItem) -> Result<Self, Self::Error> {
        if let Some(message) = &item.error {
            return Ok(Record::Failure {
                message: message.clone(),
            });
        }

        let frame = item.frame.unwrap_or(0);

        if let Some(raw) = &item.box_raw {
            return Ok(Record::RawBox(RawBox {
                frame,
                bbox: raw.parse()?,
            }));
        }

        let bbox = item.bbox.as_ref().ok_or(RecordError::MissingBox)?.parse()?;
        Ok(Record::Detection {
            track_id: item.track_id.clone(),
            detection: Detection {
                text: item.lp_text.clone().unwrap_or_default(),
                filtered_text: item.text_filtered.clone().unwrap_or_default(),
                confidence: item.confidence.unwrap_or(1.0),
                image: item.image.clone(),
                bbox,
                frame,
                tracked: item.is_tracked.unwrap_or(false),
            },
        })
    }
}
