use crate::config::TextSource;
use crate::validate::PlateValidator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Detection;

/// Track identifier as assigned by the backend tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ExternalTrackId {
    Number(i64),
    Text(String),
}

/// Identity of a plate entity. Sequential ids are handed out for records
/// that carry no track id, and never compare equal to a backend id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum TrackId {
    External(ExternalTrackId),
    Sequential(u64),
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackId::External(ExternalTrackId::Number(n)) => write!(f, "#{}", n),
            TrackId::External(ExternalTrackId::Text(s)) => write!(f, "#{}", s),
            TrackId::Sequential(n) => write!(f, "auto-{}", n),
        }
    }
}

/// Snapshot chosen to represent a plate in the result list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BestReading {
    pub text: String,
    pub filtered_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub confidence: f64,
}

impl BestReading {
    pub fn text(&self, source: TextSource) -> &str {
        match source {
            TextSource::Raw => &self.text,
            TextSource::Filtered => &self.filtered_text,
        }
    }
}

impl From<&Detection> for BestReading {
    fn from(detection: &Detection) -> Self {
        Self {
            text: detection.text.clone(),
            filtered_text: detection.filtered_text.clone(),
            image: detection.image.clone(),
            confidence: detection.confidence,
        }
    }
}

/// One physical plate, consolidated across every frame it was seen in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrackedPlate {
    pub track_id: TrackId,
    pub best: BestReading,
    pub detections: Vec<Detection>,
}

impl TrackedPlate {
    pub fn new(track_id: TrackId) -> Self {
        Self {
            track_id,
            best: BestReading::default(),
            detections: Vec::new(),
        }
    }

    pub fn push(&mut self, detection: Detection) {
        self.detections.push(detection);
    }

    pub fn frames(&self) -> impl Iterator<Item = u32> + '_ {
        self.detections.iter().map(|d| d.frame)
    }

    pub fn first_frame(&self) -> Option<u32> {
        self.detections.first().map(|d| d.frame)
    }

    pub fn last_frame(&self) -> Option<u32> {
        self.detections.last().map(|d| d.frame)
    }

    /// True once a reading has been selected. Selection requires a strictly
    /// positive confidence, so an empty best reading stays at 0.
    pub fn has_reading(&self) -> bool {
        self.best.confidence > 0.0
    }

    /// Pick the highest-confidence plausible reading.
    ///
    /// Readings no longer than `length_ratio` times the median reading length
    /// are skipped, so a short partial read cannot beat a complete one on
    /// confidence alone. The first maximum wins ties.
    pub fn select_best_reading(
        &mut self,
        validator: &PlateValidator,
        source: TextSource,
        length_ratio: f64,
    ) {
        let lengths: Vec<usize> = self
            .detections
            .iter()
            .map(|d| d.reading(source).chars().count())
            .collect();
        let min_length = median(lengths) * length_ratio;

        let mut best_confidence = 0.0;
        let mut best_index = None;
        for (i, detection) in self.detections.iter().enumerate() {
            let text = detection.reading(source);
            if detection.confidence > best_confidence
                && text.chars().count() as f64 > min_length
                && validator.is_valid(text)
            {
                best_confidence = detection.confidence;
                best_index = Some(i);
            }
        }

        self.best = best_index
            .map(|i| BestReading::from(&self.detections[i]))
            .unwrap_or_default();
    }

    /// Fold `other` into this plate. The higher-confidence best reading wins;
    /// on a shared frame our own detection is kept.
    pub fn absorb(&mut self, other: TrackedPlate) {
        if self.best.confidence < other.best.confidence {
            self.best = other.best;
        }
        let own = std::mem::take(&mut self.detections);
        self.detections = union_by_frame(own.into_iter().chain(other.detections));
    }

    /// Sort the timeline by frame, keeping the first detection seen per frame.
    pub fn normalize_timeline(&mut self) {
        let own = std::mem::take(&mut self.detections);
        self.detections = union_by_frame(own);
    }

    pub fn is_timeline_sorted(&self) -> bool {
        self.detections.windows(2).all(|w| w[0].frame < w[1].frame)
    }
}

fn union_by_frame(detections: impl IntoIterator<Item = Detection>) -> Vec<Detection> {
    let mut timeline = BTreeMap::new();
    for detection in detections {
        timeline.entry(detection.frame).or_insert(detection);
    }
    timeline.into_values().collect()
}

fn median(mut values: Vec<usize>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) as f64 / 2.0
    } else {
        values[mid] as f64
    }
}

/// An entry in the store: either a plate or a backend recognition failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PlateEntity {
    Recognized(TrackedPlate),
    Failed { message: String },
}

impl PlateEntity {
    pub fn as_plate(&self) -> Option<&TrackedPlate> {
        match self {
            PlateEntity::Recognized(plate) => Some(plate),
            PlateEntity::Failed { .. } => None,
        }
    }

    pub fn as_plate_mut(&mut self) -> Option<&mut TrackedPlate> {
        match self {
            PlateEntity::Recognized(plate) => Some(plate),
            PlateEntity::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn detection(text: &str, confidence: f64, frame: u32) -> Detection {
        Detection {
            text: text.to_string(),
            filtered_text: text.to_string(),
            confidence,
            image: Some(format!("{}.jpg", text)),
            bbox: BoundingBox::Rect {
                x: frame as f64,
                y: 0.0,
                width: 10.0,
                height: 5.0,
            },
            frame,
            tracked: false,
        }
    }

    fn plate(id: i64, readings: &[(&str, f64, u32)]) -> TrackedPlate {
        let mut plate = TrackedPlate::new(TrackId::External(ExternalTrackId::Number(id)));
        for (text, confidence, frame) in readings {
            plate.push(detection(text, *confidence, *frame));
        }
        plate
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(vec![]), 0.0);
        assert_eq!(median(vec![5]), 5.0);
        assert_eq!(median(vec![2, 6]), 4.0);
        assert_eq!(median(vec![7, 1, 3]), 3.0);
    }

    #[test]
    fn short_reading_loses_to_longer_one() {
        let mut p = plate(1, &[("AB", 0.9, 0), ("AB1234", 0.5, 1)]);
        p.select_best_reading(&PlateValidator::default(), TextSource::Raw, 0.75);
        assert_eq!(p.best.text, "AB1234");
        assert_eq!(p.best.confidence, 0.5);
        assert_eq!(p.best.image.as_deref(), Some("AB1234.jpg"));
    }

    #[test]
    fn first_maximum_wins_ties() {
        let mut p = plate(1, &[("AB123", 0.8, 0), ("AB124", 0.8, 1)]);
        p.select_best_reading(&PlateValidator::default(), TextSource::Raw, 0.75);
        assert_eq!(p.best.text, "AB123");
    }

    #[test]
    fn no_qualifying_reading_leaves_defaults() {
        let mut p = plate(1, &[("12345", 0.9, 0), ("ABCDE", 0.9, 1)]);
        p.select_best_reading(&PlateValidator::default(), TextSource::Raw, 0.75);
        assert_eq!(p.best, BestReading::default());
        assert!(!p.has_reading());
    }

    #[test]
    fn filtered_source_judges_filtered_text() {
        let mut p = plate(1, &[]);
        p.push(Detection {
            text: "AB 123!".to_string(),
            filtered_text: "AB123".to_string(),
            ..detection("x", 0.7, 0)
        });
        p.push(Detection {
            text: "AB123".to_string(),
            filtered_text: "12".to_string(),
            ..detection("x", 0.9, 1)
        });

        p.select_best_reading(&PlateValidator::default(), TextSource::Filtered, 0.5);
        assert_eq!(p.best.filtered_text, "AB123");
        assert_eq!(p.best.text, "AB 123!");
    }

    #[test]
    fn absorb_keeps_receiver_on_shared_frames() {
        let mut a = plate(1, &[("AB123", 0.6, 10), ("AB123", 0.6, 30)]);
        let mut b = plate(2, &[("AB124", 0.9, 20), ("AB124", 0.9, 30)]);
        a.best = BestReading::from(&a.detections[0]);
        b.best = BestReading::from(&b.detections[0]);

        a.absorb(b);

        assert_eq!(a.frames().collect::<Vec<_>>(), vec![10, 20, 30]);
        assert_eq!(a.detections[2].text, "AB123");
        assert_eq!(a.best.text, "AB124");
        assert!(a.is_timeline_sorted());
    }

    #[test]
    fn absorb_keeps_receiver_best_on_equal_confidence() {
        let mut a = plate(1, &[("AB123", 0.5, 1)]);
        let mut b = plate(2, &[("AB124", 0.5, 2)]);
        a.best = BestReading::from(&a.detections[0]);
        b.best = BestReading::from(&b.detections[0]);
        a.absorb(b);
        assert_eq!(a.best.text, "AB123");
    }

    #[test]
    fn normalize_sorts_and_dedupes() {
        let mut p = plate(1, &[("AB123", 0.5, 5), ("AB124", 0.5, 2), ("AB125", 0.5, 5)]);
        p.normalize_timeline();
        assert_eq!(p.frames().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(p.detections[1].text, "AB123");
    }

    #[test]
    fn track_id_display() {
        assert_eq!(
            TrackId::External(ExternalTrackId::Number(7)).to_string(),
            "#7"
        );
        assert_eq!(TrackId::Sequential(3).to_string(), "auto-3");
    }
}
