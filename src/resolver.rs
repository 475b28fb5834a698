//! Point-in-time queries against consolidated plates.
//!
//! Detections are sparse (the backend may only sample every Nth frame), so
//! the box for an arbitrary playback frame is interpolated between the two
//! recorded frames around it. These functions are called once per rendered
//! frame and keep no state between calls.

use crate::geometry::{BoundingBox, interpolate};
use crate::schema::{RawBox, TrackId, TrackedPlate};
use crate::store::PlateStore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Frame rate used when the backend reports none, or an unusable one.
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResolvedBox {
    pub bbox: BoundingBox,
    pub tracked: bool,
    /// False when the frame has its own detection.
    pub interpolated: bool,
}

/// Box of `plate` at `frame`, or `None` when the plate is not visible there.
///
/// The timeline need not be sorted: the nearest recorded frames on either
/// side are looked up directly, and on duplicate frames the earliest entry
/// wins. A query between two recorded frames more than `max_gap` apart
/// yields `None`: the tracker lost the plate in between and any position
/// would be made up.
pub fn box_at_frame(plate: &TrackedPlate, frame: u32, max_gap: Option<u32>) -> Option<ResolvedBox> {
    if let Some(exact) = plate.detections.iter().find(|d| d.frame == frame) {
        return Some(ResolvedBox {
            bbox: exact.bbox,
            tracked: exact.tracked,
            interpolated: false,
        });
    }

    // `max_by_key` keeps the last maximum, so scan in reverse
    let prev = plate
        .detections
        .iter()
        .rev()
        .filter(|d| d.frame < frame)
        .max_by_key(|d| d.frame)?;
    let next = plate
        .detections
        .iter()
        .filter(|d| d.frame > frame)
        .min_by_key(|d| d.frame)?;

    let gap = next.frame - prev.frame;
    if max_gap.is_some_and(|limit| gap > limit) {
        return None;
    }

    let t = f64::from(frame - prev.frame) / f64::from(gap);
    Some(ResolvedBox {
        bbox: interpolate(&prev.bbox, &next.bbox, t),
        tracked: prev.tracked,
        interpolated: true,
    })
}

/// What the overlay draws for one plate at one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayBox {
    pub track_id: TrackId,
    pub label: String,
    pub bbox: BoundingBox,
    pub tracked: bool,
    pub interpolated: bool,
}

/// Every plate visible at `frame`, labelled with its filtered reading.
/// Plates without a filtered reading are not drawn.
pub fn overlay_at_frame(store: &PlateStore, frame: u32, max_gap: Option<u32>) -> Vec<OverlayBox> {
    store
        .plates()
        .filter(|plate| !plate.best.filtered_text.trim().is_empty())
        .filter_map(|plate| {
            let resolved = box_at_frame(plate, frame, max_gap)?;
            Some(OverlayBox {
                track_id: plate.track_id.clone(),
                label: plate.best.filtered_text.clone(),
                bbox: resolved.bbox,
                tracked: resolved.tracked,
                interpolated: resolved.interpolated,
            })
        })
        .collect()
}

/// Debug boxes recorded at exactly `frame`. Raw boxes are never interpolated.
pub fn raw_boxes_at_frame(store: &PlateStore, frame: u32) -> Vec<&RawBox> {
    store
        .raw_boxes()
        .iter()
        .filter(|raw| raw.frame == frame)
        .collect()
}

/// Conversion between media time and frame numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
    fps: f64,
}

impl Playback {
    pub fn new(fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            DEFAULT_FPS
        };
        Self { fps }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frame shown at `seconds` into playback.
    pub fn frame_at(&self, seconds: f64) -> u32 {
        (seconds.max(0.0) * self.fps).ceil() as u32
    }

    /// Media time to seek to for `frame`.
    pub fn seek_time(&self, frame: u32) -> f64 {
        f64::from(frame) / self.fps
    }
}

impl Default for Playback {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}

/// Maps natural media pixels onto the displayed element size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub natural: (f64, f64),
    pub display: (f64, f64),
}

impl Viewport {
    pub fn apply(&self, bbox: &BoundingBox) -> BoundingBox {
        let (nw, nh) = self.natural;
        if nw <= 0.0 || nh <= 0.0 {
            return *bbox;
        }
        bbox.scaled(self.display.0 / nw, self.display.1 / nh)
    }
}
