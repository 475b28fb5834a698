use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BoxError {
    #[error("expected 4 or 8 box coordinates, got {0}")]
    Arity(usize),
    #[error("box coordinates must be finite numbers")]
    NonFinite,
}

/// A plate outline in media pixel coordinates.
///
/// Backends report either an axis-aligned rectangle or the four corners of a
/// rotated plate. Quadrilaterals are kept as-is so they can be drawn as
/// polygons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum BoundingBox {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Quad {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        x3: f64,
        y3: f64,
        x4: f64,
        y4: f64,
    },
}

/// Parse `[x1,y1,x2,y2]` or `[x1,y1,x2,y2,x3,y3,x4,y4]`.
pub fn parse_bbox(coords: &[f64]) -> Result<BoundingBox, BoxError> {
    if coords.iter().any(|c| !c.is_finite()) {
        return Err(BoxError::NonFinite);
    }
    match *coords {
        [x1, y1, x2, y2] => Ok(BoundingBox::Rect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }),
        [x1, y1, x2, y2, x3, y3, x4, y4] => Ok(BoundingBox::Quad {
            x1,
            y1,
            x2,
            y2,
            x3,
            y3,
            x4,
            y4,
        }),
        _ => Err(BoxError::Arity(coords.len())),
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Linear interpolation between two boxes. `t` is not clamped.
///
/// When the shapes differ the rectangle is promoted to its corners first.
pub fn interpolate(a: &BoundingBox, b: &BoundingBox, t: f64) -> BoundingBox {
    match (a, b) {
        (
            BoundingBox::Rect {
                x: ax,
                y: ay,
                width: aw,
                height: ah,
            },
            BoundingBox::Rect {
                x: bx,
                y: by,
                width: bw,
                height: bh,
            },
        ) => BoundingBox::Rect {
            x: lerp(*ax, *bx, t),
            y: lerp(*ay, *by, t),
            width: lerp(*aw, *bw, t),
            height: lerp(*ah, *bh, t),
        },
        _ => {
            let ca = a.corners();
            let cb = b.corners();
            let p = |i: usize| (lerp(ca[i].0, cb[i].0, t), lerp(ca[i].1, cb[i].1, t));
            BoundingBox::from_corners([p(0), p(1), p(2), p(3)])
        }
    }
}

impl BoundingBox {
    /// Corner points clockwise from the top-left of a rectangle, or the
    /// reported order for a quadrilateral.
    pub fn corners(&self) -> [(f64, f64); 4] {
        match *self {
            BoundingBox::Rect {
                x,
                y,
                width,
                height,
            } => [
                (x, y),
                (x + width, y),
                (x + width, y + height),
                (x, y + height),
            ],
            BoundingBox::Quad {
                x1,
                y1,
                x2,
                y2,
                x3,
                y3,
                x4,
                y4,
            } => [(x1, y1), (x2, y2), (x3, y3), (x4, y4)],
        }
    }

    fn from_corners(c: [(f64, f64); 4]) -> Self {
        BoundingBox::Quad {
            x1: c[0].0,
            y1: c[0].1,
            x2: c[1].0,
            y2: c[1].1,
            x3: c[2].0,
            y3: c[2].1,
            x4: c[3].0,
            y4: c[3].1,
        }
    }

    /// Scale from natural media pixels to display pixels.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        match *self {
            BoundingBox::Rect {
                x,
                y,
                width,
                height,
            } => BoundingBox::Rect {
                x: x * sx,
                y: y * sy,
                width: width * sx,
                height: height * sy,
            },
            BoundingBox::Quad { .. } => {
                let c = self.corners();
                let s = |i: usize| (c[i].0 * sx, c[i].1 * sy);
                BoundingBox::from_corners([s(0), s(1), s(2), s(3)])
            }
        }
    }

    /// Top-left anchor for a label.
    pub fn anchor(&self) -> (f64, f64) {
        self.corners()[0]
    }
}
