//! Quadrilateral geometry and its center/scale/rotation summary.

use crate::util::math::wrap_angle;

/// Point in image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    /// Creates a point.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Point2) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Four corners in consistent winding: top-left, top-right, bottom-right,
/// bottom-left in the target's own frame.
pub type Quad = [Point2; 4];

/// Planar pose summary of a quadrilateral.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub center_x: f32,
    pub center_y: f32,
    /// Width: mean of the top and bottom edge lengths.
    pub scale_x: f32,
    /// Height: mean of the left and right edge lengths.
    pub scale_y: f32,
    /// Angle of the top edge in radians, in (-pi, pi].
    pub rotation: f32,
}

impl Transform {
    /// Measures a transform from four corners.
    pub fn from_corners(corners: &Quad) -> Self {
        let [tl, tr, br, bl] = *corners;
        let center_x = (tl.x + tr.x + br.x + bl.x) * 0.25;
        let center_y = (tl.y + tr.y + br.y + bl.y) * 0.25;
        let scale_x = (tl.distance(tr) + bl.distance(br)) * 0.5;
        let scale_y = (tl.distance(bl) + tr.distance(br)) * 0.5;
        let rotation = wrap_angle((tr.y - tl.y).atan2(tr.x - tl.x));
        Self {
            center_x,
            center_y,
            scale_x,
            scale_y,
            rotation,
        }
    }

    /// Rebuilds the rectangle described by this transform.
    pub fn to_corners(&self) -> Quad {
        let (sin, cos) = self.rotation.sin_cos();
        let hx = self.scale_x * 0.5;
        let hy = self.scale_y * 0.5;
        let place = |lx: f32, ly: f32| {
            Point2::new(
                self.center_x + lx * cos - ly * sin,
                self.center_y + lx * sin + ly * cos,
            )
        };
        [
            place(-hx, -hy),
            place(hx, -hy),
            place(hx, hy),
            place(-hx, hy),
        ]
    }
}

/// Largest corner-to-corner distance between two quads.
pub fn max_corner_error(a: &Quad, b: &Quad) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(p, q)| p.distance(*q))
        .fold(0.0, f32::max)
}
