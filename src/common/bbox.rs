use serde::{Deserialize, Serialize};

/// Axis-aligned box in image pixel coordinates.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            w: x2 - x1,
            h: y2 - y1,
        }
    }

    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::from_xyxy(x, y, x + w, y + h)
    }

    /// Builds a box from its center point and size.
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::from_xywh(cx - w / 2., cy - h / 2., w, h)
    }

    pub fn width(&self) -> f32 {
        self.w
    }

    pub fn height(&self) -> f32 {
        self.h
    }

    pub fn cx(&self) -> f32 {
        self.x1 + self.w / 2.
    }

    pub fn cy(&self) -> f32 {
        self.y1 + self.h / 2.
    }

    /// Returns the bounding box coordinates as `[x1, y1, x2, y2]`.
    pub fn xyxy(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.) * self.h.max(0.)
    }

    /// Computes the intersection area between this bounding box and another.
    pub fn intersect(&self, other: &BBox) -> f32 {
        let left = self.x1.max(other.x1);
        let right = self.x2.min(other.x2);
        let top = self.y1.max(other.y1);
        let bottom = self.y2.min(other.y2);
        (right - left).max(0.) * (bottom - top).max(0.)
    }

    /// Computes the union area between this bounding box and another.
    pub fn union(&self, other: &BBox) -> f32 {
        self.area() + other.area() - self.intersect(other)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let union = self.union(other);
        if union <= 0. {
            return 0.;
        }
        self.intersect(other) / union
    }

    /// Clips the box to `[0, width] x [0, height]`.
    pub fn clamp_to(self, width: f32, height: f32) -> Self {
        Self::from_xyxy(
            self.x1.clamp(0., width),
            self.y1.clamp(0., height),
            self.x2.clamp(0., width),
            self.y2.clamp(0., height),
        )
    }

    pub fn as_xy_wh_i32(&self) -> (i32, i32, i32, i32) {
        (self.x1.round() as i32,
         self.y1.round() as i32,
         self.w.round() as i32,
         self.h.round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_constructors_agree() {
        let a = BBox::from_xyxy(10., 20., 50., 80.);
        let b = BBox::from_xywh(10., 20., 40., 60.);
        let c = BBox::from_cxcywh(30., 50., 40., 60.);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.area(), 2400.);
    }

    #[test]
    fn test_iou() {
        let a = BBox::from_xyxy(0., 0., 10., 10.);
        let b = BBox::from_xyxy(5., 0., 15., 10.);
        assert_eq!(a.intersect(&b), 50.);
        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-6);

        let far = BBox::from_xyxy(100., 100., 110., 110.);
        assert_eq!(a.iou(&far), 0.);
        assert_eq!(a.iou(&a), 1.);
    }

    #[test]
    fn test_clamp_to_image() {
        let b = BBox::from_xyxy(-5., 10., 320., 290.).clamp_to(300., 300.);
        assert_eq!(b.xyxy(), [0., 10., 300., 290.]);
        assert_eq!(b.width(), 300.);
    }
}
