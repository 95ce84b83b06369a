/// Box corners in coordinates normalized to the frame (0..1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Clamp corners into the unit square and order them.
    pub fn clamped(self) -> Self {
        let clamp = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let (x0, x1) = (clamp(self.x0), clamp(self.x1));
        let (y0, y1) = (clamp(self.y0), clamp(self.y1));
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Pixel rectangle `(x0, y0, x1, y1)` for a frame of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let w = width as f32;
        let h = height as f32;
        (
            (self.x0 * w) as u32,
            (self.y0 * h) as u32,
            (self.x1 * w) as u32,
            (self.y1 * h) as u32,
        )
    }

    pub fn area(&self) -> f32 {
        (self.x1 - self.x0).max(0.0) * (self.y1 - self.y0).max(0.0)
    }
}

/// One candidate object in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    /// Score in 0..1.
    pub confidence: f32,
    pub bbox: BoundingBox,
}
