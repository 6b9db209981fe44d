use cgmath::{InnerSpace, MetricSpace, Point3, Vector3};

/// Axis-aligned bounding box in world space
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// A box that contains nothing; expanding it by any point yields that point.
    pub fn empty() -> Self {
        Self::new([f32::MAX; 3], [f32::MIN; 3])
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1] || self.min[2] > self.max[2]
    }

    pub fn expand_point(&mut self, p: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    /// Widen only the vertical extent so it covers `height`.
    pub fn expand_height(&mut self, height: f32) {
        self.min[1] = self.min[1].min(height);
        self.max[1] = self.max[1].max(height);
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        )
    }

    pub fn distance_to_center(&self, point: Point3<f32>) -> f32 {
        self.center().distance(point)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// Encode a unit normal into the `[0, 1]` range used by normal map texels.
pub fn encode_normal(n: [f32; 3]) -> [f32; 3] {
    [(n[0] + 1.0) * 0.5, (n[1] + 1.0) * 0.5, (n[2] + 1.0) * 0.5]
}

pub fn normalize_or_up(v: Vector3<f32>) -> Vector3<f32> {
    let len2 = v.magnitude2();
    if len2 > 0.0 && len2.is_finite() {
        v / len2.sqrt()
    } else {
        Vector3::unit_y()
    }
}
