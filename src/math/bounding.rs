//! Bounding sphere computation and stream I/O.

use std::io::{Read, Seek, Write};

use glam::Vec3;

use crate::error::Result;
use crate::io::{OffsetReader, OffsetWriter};

/// A sphere enclosing a piece of geometry.
///
/// Stored on disk as center (3 x f32) followed by radius (f32).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere centered between the min/max extents of `points`, with a radius
    /// reaching the farthest point.
    ///
    /// An empty set yields the zero sphere.
    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let mut min = points[0];
        let mut max = points[0];
        for point in &points[1..] {
            min = min.min(*point);
            max = max.max(*point);
        }
        Self::from_extents(min, max).fit_radius(points)
    }

    /// Sphere centered between `min` and `max`, with a radius spanning the
    /// half-diagonal.
    #[must_use]
    pub fn from_extents(min: Vec3, max: Vec3) -> Self {
        let center = (min + max) * 0.5;
        Self {
            center,
            radius: center.distance(max),
        }
    }

    fn fit_radius(mut self, points: &[Vec3]) -> Self {
        let mut radius: f32 = 0.0;
        for point in points {
            radius = radius.max(self.center.distance(*point));
        }
        self.radius = radius;
        self
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Self> {
        Ok(Self {
            center: reader.read_vec3()?,
            radius: reader.read_f32()?,
        })
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut OffsetWriter<'_, W>) -> Result<()> {
        writer.write_vec3(self.center)?;
        writer.write_f32(self.radius)
    }
}
