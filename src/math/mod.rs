//! Angle units and bounding volumes.

mod bounding;

pub use bounding::BoundingSphere;

use crate::error::Result;
use crate::io::{OffsetReader, OffsetWriter};
use std::io::{Read, Seek, Write};

/// One full turn in binary angle units.
pub const BAMS_TURN: f32 = 65536.0;

/// Convert a binary angle (0x10000 == 360 degrees) to radians.
#[must_use]
pub fn bams_to_radians(angle: i32) -> f32 {
    angle as f32 * (std::f32::consts::TAU / BAMS_TURN)
}

/// Convert radians to the nearest binary angle.
#[must_use]
pub fn radians_to_bams(radians: f32) -> i32 {
    (radians * (BAMS_TURN / std::f32::consts::TAU)).round() as i32
}

/// A per-axis rotation in signed 32-bit binary angle units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rotation3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Rotation3 {
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Self> {
        Ok(Self {
            x: reader.read_i32()?,
            y: reader.read_i32()?,
            z: reader.read_i32()?,
        })
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut OffsetWriter<'_, W>) -> Result<()> {
        writer.write_i32(self.x)?;
        writer.write_i32(self.y)?;
        writer.write_i32(self.z)
    }

    /// Per-axis angles in radians, in x/y/z order.
    #[must_use]
    pub fn to_radians(self) -> [f32; 3] {
        [
            bams_to_radians(self.x),
            bams_to_radians(self.y),
            bams_to_radians(self.z),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bams_quarter_turn() {
        let quarter = bams_to_radians(0x4000);
        assert!((quarter - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        assert_eq!(radians_to_bams(quarter), 0x4000);
    }

    #[test]
    fn test_bams_negative() {
        let angle = bams_to_radians(-0x8000);
        assert!((angle + std::f32::consts::PI).abs() < 1e-5);
    }
}
