//! Basic-format materials.

use std::io::{Read, Seek, Write};

use crate::error::Result;
use crate::formats::Color;
use crate::io::bitfield;
use crate::io::{OffsetReader, OffsetWriter};

/// Blending operator for the source or destination alpha channel (3 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaOp {
    Zero,
    One,
    OtherColor,
    InverseOtherColor,
    SrcAlpha,
    InverseSrcAlpha,
    DstAlpha,
    InverseDstAlpha,
}

impl AlphaOp {
    fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::OtherColor,
            3 => Self::InverseOtherColor,
            4 => Self::SrcAlpha,
            5 => Self::InverseSrcAlpha,
            6 => Self::DstAlpha,
            _ => Self::InverseDstAlpha,
        }
    }

    fn to_bits(self) -> u32 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::OtherColor => 2,
            Self::InverseOtherColor => 3,
            Self::SrcAlpha => 4,
            Self::InverseSrcAlpha => 5,
            Self::DstAlpha => 6,
            Self::InverseDstAlpha => 7,
        }
    }
}

/// Texture filtering mode (2 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    PointSampled,
    Bilinear,
    Trilinear,
    Blend,
}

impl FilterMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::PointSampled,
            1 => Self::Bilinear,
            2 => Self::Trilinear,
            _ => Self::Blend,
        }
    }

    fn to_bits(self) -> u32 {
        match self {
            Self::PointSampled => 0,
            Self::Bilinear => 1,
            Self::Trilinear => 2,
            Self::Blend => 3,
        }
    }
}

/// The packed material flags word, kept raw for bit-exact round-trips.
///
/// Layout: user flags 0-6, pick status 7, super-sample 12, filter mode 13-14,
/// V-clamp 15, U-clamp 16, V-flip 17, U-flip 18, ignore-specular 19,
/// use-alpha 20, use-texture 21, environment-map 22, double-sided 23,
/// flat-shading 24, ignore-lighting 25, destination alpha 26-28, source
/// alpha 29-31. Bits 8-11 are dead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialFlags(pub u32);

macro_rules! flag_accessors {
    ($($get:ident, $set:ident, $bit:expr;)*) => {
        $(
            #[must_use]
            pub fn $get(&self) -> bool {
                self.0 & $bit != 0
            }

            pub fn $set(&mut self, value: bool) {
                if value {
                    self.0 |= $bit;
                } else {
                    self.0 &= !$bit;
                }
            }
        )*
    };
}

impl MaterialFlags {
    flag_accessors! {
        pick_status, set_pick_status, 0x80;
        super_sample, set_super_sample, 0x1000;
        clamp_v, set_clamp_v, 0x8000;
        clamp_u, set_clamp_u, 0x10000;
        flip_v, set_flip_v, 0x20000;
        flip_u, set_flip_u, 0x40000;
        ignore_specular, set_ignore_specular, 0x80000;
        use_alpha, set_use_alpha, 0x100000;
        use_texture, set_use_texture, 0x200000;
        environment_map, set_environment_map, 0x400000;
        double_sided, set_double_sided, 0x800000;
        flat_shading, set_flat_shading, 0x1000000;
        ignore_lighting, set_ignore_lighting, 0x2000000;
    }

    #[must_use]
    pub fn user_flags(&self) -> u32 {
        bitfield::extract(self.0, 0, 7)
    }

    pub fn set_user_flags(&mut self, value: u32) {
        self.0 = bitfield::insert(self.0, 0, 7, value);
    }

    #[must_use]
    pub fn filter_mode(&self) -> FilterMode {
        FilterMode::from_bits(bitfield::extract(self.0, 13, 2))
    }

    pub fn set_filter_mode(&mut self, mode: FilterMode) {
        self.0 = bitfield::insert(self.0, 13, 2, mode.to_bits());
    }

    #[must_use]
    pub fn destination_alpha(&self) -> AlphaOp {
        AlphaOp::from_bits(bitfield::extract(self.0, 26, 3))
    }

    pub fn set_destination_alpha(&mut self, op: AlphaOp) {
        self.0 = bitfield::insert(self.0, 26, 3, op.to_bits());
    }

    #[must_use]
    pub fn source_alpha(&self) -> AlphaOp {
        AlphaOp::from_bits(bitfield::extract(self.0, 29, 3))
    }

    pub fn set_source_alpha(&mut self, op: AlphaOp) {
        self.0 = bitfield::insert(self.0, 29, 3, op.to_bits());
    }
}

/// A Basic-format material (20 bytes on disk).
///
/// The texture word packs a 27-bit texture id with a 4-bit attribute; its top
/// bit is dead. Equality compares decoded fields only, so two materials whose
/// raw words differ in dead bits still compare equal, while any decoded field
/// difference makes them unequal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Material {
    pub diffuse: Color,
    pub specular: Color,
    pub exponent: f32,
    /// Packed texture id (bits 0-26) and attribute (bits 27-30).
    pub texture_word: u32,
    pub flags: MaterialFlags,
}

impl Material {
    #[must_use]
    pub fn texture_id(&self) -> u32 {
        bitfield::extract(self.texture_word, 0, 27)
    }

    pub fn set_texture_id(&mut self, id: u32) {
        self.texture_word = bitfield::insert(self.texture_word, 0, 27, id);
    }

    #[must_use]
    pub fn attribute(&self) -> u32 {
        bitfield::extract(self.texture_word, 27, 4)
    }

    pub fn set_attribute(&mut self, value: u32) {
        self.texture_word = bitfield::insert(self.texture_word, 27, 4, value);
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Self> {
        Ok(Self {
            diffuse: Color::read(reader)?,
            specular: Color::read(reader)?,
            exponent: reader.read_f32()?,
            texture_word: reader.read_u32()?,
            flags: MaterialFlags(reader.read_u32()?),
        })
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut OffsetWriter<'_, W>) -> Result<()> {
        self.diffuse.write(writer)?;
        self.specular.write(writer)?;
        writer.write_f32(self.exponent)?;
        writer.write_u32(self.texture_word)?;
        writer.write_u32(self.flags.0)
    }
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        self.diffuse == other.diffuse
            && self.specular == other.specular
            && self.exponent == other.exponent
            && self.texture_id() == other.texture_id()
            && self.attribute() == other.attribute()
            && self.flags.user_flags() == other.flags.user_flags()
            && self.flags.pick_status() == other.flags.pick_status()
            && self.flags.super_sample() == other.flags.super_sample()
            && self.flags.filter_mode() == other.flags.filter_mode()
            && self.flags.clamp_u() == other.flags.clamp_u()
            && self.flags.clamp_v() == other.flags.clamp_v()
            && self.flags.flip_u() == other.flags.flip_u()
            && self.flags.flip_v() == other.flags.flip_v()
            && self.flags.ignore_specular() == other.flags.ignore_specular()
            && self.flags.use_alpha() == other.flags.use_alpha()
            && self.flags.use_texture() == other.flags.use_texture()
            && self.flags.environment_map() == other.flags.environment_map()
            && self.flags.double_sided() == other.flags.double_sided()
            && self.flags.flat_shading() == other.flags.flat_shading()
            && self.flags.ignore_lighting() == other.flags.ignore_lighting()
            && self.flags.destination_alpha() == other.flags.destination_alpha()
            && self.flags.source_alpha() == other.flags.source_alpha()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_accessors() {
        let mut flags = MaterialFlags::default();
        flags.set_use_texture(true);
        flags.set_filter_mode(FilterMode::Trilinear);
        flags.set_source_alpha(AlphaOp::SrcAlpha);
        flags.set_destination_alpha(AlphaOp::InverseSrcAlpha);
        assert!(flags.use_texture());
        assert_eq!(flags.filter_mode(), FilterMode::Trilinear);
        assert_eq!(flags.source_alpha(), AlphaOp::SrcAlpha);
        assert_eq!(flags.destination_alpha(), AlphaOp::InverseSrcAlpha);
        assert!(!flags.use_alpha());
    }

    #[test]
    fn test_equality_ignores_dead_bits() {
        let mut a = Material::default();
        a.set_texture_id(42);
        let mut b = a;
        // Top bit of the texture word is outside both packed fields.
        b.texture_word |= 0x8000_0000;
        // Bits 8-11 of the flags word are dead.
        b.flags.0 |= 0x0000_0F00;
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_sees_packing_difference() {
        // Same flags word, different split between texture id and attribute.
        let mut a = Material::default();
        a.set_texture_id(1);
        let mut b = Material::default();
        b.set_attribute(1);
        assert_eq!(a.flags, b.flags);
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_sees_flag_difference() {
        let a = Material::default();
        let mut b = Material::default();
        b.flags.set_double_sided(true);
        assert_ne!(a, b);
    }
}
