//! Offset-following binary reader.

use std::any::Any;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use glam::Vec3;
use half::f16;

use super::Endian;
use crate::error::{Error, Result};

/// An endian-aware reader over a relocatable binary blob.
///
/// Offsets stored in the stream are byte distances from `base_offset`, not
/// from the field holding them. The value `0` always means "no object".
///
/// Objects reached through an offset more than once are resolved through an
/// internal cache keyed by absolute position, so shared sub-objects parse once
/// and keep their identity. The cache lives as long as the reader; it is not
/// shared between streams.
pub struct OffsetReader<R> {
    inner: R,
    endian: Endian,
    base_offset: u64,
    len: u64,
    cache: HashMap<u64, Box<dyn Any>>,
}

impl<R: Read + Seek> OffsetReader<R> {
    /// Wrap `inner`, capturing the stream length for offset bounds checks.
    ///
    /// The cursor is left where it was.
    pub fn new(mut inner: R, endian: Endian, base_offset: u64) -> Result<Self> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(Self {
            inner,
            endian,
            base_offset,
            len,
            cache: HashMap::new(),
        })
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Total stream length in bytes.
    pub fn stream_len(&self) -> u64 {
        self.len
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn skip(&mut self, bytes: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(bytes as i64))?;
        Ok(())
    }

    /// Drop all cached objects.
    ///
    /// Needed only when re-reading unrelated data through the same reader.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.inner.read_i8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(match self.endian {
            Endian::Little => self.inner.read_u16::<LittleEndian>()?,
            Endian::Big => self.inner.read_u16::<BigEndian>()?,
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(match self.endian {
            Endian::Little => self.inner.read_i16::<LittleEndian>()?,
            Endian::Big => self.inner.read_i16::<BigEndian>()?,
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(match self.endian {
            Endian::Little => self.inner.read_u32::<LittleEndian>()?,
            Endian::Big => self.inner.read_u32::<BigEndian>()?,
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(match self.endian {
            Endian::Little => self.inner.read_i32::<LittleEndian>()?,
            Endian::Big => self.inner.read_i32::<BigEndian>()?,
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(match self.endian {
            Endian::Little => self.inner.read_f32::<LittleEndian>()?,
            Endian::Big => self.inner.read_f32::<BigEndian>()?,
        })
    }

    /// Read an IEEE 754 binary16 value expanded to f32.
    ///
    /// Subnormals, infinities, and NaN all expand per the standard.
    pub fn read_f16(&mut self) -> Result<f32> {
        Ok(f16::from_bits(self.read_u16()?).to_f32())
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; count];
        self.inner.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Whether `offset` could point at data in this stream.
    ///
    /// `0` (the null sentinel) is always plausible. Any other value must be
    /// positive, 4-byte aligned, and land inside the stream once rebased.
    #[must_use]
    pub fn check_offset(&self, offset: i32) -> bool {
        if offset == 0 {
            return true;
        }
        offset > 0 && offset % 4 == 0 && self.base_offset + (offset as u64) < self.len
    }

    /// Run `f` with the cursor at `base_offset + offset`, then restore it.
    ///
    /// Returns `Ok(None)` without touching the stream when `offset` is `0`.
    /// The cursor is restored whether `f` succeeds or fails, so nested
    /// deferred reads compose.
    pub fn at_offset<T, F>(&mut self, offset: i32, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if offset == 0 {
            return Ok(None);
        }
        if !self.check_offset(offset) {
            let position = self.position()?;
            return Err(Error::MalformedOffset { offset, position });
        }
        let saved = self.position()?;
        self.seek(self.base_offset + offset as u64)?;
        let result = f(self);
        self.seek(saved)?;
        result.map(Some)
    }

    /// Read a 4-byte offset at the cursor, then resolve it like [`Self::at_offset`].
    ///
    /// The cursor ends up just past the offset field.
    pub fn read_offset_then<T, F>(&mut self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let offset = self.read_i32()?;
        self.at_offset(offset, f)
    }

    /// Like [`Self::read_offset_then`], but identical offsets yield the same object.
    ///
    /// The first successful parse at an absolute position is cached; later
    /// references clone the cached value instead of re-parsing. Failed parses
    /// are never cached, so speculative probes leave no trace.
    pub fn read_offset_cached<T, F>(&mut self, f: F) -> Result<Option<T>>
    where
        T: Clone + 'static,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let position = self.position()?;
        let offset = self.read_i32()?;
        if offset == 0 {
            return Ok(None);
        }
        if !self.check_offset(offset) {
            return Err(Error::MalformedOffset { offset, position });
        }
        let absolute = self.base_offset + offset as u64;
        if let Some(value) = self.cache.get(&absolute).and_then(|v| v.downcast_ref::<T>()) {
            return Ok(Some(value.clone()));
        }
        let saved = self.position()?;
        self.seek(absolute)?;
        let result = f(self);
        self.seek(saved)?;
        let value = result?;
        self.cache.insert(absolute, Box::new(value.clone()));
        Ok(Some(value))
    }
}
