//! Offset-scheduling binary writer.

use std::collections::VecDeque;
use std::io::{Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use glam::Vec3;
use half::f16;

use super::Endian;
use crate::error::{Error, Result};

type DeferredBody<'a, W> = Box<dyn FnOnce(&mut OffsetWriter<'a, W>) -> Result<()> + 'a>;

struct Deferred<'a, W: Write + Seek> {
    /// Position of the 4-byte placeholder to patch.
    placeholder: u64,
    body: DeferredBody<'a, W>,
}

/// An endian-aware writer that resolves offsets in a deferred pass.
///
/// [`schedule_offset`](Self::schedule_offset) emits a zero placeholder at the
/// cursor and queues the pointed-to data. Once all direct content is written,
/// [`flush_deferred`](Self::flush_deferred) drains the queue in FIFO order:
/// each body is written at the then-current end of the stream and the
/// placeholder is patched with the body's position relative to `base_offset`.
/// Bodies may schedule further writes, so arbitrarily deep graphs ride the
/// queue instead of the call stack.
///
/// Every patched placeholder location is recorded in order; container formats
/// that carry a relocation table emit one entry per recorded position. Null
/// references are written with [`write_null_offset`](Self::write_null_offset)
/// and are never patched or recorded.
///
/// There is no write-side identity cache: data referenced from two places is
/// scheduled twice and written twice. This mirrors the original format
/// tooling and is asymmetric with the read-side object cache on purpose.
pub struct OffsetWriter<'a, W: Write + Seek> {
    inner: W,
    endian: Endian,
    base_offset: u64,
    queue: VecDeque<Deferred<'a, W>>,
    offset_positions: Vec<u64>,
}

impl<'a, W: Write + Seek> OffsetWriter<'a, W> {
    pub fn new(inner: W, endian: Endian, base_offset: u64) -> Self {
        Self {
            inner,
            endian,
            base_offset,
            queue: VecDeque::new(),
            offset_positions: Vec::new(),
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Every placeholder position patched so far, in patch order.
    pub fn offset_positions(&self) -> &[u64] {
        &self.offset_positions
    }

    /// Unwrap the inner stream.
    ///
    /// Scheduled but unflushed writes are discarded, so call
    /// [`flush_deferred`](Self::flush_deferred) first.
    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        Ok(self.inner.write_i8(value)?)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.inner.write_u16::<LittleEndian>(value)?,
            Endian::Big => self.inner.write_u16::<BigEndian>(value)?,
        })
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.inner.write_i16::<LittleEndian>(value)?,
            Endian::Big => self.inner.write_i16::<BigEndian>(value)?,
        })
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.inner.write_u32::<LittleEndian>(value)?,
            Endian::Big => self.inner.write_u32::<BigEndian>(value)?,
        })
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.inner.write_i32::<LittleEndian>(value)?,
            Endian::Big => self.inner.write_i32::<BigEndian>(value)?,
        })
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.inner.write_f32::<LittleEndian>(value)?,
            Endian::Big => self.inner.write_f32::<BigEndian>(value)?,
        })
    }

    /// Write `value` narrowed to IEEE 754 binary16.
    pub fn write_f16(&mut self, value: f32) -> Result<()> {
        self.write_u16(f16::from_f32(value).to_bits())
    }

    pub fn write_vec3(&mut self, value: Vec3) -> Result<()> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    /// Pad with zero bytes until the cursor is a multiple of `alignment`.
    pub fn align(&mut self, alignment: u64) -> Result<()> {
        let position = self.position()?;
        let padding = (alignment - position % alignment) % alignment;
        for _ in 0..padding {
            self.write_u8(0)?;
        }
        Ok(())
    }

    /// Overwrite the u32 at `position`, then restore the cursor.
    pub fn patch_u32(&mut self, position: u64, value: u32) -> Result<()> {
        let saved = self.position()?;
        self.seek(position)?;
        self.write_u32(value)?;
        self.seek(saved)?;
        Ok(())
    }

    /// Write the 4 zero bytes of a null reference.
    ///
    /// Never scheduled, never patched, never relocated.
    pub fn write_null_offset(&mut self) -> Result<()> {
        self.write_u32(0)
    }

    /// Emit a 4-byte placeholder at the cursor and queue `body` to be written
    /// later, once all direct content is out.
    pub fn schedule_offset<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()> + 'a,
    {
        let placeholder = self.position()?;
        self.write_u32(0)?;
        self.queue.push_back(Deferred {
            placeholder,
            body: Box::new(body),
        });
        Ok(())
    }

    /// Drain the deferred-write queue in FIFO order.
    ///
    /// Each body lands at the 4-aligned end of the stream; its placeholder is
    /// patched with the position relative to `base_offset` and recorded for
    /// relocation. Bodies that schedule more writes extend the same queue.
    pub fn flush_deferred(&mut self) -> Result<()> {
        while let Some(deferred) = self.queue.pop_front() {
            self.inner.seek(SeekFrom::End(0))?;
            self.align(4)?;
            let target = self.position()?;
            let relative = target - self.base_offset;
            let patched = u32::try_from(relative).map_err(|_| Error::OffsetOverflow {
                position: deferred.placeholder,
            })?;
            self.patch_u32(deferred.placeholder, patched)?;
            self.offset_positions.push(deferred.placeholder);
            (deferred.body)(self)?;
        }
        Ok(())
    }
}
