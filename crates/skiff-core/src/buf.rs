//! Destination memory for decoded documents.
//!
//! [`DocBuf`] is a single growable byte buffer holding every decoded value.
//! Decoders never touch caller structs; they write little-endian values into
//! `(offset, size)` slots derived from a shape descriptor. Indirection is
//! expressed as absolute `u32` offsets into the same buffer:
//!
//! - string slot: 8 bytes, `(u32 offset, u32 byte length)`
//! - sequence slot: 8 bytes, `(u32 element block offset, u32 element count)`
//! - pointer slot: 4 bytes, `u32 offset` (0 = nil)
//! - timestamp slot: 12 bytes, `(i64 epoch micros, i32 utc offset seconds)`
//!
//! The first [`HEADER_SIZE`] bytes are reserved so a data block can never sit
//! at offset 0, which keeps 0 free as the nil sentinel. Freshly allocated
//! blocks are zeroed; a value that never gets written reads back as the zero
//! value of its kind.

use crate::error::{DecodeError, DecodeResult};

/// Reserved prefix of every [`DocBuf`]; offset 0 is the nil sentinel.
pub(crate) const HEADER_SIZE: usize = 8;

/// A bounded byte range inside a [`DocBuf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Absolute byte offset of the range.
    pub offset: u32,
    /// Size of the range in bytes.
    pub size: u32,
}

impl Slot {
    /// Narrows to a sub-range, relative to this slot's start.
    #[must_use]
    pub(crate) fn narrow(self, rel: u32, size: u32) -> Slot {
        debug_assert!(rel + size <= self.size, "narrowed slot out of range");
        Slot {
            offset: self.offset + rel,
            size,
        }
    }
}

/// Growable decode destination. Created and owned by [`DocSet`](crate::view::DocSet).
#[derive(Debug, Clone)]
pub struct DocBuf {
    data: Vec<u8>,
}

impl DocBuf {
    pub(crate) fn new() -> Self {
        Self {
            data: vec![0; HEADER_SIZE],
        }
    }

    /// Drops all decoded content, keeping the allocation.
    pub(crate) fn reset(&mut self) {
        self.data.truncate(HEADER_SIZE);
        self.data[..HEADER_SIZE].fill(0);
    }

    /// Current end of the buffer as an absolute offset.
    pub(crate) fn end(&self) -> u32 {
        to_u32(self.data.len())
    }

    /// Appends a zeroed block and returns its absolute offset (never 0).
    pub(crate) fn alloc_block(&mut self, size: u32) -> u32 {
        let off = self.end();
        self.data.resize(self.data.len() + size as usize, 0);
        off
    }

    /// Appends `n` zero bytes at the end.
    pub(crate) fn extend_zeroed(&mut self, n: u32) {
        self.data.resize(self.data.len() + n as usize, 0);
    }

    /// Copies the block at `off..off + len` to the end of the buffer and
    /// returns the new offset. The old bytes are abandoned in place; since
    /// all references are absolute offsets, anything the block itself points
    /// at stays valid.
    pub(crate) fn relocate_block(&mut self, off: u32, len: u32) -> u32 {
        let new_off = self.end();
        self.data
            .extend_from_within(off as usize..(off + len) as usize);
        new_off
    }

    /// Zeroes a slot's bytes.
    pub(crate) fn zero(&mut self, at: Slot) {
        let range = self.range_mut(at, at.size);
        range.fill(0);
    }

    // Typed writes. Each write must cover the slot exactly; a size mismatch
    // is a compiler bug, not caller input, hence debug assertions.

    pub(crate) fn put_bool(&mut self, at: Slot, v: bool) {
        self.range_mut(at, 1)[0] = u8::from(v);
    }

    pub(crate) fn put_i8(&mut self, at: Slot, v: i8) {
        self.range_mut(at, 1).copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn put_i16(&mut self, at: Slot, v: i16) {
        self.range_mut(at, 2).copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn put_i32(&mut self, at: Slot, v: i32) {
        self.range_mut(at, 4).copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn put_i64(&mut self, at: Slot, v: i64) {
        self.range_mut(at, 8).copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn put_f32(&mut self, at: Slot, v: f32) {
        self.range_mut(at, 4).copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn put_f64(&mut self, at: Slot, v: f64) {
        self.range_mut(at, 8).copy_from_slice(&v.to_le_bytes());
    }

    /// Appends `bytes` as a fresh block and writes an `(offset, len)` pair
    /// into the 8-byte slot.
    pub(crate) fn put_var_bytes(&mut self, at: Slot, bytes: &[u8]) {
        let off = self.end();
        self.data.extend_from_slice(bytes);
        let range = self.range_mut(at, 8);
        range[..4].copy_from_slice(&off.to_le_bytes());
        range[4..].copy_from_slice(&to_u32(bytes.len()).to_le_bytes());
    }

    /// Writes a pointer slot. `off == 0` means nil.
    pub(crate) fn put_ref(&mut self, at: Slot, off: u32) {
        self.range_mut(at, 4).copy_from_slice(&off.to_le_bytes());
    }

    /// Writes a sequence slot: element block offset and element count.
    pub(crate) fn put_seq(&mut self, at: Slot, off: u32, count: u32) {
        let range = self.range_mut(at, 8);
        range[..4].copy_from_slice(&off.to_le_bytes());
        range[4..].copy_from_slice(&count.to_le_bytes());
    }

    /// Writes a timestamp slot: epoch microseconds plus UTC offset seconds.
    pub(crate) fn put_timestamp(&mut self, at: Slot, micros: i64, offset_secs: i32) {
        let range = self.range_mut(at, 12);
        range[..8].copy_from_slice(&micros.to_le_bytes());
        range[8..].copy_from_slice(&offset_secs.to_le_bytes());
    }

    // Typed reads.

    pub(crate) fn get_bool(&self, at: Slot) -> bool {
        self.range(at, 1)[0] != 0
    }

    pub(crate) fn get_i8(&self, at: Slot) -> i8 {
        i8::from_le_bytes(self.range(at, 1).try_into().unwrap())
    }

    pub(crate) fn get_i16(&self, at: Slot) -> i16 {
        i16::from_le_bytes(self.range(at, 2).try_into().unwrap())
    }

    pub(crate) fn get_i32(&self, at: Slot) -> i32 {
        i32::from_le_bytes(self.range(at, 4).try_into().unwrap())
    }

    pub(crate) fn get_i64(&self, at: Slot) -> i64 {
        i64::from_le_bytes(self.range(at, 8).try_into().unwrap())
    }

    pub(crate) fn get_f32(&self, at: Slot) -> f32 {
        f32::from_le_bytes(self.range(at, 4).try_into().unwrap())
    }

    pub(crate) fn get_f64(&self, at: Slot) -> f64 {
        f64::from_le_bytes(self.range(at, 8).try_into().unwrap())
    }

    /// Reads an `(offset, len)` pair from a string slot.
    pub(crate) fn get_var(&self, at: Slot) -> (u32, u32) {
        let range = self.range(at, 8);
        (
            u32::from_le_bytes(range[..4].try_into().unwrap()),
            u32::from_le_bytes(range[4..].try_into().unwrap()),
        )
    }

    pub(crate) fn get_ref(&self, at: Slot) -> u32 {
        u32::from_le_bytes(self.range(at, 4).try_into().unwrap())
    }

    /// Reads `(block offset, element count)` from a sequence slot.
    pub(crate) fn get_seq(&self, at: Slot) -> (u32, u32) {
        self.get_var(at)
    }

    /// Reads `(epoch micros, utc offset seconds)` from a timestamp slot.
    pub(crate) fn get_timestamp(&self, at: Slot) -> (i64, i32) {
        let range = self.range(at, 12);
        (
            i64::from_le_bytes(range[..8].try_into().unwrap()),
            i32::from_le_bytes(range[8..].try_into().unwrap()),
        )
    }

    /// Raw bytes of an out-of-line block.
    pub(crate) fn bytes_at(&self, off: u32, len: u32) -> &[u8] {
        &self.data[off as usize..(off + len) as usize]
    }

    fn range(&self, at: Slot, width: u32) -> &[u8] {
        debug_assert_eq!(at.size, width, "slot size mismatch");
        &self.data[at.offset as usize..(at.offset + width) as usize]
    }

    fn range_mut(&mut self, at: Slot, width: u32) -> &mut [u8] {
        debug_assert_eq!(at.size, width, "slot size mismatch");
        &mut self.data[at.offset as usize..(at.offset + width) as usize]
    }
}

fn to_u32(len: usize) -> u32 {
    u32::try_from(len).expect("document buffer exceeds 4 GiB")
}

/// Mutable view of a single custom-kind slot, handed to
/// [`RawDocDecode`](crate::decode::RawDocDecode) implementations.
///
/// A codec may fill its slot with one fixed-width value matching the slot
/// size, or with variable-length bytes through an 8-byte string-shaped slot.
#[derive(Debug)]
pub struct SlotMut<'a> {
    buf: &'a mut DocBuf,
    at: Slot,
}

impl<'a> SlotMut<'a> {
    pub(crate) fn new(buf: &'a mut DocBuf, at: Slot) -> Self {
        Self { buf, at }
    }

    /// Size of the destination slot in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.at.size
    }

    /// Writes a bool. Requires a 1-byte slot.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUnmarshal`] if the slot width does not
    /// match.
    pub fn put_bool(&mut self, v: bool) -> DecodeResult<()> {
        self.check_width(1, "bool")?;
        self.buf.put_bool(self.at, v);
        Ok(())
    }

    /// Writes an `i64`. Requires an 8-byte slot.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUnmarshal`] on a slot width mismatch.
    pub fn put_i64(&mut self, v: i64) -> DecodeResult<()> {
        self.check_width(8, "i64")?;
        self.buf.put_i64(self.at, v);
        Ok(())
    }

    /// Writes an `f64`. Requires an 8-byte slot.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUnmarshal`] on a slot width mismatch.
    pub fn put_f64(&mut self, v: f64) -> DecodeResult<()> {
        self.check_width(8, "f64")?;
        self.buf.put_f64(self.at, v);
        Ok(())
    }

    /// Stores `bytes` out of line and writes the reference. Requires an
    /// 8-byte slot.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUnmarshal`] on a slot width mismatch.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> DecodeResult<()> {
        self.check_width(8, "bytes")?;
        self.buf.put_var_bytes(self.at, bytes);
        Ok(())
    }

    /// Writes raw little-endian bytes covering the whole slot.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUnmarshal`] if `raw` does not cover the
    /// slot exactly.
    pub fn put_raw(&mut self, raw: &[u8]) -> DecodeResult<()> {
        if raw.len() != self.at.size as usize {
            return Err(DecodeError::InvalidUnmarshal { target: "raw slot" });
        }
        let at = self.at;
        self.buf.range_mut(at, at.size).copy_from_slice(raw);
        Ok(())
    }

    fn check_width(&self, width: u32, target: &'static str) -> DecodeResult<()> {
        if self.at.size == width {
            Ok(())
        } else {
            Err(DecodeError::InvalidUnmarshal { target })
        }
    }
}
