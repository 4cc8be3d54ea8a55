//! Pointer and embedded-field decoders.
//!
//! Both share the lazy-allocation rule: storage behind an indirection comes
//! into existence only when a value is actually decoded. A JSON `null` (or
//! a null column entry) at a pointer position writes the nil sentinel / is
//! a no-op and never allocates.

use arrow_array::Array;

use crate::buf::{DocBuf, Slot};
use crate::decode::{scan, DecodeContext, DecoderCell};
use crate::error::DecodeResult;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct PtrDecoder {
    elem: Arc<DecoderCell>,
    elem_size: u32,
}

impl PtrDecoder {
    pub(crate) fn new(elem: Arc<DecoderCell>, elem_size: u32) -> Self {
        Self { elem, elem_size }
    }

    /// Reuses the existing pointee block or allocates a zeroed one.
    fn pointee(&self, out: &mut DocBuf, at: Slot) -> Slot {
        let mut off = out.get_ref(at);
        if off == 0 {
            off = out.alloc_block(self.elem_size);
            out.put_ref(at, off);
        }
        Slot {
            offset: off,
            size: self.elem_size,
        }
    }

    pub(crate) fn decode_json(
        &self,
        cx: &DecodeContext<'_>,
        cur: usize,
        depth: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<usize> {
        let buf = cx.json;
        let cur = scan::skip_whitespace(buf, cur);
        if buf.get(cur) == Some(&b'n') {
            scan::validate_null(buf, cur)?;
            out.put_ref(at, 0);
            return Ok(cur + 4);
        }
        let slot = self.pointee(out, at);
        self.elem.get().decode_json(cx, cur, depth, out, slot)
    }

    pub(crate) fn decode_column(
        &self,
        arr: &dyn Array,
        row: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<()> {
        if arr.is_null(row) {
            return Ok(());
        }
        let slot = self.pointee(out, at);
        self.elem.get().decode_column(arr, row, out, slot)
    }
}

/// Promoted-field decorator. The compiler flattens an embedded structure's
/// fields into the parent's key space; each promoted entry goes through one
/// of these, which rebases the destination onto the embedded storage (after
/// lazily allocating it when the embedded field is pointer-shaped) and
/// forwards to the real field decoder.
#[derive(Debug)]
pub(crate) struct AnonDecoder {
    /// Pointee size when the embedded field is a pointer; `None` when it is
    /// stored inline.
    alloc: Option<u32>,
    inner_offset: u32,
    inner_size: u32,
    dec: Arc<DecoderCell>,
}

impl AnonDecoder {
    pub(crate) fn new(
        alloc: Option<u32>,
        inner_offset: u32,
        inner_size: u32,
        dec: Arc<DecoderCell>,
    ) -> Self {
        Self {
            alloc,
            inner_offset,
            inner_size,
            dec,
        }
    }

    fn target_slot(&self, out: &mut DocBuf, at: Slot) -> Slot {
        match self.alloc {
            None => at.narrow(self.inner_offset, self.inner_size),
            Some(size) => {
                let mut off = out.get_ref(at);
                if off == 0 {
                    off = out.alloc_block(size);
                    out.put_ref(at, off);
                }
                Slot {
                    offset: off + self.inner_offset,
                    size: self.inner_size,
                }
            }
        }
    }

    pub(crate) fn decode_json(
        &self,
        cx: &DecodeContext<'_>,
        cur: usize,
        depth: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<usize> {
        let slot = self.target_slot(out, at);
        self.dec.get().decode_json(cx, cur, depth, out, slot)
    }

    pub(crate) fn decode_column(
        &self,
        arr: &dyn Array,
        row: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<()> {
        if arr.is_null(row) {
            return Ok(());
        }
        let slot = self.target_slot(out, at);
        self.dec.get().decode_column(arr, row, out, slot)
    }
}
