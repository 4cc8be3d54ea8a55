//! Structure, sequence, and fixed-array decoders.
//!
//! The structure decoder drives key lookup (JSON) and positional column
//! mapping (columnar). The sequence decoder owns the grow-and-copy element
//! block strategy and doubles as the root row decoder for record batches.

use arrow_array::{Array, ListArray, StructArray};
use fxhash::FxHashMap;

use crate::buf::{DocBuf, Slot};
use crate::decode::{column, scan, DecodeContext, DecoderCell};
use crate::error::{DecodeError, DecodeResult};
use std::sync::Arc;

/// One promoted entry of a compiled structure's field table.
#[derive(Debug)]
pub(crate) struct CompiledField {
    pub(crate) name: Box<str>,
    /// Slot offset within the structure, relative to its start.
    pub(crate) offset: u32,
    pub(crate) size: u32,
    pub(crate) dec: Arc<DecoderCell>,
}

#[derive(Debug)]
pub(crate) struct StructDecoder {
    name: String,
    fields: Vec<CompiledField>,
    /// Exact wire-name lookup.
    exact: FxHashMap<Box<str>, usize>,
    /// ASCII-lowercased fallback, consulted only on an exact miss.
    folded: FxHashMap<String, usize>,
}

impl StructDecoder {
    pub(crate) fn new(name: &str, fields: Vec<CompiledField>) -> Self {
        let mut exact = FxHashMap::default();
        let mut folded = FxHashMap::default();
        for (i, f) in fields.iter().enumerate() {
            exact.insert(f.name.clone(), i);
            folded.entry(f.name.to_ascii_lowercase()).or_insert(i);
        }
        Self {
            name: name.to_owned(),
            fields,
            exact,
            folded,
        }
    }

    fn lookup(&self, key: &[u8]) -> Option<usize> {
        let key = std::str::from_utf8(key).ok()?;
        if let Some(&i) = self.exact.get(key) {
            return Some(i);
        }
        self.folded.get(&key.to_ascii_lowercase()).copied()
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
        let depth = depth + 1;
        scan::check_depth(buf, cur, depth)?;

        let mut cur = scan::skip_whitespace(buf, cur);
        match buf.get(cur) {
            Some(b'n') => {
                scan::validate_null(buf, cur)?;
                return Ok(cur + 4);
            }
            Some(b'{') => cur += 1,
            _ => {
                return Err(DecodeError::UnexpectedEnd {
                    context: "object",
                    offset: cur,
                });
            }
        }

        cur = scan::skip_whitespace(buf, cur);
        if buf.get(cur) == Some(&b'}') {
            return Ok(cur + 1);
        }

        loop {
            let (key, next) = scan::decode_string(buf, cur)?;
            let Some(key) = key else {
                return Err(DecodeError::InvalidCharacter {
                    byte: b'n',
                    context: "object",
                    offset: cur,
                });
            };
            cur = scan::skip_whitespace(buf, next);
            match buf.get(cur) {
                Some(b':') => cur += 1,
                Some(&b) => {
                    return Err(DecodeError::InvalidCharacter {
                        byte: b,
                        context: "object",
                        offset: cur,
                    });
                }
                None => {
                    return Err(DecodeError::UnexpectedEnd {
                        context: "object",
                        offset: cur,
                    });
                }
            }

            if let Some(i) = self.lookup(&key) {
                let f = &self.fields[i];
                let slot = at.narrow(f.offset, f.size);
                cur = f
                    .dec
                    .get()
                    .decode_json(cx, cur, depth, out, slot)
                    .map_err(|e| e.with_field(&self.name, &f.name))?;
            } else {
                cur = scan::skip_value(buf, cur, depth)?;
            }

            cur = scan::skip_whitespace(buf, cur);
            match buf.get(cur) {
                Some(b'}') => return Ok(cur + 1),
                Some(b',') => {
                    cur = scan::skip_whitespace(buf, cur + 1);
                }
                Some(&b) => {
                    return Err(DecodeError::InvalidCharacter {
                        byte: b,
                        context: "object",
                        offset: cur,
                    });
                }
                None => {
                    return Err(DecodeError::UnexpectedEnd {
                        context: "object",
                        offset: cur,
                    });
                }
            }
        }
    }

    /// Columnar decode of one row. Columns map to fields positionally, in
    /// declaration order; the batch producer is responsible for matching
    /// column order to the declared shape. A column count that differs from
    /// the promoted field count is rejected rather than silently truncated,
    /// since a shifted batch could otherwise mis-assign same-typed columns.
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
        let cols = column::downcast::<StructArray>(arr)
            .ok_or_else(|| column::type_error(arr, "struct").with_field(&self.name, ""))?;
        if cols.num_columns() != self.fields.len() {
            return Err(DecodeError::Type {
                value: format!("struct of {} columns", cols.num_columns()),
                target: "struct",
                offset: 0,
                strukt: self.name.clone(),
                field: String::new(),
            });
        }
        for (f, col) in self.fields.iter().zip(cols.columns()) {
            let slot = at.narrow(f.offset, f.size);
            f.dec
                .get()
                .decode_column(col.as_ref(), row, out, slot)
                .map_err(|e| e.with_field(&self.name, &f.name))?;
        }
        Ok(())
    }
}

/// Tracks a sequence's element block while it grows.
#[derive(Debug, Default)]
struct GrowState {
    block: u32,
    count: u32,
}

#[derive(Debug)]
pub(crate) struct SeqDecoder {
    pub(crate) elem: Arc<DecoderCell>,
    pub(crate) elem_size: u32,
}

impl SeqDecoder {
    pub(crate) fn new(elem: Arc<DecoderCell>, elem_size: u32) -> Self {
        Self { elem, elem_size }
    }

    /// Appends one zeroed element slot, relocating the block to the end of
    /// the buffer first if anything was allocated after it. References into
    /// already-decoded elements stay valid because they are absolute.
    fn append_slot(&self, out: &mut DocBuf, st: &mut GrowState) -> Slot {
        if st.count == 0 {
            st.block = out.alloc_block(self.elem_size);
        } else {
            let used = st.count * self.elem_size;
            if st.block + used != out.end() {
                st.block = out.relocate_block(st.block, used);
            }
            out.extend_zeroed(self.elem_size);
        }
        st.count += 1;
        Slot {
            offset: st.block + (st.count - 1) * self.elem_size,
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
        let depth = depth + 1;
        scan::check_depth(buf, cur, depth)?;

        let mut cur = scan::skip_whitespace(buf, cur);
        match buf.get(cur) {
            Some(b'n') => {
                scan::validate_null(buf, cur)?;
                return Ok(cur + 4);
            }
            Some(b'[') => cur += 1,
            _ => {
                return Err(DecodeError::UnexpectedEnd {
                    context: "sequence",
                    offset: cur,
                });
            }
        }

        cur = scan::skip_whitespace(buf, cur);
        if buf.get(cur) == Some(&b']') {
            out.put_seq(at, 0, 0);
            return Ok(cur + 1);
        }

        let mut st = GrowState::default();
        loop {
            let slot = self.append_slot(out, &mut st);
            cur = self.elem.get().decode_json(cx, cur, depth, out, slot)?;
            cur = scan::skip_whitespace(buf, cur);
            match buf.get(cur) {
                Some(b']') => {
                    out.put_seq(at, st.block, st.count);
                    return Ok(cur + 1);
                }
                Some(b',') => cur += 1,
                Some(&b) => {
                    return Err(DecodeError::InvalidCharacter {
                        byte: b,
                        context: "sequence",
                        offset: cur,
                    });
                }
                None => {
                    return Err(DecodeError::UnexpectedEnd {
                        context: "sequence",
                        offset: cur,
                    });
                }
            }
        }
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
        let list = column::downcast::<ListArray>(arr)
            .ok_or_else(|| column::type_error(arr, "sequence"))?;
        let offsets = list.value_offsets();
        #[allow(clippy::cast_sign_loss)]
        let (start, end) = (offsets[row] as usize, offsets[row + 1] as usize);
        let values = list.values();

        let mut st = GrowState::default();
        for i in start..end {
            let slot = self.append_slot(out, &mut st);
            self.elem.get().decode_column(values.as_ref(), i, out, slot)?;
        }
        out.put_seq(at, st.block, st.count);
        Ok(())
    }

    /// Root entry for a record batch viewed as rows: decodes every row of
    /// `rows` into successive elements.
    pub(crate) fn decode_rows(
        &self,
        rows: &StructArray,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<()> {
        let mut st = GrowState::default();
        for row in 0..rows.len() {
            let slot = self.append_slot(out, &mut st);
            self.elem.get().decode_column(rows, row, out, slot)?;
        }
        out.put_seq(at, st.block, st.count);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct ArrayDecoder {
    elem: Arc<DecoderCell>,
    elem_size: u32,
    len: usize,
    target: &'static str,
    strukt: String,
    field: String,
}

impl ArrayDecoder {
    pub(crate) fn new(
        elem: Arc<DecoderCell>,
        elem_size: u32,
        len: usize,
        target: &'static str,
        strukt: &str,
        field: &str,
    ) -> Self {
        Self {
            elem,
            elem_size,
            len,
            target,
            strukt: strukt.to_owned(),
            field: field.to_owned(),
        }
    }

    fn slot_at(&self, at: Slot, idx: usize) -> Slot {
        at.narrow(u32::try_from(idx).expect("array index overflow") * self.elem_size, self.elem_size)
    }

    fn zero_tail(&self, out: &mut DocBuf, at: Slot, from: usize) {
        for idx in from..self.len {
            out.zero(self.slot_at(at, idx));
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
        let depth = depth + 1;
        scan::check_depth(buf, cur, depth)?;

        let mut cur = scan::skip_whitespace(buf, cur);
        match buf.get(cur) {
            Some(b'n') => {
                scan::validate_null(buf, cur)?;
                self.zero_tail(out, at, 0);
                return Ok(cur + 4);
            }
            Some(b'[') => cur += 1,
            _ => {
                return Err(DecodeError::UnexpectedEnd {
                    context: "array",
                    offset: cur,
                });
            }
        }

        cur = scan::skip_whitespace(buf, cur);
        if buf.get(cur) == Some(&b']') {
            self.zero_tail(out, at, 0);
            return Ok(cur + 1);
        }

        let mut idx = 0usize;
        loop {
            if idx < self.len {
                let slot = self.slot_at(at, idx);
                cur = self.elem.get().decode_json(cx, cur, depth, out, slot)?;
            } else {
                // Excess input elements are consumed and dropped.
                cur = scan::skip_value(buf, cur, depth)?;
            }
            idx += 1;
            cur = scan::skip_whitespace(buf, cur);
            match buf.get(cur) {
                Some(b']') => {
                    // Shorter input leaves the declared tail zeroed.
                    self.zero_tail(out, at, idx.min(self.len));
                    return Ok(cur + 1);
                }
                Some(b',') => cur += 1,
                Some(&b) => {
                    return Err(DecodeError::InvalidCharacter {
                        byte: b,
                        context: "array",
                        offset: cur,
                    });
                }
                None => {
                    return Err(DecodeError::UnexpectedEnd {
                        context: "array",
                        offset: cur,
                    });
                }
            }
        }
    }

    /// Columnar decode: the list span length must equal the declared array
    /// length exactly.
    pub(crate) fn decode_column(
        &self,
        arr: &dyn Array,
        row: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<()> {
        if arr.is_null(row) {
            self.zero_tail(out, at, 0);
            return Ok(());
        }
        let list = column::downcast::<ListArray>(arr).ok_or_else(|| {
            column::type_error(arr, self.target).with_field(&self.strukt, &self.field)
        })?;
        let offsets = list.value_offsets();
        #[allow(clippy::cast_sign_loss)]
        let (start, end) = (offsets[row] as usize, offsets[row + 1] as usize);
        if end - start != self.len {
            return Err(DecodeError::Type {
                value: format!("list[{}]", end - start),
                target: self.target,
                offset: 0,
                strukt: self.strukt.clone(),
                field: self.field.clone(),
            });
        }
        let values = list.values();
        for idx in 0..self.len {
            let slot = self.slot_at(at, idx);
            self.elem
                .get()
                .decode_column(values.as_ref(), start + idx, out, slot)?;
        }
        Ok(())
    }
}
