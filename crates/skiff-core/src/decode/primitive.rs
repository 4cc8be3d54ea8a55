//! Leaf decoders for booleans, integers, floats, and strings.
//!
//! Each decoder owns the structure/field names it was compiled for so type
//! errors can name their location without any unwinding bookkeeping.

use arrow_array::{
    Array, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, StringArray,
};

use crate::buf::{DocBuf, Slot};
use crate::decode::{column, scan, DecodeContext};
use crate::error::{DecodeError, DecodeResult};

#[derive(Debug)]
pub(crate) struct BoolDecoder {
    strukt: String,
    field: String,
}

impl BoolDecoder {
    pub(crate) fn new(strukt: &str, field: &str) -> Self {
        Self {
            strukt: strukt.to_owned(),
            field: field.to_owned(),
        }
    }

    pub(crate) fn decode_json(
        &self,
        cx: &DecodeContext<'_>,
        cur: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<usize> {
        let buf = cx.json;
        let cur = scan::skip_whitespace(buf, cur);
        match buf.get(cur) {
            Some(b't') => {
                scan::validate_true(buf, cur)?;
                out.put_bool(at, true);
                Ok(cur + 4)
            }
            Some(b'f') => {
                scan::validate_false(buf, cur)?;
                out.put_bool(at, false);
                Ok(cur + 5)
            }
            Some(b'n') => {
                scan::validate_null(buf, cur)?;
                Ok(cur + 4)
            }
            Some(b'"') => Err(self.mismatch("string", cur)),
            Some(b'-' | b'0'..=b'9') => Err(self.mismatch("number", cur)),
            _ => Err(DecodeError::UnexpectedEnd {
                context: "bool",
                offset: cur,
            }),
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
        let col = column::downcast::<BooleanArray>(arr)
            .ok_or_else(|| column::type_error(arr, "bool").with_field(&self.strukt, &self.field))?;
        out.put_bool(at, col.value(row));
        Ok(())
    }

    fn mismatch(&self, value: &str, offset: usize) -> DecodeError {
        DecodeError::Type {
            value: value.to_owned(),
            target: "bool",
            offset,
            strukt: self.strukt.clone(),
            field: self.field.clone(),
        }
    }
}

/// Destination width of an integer slot.
#[derive(Debug, Clone, Copy)]
pub(crate) enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

#[derive(Debug)]
pub(crate) struct IntDecoder {
    width: IntWidth,
    target: &'static str,
    strukt: String,
    field: String,
}

impl IntDecoder {
    pub(crate) fn new(width: IntWidth, target: &'static str, strukt: &str, field: &str) -> Self {
        Self {
            width,
            target,
            strukt: strukt.to_owned(),
            field: field.to_owned(),
        }
    }

    pub(crate) fn decode_json(
        &self,
        cx: &DecodeContext<'_>,
        cur: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<usize> {
        let buf = cx.json;
        let cur = scan::skip_whitespace(buf, cur);
        match buf.get(cur) {
            Some(b'-' | b'0'..=b'9') => {
                let end = scan::skip_number(buf, cur);
                let token = std::str::from_utf8(&buf[cur..end]).unwrap_or("");
                let v: i64 = token
                    .parse()
                    .map_err(|_| self.mismatch(&format!("number {token}"), cur))?;
                self.store(out, at, v, cur)?;
                Ok(end)
            }
            Some(b'n') => {
                scan::validate_null(buf, cur)?;
                Ok(cur + 4)
            }
            Some(b'"') => Err(self.mismatch("string", cur)),
            Some(b't' | b'f') => Err(self.mismatch("bool", cur)),
            _ => Err(DecodeError::UnexpectedEnd {
                context: "number",
                offset: cur,
            }),
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
        let mismatch =
            || column::type_error(arr, self.target).with_field(&self.strukt, &self.field);
        match self.width {
            IntWidth::W8 => {
                let col = column::downcast::<Int8Array>(arr).ok_or_else(mismatch)?;
                out.put_i8(at, col.value(row));
            }
            IntWidth::W16 => {
                let col = column::downcast::<Int16Array>(arr).ok_or_else(mismatch)?;
                out.put_i16(at, col.value(row));
            }
            IntWidth::W32 => {
                let col = column::downcast::<Int32Array>(arr).ok_or_else(mismatch)?;
                out.put_i32(at, col.value(row));
            }
            IntWidth::W64 => {
                let col = column::downcast::<Int64Array>(arr).ok_or_else(mismatch)?;
                out.put_i64(at, col.value(row));
            }
        }
        Ok(())
    }

    fn store(&self, out: &mut DocBuf, at: Slot, v: i64, offset: usize) -> DecodeResult<()> {
        let overflow = |_| self.mismatch(&format!("number {v}"), offset);
        match self.width {
            IntWidth::W8 => out.put_i8(at, i8::try_from(v).map_err(overflow)?),
            IntWidth::W16 => out.put_i16(at, i16::try_from(v).map_err(overflow)?),
            IntWidth::W32 => out.put_i32(at, i32::try_from(v).map_err(overflow)?),
            IntWidth::W64 => out.put_i64(at, v),
        }
        Ok(())
    }

    fn mismatch(&self, value: &str, offset: usize) -> DecodeError {
        DecodeError::Type {
            value: value.to_owned(),
            target: self.target,
            offset,
            strukt: self.strukt.clone(),
            field: self.field.clone(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct FloatDecoder {
    wide: bool,
    target: &'static str,
    strukt: String,
    field: String,
}

impl FloatDecoder {
    pub(crate) fn new(wide: bool, target: &'static str, strukt: &str, field: &str) -> Self {
        Self {
            wide,
            target,
            strukt: strukt.to_owned(),
            field: field.to_owned(),
        }
    }

    pub(crate) fn decode_json(
        &self,
        cx: &DecodeContext<'_>,
        cur: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<usize> {
        let buf = cx.json;
        let cur = scan::skip_whitespace(buf, cur);
        match buf.get(cur) {
            Some(b'-' | b'0'..=b'9') => {
                let end = scan::skip_number(buf, cur);
                let token = std::str::from_utf8(&buf[cur..end]).unwrap_or("");
                let v: f64 = token
                    .parse()
                    .map_err(|_| self.mismatch(&format!("number {token}"), cur))?;
                if self.wide {
                    out.put_f64(at, v);
                } else {
                    #[allow(clippy::cast_possible_truncation)]
                    out.put_f32(at, v as f32);
                }
                Ok(end)
            }
            Some(b'n') => {
                scan::validate_null(buf, cur)?;
                Ok(cur + 4)
            }
            Some(b'"') => Err(self.mismatch("string", cur)),
            Some(b't' | b'f') => Err(self.mismatch("bool", cur)),
            _ => Err(DecodeError::UnexpectedEnd {
                context: "number",
                offset: cur,
            }),
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
        let mismatch =
            || column::type_error(arr, self.target).with_field(&self.strukt, &self.field);
        if self.wide {
            let col = column::downcast::<Float64Array>(arr).ok_or_else(mismatch)?;
            out.put_f64(at, col.value(row));
        } else {
            let col = column::downcast::<Float32Array>(arr).ok_or_else(mismatch)?;
            out.put_f32(at, col.value(row));
        }
        Ok(())
    }

    fn mismatch(&self, value: &str, offset: usize) -> DecodeError {
        DecodeError::Type {
            value: value.to_owned(),
            target: self.target,
            offset,
            strukt: self.strukt.clone(),
            field: self.field.clone(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct StrDecoder {
    strukt: String,
    field: String,
}

impl StrDecoder {
    pub(crate) fn new(strukt: &str, field: &str) -> Self {
        Self {
            strukt: strukt.to_owned(),
            field: field.to_owned(),
        }
    }

    pub(crate) fn decode_json(
        &self,
        cx: &DecodeContext<'_>,
        cur: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<usize> {
        let buf = cx.json;
        let cur = scan::skip_whitespace(buf, cur);
        match buf.get(cur) {
            Some(b'-' | b'0'..=b'9' | b't' | b'f' | b'{' | b'[') => Err(DecodeError::Type {
                value: "non-string value".to_owned(),
                target: "string",
                offset: cur,
                strukt: self.strukt.clone(),
                field: self.field.clone(),
            }),
            _ => {
                let (bytes, next) = scan::decode_string(buf, cur)?;
                if let Some(bytes) = bytes {
                    out.put_var_bytes(at, &bytes);
                }
                Ok(next)
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
        let col = column::downcast::<StringArray>(arr)
            .ok_or_else(|| column::type_error(arr, "string").with_field(&self.strukt, &self.field))?;
        out.put_var_bytes(at, col.value(row).as_bytes());
        Ok(())
    }
}
