//! Custom codecs, timestamps, and string-wrapped payloads.
//!
//! The custom decoder hands the exact byte sub-slice of a value to a
//! caller-supplied [`RawDocDecode`] codec (or, for timestamps, to the
//! built-in RFC 3339 parser). The wrapped decoder handles values that
//! arrive as JSON strings containing the real payload.

use arrow_array::{Array, StringArray};
use tokio_util::sync::CancellationToken;

use crate::buf::{DocBuf, Slot, SlotMut};
use crate::decode::{column, scan, DecodeContext, DecoderCell};
use crate::error::{DecodeError, DecodeResult};
use std::sync::Arc;

/// A caller-defined raw codec for custom-kind shapes.
///
/// In JSON mode the codec receives the exact byte range of the value,
/// including quotes for strings; in columnar mode it receives the bytes of
/// a string column entry. It writes its result through the provided slot.
/// A null value in either mode never reaches the codec.
pub trait RawDocDecode: Send + Sync + 'static {
    /// Decodes `raw` into the destination slot.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`]; syntax errors are rebased onto the call-site
    /// offset of the outer input.
    fn decode_raw(&self, raw: &[u8], out: SlotMut<'_>) -> DecodeResult<()>;

    /// Cancellation-aware variant, used when the decode carries a token.
    /// The codec owns responsiveness: the default ignores the token and
    /// defers to [`decode_raw`](Self::decode_raw).
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`].
    fn decode_raw_cancellable(
        &self,
        _cancel: &CancellationToken,
        raw: &[u8],
        out: SlotMut<'_>,
    ) -> DecodeResult<()> {
        self.decode_raw(raw, out)
    }
}

#[derive(Clone)]
pub(crate) enum CustomKind {
    /// Built-in RFC 3339 timestamp codec writing a 12-byte timestamp slot.
    Timestamp,
    /// Caller-supplied codec.
    Hook(Arc<dyn RawDocDecode>),
}

impl std::fmt::Debug for CustomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustomKind::Timestamp => f.write_str("Timestamp"),
            CustomKind::Hook(_) => f.write_str("Hook"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct CustomDecoder {
    kind: CustomKind,
    strukt: String,
    field: String,
}

impl CustomDecoder {
    pub(crate) fn new(kind: CustomKind, strukt: &str, field: &str) -> Self {
        Self {
            kind,
            strukt: strukt.to_owned(),
            field: field.to_owned(),
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
        let start = scan::skip_whitespace(buf, cur);
        let end = scan::skip_value(buf, start, depth)?;
        let raw = &buf[start..end];
        if raw == b"null" {
            return Ok(end);
        }
        match &self.kind {
            CustomKind::Timestamp => {
                let (micros, offset_secs) = parse_rfc3339(raw, start)?;
                out.put_timestamp(at, micros, offset_secs);
            }
            CustomKind::Hook(codec) => {
                let raw = raw.to_vec();
                let slot = SlotMut::new(out, at);
                let res = match &cx.opts.cancel {
                    Some(token) => codec.decode_raw_cancellable(token, &raw, slot),
                    None => codec.decode_raw(&raw, slot),
                };
                res.map_err(|e| e.at_offset(start).with_field(&self.strukt, &self.field))?;
            }
        }
        Ok(end)
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
        match &self.kind {
            CustomKind::Timestamp => {
                if let Some((micros, offset_secs)) = column::timestamp_value(arr, row) {
                    out.put_timestamp(at, micros, offset_secs);
                }
            }
            CustomKind::Hook(codec) => {
                if let Some(col) = column::downcast::<StringArray>(arr) {
                    let raw = col.value(row).as_bytes().to_vec();
                    codec
                        .decode_raw(&raw, SlotMut::new(out, at))
                        .map_err(|e| e.with_field(&self.strukt, &self.field))?;
                }
            }
        }
        Ok(())
    }
}

/// Parses a quoted RFC 3339 timestamp token into epoch microseconds and the
/// encoded UTC offset in seconds.
fn parse_rfc3339(raw: &[u8], offset: usize) -> DecodeResult<(i64, i32)> {
    let syntax = || DecodeError::Syntax {
        message: format!("invalid timestamp {}", String::from_utf8_lossy(raw)),
        offset,
    };
    if raw.len() < 2 || raw[0] != b'"' || raw[raw.len() - 1] != b'"' {
        return Err(syntax());
    }
    let inner = std::str::from_utf8(&raw[1..raw.len() - 1]).map_err(|_| syntax())?;
    let dt = chrono::DateTime::parse_from_rfc3339(inner).map_err(|_| syntax())?;
    Ok((dt.timestamp_micros(), dt.offset().local_minus_utc()))
}

/// Decoder for values that arrive as JSON strings wrapping the real
/// payload. The string is unescaped and the child decoder re-runs over the
/// extracted bytes in a nested context; the outer cursor resumes after the
/// closing quote.
#[derive(Debug)]
pub(crate) struct WrappedDecoder {
    inner: Arc<DecoderCell>,
    /// Whether the destination is a pointer slot, which `null` must nil.
    is_ptr: bool,
}

impl WrappedDecoder {
    pub(crate) fn new(inner: Arc<DecoderCell>, is_ptr: bool) -> Self {
        Self { inner, is_ptr }
    }

    pub(crate) fn decode_json(
        &self,
        cx: &DecodeContext<'_>,
        cur: usize,
        depth: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<usize> {
        let (bytes, next) = scan::decode_string(cx.json, cur)?;
        match bytes {
            None => {
                if self.is_ptr {
                    out.put_ref(at, 0);
                }
                Ok(next)
            }
            Some(payload) => {
                let nested = DecodeContext {
                    json: &payload,
                    opts: cx.opts,
                };
                self.inner.get().decode_json(&nested, 0, depth, out, at)?;
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
            if self.is_ptr {
                out.put_ref(at, 0);
            }
            return Ok(());
        }
        self.inner.get().decode_column(arr, row, out, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_with_offset() {
        let (micros, off) = parse_rfc3339(br#""2021-07-01T08:00:00-04:00""#, 0).unwrap();
        assert_eq!(micros, 1_625_140_800_000_000);
        assert_eq!(off, -4 * 3600);
    }

    #[test]
    fn rfc3339_utc_zulu() {
        let (micros, off) = parse_rfc3339(br#""1970-01-01T00:00:01Z""#, 0).unwrap();
        assert_eq!(micros, 1_000_000);
        assert_eq!(off, 0);
    }

    #[test]
    fn unquoted_timestamp_is_syntax_error() {
        let err = parse_rfc3339(b"12345", 9).unwrap_err();
        assert!(matches!(err, DecodeError::Syntax { offset: 9, .. }));
    }
}
