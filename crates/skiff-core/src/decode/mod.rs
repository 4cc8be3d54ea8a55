//! Decoder compilation and execution.
//!
//! A decode target compiles, once, into a tree of [`Decoder`] variants —
//! one variant per data shape — that write straight into destination slots
//! with no per-value dispatch beyond the enum match. Compilation walks the
//! shape descriptor; struct cycles are broken with placeholder cells that
//! are sealed after the struct's field table is built. Compiled trees are
//! cached by the [`Registry`](crate::Registry) for the process lifetime.
//!
//! Execution is synchronous and single-threaded. The JSON path threads an
//! explicit byte cursor; the columnar path walks an Arrow array row by row.
//! The first error aborts the decode; partial writes are not rolled back.

mod column;
mod container;
mod custom;
mod indirect;
mod primitive;
pub(crate) mod scan;

pub use custom::RawDocDecode;
pub use scan::MAX_DEPTH;

use std::sync::{Arc, OnceLock};

use arrow_array::{Array, RecordBatch, StructArray};
use fxhash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::buf::{DocBuf, Slot};
use crate::error::{DecodeError, DecodeResult};
use crate::registry::Registry;
use crate::shape::{Descriptor, Doc, FieldDesc, Kind};
use crate::view::DocSet;

use container::{ArrayDecoder, CompiledField, SeqDecoder, StructDecoder};
use custom::{CustomDecoder, CustomKind, WrappedDecoder};
use indirect::{AnonDecoder, PtrDecoder};
use primitive::{BoolDecoder, FloatDecoder, IntDecoder, IntWidth, StrDecoder};

/// Per-call decode options.
#[derive(Debug, Default, Clone)]
pub struct DecodeOptions {
    /// Cancellation handle passed to cancellation-aware custom codecs.
    /// Codecs own responsiveness; the decode loop itself never polls it.
    pub cancel: Option<CancellationToken>,
}

/// Per-call state threaded through the JSON decode tree.
pub(crate) struct DecodeContext<'a> {
    pub(crate) json: &'a [u8],
    pub(crate) opts: &'a DecodeOptions,
}

/// One compiled decoding operation.
#[derive(Debug)]
pub(crate) enum Decoder {
    Bool(BoolDecoder),
    Int(IntDecoder),
    Float(FloatDecoder),
    Str(StrDecoder),
    Struct(StructDecoder),
    Seq(SeqDecoder),
    Array(ArrayDecoder),
    Ptr(PtrDecoder),
    Anon(AnonDecoder),
    Wrapped(WrappedDecoder),
    Custom(CustomDecoder),
    Invalid(InvalidDecoder),
}

impl Decoder {
    pub(crate) fn decode_json(
        &self,
        cx: &DecodeContext<'_>,
        cur: usize,
        depth: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<usize> {
        match self {
            Decoder::Bool(d) => d.decode_json(cx, cur, out, at),
            Decoder::Int(d) => d.decode_json(cx, cur, out, at),
            Decoder::Float(d) => d.decode_json(cx, cur, out, at),
            Decoder::Str(d) => d.decode_json(cx, cur, out, at),
            Decoder::Struct(d) => d.decode_json(cx, cur, depth, out, at),
            Decoder::Seq(d) => d.decode_json(cx, cur, depth, out, at),
            Decoder::Array(d) => d.decode_json(cx, cur, depth, out, at),
            Decoder::Ptr(d) => d.decode_json(cx, cur, depth, out, at),
            Decoder::Anon(d) => d.decode_json(cx, cur, depth, out, at),
            Decoder::Wrapped(d) => d.decode_json(cx, cur, depth, out, at),
            Decoder::Custom(d) => d.decode_json(cx, cur, depth, out, at),
            Decoder::Invalid(d) => Err(d.error(cur)),
        }
    }

    pub(crate) fn decode_column(
        &self,
        arr: &dyn Array,
        row: usize,
        out: &mut DocBuf,
        at: Slot,
    ) -> DecodeResult<()> {
        match self {
            Decoder::Bool(d) => d.decode_column(arr, row, out, at),
            Decoder::Int(d) => d.decode_column(arr, row, out, at),
            Decoder::Float(d) => d.decode_column(arr, row, out, at),
            Decoder::Str(d) => d.decode_column(arr, row, out, at),
            Decoder::Struct(d) => d.decode_column(arr, row, out, at),
            Decoder::Seq(d) => d.decode_column(arr, row, out, at),
            Decoder::Array(d) => d.decode_column(arr, row, out, at),
            Decoder::Ptr(d) => d.decode_column(arr, row, out, at),
            Decoder::Anon(d) => d.decode_column(arr, row, out, at),
            Decoder::Wrapped(d) => d.decode_column(arr, row, out, at),
            Decoder::Custom(d) => d.decode_column(arr, row, out, at),
            Decoder::Invalid(d) => Err(d.error(0)),
        }
    }
}

/// Sentinel for shapes that are representable but not decodable, such as
/// maps. Compiling succeeds; touching the value fails.
#[derive(Debug)]
pub(crate) struct InvalidDecoder {
    target: &'static str,
    strukt: String,
    field: String,
}

impl InvalidDecoder {
    fn error(&self, offset: usize) -> DecodeError {
        DecodeError::Type {
            value: "value".to_owned(),
            target: self.target,
            offset,
            strukt: self.strukt.clone(),
            field: self.field.clone(),
        }
    }
}

/// Placeholder cell for a compiled decoder. Inserted into the per-walk
/// `seen` map before a struct's fields compile, then sealed, which is what
/// lets self-referential shapes compile to a finite tree.
#[derive(Debug)]
pub(crate) struct DecoderCell(OnceLock<Decoder>);

impl DecoderCell {
    fn empty() -> Arc<Self> {
        Arc::new(Self(OnceLock::new()))
    }

    fn sealed(dec: Decoder) -> Arc<Self> {
        let cell = Self(OnceLock::new());
        let _ = cell.0.set(dec);
        Arc::new(cell)
    }

    fn seal(&self, dec: Decoder) {
        let _ = self.0.set(dec);
    }

    /// Every cell is sealed before the compile walk returns; an unsealed
    /// cell at decode time is a compiler bug.
    pub(crate) fn get(&self) -> &Decoder {
        self.0.get().expect("decoder cell sealed during compile")
    }
}

type Seen = FxHashMap<std::any::TypeId, Arc<DecoderCell>>;

/// Compiles the root decoder for element shape `elem`: the decode target is
/// always a sequence of structures.
pub(crate) fn compile_root(reg: &Registry, elem: &Arc<Descriptor>) -> DecodeResult<Decoder> {
    if !matches!(elem.kind, Kind::Struct(_)) {
        return Err(DecodeError::InvalidUnmarshal { target: elem.name });
    }
    let mut seen = Seen::default();
    let cell = compile(reg, elem, "", "", &mut seen)?;
    Ok(Decoder::Seq(SeqDecoder::new(cell, elem.size)))
}

fn compile(
    reg: &Registry,
    desc: &Arc<Descriptor>,
    strukt: &str,
    field: &str,
    seen: &mut Seen,
) -> DecodeResult<Arc<DecoderCell>> {
    let cell = match &desc.kind {
        Kind::Bool => DecoderCell::sealed(Decoder::Bool(BoolDecoder::new(strukt, field))),
        Kind::Int8 => int_cell(IntWidth::W8, "i8", strukt, field),
        Kind::Int16 => int_cell(IntWidth::W16, "i16", strukt, field),
        Kind::Int32 => int_cell(IntWidth::W32, "i32", strukt, field),
        Kind::Int64 => int_cell(IntWidth::W64, "i64", strukt, field),
        Kind::Float32 => DecoderCell::sealed(Decoder::Float(FloatDecoder::new(
            false, "f32", strukt, field,
        ))),
        Kind::Float64 => DecoderCell::sealed(Decoder::Float(FloatDecoder::new(
            true, "f64", strukt, field,
        ))),
        Kind::Str => DecoderCell::sealed(Decoder::Str(StrDecoder::new(strukt, field))),
        Kind::Timestamp => DecoderCell::sealed(Decoder::Custom(CustomDecoder::new(
            CustomKind::Timestamp,
            strukt,
            field,
        ))),
        Kind::Custom(shape) => DecoderCell::sealed(Decoder::Custom(CustomDecoder::new(
            CustomKind::Hook(Arc::clone(&shape.codec)),
            strukt,
            field,
        ))),
        Kind::Ptr(elem) => {
            let pointee = reg.resolve(&elem.shape);
            let child = compile(reg, &pointee, strukt, field, seen)?;
            DecoderCell::sealed(Decoder::Ptr(PtrDecoder::new(child, pointee.size)))
        }
        Kind::Seq(elem) => {
            let ed = reg.resolve(&elem.shape);
            let child = compile(reg, &ed, strukt, field, seen)?;
            DecoderCell::sealed(Decoder::Seq(SeqDecoder::new(child, ed.size)))
        }
        Kind::Array(elem, len) => {
            let ed = reg.resolve(&elem.shape);
            let child = compile(reg, &ed, strukt, field, seen)?;
            DecoderCell::sealed(Decoder::Array(ArrayDecoder::new(
                child, ed.size, *len, desc.name, strukt, field,
            )))
        }
        Kind::Map(_) => DecoderCell::sealed(Decoder::Invalid(InvalidDecoder {
            target: desc.name,
            strukt: strukt.to_owned(),
            field: field.to_owned(),
        })),
        Kind::Struct(fields) => {
            if let Some(cell) = seen.get(&desc.type_id) {
                return Ok(Arc::clone(cell));
            }
            let cell = DecoderCell::empty();
            seen.insert(desc.type_id, Arc::clone(&cell));
            let compiled = compile_struct(reg, desc, fields, seen)?;
            cell.seal(Decoder::Struct(compiled));
            cell
        }
    };
    Ok(cell)
}

fn int_cell(width: IntWidth, target: &'static str, strukt: &str, field: &str) -> Arc<DecoderCell> {
    DecoderCell::sealed(Decoder::Int(IntDecoder::new(width, target, strukt, field)))
}

/// Compiles one declared field, honoring the stringified flag.
fn compile_field(
    reg: &Registry,
    strukt: &str,
    fd: &FieldDesc,
    seen: &mut Seen,
) -> DecodeResult<Arc<DecoderCell>> {
    let child_desc = reg.resolve(&fd.shape);
    let inner = compile(reg, &child_desc, strukt, &fd.name, seen)?;
    if fd.stringified {
        let is_ptr = matches!(child_desc.kind, Kind::Ptr(_));
        Ok(DecoderCell::sealed(Decoder::Wrapped(WrappedDecoder::new(
            inner, is_ptr,
        ))))
    } else {
        Ok(inner)
    }
}

/// Compiles a struct's field table, promoting embedded fields in place.
fn compile_struct(
    reg: &Registry,
    desc: &Arc<Descriptor>,
    fields: &[FieldDesc],
    seen: &mut Seen,
) -> DecodeResult<StructDecoder> {
    let mut table: Vec<CompiledField> = Vec::with_capacity(fields.len());
    for fd in fields {
        if fd.embedded {
            promote_embedded(reg, desc.name, fd, &mut table, seen)?;
        } else {
            table.push(CompiledField {
                name: fd.name.clone(),
                offset: fd.offset,
                size: fd.size,
                dec: compile_field(reg, desc.name, fd, seen)?,
            });
        }
    }
    Ok(StructDecoder::new(desc.name, table))
}

/// Flattens an embedded field: its child structure's fields enter the
/// parent's table in place, each behind an [`AnonDecoder`] that rebases
/// onto the embedded storage.
fn promote_embedded(
    reg: &Registry,
    strukt: &str,
    fd: &FieldDesc,
    table: &mut Vec<CompiledField>,
    seen: &mut Seen,
) -> DecodeResult<()> {
    let child_desc = reg.resolve(&fd.shape);
    let (alloc, inner) = match &child_desc.kind {
        Kind::Struct(_) => (None, Arc::clone(&child_desc)),
        Kind::Ptr(elem) => {
            let pointee = reg.resolve(&elem.shape);
            if matches!(pointee.kind, Kind::Struct(_)) {
                (Some(pointee.size), pointee)
            } else {
                push_invalid(table, fd, child_desc.name, strukt);
                return Ok(());
            }
        }
        _ => {
            push_invalid(table, fd, child_desc.name, strukt);
            return Ok(());
        }
    };

    let Kind::Struct(sub_fields) = &inner.kind else {
        unreachable!("embedded promotion target is a struct");
    };
    for sfd in sub_fields {
        let dec = compile_field(reg, inner.name, sfd, seen)?;
        table.push(CompiledField {
            name: sfd.name.clone(),
            offset: fd.offset,
            size: fd.size,
            dec: DecoderCell::sealed(Decoder::Anon(AnonDecoder::new(
                alloc, sfd.offset, sfd.size, dec,
            ))),
        });
    }
    Ok(())
}

fn push_invalid(table: &mut Vec<CompiledField>, fd: &FieldDesc, target: &'static str, strukt: &str) {
    table.push(CompiledField {
        name: fd.name.clone(),
        offset: fd.offset,
        size: fd.size,
        dec: DecoderCell::sealed(Decoder::Invalid(InvalidDecoder {
            target,
            strukt: strukt.to_owned(),
            field: fd.name.to_string(),
        })),
    });
}

/// Decodes a columnar record batch into `out`.
///
/// The batch is adapted to a row view; columns map to `T`'s declared fields
/// positionally, with embedded fields promoted in place.
///
/// # Errors
///
/// [`DecodeError::InvalidUnmarshal`] if `T` is not a structure shape, or
/// any decode error from the rows.
pub fn unmarshal_record<T: Doc>(
    reg: &Registry,
    batch: &RecordBatch,
    out: &mut DocSet<T>,
) -> DecodeResult<()> {
    let dec = reg.root_decoder::<T>()?;
    let Decoder::Seq(seq) = dec.as_ref() else {
        return Err(DecodeError::InvalidUnmarshal {
            target: std::any::type_name::<T>(),
        });
    };
    out.reset();
    let rows = StructArray::from(batch.clone());
    let (buf, root) = out.dest_mut();
    seq.decode_rows(&rows, buf, root)
}

/// Decodes a JSON array of documents into `out`.
///
/// # Errors
///
/// [`DecodeError::InvalidUnmarshal`] if `T` is not a structure shape, or
/// any scan/decode error with its byte offset.
pub fn unmarshal_json<T: Doc>(reg: &Registry, json: &[u8], out: &mut DocSet<T>) -> DecodeResult<()> {
    unmarshal_json_with(reg, json, &DecodeOptions::default(), out)
}

/// [`unmarshal_json`] with explicit [`DecodeOptions`].
///
/// A top-level `null` leaves the destination empty. Trailing non-whitespace
/// after the top-level value is a syntax error.
///
/// # Errors
///
/// Same as [`unmarshal_json`].
pub fn unmarshal_json_with<T: Doc>(
    reg: &Registry,
    json: &[u8],
    opts: &DecodeOptions,
    out: &mut DocSet<T>,
) -> DecodeResult<()> {
    let dec = reg.root_decoder::<T>()?;
    out.reset();
    let cx = DecodeContext { json, opts };
    let (buf, root) = out.dest_mut();
    let cur = dec.decode_json(&cx, 0, 0, buf, root)?;
    let cur = scan::skip_whitespace(json, cur);
    if cur != json.len() {
        return Err(DecodeError::Syntax {
            message: "trailing characters after top-level value".to_owned(),
            offset: cur,
        });
    }
    Ok(())
}
