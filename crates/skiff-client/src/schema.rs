//! Arrow schema derivation from shape descriptors.
//!
//! Upload payloads are record batches, so the client needs an Arrow schema
//! matching a declared shape. [`derive_schema`] maps descriptor kinds to
//! Arrow types, honoring per-field [`DateFormat`] overrides for
//! timestamp-shaped fields. Derivation follows the same field order and
//! embedded promotion as the positional columnar decode, so a batch built
//! against a derived schema round-trips through decode. It is never used on
//! the decode path itself.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::timezone::Tz;
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use skiff_core::{Descriptor, FieldDesc, Kind};
use thiserror::Error;

/// Metadata key carrying a field's date layout hint on derived schemas.
pub const LAYOUT_METADATA_KEY: &str = "layout";

/// Errors raised while deriving a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The root shape is not a structure.
    #[error("cannot derive a schema for {0}: not a structure shape")]
    NotAStructure(&'static str),

    /// A field's shape has no Arrow column representation.
    #[error("unsupported shape {0} in derived schema")]
    Unsupported(&'static str),

    /// A [`DateFormat`] names a timezone the tz database does not know.
    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}

/// Per-field date/timestamp column format, keyed by wire field name.
#[derive(Debug, Clone)]
pub struct DateFormat {
    /// Emit a 32-bit date column instead of a timestamp.
    pub is_32_bits: bool,
    /// Timestamp precision.
    pub unit: TimeUnit,
    /// IANA timezone name; validated up front.
    pub timezone: Option<String>,
    /// Free-form layout hint stored as field metadata.
    pub layout: Option<String>,
}

impl Default for DateFormat {
    fn default() -> Self {
        Self {
            is_32_bits: false,
            unit: TimeUnit::Millisecond,
            timezone: None,
            layout: None,
        }
    }
}

/// Derives the Arrow schema for `desc`, a structure shape.
///
/// # Errors
///
/// [`SchemaError`] if the root is not a structure, a field shape has no
/// column representation (maps), or a [`DateFormat`] timezone is unknown.
pub fn derive_schema(
    desc: &Descriptor,
    formats: &HashMap<String, DateFormat>,
) -> Result<Schema, SchemaError> {
    let Kind::Struct(fields) = &desc.kind else {
        return Err(SchemaError::NotAStructure(desc.name));
    };
    let mut columns = Vec::with_capacity(fields.len());
    collect_fields(fields, formats, &mut columns)?;
    Ok(Schema::new(columns))
}

/// Appends one Arrow field per declared field, flattening embedded
/// structures in place to mirror the decode-side column order.
fn collect_fields(
    fields: &[FieldDesc],
    formats: &HashMap<String, DateFormat>,
    out: &mut Vec<Field>,
) -> Result<(), SchemaError> {
    for fd in fields {
        if fd.embedded {
            let child = fd.shape.build();
            let inner = match child.kind {
                Kind::Struct(sub) => sub,
                Kind::Ptr(elem) => {
                    let pointee = elem.shape.build();
                    match pointee.kind {
                        Kind::Struct(sub) => sub,
                        _ => return Err(SchemaError::Unsupported(pointee.name)),
                    }
                }
                _ => return Err(SchemaError::Unsupported(child.name)),
            };
            collect_fields(&inner, formats, out)?;
            continue;
        }

        let (data_type, layout) = if fd.stringified {
            // Stringified payloads travel as text columns.
            (DataType::Utf8, None)
        } else {
            field_type(&fd.shape.build(), &fd.name, formats)?
        };
        let mut field = Field::new(fd.name.to_string(), data_type, true);
        if let Some(layout) = layout {
            field = field.with_metadata(HashMap::from([(
                LAYOUT_METADATA_KEY.to_owned(),
                layout,
            )]));
        }
        out.push(field);
    }
    Ok(())
}

fn field_type(
    desc: &Descriptor,
    field_name: &str,
    formats: &HashMap<String, DateFormat>,
) -> Result<(DataType, Option<String>), SchemaError> {
    let data_type = match &desc.kind {
        Kind::Bool => DataType::Boolean,
        Kind::Int8 => DataType::Int8,
        Kind::Int16 => DataType::Int16,
        Kind::Int32 => DataType::Int32,
        Kind::Int64 => DataType::Int64,
        Kind::Float32 => DataType::Float32,
        Kind::Float64 => DataType::Float64,
        // Custom codecs read from text columns.
        Kind::Str | Kind::Custom(_) => DataType::Utf8,
        Kind::Timestamp => return timestamp_type(field_name, formats),
        Kind::Seq(elem) | Kind::Array(elem, _) => {
            let (inner, _) = field_type(&elem.shape.build(), field_name, formats)?;
            DataType::List(Arc::new(Field::new("item", inner, true)))
        }
        Kind::Ptr(elem) => {
            let (inner, layout) = field_type(&elem.shape.build(), field_name, formats)?;
            return Ok((inner, layout));
        }
        Kind::Struct(sub) => {
            let mut inner = Vec::with_capacity(sub.len());
            collect_fields(sub, formats, &mut inner)?;
            DataType::Struct(inner.into())
        }
        Kind::Map(_) => return Err(SchemaError::Unsupported(desc.name)),
    };
    Ok((data_type, None))
}

fn timestamp_type(
    field_name: &str,
    formats: &HashMap<String, DateFormat>,
) -> Result<(DataType, Option<String>), SchemaError> {
    let default = DateFormat::default();
    let format = formats.get(field_name).unwrap_or(&default);
    if format.is_32_bits {
        return Ok((DataType::Date32, format.layout.clone()));
    }
    let tz = match &format.timezone {
        Some(name) => {
            if name.parse::<Tz>().is_err() {
                return Err(SchemaError::UnknownTimezone(name.clone()));
            }
            Some(Arc::from(name.as_str()))
        }
        None => None,
    };
    Ok((DataType::Timestamp(format.unit, tz), format.layout.clone()))
}
