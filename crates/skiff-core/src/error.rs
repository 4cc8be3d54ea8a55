//! Decode error taxonomy.
//!
//! Every error carries the byte offset at which it was raised (JSON mode)
//! so callers can point at the exact position in the input. Type mismatch
//! errors additionally name the structure and field being decoded; decoders
//! that wrap a child fill those names in as the error unwinds, without
//! changing the error's kind.

use thiserror::Error;

/// Result alias for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors raised while compiling a decoder or executing a decode.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The scanner reached the end of the input, or an invalid start byte,
    /// where a value of the named kind was expected.
    #[error("unexpected end of JSON input while decoding {context} at offset {offset}")]
    UnexpectedEnd {
        /// Kind of value being decoded ("bool", "string", "object", ...).
        context: &'static str,
        /// Byte offset in the input.
        offset: usize,
    },

    /// A structurally impossible byte appeared mid-value.
    #[error("invalid character '{}' in {context} at offset {offset}", .byte.escape_ascii())]
    InvalidCharacter {
        /// The offending byte.
        byte: u8,
        /// Kind of value being decoded.
        context: &'static str,
        /// Byte offset in the input.
        offset: usize,
    },

    /// Nesting exceeded [`MAX_DEPTH`](crate::decode::MAX_DEPTH).
    #[error("exceeded max depth at character '{}' offset {offset}", .byte.escape_ascii())]
    ExceededMaxDepth {
        /// Byte at the cursor when the limit was hit.
        byte: u8,
        /// Byte offset in the input.
        offset: usize,
    },

    /// Malformed input that is not a character-level violation: bad literal,
    /// trailing garbage, an unparseable wrapped payload.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Human-readable description.
        message: String,
        /// Byte offset in the input.
        offset: usize,
    },

    /// The input value's shape cannot be coerced into the target slot.
    #[error("cannot decode {value} into {target} at offset {offset} ({strukt}.{field})")]
    Type {
        /// Description of the source value ("string", "number 1.5", "list[3]").
        value: String,
        /// Name of the destination type.
        target: &'static str,
        /// Byte offset in the input (0 in columnar mode).
        offset: usize,
        /// Enclosing structure name, filled by wrapping decoders.
        strukt: String,
        /// Field name, filled by wrapping decoders.
        field: String,
    },

    /// The destination shape is unusable as a decode root.
    #[error("cannot decode into {target}: destination must be a sequence of structures")]
    InvalidUnmarshal {
        /// Name of the rejected destination type.
        target: &'static str,
    },
}

impl DecodeError {
    /// Fills in empty structure/field names on a type error. Other kinds
    /// pass through untouched.
    pub(crate) fn with_field(self, strukt: &str, field: &str) -> Self {
        match self {
            DecodeError::Type {
                value,
                target,
                offset,
                strukt: s,
                field: f,
            } => DecodeError::Type {
                value,
                target,
                offset,
                strukt: if s.is_empty() { strukt.to_owned() } else { s },
                field: if f.is_empty() { field.to_owned() } else { f },
            },
            other => other,
        }
    }

    /// Rebases a syntax error raised by a custom codec onto the call-site
    /// offset in the outer input.
    pub(crate) fn at_offset(self, offset: usize) -> Self {
        match self {
            DecodeError::Syntax { message, .. } => DecodeError::Syntax { message, offset },
            other => other,
        }
    }
}
