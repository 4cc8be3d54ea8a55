//! Typed decode core for the skiff document store client.
//!
//! Documents come back from the store in two encodings: raw JSON byte
//! streams and Arrow record batches. Both decode through one abstraction: a
//! caller declares a target shape with the [`Doc`] trait, the [`Registry`]
//! compiles (once, cached) a tree of specialized decoders for it, and the
//! tree executes directly against slot offsets in a [`DocSet`] destination
//! buffer — no per-value dynamic dispatch on the hot path.
//!
//! ```
//! use skiff_core::{unmarshal_json, Descriptor, Doc, DocSet, Field, Registry, ShapeRef};
//!
//! struct Span;
//!
//! impl Doc for Span {
//!     fn descriptor() -> Descriptor {
//!         Descriptor::struct_of::<Span>(
//!             "Span",
//!             vec![
//!                 Field::new("name", ShapeRef::of::<String>()),
//!                 Field::new("duration", ShapeRef::of::<i64>()),
//!             ],
//!         )
//!     }
//! }
//!
//! let reg = Registry::new();
//! let mut docs = DocSet::<Span>::new(&reg);
//! unmarshal_json(&reg, br#"[{"name":"GET /","duration":42}]"#, &mut docs).unwrap();
//! assert_eq!(docs.get(0).str("name"), "GET /");
//! assert_eq!(docs.get(0).i64("duration"), 42);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buf;
pub mod decode;
pub mod error;
pub mod registry;
pub mod shape;
pub mod view;

pub use buf::{DocBuf, Slot, SlotMut};
pub use decode::{
    unmarshal_json, unmarshal_json_with, unmarshal_record, DecodeOptions, RawDocDecode, MAX_DEPTH,
};
pub use error::{DecodeError, DecodeResult};
pub use registry::Registry;
pub use shape::{CustomShape, Descriptor, Doc, ElemDesc, Field, FieldDesc, Kind, ShapeRef};
pub use view::{DocSet, DocView, SeqView};
