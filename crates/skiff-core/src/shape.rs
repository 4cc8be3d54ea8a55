//! Shape descriptors for decode targets.
//!
//! A [`Descriptor`] is immutable metadata about one target type: its kind,
//! its inline byte size, and for structures an ordered field table with
//! precomputed packed offsets. Callers declare shapes by implementing
//! [`Doc`], usually through [`Descriptor::struct_of`] and the [`Field`]
//! builder:
//!
//! ```
//! use skiff_core::{Descriptor, Doc, Field, ShapeRef};
//!
//! struct Span {
//!     // conceptual layout; decode never touches this struct directly
//! }
//!
//! impl Doc for Span {
//!     fn descriptor() -> Descriptor {
//!         Descriptor::struct_of::<Span>(
//!             "Span",
//!             vec![
//!                 Field::new("trace_id", ShapeRef::of::<String>()),
//!                 Field::new("duration", ShapeRef::of::<i64>()),
//!             ],
//!         )
//!     }
//! }
//! ```
//!
//! Child references are lazy (`TypeId` plus a build function) so that
//! self-referential shapes — a tree node holding `Option<Box<Node>>` —
//! terminate: a pointer field contributes a fixed 4-byte slot regardless of
//! what it points at, so layout never needs to recurse through a pointer.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::decode::RawDocDecode;

/// A decode target shape. Implemented by hand (or by the blanket impls
/// below) rather than derived; the descriptor stands in for field tags.
pub trait Doc: 'static {
    /// Builds the shape descriptor for this type. Called lazily and
    /// memoized by the [`Registry`](crate::Registry); must be pure.
    fn descriptor() -> Descriptor;
}

/// Lazy reference to a child shape. Carries the `TypeId` for identity and a
/// build function invoked only when the child's descriptor is needed.
#[derive(Clone, Copy)]
pub struct ShapeRef {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    make: fn() -> Descriptor,
}

impl ShapeRef {
    /// Reference to `T`'s shape.
    #[must_use]
    pub fn of<T: Doc>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            make: T::descriptor,
        }
    }

    /// Builds the referenced descriptor. Prefer
    /// [`Registry::descriptor_of`](crate::Registry::descriptor_of) where a
    /// registry is at hand; this always rebuilds.
    #[must_use]
    pub fn build(&self) -> Descriptor {
        (self.make)()
    }
}

impl std::fmt::Debug for ShapeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeRef")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// What a shape is, structurally.
#[derive(Debug, Clone)]
pub enum Kind {
    /// 1-byte boolean.
    Bool,
    /// 1-byte signed integer.
    Int8,
    /// 2-byte signed integer.
    Int16,
    /// 4-byte signed integer.
    Int32,
    /// 8-byte signed integer.
    Int64,
    /// 4-byte IEEE float.
    Float32,
    /// 8-byte IEEE float.
    Float64,
    /// Out-of-line UTF-8 string (8-byte reference slot).
    Str,
    /// Instant with a fixed UTC offset (12-byte slot).
    Timestamp,
    /// Structure with a packed field table.
    Struct(Vec<FieldDesc>),
    /// Growable sequence (8-byte reference slot).
    Seq(ElemDesc),
    /// Fixed-length inline array.
    Array(ElemDesc, usize),
    /// Nilable pointer (4-byte reference slot, 0 = nil).
    Ptr(ElemDesc),
    /// String-keyed map. Accepted as a shape, rejected by the decoder.
    Map(ElemDesc),
    /// Caller-defined raw codec with a fixed slot size.
    Custom(CustomShape),
}

/// Element metadata for sequences, arrays, pointers, and maps.
#[derive(Debug, Clone, Copy)]
pub struct ElemDesc {
    /// The element shape.
    pub shape: ShapeRef,
    /// Inline size of one element.
    pub size: u32,
}

impl ElemDesc {
    /// Element descriptor for `T` with an eagerly computed size. Only
    /// fixed-length arrays need this; everything else defers.
    #[must_use]
    pub fn of<T: Doc>() -> Self {
        Self {
            shape: ShapeRef::of::<T>(),
            size: T::descriptor().size,
        }
    }

    /// Element descriptor for `T` with size resolution deferred to decoder
    /// compile time. Containers whose own slot width does not depend on the
    /// element (sequences, pointers, maps) use this, which is what lets a
    /// shape reference itself through them.
    #[must_use]
    pub fn deferred<T: Doc>() -> Self {
        Self {
            shape: ShapeRef::of::<T>(),
            size: 0,
        }
    }
}

/// One entry of a structure's field table.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    /// External (wire) name the decoder matches JSON keys against.
    pub name: Box<str>,
    /// Byte offset within the structure's slot.
    pub offset: u32,
    /// Inline size of the field.
    pub size: u32,
    /// Promote the child structure's fields into this one.
    pub embedded: bool,
    /// The wire value is a JSON string wrapping the real payload.
    pub stringified: bool,
    /// Child shape.
    pub shape: ShapeRef,
}

/// Custom-kind payload: a fixed slot size plus the codec that fills it.
#[derive(Clone)]
pub struct CustomShape {
    /// Inline slot size handed to the codec.
    pub size: u32,
    /// The raw codec.
    pub codec: Arc<dyn RawDocDecode>,
}

impl std::fmt::Debug for CustomShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomShape")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Immutable shape metadata for one decode target type.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Display name, used in error messages.
    pub name: &'static str,
    /// Identity of the Rust type this shape describes.
    pub type_id: TypeId,
    /// Inline byte size of one value of this shape.
    pub size: u32,
    /// Structural kind.
    pub kind: Kind,
}

impl Descriptor {
    /// Builds a structure descriptor for `T`, packing the given fields in
    /// declaration order. Skip-marked fields are dropped here and take part
    /// in neither layout nor decode nor schema derivation.
    #[must_use]
    pub fn struct_of<T: 'static>(name: &'static str, fields: Vec<Field>) -> Descriptor {
        let mut table = Vec::with_capacity(fields.len());
        let mut offset = 0u32;
        for f in fields {
            if f.skip {
                continue;
            }
            let size = f.shape.build().size;
            table.push(FieldDesc {
                name: f.name,
                offset,
                size,
                embedded: f.embedded,
                stringified: f.stringified,
                shape: f.shape,
            });
            offset += size;
        }
        Descriptor {
            name,
            type_id: TypeId::of::<T>(),
            size: offset,
            kind: Kind::Struct(table),
        }
    }

    /// Builds a custom-kind descriptor for `T` backed by `codec`, with a
    /// `size`-byte inline slot.
    #[must_use]
    pub fn custom_of<T: 'static>(
        name: &'static str,
        size: u32,
        codec: Arc<dyn RawDocDecode>,
    ) -> Descriptor {
        Descriptor {
            name,
            type_id: TypeId::of::<T>(),
            size,
            kind: Kind::Custom(CustomShape { size, codec }),
        }
    }

    fn leaf<T: 'static>(kind: Kind) -> Descriptor {
        let size = kind_size(&kind);
        Descriptor {
            name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size,
            kind,
        }
    }
}

fn kind_size(kind: &Kind) -> u32 {
    match kind {
        Kind::Bool | Kind::Int8 => 1,
        Kind::Int16 => 2,
        Kind::Int32 | Kind::Float32 | Kind::Ptr(_) => 4,
        Kind::Int64 | Kind::Float64 | Kind::Str | Kind::Seq(_) | Kind::Map(_) => 8,
        Kind::Timestamp => 12,
        Kind::Array(e, n) => e.size * u32::try_from(*n).expect("array length overflow"),
        Kind::Struct(fields) => fields.iter().map(|f| f.size).sum(),
        Kind::Custom(c) => c.size,
    }
}

/// Builder for one structure field, consumed by [`Descriptor::struct_of`].
#[derive(Debug, Clone)]
pub struct Field {
    name: Box<str>,
    shape: ShapeRef,
    embedded: bool,
    stringified: bool,
    skip: bool,
}

impl Field {
    /// A plain field matched by `name` on the wire.
    #[must_use]
    pub fn new(name: &str, shape: ShapeRef) -> Self {
        Self {
            name: name.into(),
            shape,
            embedded: false,
            stringified: false,
            skip: false,
        }
    }

    /// An embedded field: the child structure's fields are promoted into the
    /// parent's key space (JSON) and column span (columnar). The shape must
    /// be a structure or a pointer to one.
    #[must_use]
    pub fn embedded(name: &str, shape: ShapeRef) -> Self {
        Self {
            embedded: true,
            ..Self::new(name, shape)
        }
    }

    /// Marks the wire value as a JSON string wrapping the real payload.
    #[must_use]
    pub fn stringified(mut self) -> Self {
        self.stringified = true;
        self
    }

    /// Excludes the field entirely: no storage, no decode, no derived
    /// schema column.
    #[must_use]
    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }
}

macro_rules! leaf_doc {
    ($($t:ty => $kind:expr;)*) => {
        $(
            impl Doc for $t {
                fn descriptor() -> Descriptor {
                    Descriptor::leaf::<$t>($kind)
                }
            }
        )*
    };
}

leaf_doc! {
    bool => Kind::Bool;
    i8 => Kind::Int8;
    i16 => Kind::Int16;
    i32 => Kind::Int32;
    i64 => Kind::Int64;
    f32 => Kind::Float32;
    f64 => Kind::Float64;
    String => Kind::Str;
    DateTime<FixedOffset> => Kind::Timestamp;
}

impl<T: Doc> Doc for Vec<T> {
    fn descriptor() -> Descriptor {
        Descriptor::leaf::<Vec<T>>(Kind::Seq(ElemDesc::deferred::<T>()))
    }
}

impl<T: Doc, const N: usize> Doc for [T; N] {
    fn descriptor() -> Descriptor {
        Descriptor::leaf::<[T; N]>(Kind::Array(ElemDesc::of::<T>(), N))
    }
}

impl<T: Doc> Doc for Option<Box<T>> {
    fn descriptor() -> Descriptor {
        Descriptor::leaf::<Option<Box<T>>>(Kind::Ptr(ElemDesc::deferred::<T>()))
    }
}

impl<V: Doc> Doc for HashMap<String, V> {
    fn descriptor() -> Descriptor {
        Descriptor::leaf::<HashMap<String, V>>(Kind::Map(ElemDesc::deferred::<V>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Span;

    impl Doc for Span {
        fn descriptor() -> Descriptor {
            Descriptor::struct_of::<Span>(
                "Span",
                vec![
                    Field::new("ok", ShapeRef::of::<bool>()),
                    Field::new("id", ShapeRef::of::<i64>()),
                    Field::new("name", ShapeRef::of::<String>()),
                    Field::new("secret", ShapeRef::of::<String>()).skip(),
                ],
            )
        }
    }

    struct Node;

    impl Doc for Node {
        fn descriptor() -> Descriptor {
            Descriptor::struct_of::<Node>(
                "Node",
                vec![
                    Field::new("value", ShapeRef::of::<i32>()),
                    Field::new("next", ShapeRef::of::<Option<Box<Node>>>()),
                ],
            )
        }
    }

    #[test]
    fn struct_layout_is_packed() {
        let desc = Span::descriptor();
        let Kind::Struct(fields) = &desc.kind else {
            panic!("expected struct kind");
        };
        assert_eq!(fields.len(), 3, "skip-marked field must be dropped");
        assert_eq!(fields[0].offset, 0);
        assert_eq!(fields[1].offset, 1);
        assert_eq!(fields[2].offset, 9);
        assert_eq!(desc.size, 17);
    }

    #[test]
    fn cyclic_shape_terminates() {
        // Node references itself through a pointer; layout must not recurse.
        let desc = Node::descriptor();
        assert_eq!(desc.size, 8); // i32 + 4-byte pointer slot
    }

    #[test]
    fn leaf_sizes() {
        assert_eq!(bool::descriptor().size, 1);
        assert_eq!(i16::descriptor().size, 2);
        assert_eq!(f64::descriptor().size, 8);
        assert_eq!(String::descriptor().size, 8);
        assert_eq!(<DateTime<FixedOffset>>::descriptor().size, 12);
        assert_eq!(<Vec<i64>>::descriptor().size, 8);
        assert_eq!(<[i64; 4]>::descriptor().size, 32);
    }

    #[test]
    fn identical_types_yield_identical_layout() {
        let a = Span::descriptor();
        let b = Span::descriptor();
        assert_eq!(a.size, b.size);
        assert_eq!(a.type_id, b.type_id);
    }
}
