//! Typed read access to decoded documents.
//!
//! [`DocSet`] owns the destination buffer for one decode target and hands
//! out [`DocView`] / [`SeqView`] accessors over decoded elements. Every
//! shape reachable from the target is resolved through the registry once,
//! when the set is created; views borrow that table and never rebuild
//! descriptors. Accessors panic on a name or kind mismatch, which is a
//! programming error against the declared shape, never bad input.

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use fxhash::FxHashMap;

use crate::buf::{DocBuf, Slot};
use crate::registry::Registry;
use crate::shape::{Descriptor, Doc, FieldDesc, Kind, ShapeRef};

type ShapeTable = FxHashMap<TypeId, Arc<Descriptor>>;

/// Decode destination plus typed access for documents of shape `T`.
pub struct DocSet<T: Doc> {
    buf: DocBuf,
    desc: Arc<Descriptor>,
    shapes: ShapeTable,
    root: Slot,
    _marker: PhantomData<T>,
}

impl<T: Doc> DocSet<T> {
    /// Creates an empty destination for documents of shape `T`.
    #[must_use]
    pub fn new(reg: &Registry) -> Self {
        let desc = reg.descriptor_of::<T>();
        let mut shapes = ShapeTable::default();
        collect_shapes(reg, &desc, &mut shapes);
        let mut buf = DocBuf::new();
        let root = Slot {
            offset: buf.alloc_block(8),
            size: 8,
        };
        Self {
            buf,
            desc,
            shapes,
            root,
            _marker: PhantomData,
        }
    }

    /// Clears all decoded documents, keeping the allocation.
    pub(crate) fn reset(&mut self) {
        self.buf.reset();
        self.root = Slot {
            offset: self.buf.alloc_block(8),
            size: 8,
        };
    }

    pub(crate) fn dest_mut(&mut self) -> (&mut DocBuf, Slot) {
        (&mut self.buf, self.root)
    }

    /// Number of decoded documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.get_seq(self.root).1 as usize
    }

    /// `true` when no documents were decoded. A top-level `null` and an
    /// empty input array are indistinguishable here.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View of document `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    #[must_use]
    pub fn get(&self, i: usize) -> DocView<'_> {
        let (block, count) = self.buf.get_seq(self.root);
        assert!(i < count as usize, "document index {i} out of bounds ({count})");
        let idx = u32::try_from(i).expect("document index overflow");
        DocView {
            buf: &self.buf,
            shapes: &self.shapes,
            desc: Arc::clone(&self.desc),
            at: Slot {
                offset: block + idx * self.desc.size,
                size: self.desc.size,
            },
        }
    }

    /// Iterates over all decoded documents.
    pub fn iter(&self) -> impl Iterator<Item = DocView<'_>> {
        (0..self.len()).map(|i| self.get(i))
    }
}

impl<T: Doc> std::fmt::Debug for DocSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocSet")
            .field("shape", &self.desc.name)
            .field("len", &self.len())
            .finish()
    }
}

/// Resolves every shape reachable from `desc` into `out`, depth-first with
/// a seen check so self-referential shapes terminate.
fn collect_shapes(reg: &Registry, desc: &Descriptor, out: &mut ShapeTable) {
    match &desc.kind {
        Kind::Struct(fields) => {
            for fd in fields {
                insert_shape(reg, &fd.shape, out);
            }
        }
        Kind::Seq(elem) | Kind::Array(elem, _) | Kind::Ptr(elem) | Kind::Map(elem) => {
            insert_shape(reg, &elem.shape, out);
        }
        _ => {}
    }
}

fn insert_shape(reg: &Registry, shape: &ShapeRef, out: &mut ShapeTable) {
    if out.contains_key(&shape.type_id) {
        return;
    }
    let desc = reg.resolve(shape);
    out.insert(shape.type_id, Arc::clone(&desc));
    collect_shapes(reg, &desc, out);
}

/// Read view of one decoded structure.
pub struct DocView<'a> {
    buf: &'a DocBuf,
    shapes: &'a ShapeTable,
    desc: Arc<Descriptor>,
    at: Slot,
}

impl<'a> DocView<'a> {
    fn field(&self, name: &str) -> (&FieldDesc, Slot) {
        let Kind::Struct(fields) = &self.desc.kind else {
            panic!("{} is not a structure shape", self.desc.name);
        };
        let fd = fields
            .iter()
            .find(|f| &*f.name == name)
            .unwrap_or_else(|| panic!("{} has no field {name}", self.desc.name));
        (fd, self.at.narrow(fd.offset, fd.size))
    }

    fn shape_of(&self, shape: &ShapeRef) -> Arc<Descriptor> {
        let desc = self
            .shapes
            .get(&shape.type_id)
            .expect("child shape resolved when the set was created");
        Arc::clone(desc)
    }

    /// Reads a bool field.
    ///
    /// # Panics
    ///
    /// Panics if the field does not exist or is not bool-shaped.
    #[must_use]
    pub fn bool(&self, name: &str) -> bool {
        self.buf.get_bool(self.field(name).1)
    }

    /// Reads an `i8` field.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn i8(&self, name: &str) -> i8 {
        self.buf.get_i8(self.field(name).1)
    }

    /// Reads an `i16` field.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn i16(&self, name: &str) -> i16 {
        self.buf.get_i16(self.field(name).1)
    }

    /// Reads an `i32` field.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn i32(&self, name: &str) -> i32 {
        self.buf.get_i32(self.field(name).1)
    }

    /// Reads an `i64` field.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn i64(&self, name: &str) -> i64 {
        self.buf.get_i64(self.field(name).1)
    }

    /// Reads an `f32` field.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn f32(&self, name: &str) -> f32 {
        self.buf.get_f32(self.field(name).1)
    }

    /// Reads an `f64` field.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn f64(&self, name: &str) -> f64 {
        self.buf.get_f64(self.field(name).1)
    }

    /// Reads a string field. An absent value reads as `""`.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch, or if the stored bytes are not
    /// valid UTF-8 (decoders only store validated text).
    #[must_use]
    pub fn str(&self, name: &str) -> &'a str {
        let (off, len) = self.buf.get_var(self.field(name).1);
        if off == 0 {
            return "";
        }
        std::str::from_utf8(self.buf.bytes_at(off, len)).expect("decoded string is UTF-8")
    }

    /// Reads a timestamp field. An absent value reads as the Unix epoch.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch or an out-of-range instant.
    #[must_use]
    pub fn timestamp(&self, name: &str) -> DateTime<FixedOffset> {
        let (micros, offset_secs) = self.buf.get_timestamp(self.field(name).1);
        let tz = FixedOffset::east_opt(offset_secs).expect("stored UTC offset in range");
        DateTime::from_timestamp_micros(micros)
            .expect("stored timestamp in range")
            .with_timezone(&tz)
    }

    /// Descends into an inline structure field.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn doc(&self, name: &str) -> DocView<'a> {
        let (fd, slot) = self.field(name);
        DocView {
            buf: self.buf,
            shapes: self.shapes,
            desc: self.shape_of(&fd.shape),
            at: slot,
        }
    }

    /// Follows a pointer field; `None` when nil.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn ptr(&self, name: &str) -> Option<DocView<'a>> {
        let (fd, slot) = self.field(name);
        let child = self.shape_of(&fd.shape);
        let Kind::Ptr(elem) = &child.kind else {
            panic!("field {name} is not pointer-shaped");
        };
        let off = self.buf.get_ref(slot);
        if off == 0 {
            return None;
        }
        let pointee = self.shape_of(&elem.shape);
        let size = pointee.size;
        Some(DocView {
            buf: self.buf,
            shapes: self.shapes,
            desc: pointee,
            at: Slot { offset: off, size },
        })
    }

    /// Views a sequence field. An absent value views as empty.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn seq(&self, name: &str) -> SeqView<'a> {
        let (fd, slot) = self.field(name);
        let child = self.shape_of(&fd.shape);
        let Kind::Seq(elem) = &child.kind else {
            panic!("field {name} is not sequence-shaped");
        };
        let (block, count) = self.buf.get_seq(slot);
        SeqView {
            buf: self.buf,
            shapes: self.shapes,
            elem: self.shape_of(&elem.shape),
            base: block,
            count,
        }
    }

    /// Views a fixed-length array field.
    ///
    /// # Panics
    ///
    /// Panics on a name or kind mismatch.
    #[must_use]
    pub fn array(&self, name: &str) -> SeqView<'a> {
        let (fd, slot) = self.field(name);
        let child = self.shape_of(&fd.shape);
        let Kind::Array(elem, len) = &child.kind else {
            panic!("field {name} is not array-shaped");
        };
        SeqView {
            buf: self.buf,
            shapes: self.shapes,
            elem: self.shape_of(&elem.shape),
            base: slot.offset,
            count: u32::try_from(*len).expect("array length overflow"),
        }
    }
}

/// Read view of a decoded sequence or array.
pub struct SeqView<'a> {
    buf: &'a DocBuf,
    shapes: &'a ShapeTable,
    elem: Arc<Descriptor>,
    base: u32,
    count: u32,
}

impl<'a> SeqView<'a> {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// `true` when there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn slot_at(&self, i: usize) -> Slot {
        assert!(i < self.count as usize, "element index {i} out of bounds");
        let idx = u32::try_from(i).expect("element index overflow");
        Slot {
            offset: self.base + idx * self.elem.size,
            size: self.elem.size,
        }
    }

    /// Reads element `i` as bool.
    ///
    /// # Panics
    ///
    /// Panics on an index or kind mismatch.
    #[must_use]
    pub fn bool(&self, i: usize) -> bool {
        self.buf.get_bool(self.slot_at(i))
    }

    /// Reads element `i` as `i64`.
    ///
    /// # Panics
    ///
    /// Panics on an index or kind mismatch.
    #[must_use]
    pub fn i64(&self, i: usize) -> i64 {
        self.buf.get_i64(self.slot_at(i))
    }

    /// Reads element `i` as `f64`.
    ///
    /// # Panics
    ///
    /// Panics on an index or kind mismatch.
    #[must_use]
    pub fn f64(&self, i: usize) -> f64 {
        self.buf.get_f64(self.slot_at(i))
    }

    /// Reads element `i` as a string.
    ///
    /// # Panics
    ///
    /// Panics on an index or kind mismatch.
    #[must_use]
    pub fn str(&self, i: usize) -> &'a str {
        let (off, len) = self.buf.get_var(self.slot_at(i));
        if off == 0 {
            return "";
        }
        std::str::from_utf8(self.buf.bytes_at(off, len)).expect("decoded string is UTF-8")
    }

    /// Reads element `i` as a timestamp.
    ///
    /// # Panics
    ///
    /// Panics on an index or kind mismatch or an out-of-range instant.
    #[must_use]
    pub fn timestamp(&self, i: usize) -> DateTime<FixedOffset> {
        let (micros, offset_secs) = self.buf.get_timestamp(self.slot_at(i));
        let tz = FixedOffset::east_opt(offset_secs).expect("stored UTC offset in range");
        DateTime::from_timestamp_micros(micros)
            .expect("stored timestamp in range")
            .with_timezone(&tz)
    }

    /// Views element `i` as a structure.
    ///
    /// # Panics
    ///
    /// Panics on an index or kind mismatch.
    #[must_use]
    pub fn doc(&self, i: usize) -> DocView<'a> {
        DocView {
            buf: self.buf,
            shapes: self.shapes,
            desc: Arc::clone(&self.elem),
            at: self.slot_at(i),
        }
    }
}
