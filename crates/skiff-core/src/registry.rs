//! Shape and decoder caches.
//!
//! [`Registry`] owns two process-lifetime caches keyed by `TypeId`: one
//! canonical descriptor per shape, and one compiled root decoder per decode
//! target. There are no globals; the registry is an explicit object owned
//! by whoever drives decoding. Lookups are concurrent; a duplicate build
//! race loses harmlessly, with the cache converging on one canonical `Arc`.

use std::any::TypeId;
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::decode::{self, Decoder};
use crate::error::DecodeResult;
use crate::shape::{Descriptor, Doc, ShapeRef};

/// Process-lifetime cache of shape descriptors and compiled decoders.
/// Entries are never evicted.
#[derive(Default)]
pub struct Registry {
    descriptors: RwLock<FxHashMap<TypeId, Arc<Descriptor>>>,
    decoders: RwLock<FxHashMap<TypeId, Arc<Decoder>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical descriptor for `T`, building it on first use.
    pub fn descriptor_of<T: Doc>(&self) -> Arc<Descriptor> {
        self.resolve(&ShapeRef::of::<T>())
    }

    /// Returns the canonical descriptor behind a shape reference.
    pub(crate) fn resolve(&self, shape: &ShapeRef) -> Arc<Descriptor> {
        if let Some(desc) = self.descriptors.read().get(&shape.type_id) {
            return Arc::clone(desc);
        }
        // Built outside the lock: construction may recurse into resolve for
        // child shapes, and losing a race to another thread is benign.
        let built = Arc::new(shape.build());
        let mut cache = self.descriptors.write();
        Arc::clone(cache.entry(shape.type_id).or_insert(built))
    }

    /// Returns the compiled root decoder for decoding sequences of `T`,
    /// compiling and caching it on first use.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidUnmarshal`](crate::DecodeError::InvalidUnmarshal)
    /// if `T` is not a structure shape.
    pub(crate) fn root_decoder<T: Doc>(&self) -> DecodeResult<Arc<Decoder>> {
        let key = TypeId::of::<T>();
        if let Some(dec) = self.decoders.read().get(&key) {
            return Ok(Arc::clone(dec));
        }
        let elem = self.descriptor_of::<T>();
        let compiled = Arc::new(decode::compile_root(self, &elem)?);
        debug!(target_type = elem.name, "compiled root decoder");
        let mut cache = self.decoders.write();
        Ok(Arc::clone(cache.entry(key).or_insert(compiled)))
    }

    /// Number of cached descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    /// `true` when nothing has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("descriptors", &self.descriptors.read().len())
            .field("decoders", &self.decoders.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Field, Kind};

    struct Point;

    impl Doc for Point {
        fn descriptor() -> Descriptor {
            Descriptor::struct_of::<Point>(
                "Point",
                vec![
                    Field::new("x", ShapeRef::of::<f64>()),
                    Field::new("y", ShapeRef::of::<f64>()),
                ],
            )
        }
    }

    #[test]
    fn descriptor_lookup_is_idempotent() {
        let reg = Registry::new();
        let a = reg.descriptor_of::<Point>();
        let b = reg.descriptor_of::<Point>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn root_decoder_is_cached() {
        let reg = Registry::new();
        let a = reg.root_decoder::<Point>().unwrap();
        let b = reg.root_decoder::<Point>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn non_struct_root_is_rejected() {
        let reg = Registry::new();
        let err = reg.root_decoder::<i64>().unwrap_err();
        assert!(matches!(
            err,
            crate::error::DecodeError::InvalidUnmarshal { target: "i64" }
        ));
    }

    #[test]
    fn concurrent_lookups_converge() {
        let reg = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.descriptor_of::<Point>())
            })
            .collect();
        let descs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for d in &descs[1..] {
            assert!(Arc::ptr_eq(&descs[0], d));
        }
        assert!(matches!(descs[0].kind, Kind::Struct(_)));
    }
}
