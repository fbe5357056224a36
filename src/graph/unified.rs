//! The unified object index space.
//!
//! One integer range covers every object of a snapshot, in three consecutive sub-ranges:
//!
//! ```text
//! [0, gc)                     GC handle slots       managed objects 0..gc
//! [gc, gc + native)           native objects        native objects 0..native
//! [gc + native, total)        crawled-only objects  managed objects gc..managed
//! ```
//!
//! The presentation layer stores these indices; they are stable for the snapshot's lifetime.

use crate::{Error, Result};

/// An object named by a unified index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnifiedObject {
    /// Index into the managed object table.
    Managed(usize),
    /// Index into the native object table.
    Native(usize),
}

/// Translation between the unified index space and the per-kind tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnifiedIndex {
    gc_handles: usize,
    native_objects: usize,
    managed_objects: usize,
}

impl UnifiedIndex {
    /// Creates the index space for the given table sizes.
    ///
    /// `managed_objects` includes the GC handle slots, so it is never below `gc_handles` for a
    /// crawled snapshot.
    #[must_use]
    pub fn new(gc_handles: usize, native_objects: usize, managed_objects: usize) -> Self {
        Self {
            gc_handles,
            native_objects,
            managed_objects: managed_objects.max(gc_handles),
        }
    }

    /// Total number of unified indices.
    #[must_use]
    pub fn count(&self) -> usize {
        self.managed_objects + self.native_objects
    }

    /// Unified index of the managed object at `managed`.
    #[must_use]
    pub fn from_managed(&self, managed: usize) -> Option<usize> {
        if managed >= self.managed_objects {
            None
        } else if managed < self.gc_handles {
            Some(managed)
        } else {
            Some(managed + self.native_objects)
        }
    }

    /// Unified index of the native object at `native`.
    #[must_use]
    pub fn from_native(&self, native: usize) -> Option<usize> {
        (native < self.native_objects).then_some(self.gc_handles + native)
    }

    /// Resolves a unified index to the object it names.
    ///
    /// # Errors
    /// Returns [`Error::InvalidUnifiedIndex`] for an index past the last object.
    pub fn resolve(&self, unified: usize) -> Result<UnifiedObject> {
        let natives_end = self.gc_handles + self.native_objects;
        if unified < self.gc_handles {
            Ok(UnifiedObject::Managed(unified))
        } else if unified < natives_end {
            Ok(UnifiedObject::Native(unified - self.gc_handles))
        } else if unified < self.count() {
            Ok(UnifiedObject::Managed(unified - self.native_objects))
        } else {
            Err(Error::InvalidUnifiedIndex(unified))
        }
    }

    /// Unified index of `object`.
    #[must_use]
    pub fn index_of(&self, object: UnifiedObject) -> Option<usize> {
        match object {
            UnifiedObject::Managed(managed) => self.from_managed(managed),
            UnifiedObject::Native(native) => self.from_native(native),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_sub_range() {
        let index = UnifiedIndex::new(3, 2, 7);
        assert_eq!(index.count(), 9);

        for unified in 0..index.count() {
            let object = index.resolve(unified).unwrap();
            assert_eq!(index.index_of(object), Some(unified), "unified {unified}");
        }

        assert_eq!(index.resolve(0).unwrap(), UnifiedObject::Managed(0));
        assert_eq!(index.resolve(3).unwrap(), UnifiedObject::Native(0));
        assert_eq!(index.resolve(5).unwrap(), UnifiedObject::Managed(3));
        assert!(matches!(index.resolve(9), Err(Error::InvalidUnifiedIndex(9))));
    }

    #[test]
    fn out_of_range_kinds() {
        let index = UnifiedIndex::new(1, 1, 2);
        assert_eq!(index.from_managed(2), None);
        assert_eq!(index.from_native(1), None);
        assert_eq!(index.from_native(0), Some(1));
        assert_eq!(index.from_managed(1), Some(2));
    }
}
