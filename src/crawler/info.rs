//! Output tables of the heap crawl.

use std::collections::HashMap;

use strum::{Display, EnumIter};

use crate::utils::BitSet;

/// One managed object found by the crawl.
///
/// The first [`crate::snapshot::GcHandles::count`] entries mirror the GC handle table. A
/// handle slot stays a placeholder (`ptr_object == 0`, no type) if its target could not be
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagedObjectInfo {
    /// Address of the object, `0` for a placeholder.
    pub ptr_object: u64,
    /// Address of the object's type-info structure, `0` if the header could not be decoded.
    pub ptr_type_info: u64,
    /// Row of the object's type, `None` for placeholders and corrupt headers.
    pub type_index: Option<usize>,
    /// Size of the object in the heap, header included.
    pub size: u64,
    /// Number of connections pointing at this object.
    pub ref_count: u32,
    /// Native object this managed shell belongs to.
    pub native_object_index: Option<usize>,
    /// GC handle keeping the object alive.
    pub gc_handle_index: Option<usize>,
    /// Position of this entry in the managed object table.
    pub managed_object_index: usize,
}

impl ManagedObjectInfo {
    /// Empty slot for the GC handle at `index`.
    #[must_use]
    pub fn placeholder(index: usize) -> Self {
        Self {
            gc_handle_index: Some(index),
            managed_object_index: index,
            ..Self::default()
        }
    }

    /// `true` once the object header was decoded successfully.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.ptr_object != 0 && self.type_index.is_some()
    }

    /// `true` once the crawl reached the object, decodable or not.
    #[must_use]
    pub fn is_visited(&self) -> bool {
        self.ptr_object != 0
    }
}

/// Kind of a [`ManagedConnection`], deciding how `from` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ConnectionKind {
    /// `from` is a managed object index.
    ObjectToObject,
    /// `from` is the row of the type whose static storage holds the reference.
    TypeStaticToObject,
    /// `from` is a native object index, `to` its managed shell.
    NativeToManagedShell,
}

/// A discovered reference to a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedConnection {
    /// How `from` is interpreted.
    pub kind: ConnectionKind,
    /// Managed object, type or native object holding the reference.
    pub from: usize,
    /// Managed object index of the target.
    pub to: usize,
    /// Field holding the reference, `None` for array elements and native links.
    pub field_from: Option<usize>,
    /// Element holding the reference, or holding the value type that holds it.
    pub array_index_from: Option<usize>,
}

/// Recoverable problems met during the crawl.
///
/// None of these abort the crawl; they explain why the graph is partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrawlDiagnostics {
    /// Non-null pointers that land outside every memory section.
    pub unresolved_pointers: usize,
    /// Objects whose type-info pointer resolved to no known type.
    pub corrupt_headers: usize,
    /// Headers that only resolved through one extra indirection.
    pub indirect_type_info_headers: usize,
    /// String or array lengths that were impossible and clamped to zero.
    pub clamped_lengths: usize,
    /// Thread-static fields, which have no captured storage.
    pub skipped_tls_fields: usize,
    /// Value type fields whose type is their own declaring type.
    pub skipped_self_referencing_fields: usize,
    /// Fields whose type index resolves to no type.
    pub unknown_field_types: usize,
    /// Bridge objects whose cached pointer matches no native object.
    pub shells_without_native_object: usize,
    /// GC handles targeting an address another handle already targets.
    pub duplicate_gc_handles: usize,
    /// Object headers decoded, exactly one per distinct object address reached.
    pub headers_parsed: usize,
}

/// Memory sums over all unique, decodable managed objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryTotals {
    /// Size of every object.
    pub total: u64,
    /// Size of the objects inside the assumed active heap.
    pub active_heap: u64,
    /// Size of the objects nothing refers to.
    pub abandoned: u64,
}

/// The managed object graph produced by the crawl.
#[derive(Debug, Clone, Default)]
pub struct ManagedData {
    pub(crate) objects: Vec<ManagedObjectInfo>,
    pub(crate) connections: Vec<ManagedConnection>,
    pub(crate) index_by_address: HashMap<u64, usize>,
    pub(crate) duplicates: BitSet,
    pub(crate) diagnostics: CrawlDiagnostics,
    pub(crate) totals: MemoryTotals,
}

impl ManagedData {
    /// All managed objects, GC handle slots first.
    #[must_use]
    pub fn objects(&self) -> &[ManagedObjectInfo] {
        &self.objects
    }

    /// Managed object at `index`.
    #[must_use]
    pub fn object(&self, index: usize) -> Option<&ManagedObjectInfo> {
        self.objects.get(index)
    }

    /// Number of managed objects, placeholders and duplicates included.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// All discovered connections, in discovery order.
    #[must_use]
    pub fn connections(&self) -> &[ManagedConnection] {
        &self.connections
    }

    /// Canonical managed object at `address`.
    ///
    /// For an address targeted by several GC handles this is the slot of the first handle.
    #[must_use]
    pub fn find_by_address(&self, address: u64) -> Option<usize> {
        self.index_by_address.get(&address).copied()
    }

    /// `true` if the slot at `index` is a copy made for a duplicate GC handle.
    #[must_use]
    pub fn is_duplicate(&self, index: usize) -> bool {
        self.duplicates.contains(index)
    }

    /// Iterates the canonical, decodable objects with their index.
    pub fn unique_objects(&self) -> impl Iterator<Item = (usize, &ManagedObjectInfo)> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(|(index, info)| info.is_valid() && !self.duplicates.contains(*index))
    }

    /// What went wrong while crawling.
    #[must_use]
    pub fn diagnostics(&self) -> &CrawlDiagnostics {
        &self.diagnostics
    }

    /// Memory sums.
    #[must_use]
    pub fn totals(&self) -> &MemoryTotals {
        &self.totals
    }
}
