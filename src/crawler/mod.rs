//! Reconstruction of the managed object graph from raw heap bytes.
//!
//! The crawl starts at the GC handles and follows every reference it can decode, using an
//! explicit work stack instead of recursion so that deep reference chains cannot exhaust the
//! native stack. It runs in strictly ordered phases, see [`CrawlPhase`]:
//!
//! 1. **Seed**: every GC handle reserves the managed object slot with its own index. A handle
//!    targeting an address another handle already targets is deferred as a duplicate.
//! 2. **Instance crawl**: pops pointers, resolves them through the memory sections, decodes the
//!    object header once per address and pushes the references held in its fields or elements.
//! 3. **Static crawl**: walks the static fields each type owns, directly on the captured static
//!    storage, and drains the work stack again.
//! 4. **Duplicate reconciliation**: copies the object found for a shared address into the slots
//!    of the deferred duplicate handles.
//! 5. **Cross-reference**: links managed shells to their native objects.
//! 6. **Aggregate**: sums object sizes.
//!
//! # Failure handling
//!
//! A pointer outside every memory section drops the single edge. A header that resolves to no
//! type records the object without a type and size, and adds no connection. Impossible string
//! and array lengths are clamped to zero. All of these are counted in [`CrawlDiagnostics`].
//! Only a reference without any valid origin aborts the crawl, it means the tables contradict
//! each other.

mod array;
mod crossref;
mod header;
mod info;
mod progress;

pub use array::ArrayInfo;
pub use header::ObjectHeader;
pub use info::{
    ConnectionKind, CrawlDiagnostics, ManagedConnection, ManagedData, ManagedObjectInfo,
    MemoryTotals,
};
pub use progress::{CrawlPhase, CrawlProgress, NoProgress};

pub(crate) use crossref::NativeLinks;

use rayon::prelude::*;

use crate::{
    memory::BytesAndOffset, snapshot::VirtualMachineInformation, utils::BitSet, CachedSnapshot,
    Result,
};

/// Bound on value types nested inside value types.
const MAX_VALUE_TYPE_DEPTH: usize = 64;

/// What holds a reference that is waiting on the work stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// A field or element of the managed object with this index.
    Object(usize),
    /// The static storage of the type with this row.
    TypeStatic(usize),
}

/// One pending reference.
#[derive(Debug, Clone, Copy)]
struct StackCrawlData {
    ptr: u64,
    origin: Option<Origin>,
    field_from: Option<usize>,
    array_index_from: Option<usize>,
}

/// Result of [`crawl`]: the managed graph and the native back-links still to be applied.
pub(crate) struct CrawlOutput {
    pub managed: ManagedData,
    pub links: NativeLinks,
}

/// Offset of a field inside the data it is read from.
///
/// Field offsets include the object header. Inline value type data (embedded fields, array
/// elements) has no header, so the header size is subtracted for it. Returns `None` for
/// negative offsets and offsets that point into the missing header.
pub(crate) fn field_data_offset(
    offset: i32,
    inline: bool,
    vm: &VirtualMachineInformation,
) -> Option<usize> {
    let offset = usize::try_from(offset).ok()?;
    if inline {
        offset.checked_sub(vm.header_size())
    } else {
        Some(offset)
    }
}

/// Runs every crawl phase over `snapshot`.
///
/// # Errors
/// Returns [`crate::Error::InvariantViolation`] if a reference has no valid origin, and
/// [`crate::Error::FieldNotFound`] if a type lists a field the field table does not have.
pub(crate) fn crawl(
    snapshot: &CachedSnapshot,
    progress: &mut dyn CrawlProgress,
) -> Result<CrawlOutput> {
    let span = tracing::info_span!(
        "crawl",
        gc_handles = snapshot.gc_handles().count(),
        types = snapshot.types().count(),
        sections = snapshot.sections().len()
    );
    let _guard = span.enter();

    let mut crawler = HeapCrawler::new(snapshot);

    progress.phase(CrawlPhase::Seed);
    crawler.seed();
    tracing::debug!(
        seeds = crawler.stack.len(),
        duplicates = crawler.pending_duplicates.len(),
        "seeded"
    );

    progress.phase(CrawlPhase::InstanceCrawl);
    crawler.drain()?;
    tracing::debug!(
        objects = crawler.data.objects.len(),
        connections = crawler.data.connections.len(),
        "instance crawl done"
    );

    progress.phase(CrawlPhase::StaticCrawl);
    crawler.crawl_statics()?;
    tracing::debug!(
        objects = crawler.data.objects.len(),
        connections = crawler.data.connections.len(),
        "static crawl done"
    );

    progress.phase(CrawlPhase::DuplicateReconciliation);
    crawler.reconcile_duplicates();

    let mut managed = crawler.data;

    progress.phase(CrawlPhase::CrossReference);
    let links = crossref::resolve(snapshot, &mut managed);

    progress.phase(CrawlPhase::Aggregate);
    managed.totals = aggregate(snapshot, &managed);
    tracing::debug!(
        total = managed.totals.total,
        active_heap = managed.totals.active_heap,
        abandoned = managed.totals.abandoned,
        diagnostics = ?managed.diagnostics,
        "crawl complete"
    );

    Ok(CrawlOutput { managed, links })
}

struct HeapCrawler<'a> {
    snapshot: &'a CachedSnapshot,
    data: ManagedData,
    stack: Vec<StackCrawlData>,
    pending_duplicates: Vec<(usize, u64)>,
}

impl<'a> HeapCrawler<'a> {
    fn new(snapshot: &'a CachedSnapshot) -> Self {
        let handles = snapshot.gc_handles().count();
        let mut data = ManagedData::default();
        data.objects.reserve(handles * 2);
        data.connections
            .reserve(handles + snapshot.raw_connections().count());
        data.index_by_address.reserve(handles);

        Self {
            snapshot,
            data,
            stack: Vec::with_capacity(handles),
            pending_duplicates: Vec::new(),
        }
    }

    fn seed(&mut self) {
        let targets = self.snapshot.gc_handles().targets();
        self.data
            .objects
            .extend((0..targets.len()).map(ManagedObjectInfo::placeholder));

        for (handle, &target) in targets.iter().enumerate() {
            if target == 0 {
                continue;
            }
            if self.data.index_by_address.contains_key(&target) {
                self.data.diagnostics.duplicate_gc_handles += 1;
                self.pending_duplicates.push((handle, target));
                continue;
            }

            self.data.index_by_address.insert(target, handle);
            self.stack.push(StackCrawlData {
                ptr: target,
                origin: None,
                field_from: None,
                array_index_from: None,
            });
        }
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(item) = self.stack.pop() {
            self.crawl_pointer(item)?;
        }
        Ok(())
    }

    fn crawl_pointer(&mut self, item: StackCrawlData) -> Result<()> {
        let snapshot = self.snapshot;
        let Some(data) = snapshot.sections().find(item.ptr) else {
            self.data.diagnostics.unresolved_pointers += 1;
            tracing::trace!(ptr = item.ptr, "dropped reference outside every memory section");
            return Ok(());
        };

        let known = self.data.index_by_address.get(&item.ptr).copied();
        let (index, newly_visited) = match known {
            Some(index) if self.data.objects[index].is_visited() => (index, false),
            _ => (self.visit(item.ptr, data, known), true),
        };

        let Some(type_index) = self.data.objects[index].type_index else {
            return Ok(());
        };

        self.add_connection(&item, index)?;
        if newly_visited {
            self.crawl_object(index, type_index, data)?;
        }
        Ok(())
    }

    /// Decodes the header of a newly reached object and records it.
    fn visit(&mut self, ptr: u64, data: BytesAndOffset<'_>, known: Option<usize>) -> usize {
        let index = known.unwrap_or_else(|| {
            let index = self.data.objects.len();
            self.data.objects.push(ManagedObjectInfo {
                managed_object_index: index,
                ..ManagedObjectInfo::default()
            });
            self.data.index_by_address.insert(ptr, index);
            index
        });

        self.data.diagnostics.headers_parsed += 1;
        let header = ObjectHeader::parse(self.snapshot, data);
        let info = &mut self.data.objects[index];
        info.ptr_object = ptr;

        match header {
            Some(header) => {
                info.ptr_type_info = header.ptr_type_info;
                info.type_index = Some(header.type_index);
                info.size = header.size;
                if header.indirect {
                    self.data.diagnostics.indirect_type_info_headers += 1;
                }
                if header.clamped {
                    self.data.diagnostics.clamped_lengths += 1;
                    tracing::warn!(ptr, "impossible string or array length, clamped to zero");
                }
            }
            None => {
                self.data.diagnostics.corrupt_headers += 1;
                tracing::warn!(ptr, "object header does not resolve to a known type");
            }
        }

        index
    }

    fn add_connection(&mut self, item: &StackCrawlData, to: usize) -> Result<()> {
        let (kind, from) = match (item.origin, item.field_from) {
            (None, None) => return Ok(()),
            (None, Some(field)) => {
                return Err(invariant_error!(
                    "Reference to {:#x} through field {} has no origin",
                    item.ptr,
                    field
                ))
            }
            (Some(Origin::Object(from)), _) => (ConnectionKind::ObjectToObject, from),
            (Some(Origin::TypeStatic(type_index)), _) => {
                (ConnectionKind::TypeStaticToObject, type_index)
            }
        };

        self.data.objects[to].ref_count += 1;
        self.data.connections.push(ManagedConnection {
            kind,
            from,
            to,
            field_from: item.field_from,
            array_index_from: item.array_index_from,
        });
        Ok(())
    }

    fn crawl_object(
        &mut self,
        index: usize,
        type_index: usize,
        data: BytesAndOffset<'_>,
    ) -> Result<()> {
        let snapshot = self.snapshot;
        let types = snapshot.types();
        let origin = Origin::Object(index);

        if snapshot.well_known().string_type == Some(type_index) {
            return Ok(());
        }

        if !types.is_array(type_index) {
            let fields = types.instance_fields(type_index);
            return self.crawl_fields(data, fields, false, origin, None, 0);
        }

        let array = ArrayInfo::read(snapshot, data, type_index);
        let Some(element_type) = array.element_type else {
            return Ok(());
        };
        let inline = types.is_value_type(element_type);

        for element in 0..array.length {
            let at = data.add(array.element_offset(snapshot, element));
            if inline {
                self.crawl_fields(
                    at,
                    types.instance_fields(element_type),
                    true,
                    origin,
                    Some(element),
                    1,
                )?;
            } else {
                self.push_reference(at, origin, None, Some(element));
            }
        }
        Ok(())
    }

    fn crawl_statics(&mut self) -> Result<()> {
        let snapshot = self.snapshot;
        let types = snapshot.types();

        for type_index in 0..types.count() {
            let bytes = types.static_field_bytes(type_index);
            if bytes.is_empty() {
                continue;
            }

            let data = BytesAndOffset::new(bytes, 0, snapshot.vm().pointer_size);
            self.crawl_fields(
                data,
                types.owned_static_fields(type_index),
                false,
                Origin::TypeStatic(type_index),
                None,
                0,
            )?;
        }

        self.drain()
    }

    /// Walks `fields` against `data`, recursing into embedded value types and pushing every
    /// non-null reference.
    fn crawl_fields(
        &mut self,
        data: BytesAndOffset<'_>,
        fields: &[usize],
        inline: bool,
        origin: Origin,
        array_index: Option<usize>,
        depth: usize,
    ) -> Result<()> {
        let snapshot = self.snapshot;
        let types = snapshot.types();
        let field_table = snapshot.fields();

        if depth > MAX_VALUE_TYPE_DEPTH {
            tracing::warn!(depth, "value type nesting too deep, not crawled further");
            return Ok(());
        }

        for &field in fields {
            let offset = field_table.offset(field)?;
            if offset == -1 {
                self.data.diagnostics.skipped_tls_fields += 1;
                continue;
            }

            let field_type_index = field_table.type_index(field)?;
            let Some(field_type) = types.array_index_of(field_type_index) else {
                self.data.diagnostics.unknown_field_types += 1;
                tracing::trace!(field, field_type_index, "field of unknown type");
                continue;
            };

            let is_value_type = types.is_value_type(field_type);
            if is_value_type && field_table.declaring_type(field)? == Some(field_type) {
                self.data.diagnostics.skipped_self_referencing_fields += 1;
                continue;
            }

            let Some(offset) = field_data_offset(offset, inline, snapshot.vm()) else {
                continue;
            };
            let at = data.add(offset);

            if is_value_type {
                self.crawl_fields(
                    at,
                    types.instance_fields(field_type),
                    true,
                    origin,
                    array_index,
                    depth + 1,
                )?;
            } else {
                self.push_reference(at, origin, Some(field), array_index);
            }
        }
        Ok(())
    }

    fn push_reference(
        &mut self,
        slot: BytesAndOffset<'_>,
        origin: Origin,
        field_from: Option<usize>,
        array_index_from: Option<usize>,
    ) {
        match slot.read_pointer() {
            Ok(0) => {}
            Ok(ptr) => self.stack.push(StackCrawlData {
                ptr,
                origin: Some(origin),
                field_from,
                array_index_from,
            }),
            Err(_) => {
                tracing::trace!(offset = slot.offset(), "reference slot outside captured bytes");
            }
        }
    }

    fn reconcile_duplicates(&mut self) {
        let mut duplicates = BitSet::new(self.data.objects.len());
        for (handle, target) in std::mem::take(&mut self.pending_duplicates) {
            if let Some(&canonical) = self.data.index_by_address.get(&target) {
                let mut info = self.data.objects[canonical].clone();
                info.gc_handle_index = Some(handle);
                info.managed_object_index = handle;
                self.data.objects[handle] = info;
            }
            duplicates.insert(handle);
        }
        self.data.duplicates = duplicates;
    }
}

fn aggregate(snapshot: &CachedSnapshot, data: &ManagedData) -> MemoryTotals {
    let sections = snapshot.sections();
    let unique: Vec<&ManagedObjectInfo> = data.unique_objects().map(|(_, info)| info).collect();

    MemoryTotals {
        total: unique.par_iter().map(|info| info.size).sum(),
        active_heap: unique
            .par_iter()
            .filter(|info| sections.is_in_active_heap(info.ptr_object))
            .map(|info| info.size)
            .sum(),
        abandoned: unique
            .par_iter()
            .filter(|info| info.ref_count == 0)
            .map(|info| info.size)
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{snapshot::VirtualMachineInformation, test::SnapshotBuilder, Error};

    #[test]
    fn field_offsets_for_inline_data() {
        let vm = VirtualMachineInformation::mono_64();
        assert_eq!(field_data_offset(24, false, &vm), Some(24));
        assert_eq!(field_data_offset(24, true, &vm), Some(8));
        assert_eq!(field_data_offset(8, true, &vm), None);
        assert_eq!(field_data_offset(-1, false, &vm), None);
    }

    #[test]
    fn cycle_is_parsed_once() {
        let mut builder = SnapshotBuilder::mono_64();
        let node = builder.class("Node", None, 24);
        let next = builder.instance_field(node, "next", 16, node);
        let a = builder.object(node, 24);
        let b = builder.object(node, 24);
        builder.write_pointer(a + 16, b);
        builder.write_pointer(b + 16, a);
        builder.gc_handle(a);
        let snapshot = builder.build();

        let managed = snapshot.managed();
        assert_eq!(managed.diagnostics().headers_parsed, 2);
        assert_eq!(managed.object_count(), 2);
        assert_eq!(managed.connections().len(), 2);
        assert!(managed
            .connections()
            .iter()
            .all(|connection| connection.field_from == Some(next)));
        assert_eq!(managed.object(0).unwrap().ref_count, 1);
        assert_eq!(managed.object(1).unwrap().ref_count, 1);
    }

    #[test]
    fn unresolved_and_corrupt_targets() {
        let mut builder = SnapshotBuilder::mono_64();
        let holder = builder.class("Holder", None, 32);
        let object = builder.class("System.Object", None, 16);
        builder.instance_field(holder, "outside", 16, object);
        builder.instance_field(holder, "corrupt", 24, object);
        let root = builder.object(holder, 32);
        let corrupt = builder.raw_object(0x0BAD_0000, 16);
        builder.write_pointer(root + 16, 0x7777_0000);
        builder.write_pointer(root + 24, corrupt);
        builder.gc_handle(root);
        let snapshot = builder.build();

        let managed = snapshot.managed();
        let diagnostics = managed.diagnostics();
        assert_eq!(diagnostics.unresolved_pointers, 1);
        assert_eq!(diagnostics.corrupt_headers, 1);
        assert!(managed.connections().is_empty());

        let index = managed.find_by_address(corrupt).unwrap();
        let info = managed.object(index).unwrap();
        assert_eq!(info.type_index, None);
        assert_eq!(info.size, 0);
        assert_eq!(info.ptr_type_info, 0);
        assert!(managed.find_by_address(0x7777_0000).is_none());
    }

    #[test]
    fn static_references_and_skips() {
        let mut builder = SnapshotBuilder::mono_64();
        let object = builder.class("System.Object", None, 16);
        let int = builder.value_type("System.Int32", 20);
        builder.instance_field(int, "m_value", 16, int);
        let boxed = builder.object(int, 20);
        let manager = builder.class("Manager", None, 16);
        let instance = builder.static_field(manager, "s_Instance", 0, object);
        builder.static_field(manager, "t_Local", -1, object);
        let target = builder.object(object, 16);
        builder.static_bytes(manager, &target.to_le_bytes());
        builder.gc_handle(boxed);
        let snapshot = builder.build();

        let managed = snapshot.managed();
        assert_eq!(managed.diagnostics().skipped_tls_fields, 1);
        assert_eq!(managed.diagnostics().skipped_self_referencing_fields, 1);
        let connection = managed.connections()[0];
        assert_eq!(connection.kind, ConnectionKind::TypeStaticToObject);
        assert_eq!(connection.from, manager);
        assert_eq!(connection.field_from, Some(instance));
        assert_eq!(managed.find_by_address(target), Some(connection.to));
    }

    #[test]
    fn value_type_array_elements() {
        let mut builder = SnapshotBuilder::mono_64();
        let object = builder.class("System.Object", None, 16);
        let pair = builder.value_type("Pair", 32);
        let first = builder.instance_field(pair, "first", 16, object);
        builder.instance_field(pair, "second", 24, object);
        let array = builder.array("Pair[]", Some(pair), 1);
        let a = builder.object(object, 16);
        let b = builder.object(object, 16);
        let address = builder.array_object_with_length(array, 2, &[a, 0, 0, b]);
        builder.gc_handle(address);
        let snapshot = builder.build();

        let managed = snapshot.managed();
        let mut connections = managed.connections().to_vec();
        connections.sort_by_key(|connection| connection.array_index_from);
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].array_index_from, Some(0));
        assert_eq!(connections[0].field_from, Some(first));
        assert_eq!(connections[1].array_index_from, Some(1));
        assert_eq!(managed.object(0).unwrap().size, 32 + 2 * 16);
    }

    #[test]
    fn zero_sized_element_array_is_clamped() {
        let mut builder = SnapshotBuilder::mono_64();
        let empty = builder.value_type("Empty", 16);
        let array = builder.array("Empty[]", Some(empty), 1);
        let address = builder.array_object_with_length(array, i32::MAX, &[]);
        builder.gc_handle(address);
        let snapshot = builder.build();

        let managed = snapshot.managed();
        assert_eq!(managed.diagnostics().clamped_lengths, 1);
        assert_eq!(managed.object_count(), 1);
        assert_eq!(managed.object(0).unwrap().size, 32);
        assert!(managed.connections().is_empty());
    }

    #[test]
    fn crawls_32_bit_pointers() {
        let mut builder = SnapshotBuilder::mono_32();
        let object = builder.class("System.Object", None, 8);
        let holder = builder.class("Holder", None, 16);
        let child = builder.instance_field(holder, "child", 8, object);
        let items = builder.instance_field(holder, "items", 12, object);
        let array = builder.array("System.Object[]", Some(object), 1);

        let root = builder.object(holder, 16);
        let leaf = builder.object(object, 8);
        let text = builder.string("hi");
        let list = builder.array_object(array, &[leaf, text]);
        builder.write_pointer(root + 8, leaf);
        builder.write_pointer(root + 12, list);
        builder.gc_handle(root);
        let snapshot = builder.build();

        let managed = snapshot.managed();
        assert_eq!(managed.object_count(), 4);
        assert_eq!(managed.diagnostics().unresolved_pointers, 0);

        let root = managed.find_by_address(root).unwrap();
        let leaf = managed.find_by_address(leaf).unwrap();
        let text = managed.find_by_address(text).unwrap();
        let list = managed.find_by_address(list).unwrap();

        let mut edges: Vec<_> = managed
            .connections()
            .iter()
            .map(|connection| {
                (
                    connection.from,
                    connection.to,
                    connection.field_from,
                    connection.array_index_from,
                )
            })
            .collect();
        edges.sort_unstable();
        let mut expected = vec![
            (root, leaf, Some(child), None),
            (root, list, Some(items), None),
            (list, leaf, None, Some(0)),
            (list, text, None, Some(1)),
        ];
        expected.sort_unstable();
        assert_eq!(edges, expected);
        assert!(managed
            .connections()
            .iter()
            .all(|connection| connection.kind == ConnectionKind::ObjectToObject));

        assert_eq!(managed.object(root).unwrap().size, 16);
        assert_eq!(managed.object(leaf).unwrap().size, 8);
        assert_eq!(managed.object(text).unwrap().size, 18);
        assert_eq!(managed.object(list).unwrap().size, 24);
        assert_eq!(managed.object(leaf).unwrap().ref_count, 2);
    }

    #[test]
    fn totals_count_unique_objects() {
        let mut builder = SnapshotBuilder::mono_64();
        let node = builder.class("Node", None, 24);
        builder.instance_field(node, "next", 16, node);
        let a = builder.object(node, 24);
        let b = builder.object(node, 24);
        builder.write_pointer(a + 16, b);
        builder.gc_handle(a);
        builder.gc_handle(a);
        let snapshot = builder.build();

        let totals = snapshot.managed().totals();
        assert_eq!(totals.total, 48);
        assert_eq!(totals.abandoned, 24);
        assert_eq!(totals.active_heap, 48);
        assert!(snapshot.managed().is_duplicate(1));
    }

    #[test]
    fn reference_without_origin_is_fatal() {
        let mut builder = SnapshotBuilder::mono_64();
        let object = builder.class("System.Object", None, 16);
        let target = builder.object(object, 16);
        builder.gc_handle(target);
        let snapshot = builder.build();

        let mut crawler = HeapCrawler::new(&snapshot);
        crawler.stack.push(StackCrawlData {
            ptr: target,
            origin: None,
            field_from: Some(0),
            array_index_from: None,
        });
        assert!(matches!(
            crawler.drain(),
            Err(Error::InvariantViolation { .. })
        ));
    }
}
