//! The loaded snapshot: entry caches plus the crawled object graph.
//!
//! [`CachedSnapshot::load`] is the only way to obtain a snapshot. It validates the columnar
//! input, derives the lookup tables, crawls the heap and builds the connection maps; a snapshot
//! is never observable in a partially crawled state.
//!
//! # Index spaces
//!
//! - types are addressed by row ([`TypeDescriptions`] maps logical type indices to rows)
//! - managed objects by their position in [`crate::crawler::ManagedData::objects`]
//! - native objects by row in [`NativeObjects`]
//! - everything the presentation layer stores uses the unified index, see
//!   [`crate::graph::UnifiedIndex`]

mod columns;
mod data;
mod fields;
mod handles;
mod native;
mod types;
mod vm;

pub use columns::split_by_offsets;
pub use data::{
    ConnectionColumns, FieldColumns, GcHandleColumns, NativeObjectColumns, NativeTypeColumns,
    RootReferenceColumns, SnapshotData, TypeColumns,
};
pub use fields::FieldDescriptions;
pub use handles::{GcHandles, RawConnections, RootReferences};
pub use native::{NativeObjects, NativeTypes};
pub use types::{TypeDescriptions, TypeFlags};
pub use vm::VirtualMachineInformation;

use crate::{
    config::CrawlerConfig,
    crawler::{self, CrawlPhase, CrawlProgress, ManagedData},
    graph::{ConnectionMaps, UnifiedIndex},
    memory::ManagedMemorySections,
    Result,
};

/// Types and fields the crawler treats specially, resolved once by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WellKnownTypes {
    /// The managed string type.
    pub string_type: Option<usize>,
    /// Managed base type of every object that can own a native counterpart.
    pub native_bridge_type: Option<usize>,
    /// The bridge type's field holding the native object address.
    pub cached_ptr_field: Option<usize>,
}

impl WellKnownTypes {
    fn resolve(
        types: &TypeDescriptions,
        fields: &FieldDescriptions,
        config: &CrawlerConfig,
    ) -> Self {
        let string_type = types.find_by_name(&config.string_type_name);
        let native_bridge_type = types.find_by_name(&config.native_bridge_type_name);
        let cached_ptr_field = native_bridge_type.and_then(|bridge| {
            types
                .instance_fields(bridge)
                .iter()
                .copied()
                .find(|&field| {
                    fields
                        .name(field)
                        .is_ok_and(|name| name == config.cached_ptr_field_name)
                })
        });

        Self {
            string_type,
            native_bridge_type,
            cached_ptr_field,
        }
    }
}

/// A fully loaded and crawled memory snapshot.
///
/// Immutable once loaded. All object handles and queries borrow from it.
#[derive(Debug)]
pub struct CachedSnapshot {
    config: CrawlerConfig,
    vm: VirtualMachineInformation,
    sections: ManagedMemorySections,
    types: TypeDescriptions,
    fields: FieldDescriptions,
    native_types: NativeTypes,
    native_objects: NativeObjects,
    gc_handles: GcHandles,
    raw_connections: RawConnections,
    root_references: RootReferences,
    well_known: WellKnownTypes,
    managed: ManagedData,
    connections: ConnectionMaps,
}

impl CachedSnapshot {
    /// Validates `data`, crawls the managed heap and builds the connection maps.
    ///
    /// `progress` is told about every phase before it starts; pass
    /// [`crate::crawler::NoProgress`] to ignore them.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidPointerWidth`] or [`crate::Error::Malformed`] for an
    /// unusable VM layout, [`crate::Error::ColumnLengthMismatch`] for non index-aligned
    /// columns, [`crate::Error::Malformed`] for inconsistent tables, and
    /// [`crate::Error::InvariantViolation`] if the crawl finds the tables contradicting each
    /// other. Recoverable problems never fail the load, see
    /// [`crate::crawler::CrawlDiagnostics`].
    pub fn load(
        data: SnapshotData,
        config: CrawlerConfig,
        mut progress: impl CrawlProgress,
    ) -> Result<Self> {
        let span = tracing::info_span!("load_snapshot", pointer_size = data.vm.pointer_size);
        let _guard = span.enter();

        data.vm.validate()?;
        let fields = FieldDescriptions::new(data.fields, &data.types.field_indices)?;
        let types = TypeDescriptions::new(data.types, &fields)?;
        let native_types = NativeTypes::new(data.native_types)?;
        let native_objects = NativeObjects::new(data.native_objects, &native_types)?;
        let raw_connections = RawConnections::new(data.connections)?;
        let root_references = RootReferences::new(data.root_references)?;
        let sections = ManagedMemorySections::new(data.sections, data.vm.pointer_size);
        let well_known = WellKnownTypes::resolve(&types, &fields, &config);

        tracing::debug!(
            types = types.count(),
            fields = fields.count(),
            native_objects = native_objects.count(),
            sections = sections.len(),
            "entry caches ready"
        );

        let mut snapshot = Self {
            config,
            vm: data.vm,
            sections,
            types,
            fields,
            native_types,
            native_objects,
            gc_handles: GcHandles::new(data.gc_handles),
            raw_connections,
            root_references,
            well_known,
            managed: ManagedData::default(),
            connections: ConnectionMaps::default(),
        };

        let output = crawler::crawl(&snapshot, &mut progress)?;
        output
            .links
            .apply(&mut snapshot.native_objects, &mut snapshot.native_types);
        snapshot.managed = output.managed;

        progress.phase(CrawlPhase::ConnectionMaps);
        snapshot.connections = ConnectionMaps::build(&snapshot);

        Ok(snapshot)
    }

    /// The configuration the snapshot was crawled with.
    #[must_use]
    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Object layout of the captured runtime.
    #[must_use]
    pub fn vm(&self) -> &VirtualMachineInformation {
        &self.vm
    }

    /// The captured memory.
    #[must_use]
    pub fn sections(&self) -> &ManagedMemorySections {
        &self.sections
    }

    /// Managed types.
    #[must_use]
    pub fn types(&self) -> &TypeDescriptions {
        &self.types
    }

    /// Managed fields.
    #[must_use]
    pub fn fields(&self) -> &FieldDescriptions {
        &self.fields
    }

    /// Native types.
    #[must_use]
    pub fn native_types(&self) -> &NativeTypes {
        &self.native_types
    }

    /// Native objects, with their managed shells linked.
    #[must_use]
    pub fn native_objects(&self) -> &NativeObjects {
        &self.native_objects
    }

    /// GC handles.
    #[must_use]
    pub fn gc_handles(&self) -> &GcHandles {
        &self.gc_handles
    }

    /// Connections recorded by the capture.
    #[must_use]
    pub fn raw_connections(&self) -> &RawConnections {
        &self.raw_connections
    }

    /// Native root references.
    #[must_use]
    pub fn root_references(&self) -> &RootReferences {
        &self.root_references
    }

    /// Types and fields resolved by name at load time.
    #[must_use]
    pub fn well_known(&self) -> &WellKnownTypes {
        &self.well_known
    }

    /// The crawled managed object graph.
    #[must_use]
    pub fn managed(&self) -> &ManagedData {
        &self.managed
    }

    /// Incoming and outgoing connections by unified index.
    #[must_use]
    pub fn connections(&self) -> &ConnectionMaps {
        &self.connections
    }

    /// The unified object index space of this snapshot.
    #[must_use]
    pub fn unified(&self) -> UnifiedIndex {
        UnifiedIndex::new(
            self.gc_handles.count(),
            self.native_objects.count(),
            self.managed.object_count(),
        )
    }

    /// Name of the type at `type_index`.
    #[must_use]
    pub fn type_name(&self, type_index: usize) -> &str {
        self.types.name(type_index)
    }

    /// Base type of the type at `type_index`.
    #[must_use]
    pub fn base_type(&self, type_index: usize) -> Option<usize> {
        self.types.base_type(type_index)
    }

    /// `true` if `type_index` is `base` or derives from it.
    #[must_use]
    pub fn is_subclass_of(&self, type_index: usize, base: usize) -> bool {
        self.types.is_subclass_of(type_index, base)
    }

    /// Root reference accounting for the native object at `native_index`.
    #[must_use]
    pub fn native_root_reference(&self, native_index: usize) -> Option<usize> {
        self.native_objects
            .root_reference_id(native_index)
            .and_then(|id| self.root_references.find(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crawler::NoProgress, test::SnapshotBuilder, Error};

    #[test]
    fn load_reports_phases_in_order() {
        let mut builder = SnapshotBuilder::mono_64();
        let object = builder.class("System.Object", None, 16);
        let address = builder.object(object, 16);
        builder.gc_handle(address);

        let mut phases = Vec::new();
        let snapshot = CachedSnapshot::load(
            builder.data(),
            CrawlerConfig::default(),
            |phase: CrawlPhase| phases.push(phase),
        )
        .unwrap();

        assert_eq!(
            phases,
            vec![
                CrawlPhase::Seed,
                CrawlPhase::InstanceCrawl,
                CrawlPhase::StaticCrawl,
                CrawlPhase::DuplicateReconciliation,
                CrawlPhase::CrossReference,
                CrawlPhase::Aggregate,
                CrawlPhase::ConnectionMaps,
            ]
        );
        assert_eq!(snapshot.managed().object_count(), 1);
    }

    #[test]
    fn load_rejects_misaligned_columns() {
        let mut builder = SnapshotBuilder::mono_64();
        builder.class("System.Object", None, 16);
        let mut data = builder.data();
        data.types.size.push(8);

        let result = CachedSnapshot::load(data, CrawlerConfig::default(), NoProgress);
        assert!(matches!(
            result,
            Err(Error::ColumnLengthMismatch {
                table: "Types",
                column: "size",
                ..
            })
        ));
    }

    #[test]
    fn load_rejects_pointer_width() {
        let mut data = SnapshotBuilder::mono_64().data();
        data.vm.pointer_size = 2;
        assert!(matches!(
            CachedSnapshot::load(data, CrawlerConfig::default(), NoProgress),
            Err(Error::InvalidPointerWidth(2))
        ));
    }

    #[test]
    fn well_known_types_by_name() {
        let mut builder = SnapshotBuilder::mono_64();
        let string = builder.string_type();
        let bridge = builder.native_bridge_type();
        let snapshot = builder.build();

        let well_known = snapshot.well_known();
        assert_eq!(well_known.string_type, Some(string));
        assert_eq!(well_known.native_bridge_type, Some(bridge));
        assert_eq!(
            snapshot
                .fields()
                .name(well_known.cached_ptr_field.unwrap())
                .unwrap(),
            "m_CachedPtr"
        );
    }

    #[test]
    fn native_root_reference_lookup() {
        let mut builder = SnapshotBuilder::mono_64();
        let native_type = builder.native_type("Texture2D");
        let native = builder.native_object(native_type, "tex", 0xAA00);
        builder.root_reference(native, 42, "Assets", 4096);
        let snapshot = builder.build();

        let root = snapshot.native_root_reference(native).unwrap();
        assert_eq!(snapshot.root_references().area_name(root), Some("Assets"));
    }
}
