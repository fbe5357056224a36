//! Raw columnar input, as produced by the snapshot reader.
//!
//! Every struct in here is a plain bundle of index-aligned columns: row `i` of an entity is
//! made of element `i` of every column. Nothing is validated at this level, that happens when
//! the columns are turned into the entry caches by [`crate::CachedSnapshot::load`].

use crate::{
    memory::MemorySection,
    snapshot::{TypeFlags, VirtualMachineInformation},
};

/// Managed type table.
#[derive(Debug, Clone, Default)]
pub struct TypeColumns {
    /// Value type / array / rank flags.
    pub flags: Vec<TypeFlags>,
    /// Base type for classes and value types, element type for arrays, `-1` if none.
    /// Expressed as a logical type index, see [`TypeColumns::type_index`].
    pub base_or_element_type_index: Vec<i32>,
    /// Instance size in bytes, object header included.
    pub size: Vec<i32>,
    /// Address of the runtime type-info structure, the first word of every instance.
    pub type_info_address: Vec<u64>,
    /// Logical type index used by fields and base links. Not necessarily the row number.
    pub type_index: Vec<i32>,
    /// Fully qualified type name.
    pub name: Vec<String>,
    /// Name of the declaring assembly.
    pub assembly: Vec<String>,
    /// Fields declared by the type itself (instance and static), as field table rows.
    pub field_indices: Vec<Vec<i32>>,
    /// Captured static storage of the type, empty if it has none.
    pub static_field_bytes: Vec<Vec<u8>>,
}

/// Managed field table.
#[derive(Debug, Clone, Default)]
pub struct FieldColumns {
    /// Field name.
    pub name: Vec<String>,
    /// Offset inside the instance (object header included) or the static block.
    /// `-1` marks a thread-static field.
    pub offset: Vec<i32>,
    /// Logical type index of the field's own type.
    pub type_index: Vec<i32>,
    /// `true` for static fields.
    pub is_static: Vec<bool>,
}

/// Native type table.
#[derive(Debug, Clone, Default)]
pub struct NativeTypeColumns {
    /// Native type name.
    pub name: Vec<String>,
    /// Row of the native base type, `-1` for root types.
    pub native_base_type_array_index: Vec<i32>,
}

/// Native object table.
#[derive(Debug, Clone, Default)]
pub struct NativeObjectColumns {
    /// Object name.
    pub name: Vec<String>,
    /// Engine-assigned instance id.
    pub instance_id: Vec<i32>,
    /// Native allocation size in bytes.
    pub size: Vec<u64>,
    /// Row of the native type.
    pub native_type_index: Vec<i32>,
    /// Address of the native object, what a managed shell's cached pointer holds.
    pub native_object_address: Vec<u64>,
    /// Id of the root reference that accounts for the object, `0` if none.
    pub root_reference_id: Vec<i64>,
}

/// GC handle table.
#[derive(Debug, Clone, Default)]
pub struct GcHandleColumns {
    /// Address of the managed object each handle keeps alive, `0` for a free handle.
    pub target: Vec<u64>,
}

/// Connections recorded by the capture itself, in unified object indices.
#[derive(Debug, Clone, Default)]
pub struct ConnectionColumns {
    /// Unified index of the referrer.
    pub from: Vec<i32>,
    /// Unified index of the referenced object.
    pub to: Vec<i32>,
}

/// Root reference table, native allocation roots.
#[derive(Debug, Clone, Default)]
pub struct RootReferenceColumns {
    /// Root id, referenced by native objects.
    pub id: Vec<i64>,
    /// Area the root belongs to.
    pub area_name: Vec<String>,
    /// Name of the rooted object.
    pub object_name: Vec<String>,
    /// Memory accounted to the root.
    pub accumulated_size: Vec<u64>,
}

/// Everything the core receives from the snapshot reader.
#[derive(Debug, Clone, Default)]
pub struct SnapshotData {
    /// Object layout of the profiled runtime.
    pub vm: VirtualMachineInformation,
    /// Captured memory, in any order.
    pub sections: Vec<MemorySection>,
    /// Managed types.
    pub types: TypeColumns,
    /// Managed fields.
    pub fields: FieldColumns,
    /// Native types.
    pub native_types: NativeTypeColumns,
    /// Native objects.
    pub native_objects: NativeObjectColumns,
    /// GC handles, the crawl seeds.
    pub gc_handles: GcHandleColumns,
    /// Native-side connections.
    pub connections: ConnectionColumns,
    /// Native root references.
    pub root_references: RootReferenceColumns,
}
