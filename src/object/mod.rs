//! Navigable handles into the crawled snapshot.
//!
//! An [`ObjectData`] names one thing the presentation layer can show: a managed object, an
//! array, a boxed value, a value type stored inline in a field or element, a field or element
//! that holds a reference, the static storage of a type, or a native object. It never owns
//! heap memory, only a [`BytesAndOffset`] view into the snapshot, and it is cheap to clone.
//!
//! Navigation is pure: [`ObjectData::field`], [`ObjectData::element`],
//! [`ObjectData::unboxed`], [`ObjectData::base`] and [`ObjectData::deref`] all return a new
//! handle and leave the current one untouched. Every derived handle remembers where it came
//! from through its [`ObjectDataParent`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use memscope::prelude::*;
//!
//! # fn show(snapshot: &CachedSnapshot) -> memscope::Result<()> {
//! let root = ObjectData::from_unified_index(snapshot, 0)?;
//! for &field in root.fields(snapshot) {
//!     let value = root.field(snapshot, field)?.deref(snapshot);
//!     println!("{} = {}", snapshot.fields().name(field)?, value.value_as_string(snapshot));
//! }
//! # Ok(())
//! # }
//! ```

mod value;

use std::sync::Arc;

use strum::IntoStaticStr;

use crate::{
    crawler::{field_data_offset, ArrayInfo, ObjectHeader},
    graph::UnifiedObject,
    memory::BytesAndOffset,
    CachedSnapshot, Error, Result,
};

/// What an [`ObjectData`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum ObjectDataKind<'a> {
    /// Nothing decodable: a null or unresolvable reference, or a thread-static field.
    Unknown,
    /// A value type stored inline, `data` points at its first field (no object header).
    Value {
        /// Row of the value type.
        type_index: usize,
        /// The inline data.
        data: BytesAndOffset<'a>,
    },
    /// A managed class instance on the heap.
    Object {
        /// Address of the object.
        address: u64,
        /// Row of the object's type.
        type_index: usize,
        /// The object, header included.
        data: BytesAndOffset<'a>,
    },
    /// A managed array on the heap.
    Array {
        /// Address of the array.
        address: u64,
        /// Row of the array type.
        type_index: usize,
        /// The array, header included.
        data: BytesAndOffset<'a>,
    },
    /// A boxed value type on the heap.
    BoxedValue {
        /// Address of the box.
        address: u64,
        /// Row of the value type.
        type_index: usize,
        /// The box, header included.
        data: BytesAndOffset<'a>,
    },
    /// A field or element holding a reference to an object.
    ReferenceObject {
        /// Row of the declared type of the field or element.
        type_index: usize,
        /// The pointer-sized slot.
        slot: BytesAndOffset<'a>,
    },
    /// A field or element holding a reference to an array.
    ReferenceArray {
        /// Row of the declared array type.
        type_index: usize,
        /// The pointer-sized slot.
        slot: BytesAndOffset<'a>,
    },
    /// The static storage of a type.
    Type {
        /// Row of the type.
        type_index: usize,
    },
    /// A native object.
    NativeObject {
        /// Row in the native object table.
        native_index: usize,
    },
}

/// Where a derived handle came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDataParent<'a> {
    /// The handle navigation started from.
    pub owner: ObjectData<'a>,
    /// Field that was followed.
    pub field: Option<usize>,
    /// Element that was followed.
    pub array_index: Option<usize>,
    /// `true` if the handle is the dereferenced target of a reference slot.
    pub expand_to_target: bool,
}

/// A handle to one object, value or storage block of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectData<'a> {
    kind: ObjectDataKind<'a>,
    parent: Option<Arc<ObjectDataParent<'a>>>,
}

impl<'a> ObjectData<'a> {
    fn new(kind: ObjectDataKind<'a>) -> Self {
        Self { kind, parent: None }
    }

    fn with_parent(
        &self,
        kind: ObjectDataKind<'a>,
        field: Option<usize>,
        array_index: Option<usize>,
        expand_to_target: bool,
    ) -> Self {
        Self {
            kind,
            parent: Some(Arc::new(ObjectDataParent {
                owner: self.clone(),
                field,
                array_index,
                expand_to_target,
            })),
        }
    }

    /// A handle to nothing.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(ObjectDataKind::Unknown)
    }

    /// Handle to the static storage of the type at `type_index`.
    #[must_use]
    pub fn type_statics(type_index: usize) -> Self {
        Self::new(ObjectDataKind::Type { type_index })
    }

    /// Handle to the native object at `native_index`.
    #[must_use]
    pub fn native(native_index: usize) -> Self {
        Self::new(ObjectDataKind::NativeObject { native_index })
    }

    /// Handle to the managed object at `address`.
    ///
    /// Uses the crawled type if the crawl reached the address, and decodes the header
    /// otherwise. Null, unresolvable and undecodable addresses yield an `Unknown` handle.
    #[must_use]
    pub fn from_managed_pointer(snapshot: &'a CachedSnapshot, address: u64) -> Self {
        if address == 0 {
            return Self::unknown();
        }
        let Some(data) = snapshot.sections().find(address) else {
            return Self::unknown();
        };

        let managed = snapshot.managed();
        let crawled = managed
            .find_by_address(address)
            .and_then(|index| managed.object(index))
            .and_then(|info| info.type_index);
        let Some(type_index) =
            crawled.or_else(|| ObjectHeader::parse(snapshot, data).map(|header| header.type_index))
        else {
            return Self::unknown();
        };

        let types = snapshot.types();
        let kind = if types.is_array(type_index) {
            ObjectDataKind::Array {
                address,
                type_index,
                data,
            }
        } else if types.is_value_type(type_index) {
            ObjectDataKind::BoxedValue {
                address,
                type_index,
                data,
            }
        } else {
            ObjectDataKind::Object {
                address,
                type_index,
                data,
            }
        };
        Self::new(kind)
    }

    /// Handle to the managed object at `index` of the managed object table.
    #[must_use]
    pub fn from_managed_object_index(snapshot: &'a CachedSnapshot, index: usize) -> Self {
        match snapshot.managed().object(index) {
            Some(info) if info.is_valid() => Self::from_managed_pointer(snapshot, info.ptr_object),
            _ => Self::unknown(),
        }
    }

    /// Handle to the object at a unified index.
    ///
    /// # Errors
    /// Returns [`Error::InvalidUnifiedIndex`] for an index outside the unified space.
    pub fn from_unified_index(snapshot: &'a CachedSnapshot, unified: usize) -> Result<Self> {
        Ok(match snapshot.unified().resolve(unified)? {
            UnifiedObject::Managed(index) => Self::from_managed_object_index(snapshot, index),
            UnifiedObject::Native(native_index) => Self::native(native_index),
        })
    }

    /// What the handle refers to.
    #[must_use]
    pub fn kind(&self) -> &ObjectDataKind<'a> {
        &self.kind
    }

    /// Name of the handle's kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        (&self.kind).into()
    }

    /// Where the handle came from, `None` for handles created directly.
    #[must_use]
    pub fn parent(&self) -> Option<&ObjectDataParent<'a>> {
        self.parent.as_deref()
    }

    /// `false` for `Unknown` handles.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self.kind, ObjectDataKind::Unknown)
    }

    /// Row of the managed type, `None` for unknown and native handles.
    #[must_use]
    pub fn type_index(&self) -> Option<usize> {
        match self.kind {
            ObjectDataKind::Value { type_index, .. }
            | ObjectDataKind::Object { type_index, .. }
            | ObjectDataKind::Array { type_index, .. }
            | ObjectDataKind::BoxedValue { type_index, .. }
            | ObjectDataKind::ReferenceObject { type_index, .. }
            | ObjectDataKind::ReferenceArray { type_index, .. }
            | ObjectDataKind::Type { type_index } => Some(type_index),
            ObjectDataKind::Unknown | ObjectDataKind::NativeObject { .. } => None,
        }
    }

    /// Address of a heap object (class instance, array or box).
    #[must_use]
    pub fn address(&self) -> Option<u64> {
        match self.kind {
            ObjectDataKind::Object { address, .. }
            | ObjectDataKind::Array { address, .. }
            | ObjectDataKind::BoxedValue { address, .. } => Some(address),
            _ => None,
        }
    }

    /// Address stored in a reference slot, `None` for other kinds.
    #[must_use]
    pub fn reference_target(&self) -> Option<u64> {
        match self.kind {
            ObjectDataKind::ReferenceObject { slot, .. }
            | ObjectDataKind::ReferenceArray { slot, .. } => slot.read_pointer().ok(),
            _ => None,
        }
    }

    /// Name of the managed or native type.
    #[must_use]
    pub fn type_name(&self, snapshot: &'a CachedSnapshot) -> &'a str {
        match self.kind {
            ObjectDataKind::Unknown => "<unknown>",
            ObjectDataKind::NativeObject { native_index } => snapshot
                .native_objects()
                .native_type_index(native_index)
                .and_then(|native_type| snapshot.native_types().name(native_type))
                .unwrap_or("<unknown native type>"),
            _ => self
                .type_index()
                .map_or("<unknown>", |type_index| snapshot.types().name(type_index)),
        }
    }

    /// Index of a heap object in the managed object table.
    #[must_use]
    pub fn managed_object_index(&self, snapshot: &CachedSnapshot) -> Option<usize> {
        snapshot.managed().find_by_address(self.address()?)
    }

    /// Unified index of a heap or native object.
    #[must_use]
    pub fn unified_index(&self, snapshot: &CachedSnapshot) -> Option<usize> {
        let unified = snapshot.unified();
        match self.kind {
            ObjectDataKind::NativeObject { native_index } => unified.from_native(native_index),
            _ => unified.from_managed(self.managed_object_index(snapshot)?),
        }
    }

    /// Size in bytes of what the handle refers to.
    ///
    /// Heap objects report their heap size, inline values the size without header, reference
    /// slots one pointer, type handles their static storage.
    #[must_use]
    pub fn size(&self, snapshot: &CachedSnapshot) -> u64 {
        let types = snapshot.types();
        match self.kind {
            ObjectDataKind::Unknown => 0,
            ObjectDataKind::Object {
                address,
                type_index,
                data,
            }
            | ObjectDataKind::Array {
                address,
                type_index,
                data,
            }
            | ObjectDataKind::BoxedValue {
                address,
                type_index,
                data,
            } => {
                let managed = snapshot.managed();
                managed
                    .find_by_address(address)
                    .and_then(|index| managed.object(index))
                    .filter(|info| info.is_valid())
                    .map_or_else(
                        || ObjectHeader::object_size(snapshot, data, type_index).0,
                        |info| info.size,
                    )
            }
            ObjectDataKind::Value { type_index, .. } => types
                .size(type_index)
                .saturating_sub(u64::from(snapshot.vm().object_header_size)),
            ObjectDataKind::ReferenceObject { .. } | ObjectDataKind::ReferenceArray { .. } => {
                u64::from(snapshot.vm().pointer_size)
            }
            ObjectDataKind::Type { type_index } => types.static_field_bytes(type_index).len() as u64,
            ObjectDataKind::NativeObject { native_index } => {
                snapshot.native_objects().size(native_index)
            }
        }
    }

    /// Number of references discovered to a heap or native object.
    #[must_use]
    pub fn ref_count(&self, snapshot: &CachedSnapshot) -> u32 {
        match self.kind {
            ObjectDataKind::NativeObject { native_index } => {
                snapshot.native_objects().ref_count(native_index)
            }
            _ => self
                .managed_object_index(snapshot)
                .and_then(|index| snapshot.managed().object(index))
                .map_or(0, |info| info.ref_count),
        }
    }

    /// Fields reachable through [`ObjectData::field`]: the instance fields (inherited
    /// included) of objects and values, the owned static fields of a type handle.
    #[must_use]
    pub fn fields(&self, snapshot: &'a CachedSnapshot) -> &'a [usize] {
        let types = snapshot.types();
        match self.kind {
            ObjectDataKind::Type { type_index } => types.owned_static_fields(type_index),
            ObjectDataKind::Object { type_index, .. }
            | ObjectDataKind::BoxedValue { type_index, .. }
            | ObjectDataKind::Value { type_index, .. } => types.instance_fields(type_index),
            _ => &[],
        }
    }

    /// Number of fields reachable through [`ObjectData::field`].
    #[must_use]
    pub fn field_count(&self, snapshot: &'a CachedSnapshot) -> usize {
        self.fields(snapshot).len()
    }

    /// Handle to `field` of this object, value or type.
    ///
    /// Static fields are read from the storage of the type in the base chain that declares
    /// them. Value type fields yield `Value` handles; reference fields yield reference
    /// handles to be followed with [`ObjectData::deref`]. A thread-static field yields an
    /// `Unknown` handle.
    ///
    /// # Errors
    /// Returns [`Error::InvalidObjectKind`] for handles without fields and for instance fields
    /// requested on a type handle, [`Error::FieldNotFound`] and [`Error::TypeNotFound`] for
    /// dangling indices, and [`Error::InvariantViolation`] if no type in the base chain owns a
    /// static field.
    pub fn field(&self, snapshot: &'a CachedSnapshot, field: usize) -> Result<Self> {
        let is_static = snapshot.fields().is_static(field)?;
        match self.kind {
            ObjectDataKind::Type { type_index } if is_static => {
                self.static_field(snapshot, type_index, field)
            }
            ObjectDataKind::Type { .. } => Err(Error::InvalidObjectKind {
                operation: "instance field",
                kind: self.kind_name(),
            }),
            ObjectDataKind::Object { type_index, .. }
            | ObjectDataKind::BoxedValue { type_index, .. }
            | ObjectDataKind::Value { type_index, .. }
                if is_static =>
            {
                self.static_field(snapshot, type_index, field)
            }
            ObjectDataKind::Object { data, .. } | ObjectDataKind::BoxedValue { data, .. } => {
                self.field_at(snapshot, field, data, false)
            }
            ObjectDataKind::Value { data, .. } => self.field_at(snapshot, field, data, true),
            _ => Err(Error::InvalidObjectKind {
                operation: "field",
                kind: self.kind_name(),
            }),
        }
    }

    fn static_field(
        &self,
        snapshot: &'a CachedSnapshot,
        type_index: usize,
        field: usize,
    ) -> Result<Self> {
        let owner = snapshot.types().owning_static_type(type_index, field)?;
        let data = BytesAndOffset::new(
            snapshot.types().static_field_bytes(owner),
            0,
            snapshot.vm().pointer_size,
        );
        self.field_at(snapshot, field, data, false)
    }

    fn field_at(
        &self,
        snapshot: &'a CachedSnapshot,
        field: usize,
        data: BytesAndOffset<'a>,
        inline: bool,
    ) -> Result<Self> {
        let fields = snapshot.fields();
        let field_type_index = fields.type_index(field)?;
        let field_type = snapshot
            .types()
            .array_index_of(field_type_index)
            .ok_or(Error::TypeNotFound(field_type_index))?;

        let kind = field_data_offset(fields.offset(field)?, inline, snapshot.vm())
            .map_or(ObjectDataKind::Unknown, |offset| {
                Self::slot_kind(snapshot, field_type, data.add(offset))
            });
        Ok(self.with_parent(kind, Some(field), None, false))
    }

    fn slot_kind(
        snapshot: &CachedSnapshot,
        type_index: usize,
        at: BytesAndOffset<'a>,
    ) -> ObjectDataKind<'a> {
        let types = snapshot.types();
        if types.is_value_type(type_index) {
            ObjectDataKind::Value {
                type_index,
                data: at,
            }
        } else if types.is_array(type_index) {
            ObjectDataKind::ReferenceArray {
                type_index,
                slot: at,
            }
        } else {
            ObjectDataKind::ReferenceObject {
                type_index,
                slot: at,
            }
        }
    }

    /// Decoded header of an array handle.
    #[must_use]
    pub fn array_info(&self, snapshot: &CachedSnapshot) -> Option<ArrayInfo> {
        match self.kind {
            ObjectDataKind::Array {
                type_index, data, ..
            } => Some(ArrayInfo::read(snapshot, data, type_index)),
            _ => None,
        }
    }

    /// Number of elements of an array handle, `0` for every other kind.
    #[must_use]
    pub fn element_count(&self, snapshot: &CachedSnapshot) -> usize {
        self.array_info(snapshot).map_or(0, |info| info.length)
    }

    /// Handle to element `index` of an array.
    ///
    /// # Errors
    /// Returns [`Error::InvalidObjectKind`] for non-array handles and [`Error::OutOfBounds`]
    /// for an index past the last element.
    pub fn element(&self, snapshot: &'a CachedSnapshot, index: usize) -> Result<Self> {
        let ObjectDataKind::Array {
            type_index, data, ..
        } = self.kind
        else {
            return Err(Error::InvalidObjectKind {
                operation: "element",
                kind: self.kind_name(),
            });
        };

        let info = ArrayInfo::read(snapshot, data, type_index);
        if index >= info.length {
            return Err(out_of_bounds_error!());
        }

        let kind = info
            .element_type
            .map_or(ObjectDataKind::Unknown, |element_type| {
                Self::slot_kind(
                    snapshot,
                    element_type,
                    data.add(info.element_offset(snapshot, index)),
                )
            });
        Ok(self.with_parent(kind, None, Some(index), false))
    }

    /// The value inside a boxed value type.
    ///
    /// # Errors
    /// Returns [`Error::InvalidObjectKind`] for every kind but `BoxedValue`.
    pub fn unboxed(&self, snapshot: &CachedSnapshot) -> Result<Self> {
        let ObjectDataKind::BoxedValue {
            type_index, data, ..
        } = self.kind
        else {
            return Err(Error::InvalidObjectKind {
                operation: "unbox",
                kind: self.kind_name(),
            });
        };

        let kind = ObjectDataKind::Value {
            type_index,
            data: data.add(snapshot.vm().header_size()),
        };
        Ok(self.with_parent(kind, None, None, false))
    }

    /// The same data viewed as its base type, `None` at the root of the hierarchy and for
    /// kinds without one.
    #[must_use]
    pub fn base(&self, snapshot: &CachedSnapshot) -> Option<Self> {
        let base = snapshot.types().base_type(self.type_index()?)?;
        let kind = match self.kind {
            ObjectDataKind::Object { address, data, .. } => ObjectDataKind::Object {
                address,
                type_index: base,
                data,
            },
            ObjectDataKind::BoxedValue { address, data, .. } => ObjectDataKind::BoxedValue {
                address,
                type_index: base,
                data,
            },
            ObjectDataKind::Value { data, .. } => ObjectDataKind::Value {
                type_index: base,
                data,
            },
            ObjectDataKind::Type { .. } => ObjectDataKind::Type { type_index: base },
            _ => return None,
        };
        Some(Self {
            kind,
            parent: self.parent.clone(),
        })
    }

    /// Follows a reference slot to the object it points at.
    ///
    /// A null or unresolvable reference yields an `Unknown` handle. Handles that are not
    /// reference slots are returned unchanged.
    #[must_use]
    pub fn deref(&self, snapshot: &'a CachedSnapshot) -> Self {
        let Some(target) = self.reference_target() else {
            if matches!(
                self.kind,
                ObjectDataKind::ReferenceObject { .. } | ObjectDataKind::ReferenceArray { .. }
            ) {
                return self.with_parent(ObjectDataKind::Unknown, None, None, true);
            }
            return self.clone();
        };

        let (field, array_index) = self
            .parent()
            .map_or((None, None), |parent| (parent.field, parent.array_index));
        let kind = Self::from_managed_pointer(snapshot, target).kind;
        self.with_parent(kind, field, array_index, true)
    }
}
