//! Native (engine-side) types and objects.
//!
//! Both tables are read-only input except for the back-links filled in by the cross-reference
//! pass: the managed shell of a native object, its reference count, and the managed type a
//! native type corresponds to.

use std::collections::HashMap;

use crate::{
    snapshot::{columns::ensure_column_len, NativeObjectColumns, NativeTypeColumns},
    Result,
};

/// Validated native type table.
#[derive(Debug, Clone, Default)]
pub struct NativeTypes {
    columns: NativeTypeColumns,
    managed_type_index: Vec<Option<usize>>,
}

impl NativeTypes {
    /// Validates the native type columns.
    ///
    /// # Errors
    /// Returns [`crate::Error::ColumnLengthMismatch`] for non index-aligned columns and
    /// [`crate::Error::Malformed`] for a base link to an unknown native type.
    pub fn new(columns: NativeTypeColumns) -> Result<Self> {
        let count = columns.name.len();
        ensure_column_len(
            "NativeTypes",
            "native_base_type_array_index",
            &columns.native_base_type_array_index,
            count,
        )?;

        for (index, &base) in columns.native_base_type_array_index.iter().enumerate() {
            if base >= 0 && base as usize >= count {
                return Err(malformed_error!(
                    "Native type {} links to unknown base {}",
                    index,
                    base
                ));
            }
        }

        Ok(Self {
            columns,
            managed_type_index: vec![None; count],
        })
    }

    /// Number of native types.
    #[must_use]
    pub fn count(&self) -> usize {
        self.columns.name.len()
    }

    /// Native type name.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.columns.name.get(index).map(String::as_str)
    }

    /// Native base type, `None` for root types.
    #[must_use]
    pub fn base_type(&self, index: usize) -> Option<usize> {
        self.columns
            .native_base_type_array_index
            .get(index)
            .and_then(|&base| usize::try_from(base).ok())
    }

    /// Managed type this native type corresponds to, if the name heuristic found one.
    #[must_use]
    pub fn managed_type_index(&self, index: usize) -> Option<usize> {
        self.managed_type_index.get(index).copied().flatten()
    }

    pub(crate) fn set_managed_type_index(&mut self, index: usize, managed: usize) {
        if let Some(slot) = self.managed_type_index.get_mut(index) {
            *slot = Some(managed);
        }
    }
}

/// Validated native object table with an address lookup.
#[derive(Debug, Clone, Default)]
pub struct NativeObjects {
    columns: NativeObjectColumns,
    managed_object_index: Vec<Option<usize>>,
    ref_count: Vec<u32>,
    index_by_address: HashMap<u64, usize>,
}

impl NativeObjects {
    /// Validates the native object columns against the native type table.
    ///
    /// # Errors
    /// Returns [`crate::Error::ColumnLengthMismatch`] for non index-aligned columns and
    /// [`crate::Error::Malformed`] for an object of an unknown native type.
    pub fn new(columns: NativeObjectColumns, types: &NativeTypes) -> Result<Self> {
        let count = columns.name.len();
        ensure_column_len("NativeObjects", "instance_id", &columns.instance_id, count)?;
        ensure_column_len("NativeObjects", "size", &columns.size, count)?;
        ensure_column_len(
            "NativeObjects",
            "native_type_index",
            &columns.native_type_index,
            count,
        )?;
        ensure_column_len(
            "NativeObjects",
            "native_object_address",
            &columns.native_object_address,
            count,
        )?;
        ensure_column_len(
            "NativeObjects",
            "root_reference_id",
            &columns.root_reference_id,
            count,
        )?;

        for (index, &native_type) in columns.native_type_index.iter().enumerate() {
            if native_type >= 0 && native_type as usize >= types.count() {
                return Err(malformed_error!(
                    "Native object {} has unknown native type {}",
                    index,
                    native_type
                ));
            }
        }

        let mut index_by_address = HashMap::with_capacity(count);
        for (index, &address) in columns.native_object_address.iter().enumerate() {
            if address != 0 {
                index_by_address.entry(address).or_insert(index);
            }
        }

        Ok(Self {
            columns,
            managed_object_index: vec![None; count],
            ref_count: vec![0; count],
            index_by_address,
        })
    }

    /// Number of native objects.
    #[must_use]
    pub fn count(&self) -> usize {
        self.columns.name.len()
    }

    /// Object name.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.columns.name.get(index).map(String::as_str)
    }

    /// Engine instance id.
    #[must_use]
    pub fn instance_id(&self, index: usize) -> Option<i32> {
        self.columns.instance_id.get(index).copied()
    }

    /// Native allocation size.
    #[must_use]
    pub fn size(&self, index: usize) -> u64 {
        self.columns.size.get(index).copied().unwrap_or(0)
    }

    /// Native type of the object.
    #[must_use]
    pub fn native_type_index(&self, index: usize) -> Option<usize> {
        self.columns
            .native_type_index
            .get(index)
            .and_then(|&native_type| usize::try_from(native_type).ok())
    }

    /// Address of the native object.
    #[must_use]
    pub fn address(&self, index: usize) -> u64 {
        self.columns
            .native_object_address
            .get(index)
            .copied()
            .unwrap_or(0)
    }

    /// Root reference accounting for the object, `None` for id `0`.
    #[must_use]
    pub fn root_reference_id(&self, index: usize) -> Option<i64> {
        self.columns
            .root_reference_id
            .get(index)
            .copied()
            .filter(|&id| id != 0)
    }

    /// Native object at `address`. Zero never resolves.
    #[must_use]
    pub fn find_by_address(&self, address: u64) -> Option<usize> {
        self.index_by_address.get(&address).copied()
    }

    /// Managed shell of the object, set by the cross-reference pass.
    #[must_use]
    pub fn managed_object_index(&self, index: usize) -> Option<usize> {
        self.managed_object_index.get(index).copied().flatten()
    }

    /// Number of references to the object discovered by the crawl.
    #[must_use]
    pub fn ref_count(&self, index: usize) -> u32 {
        self.ref_count.get(index).copied().unwrap_or(0)
    }

    pub(crate) fn set_managed_object_index(&mut self, index: usize, managed: usize) {
        if let Some(slot) = self.managed_object_index.get_mut(index) {
            *slot = Some(managed);
        }
    }

    pub(crate) fn add_ref(&mut self, index: usize) {
        if let Some(count) = self.ref_count.get_mut(index) {
            *count += 1;
        }
    }
}
