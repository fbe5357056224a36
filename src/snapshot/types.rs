//! Managed type descriptions and their derived lookup tables.
//!
//! The snapshot numbers types twice: by row in the type table (the *array index*, used by
//! everything in this crate) and by a logical *type index*, which is what base links and field
//! types refer to. The two do not necessarily coincide, [`TypeDescriptions`] keeps an explicit
//! map between them instead of assuming they do.
//!
//! Field lists are flattened once at load time, so the crawler never walks the base type chain
//! for instance fields:
//!
//! - [`TypeDescriptions::instance_fields`] holds the instance fields of a type and all of its
//!   ancestors, base type fields first
//! - [`TypeDescriptions::owned_static_fields`] holds only the static fields declared by the type

use std::collections::HashMap;

use bitflags::bitflags;

use crate::{
    snapshot::{columns::ensure_column_len, FieldDescriptions, TypeColumns},
    Error, Result,
};

bitflags! {
    /// Kind flags of a managed type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u32 {
        /// The type is a value type, instances are stored inline.
        const VALUE_TYPE = 0x0000_0001;
        /// The type is an array, `base_or_element_type_index` is the element type.
        const ARRAY = 0x0000_0002;
        /// Rank of an array type, in the upper 16 bits.
        const ARRAY_RANK_MASK = 0xFFFF_0000;
    }
}

impl TypeFlags {
    /// Flags of an array type with the given rank.
    #[must_use]
    pub fn array_of_rank(rank: u32) -> Self {
        Self::ARRAY | Self::from_bits_retain((rank << 16) & Self::ARRAY_RANK_MASK.bits())
    }

    /// Rank of an array type, `0` for non-array types.
    #[must_use]
    pub fn array_rank(self) -> u32 {
        (self.bits() & Self::ARRAY_RANK_MASK.bits()) >> 16
    }
}

/// Validated type table with precomputed field lists and reverse lookups.
#[derive(Debug, Clone, Default)]
pub struct TypeDescriptions {
    columns: TypeColumns,
    base_or_element: Vec<Option<usize>>,
    instance_fields: Vec<Vec<usize>>,
    owned_static_fields: Vec<Vec<usize>>,
    array_index_by_type_index: HashMap<i32, usize>,
    array_index_by_type_info: HashMap<u64, usize>,
}

impl TypeDescriptions {
    /// Validates the type columns and derives the lookup tables.
    ///
    /// # Errors
    /// Returns [`Error::ColumnLengthMismatch`] for non index-aligned columns, and
    /// [`Error::Malformed`] for duplicate logical type indices, base links to unknown types or
    /// cyclic inheritance.
    pub fn new(columns: TypeColumns, fields: &FieldDescriptions) -> Result<Self> {
        let count = columns.name.len();
        ensure_column_len("Types", "flags", &columns.flags, count)?;
        ensure_column_len(
            "Types",
            "base_or_element_type_index",
            &columns.base_or_element_type_index,
            count,
        )?;
        ensure_column_len("Types", "size", &columns.size, count)?;
        ensure_column_len("Types", "type_info_address", &columns.type_info_address, count)?;
        ensure_column_len("Types", "type_index", &columns.type_index, count)?;
        ensure_column_len("Types", "assembly", &columns.assembly, count)?;
        ensure_column_len("Types", "field_indices", &columns.field_indices, count)?;
        ensure_column_len("Types", "static_field_bytes", &columns.static_field_bytes, count)?;

        let mut array_index_by_type_index = HashMap::with_capacity(count);
        for (array_index, &type_index) in columns.type_index.iter().enumerate() {
            if array_index_by_type_index
                .insert(type_index, array_index)
                .is_some()
            {
                return Err(malformed_error!("Duplicate type index - {}", type_index));
            }
        }

        let mut array_index_by_type_info = HashMap::with_capacity(count);
        for (array_index, &address) in columns.type_info_address.iter().enumerate() {
            if address != 0 {
                array_index_by_type_info.entry(address).or_insert(array_index);
            }
        }

        let base_or_element = columns
            .base_or_element_type_index
            .iter()
            .enumerate()
            .map(|(array_index, &base)| {
                if base < 0 {
                    return Ok(None);
                }
                array_index_by_type_index
                    .get(&base)
                    .copied()
                    .map(Some)
                    .ok_or_else(|| {
                        malformed_error!(
                            "Type {} links to unknown base or element type {}",
                            array_index,
                            base
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut owned_instance = Vec::with_capacity(count);
        let mut owned_static_fields = Vec::with_capacity(count);
        for declared in &columns.field_indices {
            let mut instance = Vec::new();
            let mut statics = Vec::new();
            for &field in declared {
                let field = usize::try_from(field)
                    .map_err(|_| malformed_error!("Negative field index - {}", field))?;
                if fields.is_static(field)? {
                    statics.push(field);
                } else {
                    instance.push(field);
                }
            }
            owned_instance.push(instance);
            owned_static_fields.push(statics);
        }

        let mut types = Self {
            columns,
            base_or_element,
            instance_fields: Vec::new(),
            owned_static_fields,
            array_index_by_type_index,
            array_index_by_type_info,
        };

        let mut instance_fields = Vec::with_capacity(count);
        for array_index in 0..count {
            let mut chain = Vec::new();
            let mut current = Some(array_index);
            while let Some(type_array_index) = current {
                if chain.len() > count {
                    return Err(malformed_error!(
                        "Cyclic inheritance involving type {}",
                        array_index
                    ));
                }
                chain.push(type_array_index);
                current = types.base_type(type_array_index);
            }

            instance_fields.push(
                chain
                    .iter()
                    .rev()
                    .flat_map(|&type_array_index| owned_instance[type_array_index].iter().copied())
                    .collect(),
            );
        }
        types.instance_fields = instance_fields;

        Ok(types)
    }

    /// Number of types.
    #[must_use]
    pub fn count(&self) -> usize {
        self.columns.name.len()
    }

    /// Type name, `"<unknown type>"` for an out of range index.
    #[must_use]
    pub fn name(&self, type_array_index: usize) -> &str {
        self.columns
            .name
            .get(type_array_index)
            .map_or("<unknown type>", String::as_str)
    }

    /// Name of the declaring assembly.
    #[must_use]
    pub fn assembly(&self, type_array_index: usize) -> Option<&str> {
        self.columns
            .assembly
            .get(type_array_index)
            .map(String::as_str)
    }

    /// Kind flags of a type.
    #[must_use]
    pub fn flags(&self, type_array_index: usize) -> TypeFlags {
        self.columns
            .flags
            .get(type_array_index)
            .copied()
            .unwrap_or_default()
    }

    /// `true` for value types.
    #[must_use]
    pub fn is_value_type(&self, type_array_index: usize) -> bool {
        self.flags(type_array_index).contains(TypeFlags::VALUE_TYPE)
    }

    /// `true` for array types.
    #[must_use]
    pub fn is_array(&self, type_array_index: usize) -> bool {
        self.flags(type_array_index).contains(TypeFlags::ARRAY)
    }

    /// Declared instance size, object header included. Negative sizes read as zero.
    #[must_use]
    pub fn size(&self, type_array_index: usize) -> u64 {
        self.columns
            .size
            .get(type_array_index)
            .and_then(|&size| u64::try_from(size).ok())
            .unwrap_or(0)
    }

    /// Address of the runtime type-info structure.
    #[must_use]
    pub fn type_info_address(&self, type_array_index: usize) -> u64 {
        self.columns
            .type_info_address
            .get(type_array_index)
            .copied()
            .unwrap_or(0)
    }

    /// Logical type index of a row.
    #[must_use]
    pub fn type_index(&self, type_array_index: usize) -> Option<i32> {
        self.columns.type_index.get(type_array_index).copied()
    }

    /// Row of the type with the logical index `type_index`.
    #[must_use]
    pub fn array_index_of(&self, type_index: i32) -> Option<usize> {
        self.array_index_by_type_index.get(&type_index).copied()
    }

    /// Row of the type whose type-info structure lives at `address`.
    #[must_use]
    pub fn array_index_of_type_info(&self, address: u64) -> Option<usize> {
        self.array_index_by_type_info.get(&address).copied()
    }

    /// Row of the first type called `name`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.columns.name.iter().position(|candidate| candidate == name)
    }

    /// Base type or element type, `None` for root types and uninitialized generics.
    #[must_use]
    pub fn base_or_element(&self, type_array_index: usize) -> Option<usize> {
        self.base_or_element.get(type_array_index).copied().flatten()
    }

    /// Base type of a class or value type, `None` for arrays.
    #[must_use]
    pub fn base_type(&self, type_array_index: usize) -> Option<usize> {
        if self.is_array(type_array_index) {
            return None;
        }
        self.base_or_element(type_array_index)
    }

    /// Element type of an array type, `None` for non-arrays and uninitialized generics.
    #[must_use]
    pub fn element_type(&self, type_array_index: usize) -> Option<usize> {
        if !self.is_array(type_array_index) {
            return None;
        }
        self.base_or_element(type_array_index)
    }

    /// `true` if `type_array_index` is `base` or derives from it.
    #[must_use]
    pub fn is_subclass_of(&self, type_array_index: usize, base: usize) -> bool {
        let mut current = Some(type_array_index);
        let mut steps = 0;
        while let Some(candidate) = current {
            if candidate == base {
                return true;
            }
            steps += 1;
            if steps > self.count() {
                return false;
            }
            current = self.base_type(candidate);
        }
        false
    }

    /// Fields declared by the type itself, instance and static.
    #[must_use]
    pub fn declared_fields(&self, type_array_index: usize) -> &[i32] {
        self.columns
            .field_indices
            .get(type_array_index)
            .map_or(&[], Vec::as_slice)
    }

    /// Instance fields of the type and all its ancestors, base type fields first.
    #[must_use]
    pub fn instance_fields(&self, type_array_index: usize) -> &[usize] {
        self.instance_fields
            .get(type_array_index)
            .map_or(&[], Vec::as_slice)
    }

    /// Static fields declared by the type itself.
    #[must_use]
    pub fn owned_static_fields(&self, type_array_index: usize) -> &[usize] {
        self.owned_static_fields
            .get(type_array_index)
            .map_or(&[], Vec::as_slice)
    }

    /// Captured static storage of the type.
    #[must_use]
    pub fn static_field_bytes(&self, type_array_index: usize) -> &[u8] {
        self.columns
            .static_field_bytes
            .get(type_array_index)
            .map_or(&[], Vec::as_slice)
    }

    /// Finds the type in the base chain of `type_array_index` that owns the static `field`.
    ///
    /// # Errors
    /// Returns [`Error::InvariantViolation`] if no type in the chain declares the field, the
    /// field tables and type tables contradict each other in that case.
    pub fn owning_static_type(&self, type_array_index: usize, field: usize) -> Result<usize> {
        let mut current = Some(type_array_index);
        let mut steps = 0;
        while let Some(candidate) = current {
            if self.owned_static_fields(candidate).contains(&field) {
                return Ok(candidate);
            }
            steps += 1;
            if steps > self.count() {
                break;
            }
            current = self.base_type(candidate);
        }

        Err(invariant_error!(
            "Static field {} has no owner in the base chain of type {}",
            field,
            type_array_index
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FieldColumns;

    // Logical indices deliberately differ from the rows:
    // row 0 = Object (10), row 1 = Base (11) : Object, row 2 = Derived (12) : Base,
    // row 3 = Derived[] (13), row 4 = List`1[] with uninitialized element (14)
    fn tables() -> (TypeDescriptions, FieldDescriptions) {
        let fields = FieldColumns {
            name: vec!["baseField".into(), "s_Static".into(), "derivedField".into()],
            offset: vec![16, 0, 24],
            type_index: vec![10, 10, 10],
            is_static: vec![false, true, false],
        };
        let declared = vec![vec![], vec![0, 1], vec![2], vec![], vec![]];
        let fields = FieldDescriptions::new(fields, &declared).unwrap();

        let columns = TypeColumns {
            flags: vec![
                TypeFlags::empty(),
                TypeFlags::empty(),
                TypeFlags::empty(),
                TypeFlags::array_of_rank(1),
                TypeFlags::array_of_rank(2),
            ],
            base_or_element_type_index: vec![-1, 10, 11, 12, -1],
            size: vec![16, 24, 32, 32, 32],
            type_info_address: vec![0x100, 0x200, 0x300, 0x400, 0],
            type_index: vec![10, 11, 12, 13, 14],
            name: vec![
                "System.Object".into(),
                "Base".into(),
                "Derived".into(),
                "Derived[]".into(),
                "List`1[,]".into(),
            ],
            assembly: vec!["mscorlib".into(); 5],
            field_indices: declared,
            static_field_bytes: vec![vec![], vec![0; 8], vec![], vec![], vec![]],
        };
        (TypeDescriptions::new(columns, &fields).unwrap(), fields)
    }

    #[test]
    fn flags_and_rank() {
        let flags = TypeFlags::array_of_rank(3);
        assert!(flags.contains(TypeFlags::ARRAY));
        assert_eq!(flags.array_rank(), 3);
        assert_eq!(TypeFlags::VALUE_TYPE.array_rank(), 0);
    }

    #[test]
    fn index_spaces_are_kept_apart() {
        let (types, _) = tables();
        assert_eq!(types.array_index_of(12), Some(2));
        assert_eq!(types.array_index_of(2), None);
        assert_eq!(types.type_index(2), Some(12));
        assert_eq!(types.array_index_of_type_info(0x300), Some(2));
        assert_eq!(types.array_index_of_type_info(0), None);
        assert_eq!(types.base_type(2), Some(1));
        assert_eq!(types.element_type(3), Some(2));
        assert_eq!(types.base_type(3), None);
        assert_eq!(types.element_type(4), None);
        assert_eq!(types.flags(4).array_rank(), 2);
    }

    #[test]
    fn inherited_instance_fields() {
        let (types, _) = tables();
        assert_eq!(types.instance_fields(2), &[0, 2]);
        assert_eq!(types.instance_fields(1), &[0]);
        assert!(types.instance_fields(3).is_empty());
        assert_eq!(types.owned_static_fields(1), &[1]);
        assert!(types.owned_static_fields(2).is_empty());
    }

    #[test]
    fn static_field_owner() {
        let (types, _) = tables();
        assert_eq!(types.owning_static_type(2, 1).unwrap(), 1);
        assert!(matches!(
            types.owning_static_type(0, 1),
            Err(Error::InvariantViolation { .. })
        ));
        assert!(types.is_subclass_of(2, 0));
        assert!(!types.is_subclass_of(0, 2));
        assert_eq!(types.find_by_name("Base"), Some(1));
    }

    #[test]
    fn rejects_unknown_base() {
        let (_, fields) = tables();
        let columns = TypeColumns {
            flags: vec![TypeFlags::empty()],
            base_or_element_type_index: vec![99],
            size: vec![16],
            type_info_address: vec![0x10],
            type_index: vec![0],
            name: vec!["Orphan".into()],
            assembly: vec![String::new()],
            field_indices: vec![vec![]],
            static_field_bytes: vec![vec![]],
        };
        assert!(matches!(
            TypeDescriptions::new(columns, &fields),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_cyclic_inheritance() {
        let (_, fields) = tables();
        let columns = TypeColumns {
            flags: vec![TypeFlags::empty(); 2],
            base_or_element_type_index: vec![1, 0],
            size: vec![16, 16],
            type_info_address: vec![0x10, 0x20],
            type_index: vec![0, 1],
            name: vec!["A".into(), "B".into()],
            assembly: vec![String::new(); 2],
            field_indices: vec![vec![], vec![]],
            static_field_bytes: vec![vec![], vec![]],
        };
        assert!(matches!(
            TypeDescriptions::new(columns, &fields),
            Err(Error::Malformed { .. })
        ));
    }
}
