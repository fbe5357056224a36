//! Array header decoding.
//!
//! An array object starts with the regular object header, followed by a bounds pointer and a
//! scalar element count (see [`crate::snapshot::VirtualMachineInformation`]). Single-dimension
//! arrays, and arrays without a bounds block, carry their length in the scalar. Multi-dimension
//! arrays point to a bounds block holding one `{length, lower bound}` pair per rank, each entry
//! two pointers wide; the element count is the product of the lengths.

use crate::{memory::BytesAndOffset, CachedSnapshot};

/// Decoded header of one array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    /// Number of dimensions, at least `1`.
    pub rank: u32,
    /// Total number of elements over all dimensions.
    pub length: usize,
    /// Element type, `None` for an uninitialized generic element.
    pub element_type: Option<usize>,
    /// Bytes per element: the inline size of a value type element, a pointer otherwise.
    pub element_size: usize,
    /// `true` if the stored length was impossible and treated as zero.
    pub clamped: bool,
    /// Declared size of the array type, used when the element type is unknown.
    pub container_size: u64,
}

impl ArrayInfo {
    /// Decodes the header of the array object at `data`, whose type is `array_type`.
    ///
    /// A negative length, one whose elements would not fit into the captured bytes, or a
    /// non-zero length of a known element type occupying no bytes is clamped to zero and flagged
    /// instead of being trusted.
    #[must_use]
    pub fn read(snapshot: &CachedSnapshot, data: BytesAndOffset<'_>, array_type: usize) -> Self {
        let vm = snapshot.vm();
        let types = snapshot.types();

        let rank = types.flags(array_type).array_rank().max(1);
        let element_type = types.element_type(array_type);
        let element_size = match element_type {
            Some(element) if types.is_value_type(element) => {
                usize::try_from(types.size(element))
                    .unwrap_or(0)
                    .saturating_sub(vm.header_size())
            }
            Some(_) => vm.pointer_width(),
            None => 0,
        };

        let available = data.add(vm.array_header_size as usize).remaining();
        let (length, clamped) = match Self::read_length(snapshot, data, rank)
            .and_then(|length| usize::try_from(length).ok())
        {
            // a zero-sized element stride cannot bound the count against the captured bytes
            Some(length) if length > 0 && element_size == 0 && element_type.is_some() => (0, true),
            Some(length)
                if length
                    .checked_mul(element_size)
                    .is_some_and(|bytes| bytes <= available) =>
            {
                (length, false)
            }
            _ => (0, true),
        };

        Self {
            rank,
            length,
            element_type,
            element_size,
            clamped,
            container_size: types.size(array_type),
        }
    }

    fn read_length(snapshot: &CachedSnapshot, data: BytesAndOffset<'_>, rank: u32) -> Option<i64> {
        let vm = snapshot.vm();
        let bounds = data
            .add(vm.array_bounds_offset_in_header as usize)
            .read_pointer()
            .ok()?;

        if rank == 1 || bounds == 0 {
            return data
                .add(vm.array_size_offset_in_header as usize)
                .read_i32()
                .ok()
                .map(i64::from);
        }

        let bounds = snapshot.sections().find(bounds)?;
        let stride = vm.pointer_width() * 2;
        let mut total = 1i64;
        for dimension in 0..rank as usize {
            let length = bounds.add(dimension * stride).read_i32().ok()?;
            total = total.checked_mul(i64::from(length))?;
            if total < 0 {
                return Some(-1);
            }
        }
        Some(total)
    }

    /// Offset of element `index` from the start of the array object.
    #[must_use]
    pub fn element_offset(&self, snapshot: &CachedSnapshot, index: usize) -> usize {
        snapshot.vm().array_header_size as usize + index * self.element_size
    }

    /// Size of the array object in the heap.
    ///
    /// Falls back to the declared size of the array type if the element type is unknown.
    #[must_use]
    pub fn object_size(&self, snapshot: &CachedSnapshot) -> u64 {
        if self.element_type.is_none() {
            return self.container_size;
        }
        u64::from(snapshot.vm().array_header_size) + (self.length * self.element_size) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::SnapshotBuilder;

    #[test]
    fn single_dimension_reference_array() {
        let mut builder = SnapshotBuilder::mono_64();
        let object = builder.class("System.Object", None, 16);
        let array = builder.array("System.Object[]", Some(object), 1);
        let target = builder.object(object, 16);
        let address = builder.array_object(array, &[target, 0, target]);
        let snapshot = builder.build();

        let data = snapshot.sections().find(address).unwrap();
        let info = ArrayInfo::read(&snapshot, data, array);
        assert_eq!(info.rank, 1);
        assert_eq!(info.length, 3);
        assert_eq!(info.element_size, 8);
        assert!(!info.clamped);
        assert_eq!(info.object_size(&snapshot), 32 + 24);
        assert_eq!(info.element_offset(&snapshot, 2), 48);
    }

    #[test]
    fn multi_dimension_reads_bounds_block() {
        let mut builder = SnapshotBuilder::mono_64();
        let int = builder.value_type("System.Int32", 20);
        let array = builder.array("System.Int32[,]", Some(int), 2);
        let address = builder.multi_array_object(array, &[2, 3], 4);
        let snapshot = builder.build();

        let data = snapshot.sections().find(address).unwrap();
        let info = ArrayInfo::read(&snapshot, data, array);
        assert_eq!(info.rank, 2);
        assert_eq!(info.length, 6);
        assert_eq!(info.element_size, 4);
        assert_eq!(info.object_size(&snapshot), 32 + 24);
    }

    #[test]
    fn impossible_length_is_clamped() {
        let mut builder = SnapshotBuilder::mono_64();
        let object = builder.class("System.Object", None, 16);
        let array = builder.array("System.Object[]", Some(object), 1);
        let address = builder.array_object_with_length(array, 1_000_000, &[]);
        let snapshot = builder.build();

        let data = snapshot.sections().find(address).unwrap();
        let info = ArrayInfo::read(&snapshot, data, array);
        assert_eq!(info.length, 0);
        assert!(info.clamped);
    }

    #[test]
    fn zero_sized_elements_are_clamped() {
        let mut builder = SnapshotBuilder::mono_64();
        let empty = builder.value_type("Empty", 16);
        let array = builder.array("Empty[]", Some(empty), 1);
        let address = builder.array_object_with_length(array, i32::MAX, &[]);
        let snapshot = builder.build();

        let data = snapshot.sections().find(address).unwrap();
        let info = ArrayInfo::read(&snapshot, data, array);
        assert_eq!(info.element_size, 0);
        assert_eq!(info.length, 0);
        assert!(info.clamped);
        assert_eq!(info.object_size(&snapshot), 32);
    }

    #[test]
    fn empty_array_of_zero_sized_elements_is_trusted() {
        let mut builder = SnapshotBuilder::mono_64();
        let empty = builder.value_type("Empty", 16);
        let array = builder.array("Empty[]", Some(empty), 1);
        let address = builder.array_object(array, &[]);
        let snapshot = builder.build();

        let data = snapshot.sections().find(address).unwrap();
        let info = ArrayInfo::read(&snapshot, data, array);
        assert_eq!(info.length, 0);
        assert!(!info.clamped);
    }

    #[test]
    fn unknown_element_type_uses_container_size() {
        let mut builder = SnapshotBuilder::mono_64();
        let array = builder.array("List`1[]", None, 1);
        let address = builder.array_object(array, &[0, 0]);
        let snapshot = builder.build();

        let data = snapshot.sections().find(address).unwrap();
        let info = ArrayInfo::read(&snapshot, data, array);
        assert_eq!(info.element_type, None);
        assert_eq!(info.object_size(&snapshot), snapshot.types().size(array));
    }
}
