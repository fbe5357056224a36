//! Object header decoding.

use crate::{crawler::ArrayInfo, memory::BytesAndOffset, CachedSnapshot};

/// The decoded header of one managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Address of the type-info structure.
    pub ptr_type_info: u64,
    /// Row of the object's type.
    pub type_index: usize,
    /// Size of the object in the heap.
    pub size: u64,
    /// The first word pointed to a cell holding the type-info address, not to the structure.
    pub indirect: bool,
    /// The string or array length was impossible and treated as zero.
    pub clamped: bool,
}

impl ObjectHeader {
    /// Decodes the header of the object at `data`.
    ///
    /// The first pointer-sized word is looked up as a type-info address. Some captures store a
    /// pointer to a relocation cell there instead, so if the lookup fails the word is resolved
    /// once more and the cell's content is tried. Returns `None` if neither yields a known type;
    /// no type is ever guessed.
    #[must_use]
    pub fn parse(snapshot: &CachedSnapshot, data: BytesAndOffset<'_>) -> Option<Self> {
        let types = snapshot.types();
        let first = data.read_pointer().ok()?;

        let (ptr_type_info, type_index, indirect) = match types.array_index_of_type_info(first) {
            Some(type_index) => (first, type_index, false),
            None => {
                let cell = snapshot.sections().find(first)?.read_pointer().ok()?;
                (cell, types.array_index_of_type_info(cell)?, true)
            }
        };

        let (size, clamped) = Self::object_size(snapshot, data, type_index);
        Some(Self {
            ptr_type_info,
            type_index,
            size,
            indirect,
            clamped,
        })
    }

    /// Size of the object at `data`: the live length for strings and arrays, the declared
    /// size for everything else.
    #[must_use]
    pub fn object_size(
        snapshot: &CachedSnapshot,
        data: BytesAndOffset<'_>,
        type_index: usize,
    ) -> (u64, bool) {
        let vm = snapshot.vm();
        if snapshot.well_known().string_type == Some(type_index) {
            let layout = data.string_layout(vm);
            return (layout.object_size(), layout.clamped);
        }

        if snapshot.types().is_array(type_index) {
            let array = ArrayInfo::read(snapshot, data, type_index);
            return (array.object_size(snapshot), array.clamped);
        }

        (snapshot.types().size(type_index), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::SnapshotBuilder;

    #[test]
    fn direct_and_indirect_type_info() {
        let mut builder = SnapshotBuilder::mono_64();
        let class = builder.class("Player", None, 40);
        let direct = builder.object(class, 40);
        let indirect = builder.object_with_indirect_header(class, 40);
        let corrupt = builder.raw_object(0xDEAD_0000, 40);
        let snapshot = builder.build();

        let header = ObjectHeader::parse(&snapshot, snapshot.sections().find(direct).unwrap())
            .unwrap();
        assert_eq!(header.type_index, class);
        assert_eq!(header.size, 40);
        assert!(!header.indirect);

        let header = ObjectHeader::parse(&snapshot, snapshot.sections().find(indirect).unwrap())
            .unwrap();
        assert_eq!(header.type_index, class);
        assert_eq!(header.ptr_type_info, snapshot.types().type_info_address(class));
        assert!(header.indirect);

        assert!(ObjectHeader::parse(&snapshot, snapshot.sections().find(corrupt).unwrap()).is_none());
    }

    #[test]
    fn string_size_follows_length() {
        let mut builder = SnapshotBuilder::mono_64();
        let string = builder.string_type();
        let address = builder.string("hello");
        let snapshot = builder.build();

        let header = ObjectHeader::parse(&snapshot, snapshot.sections().find(address).unwrap())
            .unwrap();
        assert_eq!(header.type_index, string);
        assert_eq!(header.size, 16 + 4 + 10 + 2);
        assert!(!header.clamped);
    }
}
