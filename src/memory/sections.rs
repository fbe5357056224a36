//! Address resolution over the captured memory sections.
//!
//! A snapshot carries many disjoint byte ranges: managed heap segments, thread stacks and
//! runtime-internal regions. [`ManagedMemorySections`] sorts them once by start address and
//! resolves arbitrary addresses with a binary search, returning a [`BytesAndOffset`] into the
//! section that contains the address.
//!
//! # Active heap
//!
//! The garbage collector allocates from its most recent segments, which sit at the top of the
//! address space. Scanning from the highest section downwards, the contiguous run of
//! [`MemorySectionType::GarbageCollector`] sections (gaps of at most one pointer width are
//! tolerated) is flagged as the assumed active heap. Objects outside of it live in older or
//! fragmented segments.

use std::ops::Range;

use strum::{Display, EnumIter};

use crate::memory::BytesAndOffset;

/// Origin of a captured memory section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum MemorySectionType {
    /// A segment of the garbage-collected heap.
    GarbageCollector,
    /// Runtime-internal memory (stacks, domain data, static storage).
    VirtualMachine,
}

/// One contiguous captured region of the profiled process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySection {
    /// Address of the first byte in the profiled process.
    pub start_address: u64,
    /// The captured bytes, one per address.
    pub bytes: Vec<u8>,
    /// Origin of the section.
    pub section_type: MemorySectionType,
}

impl MemorySection {
    /// Creates a section starting at `start_address`.
    #[must_use]
    pub fn new(start_address: u64, bytes: Vec<u8>, section_type: MemorySectionType) -> Self {
        Self {
            start_address,
            bytes,
            section_type,
        }
    }

    /// Number of captured bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Address one past the last captured byte.
    #[must_use]
    pub fn end_address(&self) -> u64 {
        self.start_address.saturating_add(self.size())
    }

    /// Returns `true` if `address` lies inside the section.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start_address && address < self.end_address()
    }
}

/// Sorted, immutable index over all memory sections of a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ManagedMemorySections {
    sections: Vec<MemorySection>,
    pointer_size: u32,
    active: Option<Range<usize>>,
}

impl ManagedMemorySections {
    /// Builds the index, sorting the sections by start address.
    ///
    /// The sort is stable, so sections with equal start addresses keep their input order.
    /// Overlapping sections are tolerated (live captures can produce them) but logged; lookups
    /// resolve to the section with the greatest start address not above the address.
    #[must_use]
    pub fn new(mut sections: Vec<MemorySection>, pointer_size: u32) -> Self {
        sections.sort_by_key(|section| section.start_address);

        for pair in sections.windows(2) {
            if pair[0].end_address() > pair[1].start_address {
                tracing::warn!(
                    first = pair[0].start_address,
                    second = pair[1].start_address,
                    "overlapping memory sections"
                );
            }
        }

        let active = Self::find_active_heap(&sections, pointer_size);
        Self {
            sections,
            pointer_size,
            active,
        }
    }

    fn find_active_heap(sections: &[MemorySection], pointer_size: u32) -> Option<Range<usize>> {
        let top = sections
            .iter()
            .rposition(|section| section.section_type == MemorySectionType::GarbageCollector)?;

        let mut first = top;
        while first > 0 {
            let below = &sections[first - 1];
            let current = &sections[first];
            let contiguous = below.section_type == MemorySectionType::GarbageCollector
                && below.end_address().saturating_add(u64::from(pointer_size))
                    >= current.start_address;
            if !contiguous {
                break;
            }
            first -= 1;
        }

        Some(first..top + 1)
    }

    /// Number of sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns `true` if the snapshot has no sections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The sections in ascending address order.
    #[must_use]
    pub fn sections(&self) -> &[MemorySection] {
        &self.sections
    }

    /// Index of the section containing `address`.
    #[must_use]
    pub fn section_index(&self, address: u64) -> Option<usize> {
        let candidates = self
            .sections
            .partition_point(|section| section.start_address <= address);
        if candidates == 0 {
            return None;
        }

        let index = candidates - 1;
        self.sections[index].contains(address).then_some(index)
    }

    /// Resolves `address` to a view into the section that contains it.
    ///
    /// Returns `None` for addresses outside every section; callers treat that as unresolvable,
    /// never as a zero value.
    #[must_use]
    pub fn find(&self, address: u64) -> Option<BytesAndOffset<'_>> {
        let index = self.section_index(address)?;
        let section = &self.sections[index];
        let offset = usize::try_from(address - section.start_address).ok()?;
        Some(BytesAndOffset::new(&section.bytes, offset, self.pointer_size))
    }

    /// Address range covered by the assumed active heap, if the snapshot has heap sections.
    #[must_use]
    pub fn active_heap_range(&self) -> Option<Range<u64>> {
        let active = self.active.as_ref()?;
        let first = &self.sections[active.start];
        let last = &self.sections[active.end - 1];
        Some(first.start_address..last.end_address())
    }

    /// Returns `true` if the section at `index` belongs to the assumed active heap.
    #[must_use]
    pub fn is_section_active(&self, index: usize) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.contains(&index))
    }

    /// Returns `true` if `address` lies in one of the assumed active heap sections.
    #[must_use]
    pub fn is_in_active_heap(&self, address: u64) -> bool {
        self.section_index(address)
            .is_some_and(|index| self.is_section_active(index))
    }
}
