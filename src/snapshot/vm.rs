//! Layout description of the profiled virtual machine.

use crate::{Error, Result};

/// Width and header layout of managed objects in the captured process.
///
/// All offsets are in bytes. The object header of a managed object starts with the
/// type-info pointer; arrays extend it with a bounds pointer and a length word before the
/// first element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualMachineInformation {
    /// Width of a pointer in the captured process, 4 or 8.
    pub pointer_size: u32,
    /// Size of the header preceding the instance fields of every managed object.
    pub object_header_size: u32,
    /// Size of the header preceding the first element of an array.
    pub array_header_size: u32,
    /// Offset of the bounds pointer (multi-dimensional arrays) inside the array header.
    pub array_bounds_offset_in_header: u32,
    /// Offset of the scalar element count inside the array header.
    pub array_size_offset_in_header: u32,
    /// Allocation granularity of the garbage collector.
    pub allocation_granularity: u32,
}

impl VirtualMachineInformation {
    /// Mono layout on a 64-bit target.
    #[must_use]
    pub fn mono_64() -> Self {
        Self {
            pointer_size: 8,
            object_header_size: 16,
            array_header_size: 32,
            array_bounds_offset_in_header: 16,
            array_size_offset_in_header: 24,
            allocation_granularity: 16,
        }
    }

    /// Mono layout on a 32-bit target.
    #[must_use]
    pub fn mono_32() -> Self {
        Self {
            pointer_size: 4,
            object_header_size: 8,
            array_header_size: 16,
            array_bounds_offset_in_header: 8,
            array_size_offset_in_header: 12,
            allocation_granularity: 8,
        }
    }

    /// Checks that the layout is internally consistent.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPointerWidth`] for a pointer size other than 4 or 8, and
    /// [`Error::Malformed`] if the array header fields do not fit into the array header.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.pointer_size, 4 | 8) {
            return Err(Error::InvalidPointerWidth(self.pointer_size));
        }

        if self.object_header_size < self.pointer_size {
            return Err(malformed_error!(
                "Object header ({}) cannot hold the type-info pointer",
                self.object_header_size
            ));
        }

        let fits = |offset: u32, width: u32| {
            offset
                .checked_add(width)
                .is_some_and(|end| end <= self.array_header_size)
        };
        if !fits(self.array_bounds_offset_in_header, self.pointer_size)
            || !fits(self.array_size_offset_in_header, 4)
        {
            return Err(malformed_error!(
                "Array header of {} bytes cannot hold bounds at {} and size at {}",
                self.array_header_size,
                self.array_bounds_offset_in_header,
                self.array_size_offset_in_header
            ));
        }

        Ok(())
    }

    /// Pointer width as `usize`, for offset arithmetic.
    #[must_use]
    pub fn pointer_width(&self) -> usize {
        self.pointer_size as usize
    }

    /// Object header size as `usize`, for offset arithmetic.
    #[must_use]
    pub fn header_size(&self) -> usize {
        self.object_header_size as usize
    }
}

impl Default for VirtualMachineInformation {
    fn default() -> Self {
        Self::mono_64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(VirtualMachineInformation::mono_64().validate().is_ok());
        assert!(VirtualMachineInformation::mono_32().validate().is_ok());
        assert_eq!(
            VirtualMachineInformation::default(),
            VirtualMachineInformation::mono_64()
        );
    }

    #[test]
    fn rejects_unsupported_pointer_width() {
        let vm = VirtualMachineInformation {
            pointer_size: 2,
            ..VirtualMachineInformation::mono_64()
        };
        assert!(matches!(vm.validate(), Err(Error::InvalidPointerWidth(2))));
    }

    #[test]
    fn rejects_overlapping_array_header() {
        let vm = VirtualMachineInformation {
            array_header_size: 20,
            ..VirtualMachineInformation::mono_64()
        };
        assert!(matches!(vm.validate(), Err(Error::Malformed { .. })));
    }

    #[test]
    fn rejects_overflowing_array_offsets() {
        let vm = VirtualMachineInformation {
            array_bounds_offset_in_header: u32::MAX,
            ..VirtualMachineInformation::mono_64()
        };
        assert!(matches!(vm.validate(), Err(Error::Malformed { .. })));

        let vm = VirtualMachineInformation {
            array_size_offset_in_header: u32::MAX - 1,
            ..VirtualMachineInformation::mono_64()
        };
        assert!(matches!(vm.validate(), Err(Error::Malformed { .. })));
    }
}
