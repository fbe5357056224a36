//! Bounds-checked cursor over captured heap bytes.
//!
//! [`BytesAndOffset`] is the only way the crawler and the object handles read memory of the
//! profiled process. It pairs a byte buffer (a heap section or a type's static block) with an
//! offset into it and the target pointer width, and never hands out raw addresses as
//! dereferenceable pointers. Moving to a field or element is done with [`BytesAndOffset::add`],
//! which returns a new view instead of mutating the existing one.
//!
//! # Managed strings
//!
//! A managed string object consists of the object header, an `int32` character count and the
//! UTF-16 code units. Some captures place the count one pointer further into the object,
//! [`BytesAndOffset::string_layout`] tries both positions before giving up and clamping the
//! length to zero.

use widestring::U16Str;

use crate::{
    snapshot::VirtualMachineInformation,
    utils::{read_le_at, HeapIO},
    Error, Result,
};

/// Appended to strings that were cut at the configured maximum length.
pub const TRUNCATION_MARKER: &str = "...";

/// Location and length of the characters of a managed string object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringLayout {
    /// Offset of the first UTF-16 code unit, relative to the start of the object.
    pub chars_offset: usize,
    /// Number of UTF-16 code units.
    pub length: usize,
    /// `true` if neither header position yielded a plausible length and it was clamped to zero.
    pub clamped: bool,
}

impl StringLayout {
    /// Size of the string object in the heap, header, length word and terminator included.
    #[must_use]
    pub fn object_size(&self) -> u64 {
        (self.chars_offset + self.length * 2 + 2) as u64
    }
}

/// A decoded managed string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedString {
    /// The decoded text, including [`TRUNCATION_MARKER`] if it was truncated.
    pub value: String,
    /// The character count stored in the object.
    pub length: usize,
    /// `true` if the text was cut at the maximum length.
    pub truncated: bool,
    /// `true` if the stored length was impossible and treated as zero.
    pub clamped: bool,
}

/// A cursor into one byte buffer of the snapshot, aware of the target pointer width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesAndOffset<'a> {
    bytes: &'a [u8],
    offset: usize,
    pointer_size: u32,
}

impl<'a> BytesAndOffset<'a> {
    /// Creates a view at `offset` into `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8], offset: usize, pointer_size: u32) -> Self {
        Self {
            bytes,
            offset,
            pointer_size,
        }
    }

    /// The full backing buffer.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The offset of this view inside its buffer.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Pointer width of the captured process.
    #[must_use]
    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    /// Number of bytes between the offset and the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    /// Returns a new view shifted by `count` bytes.
    ///
    /// Shifting past the end of the buffer is allowed, any read on such a view fails.
    #[must_use]
    pub fn add(&self, count: usize) -> Self {
        Self {
            offset: self.offset.saturating_add(count),
            ..*self
        }
    }

    /// Reads a little-endian primitive at the offset.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if the value does not fit into the remaining bytes.
    pub fn read<T: HeapIO>(&self) -> Result<T> {
        let mut offset = self.offset;
        read_le_at(self.bytes, &mut offset)
    }

    /// Reads an `i16`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 2 bytes remain.
    pub fn read_i16(&self) -> Result<i16> {
        self.read()
    }

    /// Reads an `i32`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 4 bytes remain.
    pub fn read_i32(&self) -> Result<i32> {
        self.read()
    }

    /// Reads an `i64`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 8 bytes remain.
    pub fn read_i64(&self) -> Result<i64> {
        self.read()
    }

    /// Reads a `u16`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 2 bytes remain.
    pub fn read_u16(&self) -> Result<u16> {
        self.read()
    }

    /// Reads a `u32`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 4 bytes remain.
    pub fn read_u32(&self) -> Result<u32> {
        self.read()
    }

    /// Reads a `u64`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 8 bytes remain.
    pub fn read_u64(&self) -> Result<u64> {
        self.read()
    }

    /// Reads an `f32`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 4 bytes remain.
    pub fn read_f32(&self) -> Result<f32> {
        self.read()
    }

    /// Reads an `f64`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 8 bytes remain.
    pub fn read_f64(&self) -> Result<f64> {
        self.read()
    }

    /// Reads a one byte boolean, any non-zero value is `true`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if no byte remains.
    pub fn read_bool(&self) -> Result<bool> {
        Ok(self.read::<u8>()? != 0)
    }

    /// Reads a UTF-16 code unit. Unpaired surrogates decode to U+FFFD.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if fewer than 2 bytes remain.
    pub fn read_char(&self) -> Result<char> {
        let unit = self.read_u16()?;
        Ok(char::decode_utf16([unit])
            .next()
            .and_then(std::result::Result::ok)
            .unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    /// Reads a pointer of the target width, zero-extended to 64 bits.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPointerWidth`] if the pointer width is neither 4 nor 8, and
    /// [`Error::OutOfBounds`] if the pointer does not fit into the remaining bytes.
    pub fn read_pointer(&self) -> Result<u64> {
        match self.pointer_size {
            4 => Ok(u64::from(self.read_u32()?)),
            8 => self.read_u64(),
            other => Err(Error::InvalidPointerWidth(other)),
        }
    }

    /// Locates the character count and data of a managed string object starting at this view.
    ///
    /// The count is expected right after the object header. If that yields a negative value or
    /// more characters than the buffer holds, the legacy position one pointer further is tried.
    /// If both are implausible the length is clamped to zero and flagged.
    #[must_use]
    pub fn string_layout(&self, vm: &VirtualMachineInformation) -> StringLayout {
        let primary = vm.header_size();
        let secondary = primary + vm.pointer_width();

        for length_offset in [primary, secondary] {
            let chars_offset = length_offset + 4;
            let Ok(length) = self.add(length_offset).read_i32() else {
                continue;
            };
            let Ok(length) = usize::try_from(length) else {
                continue;
            };
            let available = self.add(chars_offset).remaining();
            if length.checked_mul(2).is_some_and(|bytes| bytes <= available) {
                return StringLayout {
                    chars_offset,
                    length,
                    clamped: false,
                };
            }
        }

        StringLayout {
            chars_offset: primary + 4,
            length: 0,
            clamped: true,
        }
    }

    /// Decodes the managed string object starting at this view.
    ///
    /// At most `max_length` characters are decoded, longer strings are cut and
    /// [`TRUNCATION_MARKER`] is appended.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if a code unit cannot be read, which cannot happen for a
    /// layout obtained from [`BytesAndOffset::string_layout`].
    pub fn read_string(
        &self,
        vm: &VirtualMachineInformation,
        max_length: Option<usize>,
    ) -> Result<ManagedString> {
        let layout = self.string_layout(vm);
        let take = max_length.map_or(layout.length, |max| layout.length.min(max));
        let truncated = take < layout.length;

        let mut units = Vec::with_capacity(take);
        let mut offset = self.offset.saturating_add(layout.chars_offset);
        for _ in 0..take {
            units.push(read_le_at::<u16>(self.bytes, &mut offset)?);
        }

        let mut value = U16Str::from_slice(&units).to_string_lossy();
        if truncated {
            value.push_str(TRUNCATION_MARKER);
        }

        Ok(ManagedString {
            value,
            length: layout.length,
            truncated,
            clamped: layout.clamped,
        })
    }
}
