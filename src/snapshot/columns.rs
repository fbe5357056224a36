//! Helpers for the columnar entity tables handed over by the snapshot reader.
//!
//! Every entity of a snapshot arrives as a set of equal-length columns. Variable-length data
//! (names, field index lists, static field bytes) is stored flattened with a separate offset
//! table; [`split_by_offsets`] restores one entry per row.

use crate::{Error, Result};

/// Checks that a column has the length of the table it belongs to.
///
/// # Errors
/// Returns [`Error::ColumnLengthMismatch`] if the lengths differ.
pub(crate) fn ensure_column_len<T>(
    table: &'static str,
    column: &'static str,
    values: &[T],
    expected: usize,
) -> Result<()> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(Error::ColumnLengthMismatch {
            table,
            column,
            expected,
            actual: values.len(),
        })
    }
}

/// Splits a flattened variable-length column into one vector per entry.
///
/// `offsets[i]` is the start of entry `i` inside `blob`; entry `i` ends where entry `i + 1`
/// starts, the last entry ends at the end of `blob`.
///
/// # Errors
/// Returns [`Error::Malformed`] if the offsets are not ascending or point past `blob`.
///
/// # Examples
///
/// ```rust
/// use memscope::snapshot::split_by_offsets;
///
/// let names = split_by_offsets(b"ab_cde", &[0, 2, 3])?;
/// assert_eq!(names, vec![b"ab".to_vec(), b"_".to_vec(), b"cde".to_vec()]);
/// # Ok::<(), memscope::Error>(())
/// ```
pub fn split_by_offsets<T: Clone>(blob: &[T], offsets: &[u64]) -> Result<Vec<Vec<T>>> {
    let mut entries = Vec::with_capacity(offsets.len());

    for (index, &start) in offsets.iter().enumerate() {
        let end = offsets.get(index + 1).copied().unwrap_or(blob.len() as u64);
        let (Ok(start), Ok(end)) = (usize::try_from(start), usize::try_from(end)) else {
            return Err(malformed_error!("Offset of entry {} does not fit", index));
        };

        if start > end || end > blob.len() {
            return Err(malformed_error!(
                "Invalid offsets for entry {} - {}..{} of {}",
                index,
                start,
                end,
                blob.len()
            ));
        }

        entries.push(blob[start..end].to_vec());
    }

    Ok(entries)
}
