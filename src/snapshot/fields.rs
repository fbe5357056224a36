//! Field descriptions of the managed type system.

use crate::{
    snapshot::{columns::ensure_column_len, FieldColumns},
    Error, Result,
};

/// Validated field table.
///
/// Besides the captured columns it knows the declaring type of every field, derived from the
/// per-type field lists.
#[derive(Debug, Clone, Default)]
pub struct FieldDescriptions {
    columns: FieldColumns,
    declaring_type: Vec<Option<usize>>,
}

impl FieldDescriptions {
    /// Validates the field columns and records the declaring type of each field.
    ///
    /// `type_field_indices` is the per-type list of declared fields, indexed by type row.
    ///
    /// # Errors
    /// Returns [`Error::ColumnLengthMismatch`] for non index-aligned columns and
    /// [`Error::Malformed`] if a type lists a field that does not exist.
    pub fn new(columns: FieldColumns, type_field_indices: &[Vec<i32>]) -> Result<Self> {
        let count = columns.name.len();
        ensure_column_len("Fields", "offset", &columns.offset, count)?;
        ensure_column_len("Fields", "type_index", &columns.type_index, count)?;
        ensure_column_len("Fields", "is_static", &columns.is_static, count)?;

        let mut declaring_type = vec![None; count];
        for (type_array_index, fields) in type_field_indices.iter().enumerate() {
            for &field in fields {
                let slot = usize::try_from(field)
                    .ok()
                    .and_then(|field| declaring_type.get_mut(field))
                    .ok_or_else(|| {
                        malformed_error!(
                            "Type {} declares unknown field {}",
                            type_array_index,
                            field
                        )
                    })?;
                slot.get_or_insert(type_array_index);
            }
        }

        Ok(Self {
            columns,
            declaring_type,
        })
    }

    /// Number of fields.
    #[must_use]
    pub fn count(&self) -> usize {
        self.columns.name.len()
    }

    fn check(&self, field: usize) -> Result<()> {
        if field < self.count() {
            Ok(())
        } else {
            Err(Error::FieldNotFound(field))
        }
    }

    /// Field name.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] for an unknown field.
    pub fn name(&self, field: usize) -> Result<&str> {
        self.check(field)?;
        Ok(&self.columns.name[field])
    }

    /// Raw offset, `-1` for thread-static fields.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] for an unknown field.
    pub fn offset(&self, field: usize) -> Result<i32> {
        self.check(field)?;
        Ok(self.columns.offset[field])
    }

    /// Logical type index of the field's type.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] for an unknown field.
    pub fn type_index(&self, field: usize) -> Result<i32> {
        self.check(field)?;
        Ok(self.columns.type_index[field])
    }

    /// `true` for static fields.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] for an unknown field.
    pub fn is_static(&self, field: usize) -> Result<bool> {
        self.check(field)?;
        Ok(self.columns.is_static[field])
    }

    /// `true` for thread-static fields, which have no captured storage.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] for an unknown field.
    pub fn is_thread_static(&self, field: usize) -> Result<bool> {
        Ok(self.offset(field)? == -1)
    }

    /// Row of the type declaring the field, `None` if no type lists it.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] for an unknown field.
    pub fn declaring_type(&self, field: usize) -> Result<Option<usize>> {
        self.check(field)?;
        Ok(self.declaring_type[field])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> FieldColumns {
        FieldColumns {
            name: vec!["a".into(), "b".into(), "tls".into()],
            offset: vec![16, 0, -1],
            type_index: vec![0, 1, 1],
            is_static: vec![false, true, true],
        }
    }

    #[test]
    fn declaring_types() {
        let fields = FieldDescriptions::new(columns(), &[vec![0], vec![1, 2]]).unwrap();
        assert_eq!(fields.count(), 3);
        assert_eq!(fields.declaring_type(0).unwrap(), Some(0));
        assert_eq!(fields.declaring_type(2).unwrap(), Some(1));
        assert!(fields.is_thread_static(2).unwrap());
        assert!(!fields.is_thread_static(0).unwrap());
        assert_eq!(fields.name(1).unwrap(), "b");
        assert!(matches!(fields.offset(3), Err(Error::FieldNotFound(3))));
    }

    #[test]
    fn rejects_unknown_field() {
        let result = FieldDescriptions::new(columns(), &[vec![7]]);
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn rejects_misaligned_columns() {
        let mut columns = columns();
        columns.is_static.pop();
        let result = FieldDescriptions::new(columns, &[]);
        assert!(matches!(
            result,
            Err(Error::ColumnLengthMismatch {
                column: "is_static",
                ..
            })
        ));
    }
}
