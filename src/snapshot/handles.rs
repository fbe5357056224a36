//! GC handles, capture-side connections and root references.

use std::collections::HashMap;

use crate::{
    snapshot::{
        columns::ensure_column_len, ConnectionColumns, GcHandleColumns, RootReferenceColumns,
    },
    Result,
};

/// GC handle table, the seeds of the crawl.
#[derive(Debug, Clone, Default)]
pub struct GcHandles {
    target: Vec<u64>,
}

impl GcHandles {
    /// Wraps the handle table.
    #[must_use]
    pub fn new(columns: GcHandleColumns) -> Self {
        Self {
            target: columns.target,
        }
    }

    /// Number of handles, free ones included.
    #[must_use]
    pub fn count(&self) -> usize {
        self.target.len()
    }

    /// Address the handle keeps alive, `0` for a free handle.
    #[must_use]
    pub fn target(&self, index: usize) -> u64 {
        self.target.get(index).copied().unwrap_or(0)
    }

    /// All handle targets in handle order.
    #[must_use]
    pub fn targets(&self) -> &[u64] {
        &self.target
    }
}

/// Connections recorded by the capture, in unified object indices.
#[derive(Debug, Clone, Default)]
pub struct RawConnections {
    from: Vec<i32>,
    to: Vec<i32>,
}

impl RawConnections {
    /// Validates the connection columns.
    ///
    /// # Errors
    /// Returns [`crate::Error::ColumnLengthMismatch`] if `from` and `to` differ in length.
    pub fn new(columns: ConnectionColumns) -> Result<Self> {
        ensure_column_len("Connections", "to", &columns.to, columns.from.len())?;
        Ok(Self {
            from: columns.from,
            to: columns.to,
        })
    }

    /// Number of connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.from.len()
    }

    /// Iterates `(from, to)` pairs, skipping negative indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.from
            .iter()
            .zip(&self.to)
            .filter_map(|(&from, &to)| {
                Some((usize::try_from(from).ok()?, usize::try_from(to).ok()?))
            })
    }
}

/// Root references of native allocations.
#[derive(Debug, Clone, Default)]
pub struct RootReferences {
    columns: RootReferenceColumns,
    index_by_id: HashMap<i64, usize>,
}

impl RootReferences {
    /// Validates the root reference columns and indexes them by id.
    ///
    /// # Errors
    /// Returns [`crate::Error::ColumnLengthMismatch`] for non index-aligned columns and
    /// [`crate::Error::Malformed`] for a duplicate id.
    pub fn new(columns: RootReferenceColumns) -> Result<Self> {
        let count = columns.id.len();
        ensure_column_len("RootReferences", "area_name", &columns.area_name, count)?;
        ensure_column_len("RootReferences", "object_name", &columns.object_name, count)?;
        ensure_column_len(
            "RootReferences",
            "accumulated_size",
            &columns.accumulated_size,
            count,
        )?;

        let mut index_by_id = HashMap::with_capacity(count);
        for (index, &id) in columns.id.iter().enumerate() {
            if index_by_id.insert(id, index).is_some() {
                return Err(malformed_error!("Duplicate root reference id - {}", id));
            }
        }

        Ok(Self {
            columns,
            index_by_id,
        })
    }

    /// Number of root references.
    #[must_use]
    pub fn count(&self) -> usize {
        self.columns.id.len()
    }

    /// Row of the root reference with `id`.
    #[must_use]
    pub fn find(&self, id: i64) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    /// Area the root belongs to.
    #[must_use]
    pub fn area_name(&self, index: usize) -> Option<&str> {
        self.columns.area_name.get(index).map(String::as_str)
    }

    /// Name of the rooted object.
    #[must_use]
    pub fn object_name(&self, index: usize) -> Option<&str> {
        self.columns.object_name.get(index).map(String::as_str)
    }

    /// Memory accounted to the root.
    #[must_use]
    pub fn accumulated_size(&self, index: usize) -> u64 {
        self.columns
            .accumulated_size
            .get(index)
            .copied()
            .unwrap_or(0)
    }
}
