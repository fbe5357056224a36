use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invariant_error {
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Only conditions that make a snapshot unusable are reported through this type. Recoverable
/// problems found while crawling (pointers that land outside every memory section, object
/// headers that cannot be decoded, impossible string or array lengths) are counted in
/// [`crate::crawler::CrawlDiagnostics`] instead and never interrupt the crawl.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::OutOfBounds`] - A read would have run past the end of a byte buffer
/// - [`Error::Malformed`] - Corrupted or inconsistent input data
/// - [`Error::ColumnLengthMismatch`] - Columns of one entity are not index-aligned
/// - [`Error::InvalidPointerWidth`] - The snapshot reports an unsupported pointer size
///
/// ## Graph Errors
/// - [`Error::InvariantViolation`] - The input tables are mutually inconsistent, the crawl aborts
/// - [`Error::TypeNotFound`] - A type index does not resolve to a type entry
/// - [`Error::FieldNotFound`] - A field index does not resolve to a field entry
/// - [`Error::InvalidUnifiedIndex`] - A unified object index is outside every sub-range
/// - [`Error::InvalidObjectKind`] - A navigation step does not apply to this handle kind
#[derive(Error, Debug)]
pub enum Error {
    /// An out of bound access was attempted while reading a byte buffer.
    ///
    /// Every heap read goes through a bounds-checked view, this is what it reports when the
    /// requested width does not fit into the remaining bytes.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The snapshot data is damaged and could not be interpreted.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The pointer width is neither 4 nor 8 bytes.
    #[error("Invalid pointer width - {0}")]
    InvalidPointerWidth(u32),

    /// Two columns of the same entity have different lengths.
    ///
    /// Columns are expected to be index-aligned, this is a fatal load error.
    #[error("Column '{column}' of table '{table}' has {actual} entries, expected {expected}")]
    ColumnLengthMismatch {
        /// Name of the entity table
        table: &'static str,
        /// Name of the offending column
        column: &'static str,
        /// Length of the first column of the table
        expected: usize,
        /// Length of the offending column
        actual: usize,
    },

    /// The input tables contradict each other.
    ///
    /// Raised for a connection without any valid origin, or a static field whose owning type
    /// cannot be found in the base type chain. No safe partial result exists in that case.
    #[error("Invariant violation - {file}:{line}: {message}")]
    InvariantViolation {
        /// The message to be printed for the violation
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Failed to find a type by its index.
    #[error("Failed to find type - {0}")]
    TypeNotFound(i32),

    /// Failed to find a field by its index.
    #[error("Failed to find field - {0}")]
    FieldNotFound(usize),

    /// The unified object index does not fall into any sub-range.
    #[error("Invalid unified object index - {0}")]
    InvalidUnifiedIndex(usize),

    /// The requested navigation is not supported by this kind of object handle.
    #[error("Operation '{operation}' is not supported for {kind} handles")]
    InvalidObjectKind {
        /// The navigation step that was attempted
        operation: &'static str,
        /// The kind of the handle it was attempted on
        kind: &'static str,
    },
}
