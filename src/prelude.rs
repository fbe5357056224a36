//! # memscope Prelude
//!
//! Convenient glob import of the types needed to load a snapshot and walk its object graph.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all memscope operations
pub use crate::Error;

/// The result type used throughout memscope
pub use crate::Result;

/// Crawler configuration
pub use crate::config::{CrawlerConfig, DEFAULT_MAX_STRING_LENGTH};

// ================================================================================================
// Loading
// ================================================================================================

/// Raw capture tables and the loaded snapshot
pub use crate::snapshot::{CachedSnapshot, SnapshotData, VirtualMachineInformation};

/// Progress reporting while loading
pub use crate::crawler::{CrawlPhase, CrawlProgress, NoProgress};

// ================================================================================================
// Crawl Results
// ================================================================================================

/// Crawled objects and their connections
pub use crate::crawler::{
    ConnectionKind, CrawlDiagnostics, ManagedConnection, ManagedData, ManagedObjectInfo,
    MemoryTotals,
};

/// Unified index and connection maps
pub use crate::graph::{ConnectionMaps, Referrer, UnifiedIndex, UnifiedObject};

// ================================================================================================
// Navigation
// ================================================================================================

/// Object handles
pub use crate::object::{ObjectData, ObjectDataKind};

/// Memory access
pub use crate::memory::{BytesAndOffset, ManagedMemorySections, MemorySection, MemorySectionType};
