// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # memscope
//!
//! Reconstructs the managed object graph of a captured Unity process from a memory snapshot.
//! `memscope` walks the raw heap bytes starting from GC handles and static fields, decodes
//! object headers, arrays and strings, links managed wrappers to the native engine objects
//! they represent, and exposes the result through a typed, read-only query surface.
//!
//! ## Features
//!
//! - **🔍 Heap crawling** - Iterative reachability walk over GC handles and static field data
//! - **🧭 Address resolution** - Binary search over sorted memory sections
//! - **🔗 Native cross-references** - Managed wrappers matched to native objects by cached pointer
//! - **🧩 Unified object index** - One index space over managed and native objects
//! - **🛡️ Robust against corruption** - Bad pointers and headers are counted, never fatal
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memscope::prelude::*;
//!
//! # fn run(data: SnapshotData) -> memscope::Result<()> {
//! let snapshot = CachedSnapshot::load(data, CrawlerConfig::default(), NoProgress)?;
//!
//! let managed = snapshot.managed();
//! println!("{} managed objects", managed.object_count());
//! println!("{} bytes abandoned", managed.totals().abandoned);
//!
//! for index in 0..snapshot.gc_handles().count() {
//!     let object = ObjectData::from_unified_index(&snapshot, index)?;
//!     println!("{} = {}", object.type_name(&snapshot), object.value_as_string(&snapshot));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`snapshot`] - Column tables of the capture and the loaded [`CachedSnapshot`]
//! - [`memory`] - Memory sections and the bounds-checked byte cursor
//! - [`crawler`] - The heap crawler and native cross-reference resolution
//! - [`graph`] - Unified index and connection maps
//! - [`object`] - The [`object::ObjectData`] handle used to navigate values
//! - [`utils`] - Little-endian reads and a compact bit set

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use memscope::prelude::*;
///
/// # fn run(data: SnapshotData) -> memscope::Result<()> {
/// let snapshot = CachedSnapshot::load(data, CrawlerConfig::minimal(), NoProgress)?;
/// println!("{:?}", snapshot.managed().diagnostics());
/// # Ok(())
/// # }
/// ```
pub mod prelude;

/// Crawler configuration and presets.
pub mod config;

/// The heap crawler.
///
/// Seeds a work stack with every GC handle target and the static field data of every type, then
/// pops entries until the stack is empty. Each popped pointer is resolved against the memory
/// sections, its header decoded, and its reference-typed fields and array elements pushed in
/// turn. After the walk, managed wrappers of native engine objects are linked to their native
/// counterparts and per-object sizes are aggregated.
///
/// # Key Types
///
/// - [`crawler::ManagedData`] - Result of the crawl: objects, connections, diagnostics
/// - [`crawler::ManagedObjectInfo`] - One crawled object
/// - [`crawler::CrawlProgress`] - Phase callback observed during loading
pub mod crawler;

/// Query structures over the crawled object graph.
pub mod graph;

/// Memory sections of the captured process and typed reads over them.
///
/// # Example
///
/// ```rust
/// use memscope::memory::{ManagedMemorySections, MemorySection, MemorySectionType};
///
/// let sections = ManagedMemorySections::new(
///     vec![MemorySection::new(0x1000, vec![0; 0x100], MemorySectionType::GarbageCollector)],
///     8,
/// );
/// let data = sections.find(0x1010).unwrap();
/// assert_eq!(data.offset(), 0x10);
/// assert!(sections.find(0x2000).is_none());
/// ```
pub mod memory;

/// The [`object::ObjectData`] navigation handle.
pub mod object;

/// Snapshot tables and the loaded, queryable snapshot.
pub mod snapshot;

/// Utility functions and shared types.
pub mod utils;

/// `memscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `memscope` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use memscope::{CachedSnapshot, CrawlerConfig, Error, NoProgress};
/// # fn run(data: memscope::snapshot::SnapshotData) {
/// match CachedSnapshot::load(data, CrawlerConfig::default(), NoProgress) {
///     Ok(snapshot) => println!("{} objects", snapshot.managed().object_count()),
///     Err(Error::InvalidPointerWidth(width)) => println!("Unsupported pointer width {width}"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {message}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// # }
/// ```
pub use error::Error;

/// The loaded snapshot, main entry point for all queries.
pub use snapshot::CachedSnapshot;

/// Crawler configuration.
pub use config::CrawlerConfig;

/// Loading phases and progress reporting.
pub use crawler::{CrawlPhase, CrawlProgress, NoProgress};

/// Object navigation handle.
pub use object::ObjectData;
