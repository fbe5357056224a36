//! Access to the captured memory of the profiled process.
//!
//! - [`ManagedMemorySections`] resolves heap addresses to the section that holds them
//! - [`BytesAndOffset`] is the bounds-checked cursor every typed read goes through

mod bytes;
mod sections;

pub use bytes::{BytesAndOffset, ManagedString, StringLayout, TRUNCATION_MARKER};
pub use sections::{ManagedMemorySections, MemorySection, MemorySectionType};
