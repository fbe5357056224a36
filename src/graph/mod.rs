//! Query structures over the crawled graph.
//!
//! - [`UnifiedIndex`] translates between the unified object index and the per-kind tables
//! - [`ConnectionMaps`] answers "who refers to this object" and "what does it refer to"

mod connections;
mod unified;

pub use connections::{ConnectionMaps, Referrer};
pub use unified::{UnifiedIndex, UnifiedObject};
