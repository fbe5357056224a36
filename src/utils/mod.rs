//! Low-level helpers shared by the snapshot tables and the crawler.

mod bitset;
mod io;

pub use bitset::BitSet;
pub use io::{read_le, read_le_at, HeapIO};
