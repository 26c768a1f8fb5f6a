//! Data types shared by the reader, layout engine and document layer.

mod geometry;
mod options;
mod table;

pub use geometry::*;
pub use options::*;
pub use table::*;
