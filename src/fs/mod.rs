//! File system operations module
//!
//! Local file and directory-tree copies with metadata preservation.

mod operations;

pub use operations::*;
