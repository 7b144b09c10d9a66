//! Utility types shared by every layer:
//! - [`ElementType`] / [`DataBuffer`] - closed set of element types and typed buffers
//! - [`Shape`] - dataset extents
//! - [`Error`] / [`Result`] - error handling
//! - [`path`] - group path helpers

mod data_type;
mod dimensions;
mod error;
pub mod path;

pub use data_type::*;
pub use dimensions::*;
pub use error::*;
