//! # idstore
//!
//! Storage engine for IDS (interface data structure) trees on a hierarchical
//! group/dataset store. Fields are stored whole, as time slices along an
//! extensible trailing dimension, or per slice below array-of-structures
//! objects.
//!
//! ## Modules
//!
//! - [`util`] - Element types, buffers, shapes, errors, path helpers
//! - [`store`] - Backend trait and the archive-file store
//! - [`session`] - File session registry
//! - [`array`] - Whole-array field I/O
//! - [`slice`] - Time-sliced field I/O
//! - [`interp`] - Slice reads at an arbitrary time
//! - [`object`] - Array-of-structures objects
//! - [`engine`] - The locked public entry point
//!
//! ## Example
//!
//! ```ignore
//! use idstore::prelude::*;
//!
//! let engine: Engine = Engine::from_env();
//! let sid = engine.create("scenario", 100, 1, 0, 0, true)?;
//! let obj = engine.begin(sid, None, 0, "componentA", Timedness::NonTimed)?;
//! engine.put_field_slice(obj, "aos/x", 0, &Shape::d1(3), &DataBuffer::from(vec![1.0f32, 2.0, 3.0]))?;
//! engine.release(obj)?;
//! engine.close(SessionRef::Id(sid))?;
//! ```

pub mod util;
pub mod store;
pub mod config;
pub mod digest;
pub mod array;
pub mod slice;
pub mod interp;
pub mod handle_table;
pub mod object;
pub mod session;
pub mod engine;

// Re-export commonly used types
pub use config::Config;
pub use engine::Engine;
pub use util::{DataBuffer, ElementType, Error, Result, Shape};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::Engine;
    pub use crate::handle_table::ObjectId;
    pub use crate::interp::{InterpolatedSlice, InterpolationPolicy, SliceQuery};
    pub use crate::object::{FieldRequest, FieldSlice, Timedness};
    pub use crate::session::{SessionId, SessionRef};
    pub use crate::slice::SliceMode;
    pub use crate::store::{ArchiveStore, Backend};
    pub use crate::util::{DataBuffer, ElementType, Error, Result, Shape};
}
