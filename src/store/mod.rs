//! Backing store layer.
//!
//! The engine reaches the hierarchical array store only through the
//! [`Backend`] trait: named groups, typed extensible datasets addressed by
//! hyperslab, and variable-length datasets. [`ArchiveStore`] is the bundled
//! implementation, an in-memory tree persisted to a single archive file.
//!
//! ## Archive file structure
//!
//! ```text
//! +------------------+
//! | Magic: "IDSAR"   |  5 bytes
//! +------------------+
//! | Frozen flag      |  1 byte (0x00 or 0xFF)
//! +------------------+
//! | Version          |  2 bytes (u16 LE)
//! +------------------+
//! | Root Group Pos   |  8 bytes (u64 LE)
//! +------------------+
//! | ... Nodes ...    |  children before parents
//! +------------------+
//! ```

mod archive;
mod compression;
pub mod format;
mod node;
mod reader;
mod selection;
mod writer;

pub use archive::ArchiveStore;
pub use node::{Dataset, FixedDataset, GroupNode, Node, VlenDataset};
pub use reader::IStreams;
pub use selection::Selection;
pub use writer::write_archive;

use std::fmt;
use std::path::Path;

use crate::util::{DataBuffer, ElementType, Result, Shape};

/// Handle to an open group. The root group is always open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

impl GroupId {
    pub const ROOT: GroupId = GroupId(0);
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Open `path` below `parent`, run `f` on it and close the handle again.
///
/// The handle is closed even when `f` fails; `f`'s error wins.
pub fn with_group<B: Backend, T>(
    store: &mut B,
    parent: GroupId,
    path: &str,
    create: bool,
    f: impl FnOnce(&mut B, GroupId) -> Result<T>,
) -> Result<T> {
    let group = store.open_group(parent, path, create, false)?;
    let out = f(store, group);
    let closed = store.close_group(group);
    let value = out?;
    closed?;
    Ok(value)
}

/// Creation parameters of a fixed-layout dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetSpec {
    pub etype: ElementType,
    pub shape: Shape,
    pub chunk: Option<Shape>,
    /// Trailing dimension may grow without bound.
    pub extensible: bool,
}

impl DatasetSpec {
    /// Fixed, non-extensible dataset.
    pub fn fixed(etype: ElementType, shape: Shape) -> Self {
        Self { etype, shape, chunk: None, extensible: false }
    }

    /// Dataset whose trailing dimension is unlimited.
    pub fn extensible(etype: ElementType, shape: Shape, chunk: Shape) -> Self {
        Self { etype, shape, chunk: Some(chunk), extensible: true }
    }
}

/// Stored properties of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetInfo {
    pub etype: ElementType,
    /// Current extent; `[entries]` for variable-length datasets.
    pub shape: Shape,
    pub chunk: Option<Shape>,
    pub extensible: bool,
    pub vlen: bool,
}

/// Operations the engine needs from a hierarchical array store.
///
/// Group names passed to [`Backend::open_group`] may be multi-segment
/// paths; dataset and link names are single segments.
pub trait Backend: Sized {
    /// Create a new empty store file. Fails if the file exists.
    fn create_new(path: &Path) -> Result<Self>;

    /// Open an existing store file for read/write.
    fn open(path: &Path) -> Result<Self>;

    /// Path of the backing file.
    fn path(&self) -> &Path;

    /// Persist pending changes.
    fn flush(&mut self) -> Result<()>;

    /// Flush and release the store.
    fn close(self) -> Result<()>;

    fn root(&self) -> GroupId {
        GroupId::ROOT
    }

    /// Open the group at `path` below `parent`, creating missing groups when
    /// `create` is set. With `clear`, the final group is deleted and
    /// recreated empty.
    fn open_group(&mut self, parent: GroupId, path: &str, create: bool, clear: bool) -> Result<GroupId>;

    /// Release a group handle. Unknown or already-closed handles are errors.
    fn close_group(&mut self, group: GroupId) -> Result<()>;

    /// Number of group handles currently open, the root excluded.
    fn open_group_count(&self) -> usize;

    fn link_exists(&self, group: GroupId, name: &str) -> Result<bool>;

    /// Remove a link. Missing links are `NotFound`.
    fn delete_link(&mut self, group: GroupId, name: &str) -> Result<()>;

    /// Number of links (groups and datasets) directly inside a group.
    fn num_links(&self, group: GroupId) -> Result<usize>;

    fn create_dataset(&mut self, group: GroupId, name: &str, spec: &DatasetSpec) -> Result<()>;

    fn dataset_info(&self, group: GroupId, name: &str) -> Result<DatasetInfo>;

    /// Change the extent of a fixed dataset. Only the trailing dimension of
    /// an extensible dataset may change.
    fn set_extent(&mut self, group: GroupId, name: &str, shape: &Shape) -> Result<()>;

    fn write(&mut self, group: GroupId, name: &str, sel: &Selection, data: &DataBuffer) -> Result<()>;

    fn read(&self, group: GroupId, name: &str, sel: &Selection) -> Result<DataBuffer>;

    /// Create an empty one-dimensional variable-length dataset.
    fn create_vlen_dataset(&mut self, group: GroupId, name: &str, etype: ElementType) -> Result<()>;

    /// Number of entries in a variable-length dataset.
    fn vlen_len(&self, group: GroupId, name: &str) -> Result<usize>;

    /// Write entries starting at `start`, extending the dataset as needed.
    /// `start` may not exceed the current length.
    fn write_vlen(&mut self, group: GroupId, name: &str, start: usize, entries: &[DataBuffer]) -> Result<()>;

    fn read_vlen(&self, group: GroupId, name: &str, index: usize) -> Result<DataBuffer>;
}
