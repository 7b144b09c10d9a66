//! Archive-backed [`Backend`] implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::node::{Dataset, FixedDataset, GroupNode, Node, VlenDataset};
use super::reader::IStreams;
use super::selection::Selection;
use super::writer::write_archive;
use super::{Backend, DatasetInfo, DatasetSpec, GroupId};
use crate::util::{path, DataBuffer, ElementType, Error, Result, Shape};

/// Group tree held in memory and written back to one archive file on flush.
pub struct ArchiveStore {
    path: PathBuf,
    root: GroupNode,
    /// Open handles and the group path each one names.
    handles: HashMap<GroupId, Vec<String>>,
    next_handle: u32,
    dirty: bool,
}

/// Resolve a handle to its group. Kept free of `self` so the tree and the
/// handle map can be borrowed independently.
fn lookup<'a>(handles: &HashMap<GroupId, Vec<String>>, root: &'a GroupNode, id: GroupId) -> Result<&'a GroupNode> {
    if id == GroupId::ROOT {
        return Ok(root);
    }
    let p = handles
        .get(&id)
        .ok_or_else(|| Error::store(format!("invalid group handle {}", id)))?;
    root.resolve(p)
        .ok_or_else(|| Error::store(format!("group handle {} refers to a deleted group", id)))
}

fn lookup_mut<'a>(
    handles: &HashMap<GroupId, Vec<String>>,
    root: &'a mut GroupNode,
    id: GroupId,
) -> Result<&'a mut GroupNode> {
    if id == GroupId::ROOT {
        return Ok(root);
    }
    let p = handles
        .get(&id)
        .ok_or_else(|| Error::store(format!("invalid group handle {}", id)))?;
    root.resolve_mut(p)
        .ok_or_else(|| Error::store(format!("group handle {} refers to a deleted group", id)))
}

impl ArchiveStore {
    fn from_tree(path: &Path, root: GroupNode) -> Self {
        Self {
            path: path.to_path_buf(),
            root,
            handles: HashMap::new(),
            next_handle: 1,
            dirty: false,
        }
    }

    /// Whole group tree.
    pub fn tree(&self) -> &GroupNode {
        &self.root
    }

    fn group(&self, id: GroupId) -> Result<&GroupNode> {
        lookup(&self.handles, &self.root, id)
    }

    fn group_mut(&mut self, id: GroupId) -> Result<&mut GroupNode> {
        lookup_mut(&self.handles, &mut self.root, id)
    }

    fn dataset(&self, group: GroupId, name: &str) -> Result<&Dataset> {
        match self.group(group)?.children.get(name) {
            Some(Node::Data(d)) => Ok(d),
            Some(Node::Group(_)) => Err(Error::store(format!("{} is a group, not a dataset", name))),
            None => Err(Error::not_found(format!("dataset {}", name))),
        }
    }

    fn dataset_mut(&mut self, group: GroupId, name: &str) -> Result<&mut Dataset> {
        self.dirty = true;
        match self.group_mut(group)?.children.get_mut(name) {
            Some(Node::Data(d)) => Ok(d),
            Some(Node::Group(_)) => Err(Error::store(format!("{} is a group, not a dataset", name))),
            None => Err(Error::not_found(format!("dataset {}", name))),
        }
    }

    fn fixed(&self, group: GroupId, name: &str) -> Result<&FixedDataset> {
        match self.dataset(group, name)? {
            Dataset::Fixed(d) => Ok(d),
            Dataset::Vlen(_) => Err(Error::store(format!("{} is a variable-length dataset", name))),
        }
    }

    fn fixed_mut(&mut self, group: GroupId, name: &str) -> Result<&mut FixedDataset> {
        match self.dataset_mut(group, name)? {
            Dataset::Fixed(d) => Ok(d),
            Dataset::Vlen(_) => Err(Error::store(format!("{} is a variable-length dataset", name))),
        }
    }

    fn vlen(&self, group: GroupId, name: &str) -> Result<&VlenDataset> {
        match self.dataset(group, name)? {
            Dataset::Vlen(d) => Ok(d),
            Dataset::Fixed(_) => Err(Error::store(format!("{} is not a variable-length dataset", name))),
        }
    }

    fn vlen_mut(&mut self, group: GroupId, name: &str) -> Result<&mut VlenDataset> {
        match self.dataset_mut(group, name)? {
            Dataset::Vlen(d) => Ok(d),
            Dataset::Fixed(_) => Err(Error::store(format!("{} is not a variable-length dataset", name))),
        }
    }

    fn insert_new(&mut self, group: GroupId, name: &str, dataset: Dataset) -> Result<()> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidPath(format!("dataset name {:?}", name)));
        }
        let g = self.group_mut(group)?;
        if g.children.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        g.children.insert(name.to_string(), Node::Data(dataset));
        self.dirty = true;
        Ok(())
    }
}

impl Backend for ArchiveStore {
    fn create_new(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(Error::AlreadyExists(path.display().to_string()));
        }
        let root = GroupNode::default();
        write_archive(path, &root)?;
        debug!(path = %path.display(), "created archive");
        Ok(Self::from_tree(path, root))
    }

    fn open(path: &Path) -> Result<Self> {
        let root = IStreams::open(path)?.load_tree()?;
        debug!(path = %path.display(), links = root.children.len(), "opened archive");
        Ok(Self::from_tree(path, root))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&mut self) -> Result<()> {
        if self.dirty {
            write_archive(&self.path, &self.root)?;
            self.dirty = false;
            debug!(path = %self.path.display(), "flushed archive");
        }
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        if !self.handles.is_empty() {
            warn!(path = %self.path.display(), open = self.handles.len(), "closing archive with open group handles");
        }
        self.flush()
    }

    fn open_group(&mut self, parent: GroupId, group_path: &str, create: bool, clear: bool) -> Result<GroupId> {
        let mut full = match parent {
            GroupId::ROOT => Vec::new(),
            id => self
                .handles
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::store(format!("invalid group handle {}", id)))?,
        };

        let segs: Vec<&str> = path::segments(group_path).collect();
        let mut changed = false;
        let mut node = lookup_mut(&self.handles, &mut self.root, parent)?;
        for (i, seg) in segs.iter().enumerate() {
            let last = i + 1 == segs.len();
            let exists = match node.children.get(*seg) {
                Some(Node::Group(_)) => true,
                Some(Node::Data(_)) => {
                    return Err(Error::store(format!("{} is a dataset, not a group", seg)));
                }
                None => false,
            };
            if (!exists && create) || (exists && last && clear) {
                node.children.insert(seg.to_string(), Node::Group(GroupNode::default()));
                changed = true;
            } else if !exists {
                return Err(Error::not_found(format!("group {}", group_path)));
            }
            node = match node.children.get_mut(*seg) {
                Some(Node::Group(g)) => g,
                _ => return Err(Error::store(format!("group {} vanished", seg))),
            };
            full.push(seg.to_string());
        }

        self.dirty |= changed;
        let id = GroupId(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(id, full);
        Ok(id)
    }

    fn close_group(&mut self, group: GroupId) -> Result<()> {
        if group == GroupId::ROOT {
            return Err(Error::store("the root group cannot be closed"));
        }
        self.handles
            .remove(&group)
            .map(|_| ())
            .ok_or_else(|| Error::store(format!("group handle {} is not open", group)))
    }

    fn open_group_count(&self) -> usize {
        self.handles.len()
    }

    fn link_exists(&self, group: GroupId, name: &str) -> Result<bool> {
        Ok(self.group(group)?.children.contains_key(name))
    }

    fn delete_link(&mut self, group: GroupId, name: &str) -> Result<()> {
        match self.group_mut(group)?.children.remove(name) {
            Some(_) => {
                self.dirty = true;
                Ok(())
            }
            None => Err(Error::not_found(format!("link {}", name))),
        }
    }

    fn num_links(&self, group: GroupId) -> Result<usize> {
        Ok(self.group(group)?.children.len())
    }

    fn create_dataset(&mut self, group: GroupId, name: &str, spec: &DatasetSpec) -> Result<()> {
        if let Some(chunk) = &spec.chunk {
            if chunk.rank() != spec.shape.rank() {
                return Err(Error::ShapeMismatch {
                    name: name.to_string(),
                    expected: format!("chunk of rank {}", spec.shape.rank()),
                    actual: chunk.to_string(),
                });
            }
        }
        if spec.extensible && spec.shape.rank() == 0 {
            return Err(Error::store(format!("scalar dataset {} cannot be extensible", name)));
        }
        let data = DataBuffer::filled(spec.etype, spec.shape.num_points());
        let dataset = Dataset::Fixed(FixedDataset {
            shape: spec.shape.clone(),
            chunk: spec.chunk.clone(),
            extensible: spec.extensible,
            data,
        });
        self.insert_new(group, name, dataset)
    }

    fn dataset_info(&self, group: GroupId, name: &str) -> Result<DatasetInfo> {
        Ok(match self.dataset(group, name)? {
            Dataset::Fixed(d) => DatasetInfo {
                etype: d.data.element_type(),
                shape: d.shape.clone(),
                chunk: d.chunk.clone(),
                extensible: d.extensible,
                vlen: false,
            },
            Dataset::Vlen(d) => DatasetInfo {
                etype: d.etype,
                shape: Shape::d1(d.entries.len()),
                chunk: Some(Shape::d1(1)),
                extensible: true,
                vlen: true,
            },
        })
    }

    fn set_extent(&mut self, group: GroupId, name: &str, shape: &Shape) -> Result<()> {
        let ds = self.fixed_mut(group, name)?;
        if shape == &ds.shape {
            return Ok(());
        }
        let rank = ds.shape.rank();
        let leading_same = shape.rank() == rank && shape.leading() == ds.shape.leading();
        if !ds.extensible || !leading_same {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                expected: format!("{} with only the trailing dimension changed", ds.shape),
                actual: shape.to_string(),
            });
        }

        // Keep the elements whose coordinates exist in both extents.
        let keep = ds.shape.last().unwrap_or(0).min(shape.last().unwrap_or(0));
        let common = Selection::trailing(&ds.shape, 0, keep);
        let old_offsets = common.offsets(&ds.shape)?;
        let new_offsets = Selection::trailing(shape, 0, keep).offsets(shape)?;
        let kept = ds
            .data
            .gather(&old_offsets)
            .ok_or_else(|| Error::store(format!("corrupt dataset {}", name)))?;
        let mut data = DataBuffer::filled(ds.data.element_type(), shape.num_points());
        if !data.scatter(&new_offsets, &kept) {
            return Err(Error::store(format!("relayout of {} failed", name)));
        }
        ds.data = data;
        ds.shape = shape.clone();
        Ok(())
    }

    fn write(&mut self, group: GroupId, name: &str, sel: &Selection, data: &DataBuffer) -> Result<()> {
        let ds = self.fixed_mut(group, name)?;
        let stored = ds.data.element_type();
        if data.element_type() != stored {
            return Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: stored.to_string(),
                actual: data.element_type().to_string(),
            });
        }
        let offsets = sel.offsets(&ds.shape)?;
        if offsets.len() != data.len() {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                expected: format!("{} elements", offsets.len()),
                actual: format!("{} elements", data.len()),
            });
        }
        if !ds.data.scatter(&offsets, data) {
            return Err(Error::store(format!("write to {} failed", name)));
        }
        Ok(())
    }

    fn read(&self, group: GroupId, name: &str, sel: &Selection) -> Result<DataBuffer> {
        let ds = self.fixed(group, name)?;
        let offsets = sel.offsets(&ds.shape)?;
        ds.data
            .gather(&offsets)
            .ok_or_else(|| Error::store(format!("corrupt dataset {}", name)))
    }

    fn create_vlen_dataset(&mut self, group: GroupId, name: &str, etype: ElementType) -> Result<()> {
        self.insert_new(group, name, Dataset::Vlen(VlenDataset { etype, entries: Vec::new() }))
    }

    fn vlen_len(&self, group: GroupId, name: &str) -> Result<usize> {
        Ok(self.vlen(group, name)?.entries.len())
    }

    fn write_vlen(&mut self, group: GroupId, name: &str, start: usize, entries: &[DataBuffer]) -> Result<()> {
        let ds = self.vlen_mut(group, name)?;
        if start > ds.entries.len() {
            return Err(Error::store(format!(
                "write at entry {} of {} leaves a gap (length {})",
                start,
                name,
                ds.entries.len()
            )));
        }
        if let Some(bad) = entries.iter().find(|e| e.element_type() != ds.etype) {
            return Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: ds.etype.to_string(),
                actual: bad.element_type().to_string(),
            });
        }
        for (i, entry) in entries.iter().enumerate() {
            match ds.entries.get_mut(start + i) {
                Some(slot) => *slot = entry.clone(),
                None => ds.entries.push(entry.clone()),
            }
        }
        Ok(())
    }

    fn read_vlen(&self, group: GroupId, name: &str, index: usize) -> Result<DataBuffer> {
        let ds = self.vlen(group, name)?;
        ds.entries.get(index).cloned().ok_or(Error::OutOfRange {
            name: name.to_string(),
            start: index,
            end: index + 1,
            extent: ds.entries.len(),
        })
    }
}
