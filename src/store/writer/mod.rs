//! Archive file writer.
//!
//! The tree is written children-first so every group record can point at
//! already-written positions. The header is patched last: root position,
//! then the frozen flag.

mod stream;

pub use stream::OStream;

use std::path::Path;

use super::compression::compress;
use super::format::*;
use super::node::{Dataset, GroupNode, Node};
use crate::util::Result;

/// Serialize `root` to `path`, replacing any existing file.
pub fn write_archive(path: impl AsRef<Path>, root: &GroupNode) -> Result<()> {
    let mut out = OStream::create(path)?;
    let root_pos = write_group(&mut out, root)?;
    out.finish(root_pos)
}

fn write_group(out: &mut OStream, group: &GroupNode) -> Result<u64> {
    let mut children = Vec::with_capacity(group.children.len());
    for (name, node) in &group.children {
        let pos = match node {
            Node::Group(g) => make_group_offset(write_group(out, g)?),
            Node::Data(d) => make_data_offset(write_data(out, d)?),
        };
        children.push((name.as_str(), pos));
    }

    let pos = out.pos();
    out.write_u64(children.len() as u64)?;
    for (name, child) in children {
        out.write_u32(name.len() as u32)?;
        out.write_bytes(name.as_bytes())?;
        out.write_u64(child)?;
    }
    Ok(pos)
}

fn write_data(out: &mut OStream, dataset: &Dataset) -> Result<u64> {
    let payload = compress(&dataset.encode()?, COMPRESSION_LEVEL)?;
    let pos = out.pos();
    out.write_u64(payload.len() as u64)?;
    out.write_bytes(&payload)?;
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::node::FixedDataset;
    use crate::store::reader::IStreams;
    use crate::util::{DataBuffer, Shape};

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.hd5");

        let mut leaf = GroupNode::default();
        leaf.children.insert(
            "psi".into(),
            Node::Data(Dataset::Fixed(FixedDataset {
                shape: Shape::d1(1000),
                chunk: None,
                extensible: false,
                data: DataBuffer::Double(vec![0.5; 1000]),
            })),
        );
        let mut root = GroupNode::default();
        root.children.insert("equilibrium".into(), Node::Group(leaf));
        root.children.insert("empty".into(), Node::Group(GroupNode::default()));

        write_archive(&path, &root).unwrap();
        let streams = IStreams::open(&path).unwrap();
        assert!(streams.is_frozen());
        assert_eq!(streams.version(), CURRENT_VERSION);
        assert_eq!(streams.load_tree().unwrap(), root);
    }
}
