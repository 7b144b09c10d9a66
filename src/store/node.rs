//! In-memory group/dataset tree and dataset payload codec.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::format::{KIND_FIXED, KIND_VLEN};
use crate::util::{DataBuffer, ElementType, Error, Result, Shape};

/// A link inside a group.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Group(GroupNode),
    Data(Dataset),
}

impl Node {
    pub fn as_group(&self) -> Option<&GroupNode> {
        match self {
            Node::Group(g) => Some(g),
            Node::Data(_) => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut GroupNode> {
        match self {
            Node::Group(g) => Some(g),
            Node::Data(_) => None,
        }
    }
}

/// Group: named links in name order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupNode {
    pub children: BTreeMap<String, Node>,
}

impl GroupNode {
    /// Resolve a chain of group names below this group.
    pub fn resolve(&self, path: &[String]) -> Option<&GroupNode> {
        path.iter()
            .try_fold(self, |g, name| g.children.get(name).and_then(Node::as_group))
    }

    /// Mutable variant of [`GroupNode::resolve`].
    pub fn resolve_mut(&mut self, path: &[String]) -> Option<&mut GroupNode> {
        path.iter()
            .try_fold(self, |g, name| g.children.get_mut(name).and_then(Node::as_group_mut))
    }

    /// Count of groups and datasets below this group, recursively.
    pub fn count_nodes(&self) -> (usize, usize) {
        self.children.values().fold((0, 0), |(g, d), child| match child {
            Node::Group(sub) => {
                let (sg, sd) = sub.count_nodes();
                (g + 1 + sg, d + sd)
            }
            Node::Data(_) => (g, d + 1),
        })
    }
}

/// A fixed-layout dataset: one row-major buffer over `shape`.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedDataset {
    pub shape: Shape,
    pub chunk: Option<Shape>,
    /// Trailing dimension is unlimited.
    pub extensible: bool,
    pub data: DataBuffer,
}

/// A one-dimensional dataset of variable-length entries.
#[derive(Clone, Debug, PartialEq)]
pub struct VlenDataset {
    pub etype: ElementType,
    pub entries: Vec<DataBuffer>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Dataset {
    Fixed(FixedDataset),
    Vlen(VlenDataset),
}

impl Dataset {
    pub fn element_type(&self) -> ElementType {
        match self {
            Dataset::Fixed(d) => d.data.element_type(),
            Dataset::Vlen(d) => d.etype,
        }
    }

    /// Encode this dataset as a data block payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Dataset::Fixed(d) => {
                out.write_u8(KIND_FIXED)?;
                out.write_u8(d.data.element_type() as u8)?;
                write_shape(&mut out, &d.shape)?;
                out.write_u8(d.extensible as u8)?;
                match &d.chunk {
                    Some(chunk) => {
                        out.write_u8(1)?;
                        write_shape(&mut out, chunk)?;
                    }
                    None => out.write_u8(0)?,
                }
                write_values(&mut out, &d.data)?;
            }
            Dataset::Vlen(d) => {
                out.write_u8(KIND_VLEN)?;
                out.write_u8(d.etype as u8)?;
                out.write_u64::<LittleEndian>(d.entries.len() as u64)?;
                for entry in &d.entries {
                    out.write_u64::<LittleEndian>(entry.len() as u64)?;
                    write_values(&mut out, entry)?;
                }
            }
        }
        Ok(out)
    }

    /// Decode a payload produced by [`Dataset::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let kind = cur.read_u8()?;
        let etype = read_type(&mut cur)?;
        let ds = match kind {
            KIND_FIXED => {
                let shape = read_shape(&mut cur)?;
                let extensible = cur.read_u8()? != 0;
                let chunk = match cur.read_u8()? {
                    0 => None,
                    _ => Some(read_shape(&mut cur)?),
                };
                let data = read_values(&mut cur, etype, shape.num_points())?;
                Dataset::Fixed(FixedDataset { shape, chunk, extensible, data })
            }
            KIND_VLEN => {
                let count = cur.read_u64::<LittleEndian>()? as usize;
                let mut entries = Vec::with_capacity(count.min(1 << 16));
                for _ in 0..count {
                    let len = cur.read_u64::<LittleEndian>()? as usize;
                    entries.push(read_values(&mut cur, etype, len)?);
                }
                Dataset::Vlen(VlenDataset { etype, entries })
            }
            other => return Err(Error::invalid(format!("unknown dataset kind {}", other))),
        };
        if cur.position() != bytes.len() as u64 {
            return Err(Error::invalid("trailing bytes after dataset payload"));
        }
        Ok(ds)
    }
}

fn write_shape(out: &mut Vec<u8>, shape: &Shape) -> Result<()> {
    out.write_u32::<LittleEndian>(shape.rank() as u32)?;
    for &d in shape.sizes() {
        out.write_u64::<LittleEndian>(d as u64)?;
    }
    Ok(())
}

fn read_shape(cur: &mut Cursor<&[u8]>) -> Result<Shape> {
    let rank = cur.read_u32::<LittleEndian>()? as usize;
    if rank > 32 {
        return Err(Error::invalid(format!("dataset rank {} too large", rank)));
    }
    let mut shape = Shape::scalar();
    for _ in 0..rank {
        shape.push(cur.read_u64::<LittleEndian>()? as usize);
    }
    Ok(shape)
}

fn read_type(cur: &mut Cursor<&[u8]>) -> Result<ElementType> {
    let tag = cur.read_u8()?;
    ElementType::from_u8(tag).ok_or_else(|| Error::invalid(format!("unknown element type {}", tag)))
}

fn write_values(out: &mut Vec<u8>, buf: &DataBuffer) -> Result<()> {
    match buf {
        DataBuffer::Int(v) => v.iter().try_for_each(|x| out.write_i32::<LittleEndian>(*x))?,
        DataBuffer::Float(v) => v.iter().try_for_each(|x| out.write_f32::<LittleEndian>(*x))?,
        DataBuffer::Double(v) => v.iter().try_for_each(|x| out.write_f64::<LittleEndian>(*x))?,
        DataBuffer::Text(v) => {
            for s in v {
                out.write_u32::<LittleEndian>(s.len() as u32)?;
                out.extend_from_slice(s.as_bytes());
            }
        }
    }
    Ok(())
}

fn read_values(cur: &mut Cursor<&[u8]>, etype: ElementType, n: usize) -> Result<DataBuffer> {
    let remaining = cur.get_ref().len() as u64 - cur.position();
    if etype.is_numeric() && (n as u64).saturating_mul(etype.num_bytes() as u64) > remaining {
        return Err(Error::UnexpectedEof(cur.position()));
    }
    Ok(match etype {
        ElementType::Int => {
            let mut v = vec![0i32; n];
            cur.read_i32_into::<LittleEndian>(&mut v)?;
            DataBuffer::Int(v)
        }
        ElementType::Float => {
            let mut v = vec![0f32; n];
            cur.read_f32_into::<LittleEndian>(&mut v)?;
            DataBuffer::Float(v)
        }
        ElementType::Double => {
            let mut v = vec![0f64; n];
            cur.read_f64_into::<LittleEndian>(&mut v)?;
            DataBuffer::Double(v)
        }
        ElementType::Text => {
            let mut v = Vec::with_capacity(n.min(1 << 16));
            for _ in 0..n {
                let len = cur.read_u32::<LittleEndian>()? as usize;
                let mut bytes = vec![0u8; len];
                cur.read_exact(&mut bytes)?;
                v.push(String::from_utf8(bytes)?);
            }
            DataBuffer::Text(v)
        }
    })
}
