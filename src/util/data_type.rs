//! Element types and typed buffers.
//!
//! The engine handles a closed set of element types. Every buffer crossing
//! the engine boundary is a [`DataBuffer`], matched exhaustively once at the
//! store boundary instead of being dispatched on a raw type code.

use std::fmt;

/// Element type of a dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ElementType {
    /// Signed 32-bit integer
    #[default]
    Int = 1,
    /// 32-bit floating point
    Float = 2,
    /// 64-bit floating point
    Double = 3,
    /// UTF-8 text
    Text = 4,
}

impl ElementType {
    /// Size in bytes of one element. Text has no fixed size.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Int => 4,
            Self::Float => 4,
            Self::Double => 8,
            Self::Text => 0,
        }
    }

    /// Name used by the outer dispatcher.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Double => "double",
            Self::Text => "string",
        }
    }

    /// Parse from a dispatcher type name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "string" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Convert from the on-disk tag.
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Int),
            2 => Some(Self::Float),
            3 => Some(Self::Double),
            4 => Some(Self::Text),
            _ => None,
        }
    }

    /// True for int/float/double.
    #[inline]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Owned, typed element buffer in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub enum DataBuffer {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<String>),
}

// Applies the same expression to whichever vector the buffer holds.
macro_rules! with_vec {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            DataBuffer::Int($v) => $body,
            DataBuffer::Float($v) => $body,
            DataBuffer::Double($v) => $body,
            DataBuffer::Text($v) => $body,
        }
    };
}

impl DataBuffer {
    /// Empty buffer of the given type.
    pub fn empty(ty: ElementType) -> Self {
        Self::filled(ty, 0)
    }

    /// Buffer of `n` default elements (zero / empty string).
    pub fn filled(ty: ElementType, n: usize) -> Self {
        match ty {
            ElementType::Int => Self::Int(vec![0; n]),
            ElementType::Float => Self::Float(vec![0.0; n]),
            ElementType::Double => Self::Double(vec![0.0; n]),
            ElementType::Text => Self::Text(vec![String::new(); n]),
        }
    }

    /// Scalar "no data" value for a type: the most negative representable
    /// number, or an empty string.
    pub fn sentinel(ty: ElementType) -> Self {
        match ty {
            ElementType::Int => Self::Int(vec![i32::MIN]),
            ElementType::Float => Self::Float(vec![-f32::MAX]),
            ElementType::Double => Self::Double(vec![-f64::MAX]),
            ElementType::Text => Self::Text(vec![String::new()]),
        }
    }

    /// Single text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(vec![s.into()])
    }

    /// Element type of this buffer.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Int(_) => ElementType::Int,
            Self::Float(_) => ElementType::Float,
            Self::Double(_) => ElementType::Double,
            Self::Text(_) => ElementType::Text,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        with_vec!(self, v => v.len())
    }

    /// True if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the elements at `indices`, in that order.
    pub fn gather(&self, indices: &[usize]) -> Option<Self> {
        let len = self.len();
        if indices.iter().any(|&i| i >= len) {
            return None;
        }
        Some(match self {
            Self::Int(v) => Self::Int(indices.iter().map(|&i| v[i]).collect()),
            Self::Float(v) => Self::Float(indices.iter().map(|&i| v[i]).collect()),
            Self::Double(v) => Self::Double(indices.iter().map(|&i| v[i]).collect()),
            Self::Text(v) => Self::Text(indices.iter().map(|&i| v[i].clone()).collect()),
        })
    }

    /// Write `src[k]` to `self[indices[k]]`. Types and lengths must agree.
    pub fn scatter(&mut self, indices: &[usize], src: &DataBuffer) -> bool {
        if indices.len() != src.len() || indices.iter().any(|&i| i >= self.len()) {
            return false;
        }
        match (self, src) {
            (Self::Int(dst), Self::Int(s)) => indices.iter().zip(s).for_each(|(&i, x)| dst[i] = *x),
            (Self::Float(dst), Self::Float(s)) => indices.iter().zip(s).for_each(|(&i, x)| dst[i] = *x),
            (Self::Double(dst), Self::Double(s)) => indices.iter().zip(s).for_each(|(&i, x)| dst[i] = *x),
            (Self::Text(dst), Self::Text(s)) => indices.iter().zip(s).for_each(|(&i, x)| dst[i] = x.clone()),
            _ => return false,
        }
        true
    }

    /// Integer view.
    pub fn as_int(&self) -> Option<&[i32]> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Float view.
    pub fn as_float(&self) -> Option<&[f32]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Double view.
    pub fn as_double(&self) -> Option<&[f64]> {
        match self {
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Text view.
    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Vec<i32>> for DataBuffer {
    fn from(v: Vec<i32>) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<f32>> for DataBuffer {
    fn from(v: Vec<f32>) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<f64>> for DataBuffer {
    fn from(v: Vec<f64>) -> Self {
        Self::Double(v)
    }
}

impl From<Vec<String>> for DataBuffer {
    fn from(v: Vec<String>) -> Self {
        Self::Text(v)
    }
}
