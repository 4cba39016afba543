//! Numpy-style data types and typed array buffers.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::{NetCdfError, NetCdfResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    UInt,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
    /// Single byte types (`|`)
    NotApplicable,
}

/// A scalar data type described by a numpy type string such as `<f4` or `>u4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DType {
    pub kind: ScalarKind,
    pub size: usize,
    pub byte_order: ByteOrder,
}

impl DType {
    pub fn new(kind: ScalarKind, size: usize, byte_order: ByteOrder) -> NetCdfResult<Self> {
        let valid = match kind {
            ScalarKind::Int | ScalarKind::UInt => matches!(size, 1 | 2 | 4 | 8),
            ScalarKind::Float => matches!(size, 4 | 8),
        };
        if !valid {
            return Err(NetCdfError::invalid_format(format!(
                "unsupported {:?} size {}",
                kind, size
            )));
        }
        let byte_order = if size == 1 {
            ByteOrder::NotApplicable
        } else {
            byte_order
        };
        Ok(Self {
            kind,
            size,
            byte_order,
        })
    }

    /// Parse a numpy type string.
    pub fn parse(s: &str) -> NetCdfResult<Self> {
        let mut chars = s.chars();
        let (order, rest) = match chars.next() {
            Some('<') => (ByteOrder::Little, chars.as_str()),
            Some('>') => (ByteOrder::Big, chars.as_str()),
            Some('|') => (ByteOrder::NotApplicable, chars.as_str()),
            Some('=') => (native_order(), chars.as_str()),
            _ => (native_order(), s),
        };
        let mut rest_chars = rest.chars();
        let kind = match rest_chars.next() {
            Some('i') => ScalarKind::Int,
            Some('u') => ScalarKind::UInt,
            Some('f') => ScalarKind::Float,
            _ => return Err(NetCdfError::invalid_format(format!("unsupported dtype '{}'", s))),
        };
        let size: usize = rest_chars
            .as_str()
            .parse()
            .map_err(|_| NetCdfError::invalid_format(format!("invalid dtype size in '{}'", s)))?;
        Self::new(kind, size, order)
    }

    pub fn is_big_endian(&self) -> bool {
        self.byte_order == ByteOrder::Big
    }

    /// Same kind and size in little-endian order.
    pub fn to_little_endian(self) -> Self {
        Self {
            byte_order: if self.size == 1 {
                ByteOrder::NotApplicable
            } else {
                ByteOrder::Little
            },
            ..self
        }
    }

    /// Human readable name, e.g. `float32`.
    pub fn name(&self) -> String {
        let prefix = match self.kind {
            ScalarKind::Int => "int",
            ScalarKind::UInt => "uint",
            ScalarKind::Float => "float",
        };
        format!("{}{}", prefix, self.size * 8)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let order = match self.byte_order {
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
            ByteOrder::NotApplicable => '|',
        };
        let kind = match self.kind {
            ScalarKind::Int => 'i',
            ScalarKind::UInt => 'u',
            ScalarKind::Float => 'f',
        };
        write!(f, "{}{}{}", order, kind, self.size)
    }
}

fn native_order() -> ByteOrder {
    if cfg!(target_endian = "big") {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    }
}

/// A fill value as found in `.zarray` documents and `_FillValue` attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl FillValue {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Some(FillValue::Int(v))
                } else if let Some(v) = n.as_u64() {
                    Some(FillValue::UInt(v))
                } else {
                    n.as_f64().map(FillValue::Float)
                }
            }
            serde_json::Value::String(s) => match s.as_str() {
                "NaN" => Some(FillValue::Float(f64::NAN)),
                "Infinity" => Some(FillValue::Float(f64::INFINITY)),
                "-Infinity" => Some(FillValue::Float(f64::NEG_INFINITY)),
                _ => None,
            },
            serde_json::Value::Array(items) if items.len() == 1 => Self::from_json(&items[0]),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match *self {
            FillValue::Int(v) => serde_json::json!(v),
            FillValue::UInt(v) => serde_json::json!(v),
            FillValue::Float(v) if v.is_nan() => serde_json::json!("NaN"),
            FillValue::Float(v) if v == f64::INFINITY => serde_json::json!("Infinity"),
            FillValue::Float(v) if v == f64::NEG_INFINITY => serde_json::json!("-Infinity"),
            FillValue::Float(v) => serde_json::json!(v),
        }
    }

    /// Default used when a variable declares no fill value.
    pub fn default_for(dtype: &DType) -> Self {
        match dtype.kind {
            ScalarKind::Float => FillValue::Float(f64::NAN),
            ScalarKind::Int => FillValue::Int(0),
            ScalarKind::UInt => FillValue::UInt(0),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            FillValue::Int(v) => v as f64,
            FillValue::UInt(v) => v as f64,
            FillValue::Float(v) => v,
        }
    }
}

impl Serialize for FillValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FillValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        FillValue::from_json(&value)
            .ok_or_else(|| de::Error::custom(format!("invalid fill value {}", value)))
    }
}

/// Numeric element types that can live in an [`ArrayData`].
pub trait Element: Copy + Send + Sync + 'static {
    fn from_fill(fill: FillValue) -> Self;
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn from_fill(fill: FillValue) -> Self {
                    match fill {
                        FillValue::Int(v) => v as $t,
                        FillValue::UInt(v) => v as $t,
                        FillValue::Float(v) => v as $t,
                    }
                }

                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_element!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// A flat, typed array buffer in C order.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Apply `$body` to the inner vector of any variant, rewrapping in the same variant.
#[macro_export]
macro_rules! map_array_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::ArrayData::I8($v) => $crate::ArrayData::I8($body),
            $crate::ArrayData::U8($v) => $crate::ArrayData::U8($body),
            $crate::ArrayData::I16($v) => $crate::ArrayData::I16($body),
            $crate::ArrayData::U16($v) => $crate::ArrayData::U16($body),
            $crate::ArrayData::I32($v) => $crate::ArrayData::I32($body),
            $crate::ArrayData::U32($v) => $crate::ArrayData::U32($body),
            $crate::ArrayData::I64($v) => $crate::ArrayData::I64($body),
            $crate::ArrayData::U64($v) => $crate::ArrayData::U64($body),
            $crate::ArrayData::F32($v) => $crate::ArrayData::F32($body),
            $crate::ArrayData::F64($v) => $crate::ArrayData::F64($body),
        }
    };
}

/// Evaluate `$body` against the inner vector of any variant.
#[macro_export]
macro_rules! with_array_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::ArrayData::I8($v) => $body,
            $crate::ArrayData::U8($v) => $body,
            $crate::ArrayData::I16($v) => $body,
            $crate::ArrayData::U16($v) => $body,
            $crate::ArrayData::I32($v) => $body,
            $crate::ArrayData::U32($v) => $body,
            $crate::ArrayData::I64($v) => $body,
            $crate::ArrayData::U64($v) => $body,
            $crate::ArrayData::F32($v) => $body,
            $crate::ArrayData::F64($v) => $body,
        }
    };
}

macro_rules! decode_elements {
    ($bytes:expr, $t:ty, $big:expr) => {{
        const N: usize = std::mem::size_of::<$t>();
        $bytes
            .chunks_exact(N)
            .map(|c| {
                let mut buf = [0u8; N];
                buf.copy_from_slice(c);
                if $big {
                    <$t>::from_be_bytes(buf)
                } else {
                    <$t>::from_le_bytes(buf)
                }
            })
            .collect::<Vec<$t>>()
    }};
}

impl ArrayData {
    /// Decode raw element bytes laid out according to `dtype`.
    pub fn from_bytes(dtype: &DType, bytes: &[u8]) -> NetCdfResult<Self> {
        if bytes.len() % dtype.size != 0 {
            return Err(NetCdfError::invalid_format(format!(
                "{} bytes is not a multiple of the {} element size",
                bytes.len(),
                dtype
            )));
        }
        let big = dtype.is_big_endian();
        Ok(match (dtype.kind, dtype.size) {
            (ScalarKind::Int, 1) => ArrayData::I8(bytes.iter().map(|&b| b as i8).collect()),
            (ScalarKind::UInt, 1) => ArrayData::U8(bytes.to_vec()),
            (ScalarKind::Int, 2) => ArrayData::I16(decode_elements!(bytes, i16, big)),
            (ScalarKind::UInt, 2) => ArrayData::U16(decode_elements!(bytes, u16, big)),
            (ScalarKind::Int, 4) => ArrayData::I32(decode_elements!(bytes, i32, big)),
            (ScalarKind::UInt, 4) => ArrayData::U32(decode_elements!(bytes, u32, big)),
            (ScalarKind::Int, 8) => ArrayData::I64(decode_elements!(bytes, i64, big)),
            (ScalarKind::UInt, 8) => ArrayData::U64(decode_elements!(bytes, u64, big)),
            (ScalarKind::Float, 4) => ArrayData::F32(decode_elements!(bytes, f32, big)),
            (ScalarKind::Float, 8) => ArrayData::F64(decode_elements!(bytes, f64, big)),
            _ => {
                return Err(NetCdfError::invalid_format(format!(
                    "unsupported dtype {}",
                    dtype
                )))
            }
        })
    }

    /// Encode into raw bytes with the given byte order.
    pub fn to_bytes(&self, big_endian: bool) -> Vec<u8> {
        with_array_data!(self, v => {
            v.iter()
                .flat_map(|x| {
                    if big_endian {
                        x.to_be_bytes().to_vec()
                    } else {
                        x.to_le_bytes().to_vec()
                    }
                })
                .collect()
        })
    }

    /// An array of `len` elements all set to `fill`.
    pub fn full(dtype: &DType, len: usize, fill: FillValue) -> Self {
        match (dtype.kind, dtype.size) {
            (ScalarKind::Int, 1) => ArrayData::I8(vec![i8::from_fill(fill); len]),
            (ScalarKind::UInt, 1) => ArrayData::U8(vec![u8::from_fill(fill); len]),
            (ScalarKind::Int, 2) => ArrayData::I16(vec![i16::from_fill(fill); len]),
            (ScalarKind::UInt, 2) => ArrayData::U16(vec![u16::from_fill(fill); len]),
            (ScalarKind::Int, 4) => ArrayData::I32(vec![i32::from_fill(fill); len]),
            (ScalarKind::UInt, 4) => ArrayData::U32(vec![u32::from_fill(fill); len]),
            (ScalarKind::Int, _) => ArrayData::I64(vec![i64::from_fill(fill); len]),
            (ScalarKind::UInt, _) => ArrayData::U64(vec![u64::from_fill(fill); len]),
            (ScalarKind::Float, 4) => ArrayData::F32(vec![f32::from_fill(fill); len]),
            (ScalarKind::Float, _) => ArrayData::F64(vec![f64::from_fill(fill); len]),
        }
    }

    pub fn len(&self) -> usize {
        with_array_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The little-endian dtype of this buffer.
    pub fn dtype(&self) -> DType {
        let (kind, size) = match self {
            ArrayData::I8(_) => (ScalarKind::Int, 1),
            ArrayData::U8(_) => (ScalarKind::UInt, 1),
            ArrayData::I16(_) => (ScalarKind::Int, 2),
            ArrayData::U16(_) => (ScalarKind::UInt, 2),
            ArrayData::I32(_) => (ScalarKind::Int, 4),
            ArrayData::U32(_) => (ScalarKind::UInt, 4),
            ArrayData::I64(_) => (ScalarKind::Int, 8),
            ArrayData::U64(_) => (ScalarKind::UInt, 8),
            ArrayData::F32(_) => (ScalarKind::Float, 4),
            ArrayData::F64(_) => (ScalarKind::Float, 8),
        };
        DType {
            kind,
            size,
            byte_order: if size == 1 {
                ByteOrder::NotApplicable
            } else {
                ByteOrder::Little
            },
        }
    }

    pub fn get_f64(&self, index: usize) -> Option<f64> {
        with_array_data!(self, v => v.get(index).map(|x| x.to_f64()))
    }

    /// Values as unsigned integers, for index-like variables.
    pub fn to_u64_vec(&self) -> NetCdfResult<Vec<u64>> {
        match self {
            ArrayData::F32(_) | ArrayData::F64(_) => Err(NetCdfError::invalid_format(
                "expected an integer array, got floating point",
            )),
            _ => Ok(with_array_data!(self, v => v.iter().map(|x| x.to_f64() as u64).collect())),
        }
    }

    /// Pick elements by index; positions equal to `missing` get `fill`.
    pub fn gather(&self, index: &[u32], missing: u32, fill: FillValue) -> Self {
        map_array_data!(self, v => {
            let fill = Element::from_fill(fill);
            index
                .iter()
                .map(|&i| {
                    if i == missing {
                        fill
                    } else {
                        v.get(i as usize).copied().unwrap_or(fill)
                    }
                })
                .collect()
        })
    }

    /// Convert to the element type of `dtype`.
    ///
    /// Elements equal to `fill` become `target_fill`. Other values are cast
    /// numerically, saturating at the bounds of integer types.
    pub fn cast(&self, dtype: &DType, fill: FillValue, target_fill: FillValue) -> Self {
        let own = self.dtype();
        if own.kind == dtype.kind && own.size == dtype.size {
            return self.clone();
        }
        let fill = fill.as_f64();
        let values: Vec<Option<f64>> = with_array_data!(self, v => {
            v.iter()
                .map(|x| {
                    let x = x.to_f64();
                    let is_fill = x == fill || (x.is_nan() && fill.is_nan());
                    (!is_fill).then_some(x)
                })
                .collect()
        });
        match (dtype.kind, dtype.size) {
            (ScalarKind::Int, 1) => ArrayData::I8(cast_elements(&values, target_fill)),
            (ScalarKind::UInt, 1) => ArrayData::U8(cast_elements(&values, target_fill)),
            (ScalarKind::Int, 2) => ArrayData::I16(cast_elements(&values, target_fill)),
            (ScalarKind::UInt, 2) => ArrayData::U16(cast_elements(&values, target_fill)),
            (ScalarKind::Int, 4) => ArrayData::I32(cast_elements(&values, target_fill)),
            (ScalarKind::UInt, 4) => ArrayData::U32(cast_elements(&values, target_fill)),
            (ScalarKind::Int, _) => ArrayData::I64(cast_elements(&values, target_fill)),
            (ScalarKind::UInt, _) => ArrayData::U64(cast_elements(&values, target_fill)),
            (ScalarKind::Float, 4) => ArrayData::F32(cast_elements(&values, target_fill)),
            (ScalarKind::Float, _) => ArrayData::F64(cast_elements(&values, target_fill)),
        }
    }

    /// Cut a `rows × cols` window out of a row-major 2-D array of width `width`.
    pub fn window_2d(
        &self,
        width: usize,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> Self {
        map_array_data!(self, v => {
            let mut out = Vec::with_capacity(rows.len() * cols.len());
            for row in rows.clone() {
                let start = row * width;
                out.extend_from_slice(&v[start + cols.start..start + cols.end]);
            }
            out
        })
    }
}

fn cast_elements<T: Element>(values: &[Option<f64>], fill: FillValue) -> Vec<T> {
    let fill = T::from_fill(fill);
    values.iter().map(|v| v.map_or(fill, T::from_f64)).collect()
}
