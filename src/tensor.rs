// Copyright (c) 2015-2021 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Tensor handles, and their literal (inline) byte layout.
//!
//! A tensor is either stored out-of-band in a tensor table, in which case
//! the pickle stream only carries its index, or inline as a literal.  The
//! literal layout is, all little-endian:
//!
//! ```text
//! u8        dtype code
//! u32       rank
//! i64 * rank  sizes
//! u64       data length in bytes
//! [u8]      data (row-major, contiguous)
//! ```

use std::fmt;
use std::rc::Rc;
use std::convert::TryFrom;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::{Error, ErrorCode, Result};

/// Element type of a tensor.  The codes follow the numbering of the
/// reference tensor library so literal payloads stay readable there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    UInt8,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
}

impl ScalarType {
    pub fn code(self) -> u8 {
        match self {
            ScalarType::UInt8   => 0,
            ScalarType::Int8    => 1,
            ScalarType::Int16   => 2,
            ScalarType::Int32   => 3,
            ScalarType::Int64   => 4,
            ScalarType::Float32 => 6,
            ScalarType::Float64 => 7,
            ScalarType::Bool    => 11,
        }
    }

    pub fn from_code(code: u8) -> Option<ScalarType> {
        match code {
            0  => Some(ScalarType::UInt8),
            1  => Some(ScalarType::Int8),
            2  => Some(ScalarType::Int16),
            3  => Some(ScalarType::Int32),
            4  => Some(ScalarType::Int64),
            6  => Some(ScalarType::Float32),
            7  => Some(ScalarType::Float64),
            11 => Some(ScalarType::Bool),
            _  => None,
        }
    }

    /// Size of a single element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            ScalarType::UInt8 | ScalarType::Int8 | ScalarType::Bool => 1,
            ScalarType::Int16                                        => 2,
            ScalarType::Int32 | ScalarType::Float32                  => 4,
            ScalarType::Int64 | ScalarType::Float64                  => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::UInt8   => "uint8",
            ScalarType::Int8    => "int8",
            ScalarType::Int16   => "int16",
            ScalarType::Int32   => "int32",
            ScalarType::Int64   => "int64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
            ScalarType::Bool    => "bool",
        }
    }
}

#[derive(Debug, PartialEq)]
struct TensorImpl {
    dtype: ScalarType,
    sizes: Vec<i64>,
    data: Vec<u8>,
}

/// A shared handle onto a contiguous tensor.
///
/// Cloning the handle does not copy the data; clones are the same object for
/// the purpose of memoization.  Equality compares contents.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor(Rc<TensorImpl>);

impl Tensor {
    /// Create a tensor, checking that `data` holds exactly the elements
    /// `sizes` describes.
    pub fn new(dtype: ScalarType, sizes: Vec<i64>, data: Vec<u8>) -> Result<Tensor> {
        check_layout(dtype, &sizes, data.len()).map_err(Error::Syntax)?;
        Ok(Tensor::from_raw_parts(dtype, sizes, data))
    }

    /// Create a tensor without validating the layout.  Inconsistent tensors
    /// are reported when they are written inline.
    pub fn from_raw_parts(dtype: ScalarType, sizes: Vec<i64>, data: Vec<u8>) -> Tensor {
        Tensor(Rc::new(TensorImpl { dtype, sizes, data }))
    }

    pub fn from_f32(sizes: Vec<i64>, values: &[f32]) -> Result<Tensor> {
        let mut data = vec![0; values.len() * 4];
        LittleEndian::write_f32_into(values, &mut data);
        Tensor::new(ScalarType::Float32, sizes, data)
    }

    pub fn from_i64(sizes: Vec<i64>, values: &[i64]) -> Result<Tensor> {
        let mut data = vec![0; values.len() * 8];
        LittleEndian::write_i64_into(values, &mut data);
        Tensor::new(ScalarType::Int64, sizes, data)
    }

    pub fn dtype(&self) -> ScalarType {
        self.0.dtype
    }

    pub fn sizes(&self) -> &[i64] {
        &self.0.sizes
    }

    /// Raw element bytes, little-endian.
    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    /// Number of elements, if the sizes are valid.
    pub fn numel(&self) -> Option<usize> {
        numel(&self.0.sizes)
    }

    /// Whether both handles refer to the same tensor object.
    pub fn is_same(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    /// Serialize into the literal layout.
    pub(crate) fn to_literal(&self) -> std::result::Result<Vec<u8>, ErrorCode> {
        let t = &*self.0;
        check_layout(t.dtype, &t.sizes, t.data.len())?;
        let rank = u32::try_from(t.sizes.len())
            .map_err(|_| ErrorCode::TensorEncoding("rank too large".into()))?;
        let mut out = Vec::with_capacity(13 + 8 * t.sizes.len() + t.data.len());
        out.push(t.dtype.code());
        let mut buf = [0; 8];
        LittleEndian::write_u32(&mut buf[..4], rank);
        out.extend_from_slice(&buf[..4]);
        for &size in &t.sizes {
            LittleEndian::write_i64(&mut buf, size);
            out.extend_from_slice(&buf);
        }
        LittleEndian::write_u64(&mut buf, t.data.len() as u64);
        out.extend_from_slice(&buf);
        out.extend_from_slice(&t.data);
        Ok(out)
    }

    /// Inflate a tensor from the literal layout.  The payload has to be
    /// consumed exactly.
    pub(crate) fn from_literal(mut bytes: &[u8]) -> std::result::Result<Tensor, ErrorCode> {
        let truncated = |_| ErrorCode::TensorEncoding("literal payload truncated".into());
        let code = bytes.read_u8().map_err(truncated)?;
        let dtype = ScalarType::from_code(code).ok_or_else(
            || ErrorCode::TensorEncoding(format!("unknown dtype code {}", code)))?;
        let rank = bytes.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        if rank > bytes.len() / 8 {
            return Err(ErrorCode::TensorEncoding("literal payload truncated".into()));
        }
        let mut sizes = Vec::with_capacity(rank);
        for _ in 0..rank {
            sizes.push(bytes.read_i64::<LittleEndian>().map_err(truncated)?);
        }
        let len = bytes.read_u64::<LittleEndian>().map_err(truncated)?;
        if len != bytes.len() as u64 {
            return Err(ErrorCode::TensorEncoding(
                format!("data length {} does not match the {} remaining bytes", len, bytes.len())));
        }
        check_layout(dtype, &sizes, bytes.len())?;
        Ok(Tensor::from_raw_parts(dtype, sizes, bytes.to_vec()))
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tensor(dtype={}, sizes={:?})", self.0.dtype.name(), self.0.sizes)
    }
}

fn numel(sizes: &[i64]) -> Option<usize> {
    sizes.iter().try_fold(1usize, |acc, &size| {
        usize::try_from(size).ok().and_then(|size| acc.checked_mul(size))
    })
}

fn check_layout(dtype: ScalarType, sizes: &[i64], len: usize) -> std::result::Result<(), ErrorCode> {
    let expected = numel(sizes)
        .and_then(|n| n.checked_mul(dtype.element_size()))
        .ok_or_else(|| ErrorCode::TensorEncoding(format!("invalid sizes {:?}", sizes)))?;
    if expected != len {
        return Err(ErrorCode::TensorEncoding(
            format!("sizes {:?} of {} need {} bytes, have {}", sizes, dtype.name(), expected, len)));
    }
    Ok(())
}
