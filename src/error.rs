// Copyright (c) 2015-2021 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Error objects and codes

use std::fmt;
use std::io;
use std::error;
use std::result;
use serde::{ser, de};

use crate::consts::opcode_name;

#[derive(Clone, PartialEq, Debug)]
pub enum ErrorCode {
    /// Read past the end of the input
    Truncated,
    /// Byte is not an opcode we understand
    UnknownOpcode(u8),
    /// PROTO announced a version other than 2, 3 or 4
    UnsupportedProtocol(u8),
    /// A value was missing from the memo
    MemoMiss(u32),
    /// BINPUT/LONG_BINPUT with an id that does not extend the memo
    MemoGap { expected: u32, found: u32 },
    /// String decoding as UTF-8 failed
    Utf8,
    /// Integer does not fit into 64 bits (or a memo id into 32)
    Overflow,
    /// Stack underflowed, or a pop reached below the current mark
    StackUnderflow,
    /// A "module global" outside the reserved classes
    UnknownGlobal(Vec<u8>, Vec<u8>),
    /// The encoder cannot serialize this value variant
    Unsupported(&'static str),
    /// Wrong stack item type for the opcode
    TypeMismatch(&'static str, String),
    /// A tensor could not be converted to or from its literal form
    TensorEncoding(String),
    /// A tensor reference without a matching tensor table entry
    MissingTensor(i64),
    /// A container would contain itself
    Recursive,
    /// Containers are nested deeper than the configured limit
    NestingLimit(usize),
    /// Checking container links for cycles took more work than the input
    /// size allows
    CheckBudget,
    /// Found trailing bytes after STOP opcode
    TrailingBytes,
    /// Structure deserialization error from serde
    Structure(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorCode::Truncated => write!(fmt, "unexpected end of pickle data"),
            ErrorCode::UnknownOpcode(op) => write!(fmt, "unknown opcode 0x{:02x}", op),
            ErrorCode::UnsupportedProtocol(v) => write!(fmt, "unsupported protocol {}", v),
            ErrorCode::MemoMiss(id) => write!(fmt, "missing memo with id {}", id),
            ErrorCode::MemoGap { expected, found } =>
                write!(fmt, "memo id {} does not extend the memo (expected {})", found, expected),
            ErrorCode::Utf8 => write!(fmt, "string is not UTF-8 encoded"),
            ErrorCode::Overflow => write!(fmt, "integer overflow"),
            ErrorCode::StackUnderflow => write!(fmt, "pickle stack underflow"),
            ErrorCode::UnknownGlobal(ref m, ref g) =>
                write!(fmt, "unknown global: {}.{}",
                       String::from_utf8_lossy(m), String::from_utf8_lossy(g)),
            ErrorCode::Unsupported(what) => write!(fmt, "cannot serialize {} values", what),
            ErrorCode::TypeMismatch(what, ref it) =>
                write!(fmt, "invalid stack item, expected {}, got {}", what, it),
            ErrorCode::TensorEncoding(ref s) => write!(fmt, "tensor encoding failed: {}", s),
            ErrorCode::MissingTensor(idx) =>
                write!(fmt, "tensor reference {} has no entry in the tensor table", idx),
            ErrorCode::Recursive => write!(fmt, "recursive structure found"),
            ErrorCode::NestingLimit(max) =>
                write!(fmt, "containers nested deeper than {} levels", max),
            ErrorCode::CheckBudget => write!(fmt, "cycle checks exceeded their work budget"),
            ErrorCode::TrailingBytes => write!(fmt, "trailing bytes found"),
            ErrorCode::Structure(ref s) => fmt.write_str(s),
        }
    }
}

/// This type represents all possible errors that can occur when serializing or
/// deserializing a value.
#[derive(Debug)]
pub enum Error {
    /// Some IO error occurred when reading input or writing output.
    Io(io::Error),
    /// The pickle had some error while interpreting.  `offset` points into the
    /// offending instruction, `opcode` is the last opcode that was read.
    Eval { code: ErrorCode, offset: usize, opcode: Option<u8> },
    /// A value could not be encoded; `variant` names the value's variant.
    Encode { code: ErrorCode, variant: &'static str },
    /// Error while converting between values and other serde types.
    Syntax(ErrorCode),
}

impl Error {
    /// The kind of error, if it isn't an IO error.
    pub fn code(&self) -> Option<&ErrorCode> {
        match *self {
            Error::Io(_) => None,
            Error::Eval { ref code, .. } |
            Error::Encode { ref code, .. } |
            Error::Syntax(ref code) => Some(code),
        }
    }

    /// Byte offset at which decoding failed.
    pub fn offset(&self) -> Option<usize> {
        match *self {
            Error::Eval { offset, .. } => Some(offset),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

pub type Result<T> = result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref error) => error.fmt(fmt),
            Error::Eval { ref code, offset, opcode: Some(op) } =>
                write!(fmt, "eval error at offset {} (opcode {}): {}",
                       offset, opcode_name(op), code),
            Error::Eval { ref code, offset, opcode: None } =>
                write!(fmt, "eval error at offset {}: {}", offset, code),
            Error::Encode { ref code, variant } =>
                write!(fmt, "encoding error in {} value: {}", variant, code),
            Error::Syntax(ref code) => write!(fmt, "decoding error: {}", code)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref error) => Some(error),
            _ => None,
        }
    }
}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Error {
        Error::Syntax(ErrorCode::Structure(msg.to_string()))
    }
}

impl ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Error {
        Error::Syntax(ErrorCode::Structure(msg.to_string()))
    }
}
