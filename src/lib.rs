// Copyright (c) 2015-2021 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Pickling of runtime values with shared references and tensors
//!
//! # Pickle format
//!
//! Values are written as a program for the pickle VM, protocol 2, the way
//! Python's pickle module would write the equivalent objects.  Python can
//! read the streams back as long as the reserved classes (see below) are
//! importable from `__main__`.  A stream looks like
//!
//! ```text
//! 80 02   PROTO 2
//! ...     one instruction sequence per root value
//! 2e      STOP
//! ```
//!
//! When decoding, protocols 2 to 4 are accepted.  Every value left on the
//! stack at STOP is a root, so a stream may carry several of them.
//!
//! # Supported types
//!
//! The value model is `IValue`:
//!
//! * None
//! * Boolean (Rust `bool`)
//! * Integers (Rust `i64`)
//! * Floats (Rust `f64`)
//! * Unicode strings
//! * Lists, tuples and dictionaries (insertion ordered)
//! * Integer lists, written as the reserved class `IntList`
//! * Tensors, either as an index into a side table or inline
//!
//! Strings, lists, dictionaries, integer lists and tensors are reference
//! counted.  An object reachable along several paths is written once and then
//! referenced through the memo, and decoding restores the sharing.  Cyclic
//! graphs can't be written.
//!
//! # Reserved classes
//!
//! GLOBAL may only name the module `__main__` and one of the classes
//! `TensorID` (argument: an index into the tensor table), `IntList`
//! (argument: a list of integers) or `LiteralTensor` (argument: a bytes
//! object holding an inline tensor).  Any other global is rejected, which
//! makes decoding untrusted input safe from arbitrary code execution.
//!
//! # Limits
//!
//! Containers may nest at most 1000 levels deep by default, both when
//! encoding and when decoding; `SerOptions::max_depth` and
//! `DeOptions::max_depth` change that.  Deeper values fail with
//! `ErrorCode::NestingLimit` instead of exhausting the stack.  The decoder's
//! cycle checks only search containers that were fetched back from the memo,
//! and their total work is capped in proportion to the input size
//! (`ErrorCode::CheckBudget`).
//!
//! # Exported API
//!
//! `values_to_vec` and `value_to_vec` encode one or more roots, and
//! `values_from_slice` and `value_from_slice` decode them.  Tensor tables and
//! strictness are configured with `SerOptions` and `DeOptions`.  `IValue`
//! also implements serde's `Serialize` and `Deserialize`, to exchange values
//! with other formats.

pub use self::ser::{
    Pickler,
    SerOptions,
    values_to_vec,
    value_to_vec,
    values_to_writer,
};

pub use self::de::{
    Unpickler,
    DeOptions,
    values_from_slice,
    value_from_slice,
    values_from_reader,
};

pub use self::value::{
    IValue,
    DictKey,
    Capsule,
};

pub use self::tensor::{Tensor, ScalarType};

pub use self::error::{Error, ErrorCode, Result};

pub mod ser;
pub mod de;
pub mod error;
pub mod value;
pub mod tensor;
mod consts;
mod value_impls;

#[cfg(test)]
#[path = "../test/mod.rs"]
mod test;
