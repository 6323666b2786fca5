// Copyright (c) 2015-2021 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Constants for the pickle opcodes understood by this codec, and the
//! reserved class tags it uses.
//!
//! The opcode constants use the names Python's pickle.py uses.  They are not
//! in an enum because the decoder dispatches on raw bytes anyway, and unknown
//! bytes have to be reported as they are.

pub const MARK             : u8 = b'(';    // push special markobject on stack
pub const STOP             : u8 = b'.';    // every pickle ends with STOP
pub const BININT           : u8 = b'J';    // push four-byte signed int
pub const BININT1          : u8 = b'K';    // push 1-byte unsigned int
pub const BININT2          : u8 = b'M';    // push 2-byte unsigned int
pub const NONE             : u8 = b'N';    // push None
pub const BINUNICODE       : u8 = b'X';    // push Unicode string; counted UTF-8 string argument
pub const APPEND           : u8 = b'a';    // append stack top to list below it
pub const EMPTY_DICT       : u8 = b'}';    // push empty dict
pub const APPENDS          : u8 = b'e';    // extend list on stack by topmost stack slice
pub const EMPTY_LIST       : u8 = b']';    // push empty list
pub const SETITEM          : u8 = b's';    // add key+value pair to dict
pub const TUPLE            : u8 = b't';    // build tuple from topmost stack items
pub const EMPTY_TUPLE      : u8 = b')';    // push empty tuple
pub const SETITEMS         : u8 = b'u';    // modify dict by adding topmost key+value pairs
pub const BINFLOAT         : u8 = b'G';    // push float; arg is 8-byte float encoding
pub const BINPUT           : u8 = b'q';    // store stack top in memo; 1-byte arg
pub const LONG_BINPUT      : u8 = b'r';    //   "     "    "   "   " ; 4-byte arg
pub const BINGET           : u8 = b'h';    // push item from memo on stack; 1-byte arg
pub const LONG_BINGET      : u8 = b'j';    //   "    "    "    "   "   "  ; 4-byte arg
pub const GLOBAL           : u8 = b'c';    // push class marker; 2 newline-terminated args
pub const REDUCE           : u8 = b'R';    // apply class marker to argtuple, both on stack
pub const BUILD            : u8 = b'b';    // accepted, the state argument is discarded
pub const PROTO            : u8 = b'\x80'; // identify pickle protocol
pub const NEWOBJ           : u8 = b'\x81'; // same as REDUCE for our class markers
pub const TUPLE1           : u8 = b'\x85'; // build 1-tuple from stack top
pub const TUPLE2           : u8 = b'\x86'; // build 2-tuple from two topmost stack items
pub const TUPLE3           : u8 = b'\x87'; // build 3-tuple from three topmost stack items
pub const NEWTRUE          : u8 = b'\x88'; // push True
pub const NEWFALSE         : u8 = b'\x89'; // push False
pub const LONG1            : u8 = b'\x8a'; // push long from < 256 bytes
pub const LONG4            : u8 = b'\x8b'; // push really big long
pub const BINBYTES         : u8 = b'B';    // push bytes; counted binary string argument
pub const SHORT_BINBYTES   : u8 = b'C';    //  "     "   ;    "      "       "      " < 256 bytes
pub const SHORT_BINUNICODE : u8 = b'\x8c'; // push short string; UTF-8 length < 256 bytes
pub const BINUNICODE8      : u8 = b'\x8d'; // push very long string
pub const BINBYTES8        : u8 = b'\x8e'; // push very long bytes string
pub const MEMOIZE          : u8 = b'\x94'; // store top of the stack in memo
pub const FRAME            : u8 = b'\x95'; // indicate the beginning of a new frame

/// The protocol version written after PROTO.
pub const PROTOCOL_VERSION: u8 = 2;

/// Default limit on container nesting, for encoding and decoding.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Module name of all reserved GLOBAL targets.
pub const CLASS_MODULE: &[u8] = b"__main__";

/// The closed set of classes a GLOBAL may name in a stream of ours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PicklerClass {
    /// A reference into the tensor table
    Tensor,
    /// List[int]
    IntList,
    /// A tensor stored entirely in the pickle stream
    LiteralTensor,
}

impl PicklerClass {
    /// The class name written after the module in GLOBAL.
    pub fn name(self) -> &'static [u8] {
        match self {
            PicklerClass::Tensor        => b"TensorID",
            PicklerClass::IntList       => b"IntList",
            PicklerClass::LiteralTensor => b"LiteralTensor",
        }
    }

    /// Look up a GLOBAL target in the whitelist.
    pub fn from_global(module: &[u8], name: &[u8]) -> Option<PicklerClass> {
        if module != CLASS_MODULE {
            return None;
        }
        match name {
            b"TensorID"      => Some(PicklerClass::Tensor),
            b"IntList"       => Some(PicklerClass::IntList),
            b"LiteralTensor" => Some(PicklerClass::LiteralTensor),
            _                => None,
        }
    }
}

/// Human-readable name of an opcode, for diagnostics.
pub fn opcode_name(op: u8) -> &'static str {
    match op {
        MARK             => "MARK",
        STOP             => "STOP",
        BININT           => "BININT",
        BININT1          => "BININT1",
        BININT2          => "BININT2",
        NONE             => "NONE",
        BINUNICODE       => "BINUNICODE",
        APPEND           => "APPEND",
        EMPTY_DICT       => "EMPTY_DICT",
        APPENDS          => "APPENDS",
        EMPTY_LIST       => "EMPTY_LIST",
        SETITEM          => "SETITEM",
        TUPLE            => "TUPLE",
        EMPTY_TUPLE      => "EMPTY_TUPLE",
        SETITEMS         => "SETITEMS",
        BINFLOAT         => "BINFLOAT",
        BINPUT           => "BINPUT",
        LONG_BINPUT      => "LONG_BINPUT",
        BINGET           => "BINGET",
        LONG_BINGET      => "LONG_BINGET",
        GLOBAL           => "GLOBAL",
        REDUCE           => "REDUCE",
        BUILD            => "BUILD",
        PROTO            => "PROTO",
        NEWOBJ           => "NEWOBJ",
        TUPLE1           => "TUPLE1",
        TUPLE2           => "TUPLE2",
        TUPLE3           => "TUPLE3",
        NEWTRUE          => "NEWTRUE",
        NEWFALSE         => "NEWFALSE",
        LONG1            => "LONG1",
        LONG4            => "LONG4",
        BINBYTES         => "BINBYTES",
        SHORT_BINBYTES   => "SHORT_BINBYTES",
        SHORT_BINUNICODE => "SHORT_BINUNICODE",
        BINUNICODE8      => "BINUNICODE8",
        BINBYTES8        => "BINBYTES8",
        MEMOIZE          => "MEMOIZE",
        FRAME            => "FRAME",
        _                => "<unknown>",
    }
}
