// Copyright (c) 2015-2016 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Pickle serialization
//!
//! The pickler walks the value graph eagerly and appends opcodes to an
//! in-memory buffer.  Strings, lists, dicts, int lists, inline tensors and
//! tuples that occur more than once in the graph are memoized, so that later
//! occurrences become a single BINGET/LONG_BINGET.

use std::io;
use std::slice;
use std::convert::TryFrom;
use std::collections::{HashMap, HashSet};
use byteorder::{ByteOrder, BigEndian, LittleEndian};
use num_bigint::BigInt;
use log::debug;

use crate::consts::*;
use crate::error::{Error, ErrorCode, Result};
use crate::tensor::Tensor;
use crate::value::IValue;

/// Options for pickling.
pub struct SerOptions<'t> {
    tensor_table: Option<&'t mut Vec<Tensor>>,
    max_depth: usize,
}

impl<'t> Default for SerOptions<'t> {
    fn default() -> Self {
        SerOptions { tensor_table: None, max_depth: DEFAULT_MAX_DEPTH }
    }
}

impl<'t> SerOptions<'t> {
    /// Construct with default options:
    ///
    /// - tensors are written inline
    /// - containers may be nested 1000 levels deep
    pub fn new() -> Self {
        Default::default()
    }

    /// Append tensors to `table` and only write their index into the
    /// stream.
    pub fn tensor_table(mut self, table: &'t mut Vec<Tensor>) -> Self {
        self.tensor_table = Some(table);
        self
    }

    /// Fail with `NestingLimit` on containers nested deeper than `depth`
    /// levels.  Writing a value recurses once per level, so raising the
    /// limit needs a correspondingly large stack.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// A structure for pickling values into a byte buffer.
pub struct Pickler<'t> {
    output: Vec<u8>,
    // Memoization of values that have been written, keyed by identity.
    memo: HashMap<*const (), u32>,
    memo_len: u64,
    // Tuples that occur more than once in the graph; only those are memoized.
    shared_tuples: HashSet<*const ()>,
    tensor_table: Option<&'t mut Vec<Tensor>>,
    max_depth: usize,
}

impl<'t> Pickler<'t> {
    pub fn new(options: SerOptions<'t>) -> Self {
        Pickler {
            output: Vec::with_capacity(128),
            memo: HashMap::new(),
            memo_len: 0,
            shared_tuples: HashSet::new(),
            tensor_table: options.tensor_table,
            max_depth: options.max_depth,
        }
    }

    /// Pickle `roots` into a complete stream.  Decoding the stream yields
    /// the roots in order.
    pub fn pickle(mut self, roots: &[IValue]) -> Result<Vec<u8>> {
        let mut seen = HashSet::new();
        for root in roots {
            self.scan(root, &mut seen)?;
        }
        self.write_opcode(PROTO);
        self.write_opcode(PROTOCOL_VERSION);
        for root in roots {
            self.push_ivalue(root)?;
        }
        self.write_opcode(STOP);
        debug!("pickled {} roots into {} bytes ({} memo entries, {} tensors in table)",
               roots.len(), self.output.len(), self.memo_len,
               self.tensor_table.as_ref().map_or(0, |t| t.len()));
        Ok(self.output)
    }

    /// Find tuples that occur more than once, and reject cyclic graphs and
    /// graphs nested too deeply to write.  Containers that were already
    /// scanned are not entered again, exactly like the pickler replaces them
    /// with a memo lookup, so the depth seen here is the depth `push_ivalue`
    /// recurses to.
    fn scan(&mut self, root: &IValue, seen: &mut HashSet<*const ()>) -> Result<()> {
        enum Step { Enter(IValue, usize), Leave(*const ()) }

        // Containers on the current path.
        let mut active = HashSet::new();
        let mut todo = vec![Step::Enter(root.clone(), 1)];
        while let Some(step) = todo.pop() {
            let (value, depth) = match step {
                Step::Enter(value, depth) => (value, depth),
                Step::Leave(ptr) => {
                    active.remove(&ptr);
                    continue;
                }
            };
            let ptr = match value {
                IValue::List(_) | IValue::Tuple(_) | IValue::Dict(_) => match value.identity() {
                    Some(ptr) => ptr,
                    None => continue,
                },
                _ => continue,
            };
            if active.contains(&ptr) {
                return Err(encode_error(ErrorCode::Recursive, &value));
            }
            if !seen.insert(ptr) {
                if let IValue::Tuple(_) = value {
                    self.shared_tuples.insert(ptr);
                }
                continue;
            }
            if depth > self.max_depth {
                return Err(encode_error(ErrorCode::NestingLimit(self.max_depth), &value));
            }
            active.insert(ptr);
            todo.push(Step::Leave(ptr));
            // Reversed, so children are entered in order.
            todo.extend(value.children().into_iter().rev().map(|v| Step::Enter(v, depth + 1)));
        }
        Ok(())
    }

    /// The memo key of a value, if the value is memoized at all.
    fn memo_key(&self, value: &IValue) -> Option<*const ()> {
        match *value {
            IValue::String(ref s) if !s.is_empty() => value.identity(),
            IValue::List(_) | IValue::Dict(_) | IValue::IntList(_) => value.identity(),
            IValue::Tuple(_) => value.identity().filter(|ptr| self.shared_tuples.contains(ptr)),
            IValue::Tensor(_) if self.tensor_table.is_none() => value.identity(),
            _ => None,
        }
    }

    fn push_ivalue(&mut self, value: &IValue) -> Result<()> {
        // Check if this value has been written before.
        if let Some(ptr) = self.memo_key(value) {
            if let Some(&id) = self.memo.get(&ptr) {
                self.push_binget(id);
                return Ok(());
            }
        }
        match *value {
            IValue::None          => self.write_opcode(NONE),
            IValue::Bool(b)       => self.write_opcode(if b { NEWTRUE } else { NEWFALSE }),
            IValue::Int(i)        => self.push_int(i),
            IValue::Double(f)     => self.push_double(f),
            IValue::String(ref s) => {
                self.push_string(s);
                if !s.is_empty() {
                    self.push_memoization(value)?;
                }
            }
            IValue::List(ref l) => {
                self.write_opcode(EMPTY_LIST);
                self.push_memoization(value)?;
                self.write_opcode(MARK);
                for item in l.borrow().iter() {
                    self.push_ivalue(item)?;
                }
                self.write_opcode(APPENDS);
            }
            IValue::Tuple(ref t) => {
                self.push_tuple(t)?;
                if self.memo_key(value).is_some() {
                    self.push_memoization(value)?;
                }
            }
            IValue::Dict(ref d) => {
                self.write_opcode(EMPTY_DICT);
                self.push_memoization(value)?;
                self.write_opcode(MARK);
                for (key, item) in d.borrow().iter() {
                    self.push_ivalue(&key.to_value())?;
                    self.push_ivalue(item)?;
                }
                self.write_opcode(SETITEMS);
            }
            IValue::IntList(ref l) => {
                self.push_class(PicklerClass::IntList);
                self.write_opcode(EMPTY_LIST);
                self.push_memo_slot(None, value)?;
                self.write_opcode(MARK);
                for &item in l.borrow().iter() {
                    self.push_int(item);
                }
                self.write_opcode(APPENDS);
                self.write_opcode(TUPLE1);
                self.write_opcode(REDUCE);
                self.push_memoization(value)?;
            }
            IValue::Tensor(ref t) => self.push_tensor(value, t)?,
            IValue::Capsule(_) =>
                return Err(encode_error(ErrorCode::Unsupported(value.type_name()), value)),
        }
        Ok(())
    }

    fn push_tuple(&mut self, items: &[IValue]) -> Result<()> {
        match items.len() {
            0 => self.write_opcode(EMPTY_TUPLE),
            1 => {
                self.push_ivalue(&items[0])?;
                self.write_opcode(TUPLE1);
            }
            2 => {
                self.push_ivalue(&items[0])?;
                self.push_ivalue(&items[1])?;
                self.write_opcode(TUPLE2);
            }
            3 => {
                self.push_ivalue(&items[0])?;
                self.push_ivalue(&items[1])?;
                self.push_ivalue(&items[2])?;
                self.write_opcode(TUPLE3);
            }
            _ => {
                self.write_opcode(MARK);
                for item in items {
                    self.push_ivalue(item)?;
                }
                self.write_opcode(TUPLE);
            }
        }
        Ok(())
    }

    fn push_tensor(&mut self, value: &IValue, tensor: &Tensor) -> Result<()> {
        let index = match self.tensor_table {
            Some(ref mut table) => {
                table.push(tensor.clone());
                Some(table.len() - 1)
            }
            None => None,
        };
        match index {
            Some(index) => {
                self.push_class(PicklerClass::Tensor);
                self.push_int(index as i64);
                self.write_opcode(TUPLE1);
                self.write_opcode(REDUCE);
            }
            None => {
                let literal = tensor.to_literal().map_err(|code| encode_error(code, value))?;
                self.push_class(PicklerClass::LiteralTensor);
                self.push_bytes(&literal);
                self.write_opcode(TUPLE1);
                self.write_opcode(REDUCE);
                self.push_memoization(value)?;
            }
        }
        Ok(())
    }

    fn push_class(&mut self, cls: PicklerClass) {
        self.write_opcode(GLOBAL);
        self.output.extend_from_slice(CLASS_MODULE);
        self.output.push(b'\n');
        self.output.extend_from_slice(cls.name());
        self.output.push(b'\n');
    }

    fn push_int(&mut self, value: i64) {
        if 0 <= value && value <= 0xff {
            self.write_opcode(BININT1);
            self.output.push(value as u8);
        } else if 0 <= value && value <= 0xffff {
            self.write_opcode(BININT2);
            self.write_u16(value as u16);
        } else if i64::from(i32::MIN) <= value && value <= i64::from(i32::MAX) {
            self.write_opcode(BININT);
            self.write_i32(value as i32);
        } else {
            // Minimal two's complement, so the sign survives.
            let bytes = BigInt::from(value).to_signed_bytes_le();
            self.write_opcode(LONG1);
            self.output.push(bytes.len() as u8);
            self.output.extend_from_slice(&bytes);
        }
    }

    fn push_double(&mut self, value: f64) {
        self.write_opcode(BINFLOAT);
        // Yes, this one is big endian.
        let mut buf = [0; 8];
        BigEndian::write_f64(&mut buf, value);
        self.output.extend_from_slice(&buf);
    }

    fn push_string(&mut self, value: &str) {
        let len = value.len();
        if len <= 0xff {
            self.write_opcode(SHORT_BINUNICODE);
            self.output.push(len as u8);
        } else if let Ok(len) = u32::try_from(len) {
            self.write_opcode(BINUNICODE);
            self.write_u32(len);
        } else {
            self.write_opcode(BINUNICODE8);
            self.write_u64(len as u64);
        }
        self.output.extend_from_slice(value.as_bytes());
    }

    fn push_bytes(&mut self, value: &[u8]) {
        if let Ok(len) = u32::try_from(value.len()) {
            self.write_opcode(BINBYTES);
            self.write_u32(len);
        } else {
            self.write_opcode(BINBYTES8);
            self.write_u64(value.len() as u64);
        }
        self.output.extend_from_slice(value);
    }

    fn push_binget(&mut self, id: u32) {
        if id <= 0xff {
            self.write_opcode(BINGET);
            self.output.push(id as u8);
        } else {
            self.write_opcode(LONG_BINGET);
            self.write_u32(id);
        }
    }

    /// Emit MEMOIZE for `value` and remember its id.
    fn push_memoization(&mut self, value: &IValue) -> Result<()> {
        self.push_memo_slot(value.identity(), value)
    }

    /// Emit MEMOIZE, taking the next memo id.  With no key, the slot is only
    /// taken to keep ids in sync with the reader.
    fn push_memo_slot(&mut self, key: Option<*const ()>, value: &IValue) -> Result<()> {
        let id = u32::try_from(self.memo_len)
            .map_err(|_| encode_error(ErrorCode::Overflow, value))?;
        self.write_opcode(MEMOIZE);
        if let Some(key) = key {
            self.memo.insert(key, id);
        }
        self.memo_len += 1;
        Ok(())
    }

    #[inline]
    fn write_opcode(&mut self, opcode: u8) {
        self.output.push(opcode);
    }

    fn write_u16(&mut self, value: u16) {
        let mut buf = [0; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.output.extend_from_slice(&buf);
    }

    fn write_u32(&mut self, value: u32) {
        let mut buf = [0; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.output.extend_from_slice(&buf);
    }

    fn write_i32(&mut self, value: i32) {
        let mut buf = [0; 4];
        LittleEndian::write_i32(&mut buf, value);
        self.output.extend_from_slice(&buf);
    }

    fn write_u64(&mut self, value: u64) {
        let mut buf = [0; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.output.extend_from_slice(&buf);
    }
}

fn encode_error(code: ErrorCode, value: &IValue) -> Error {
    Error::Encode { code, variant: value.type_name() }
}

/// Encode the values into a `Vec<u8>` buffer.
pub fn values_to_vec(roots: &[IValue], options: SerOptions) -> Result<Vec<u8>> {
    Pickler::new(options).pickle(roots)
}

/// Encode a single value into a `Vec<u8>` buffer.
#[inline]
pub fn value_to_vec(root: &IValue, options: SerOptions) -> Result<Vec<u8>> {
    values_to_vec(slice::from_ref(root), options)
}

/// Encode the values into a writer.  The stream is built in memory first,
/// so nothing is written if encoding fails.
pub fn values_to_writer<W: io::Write>(writer: &mut W, roots: &[IValue], options: SerOptions)
                                      -> Result<()> {
    let buffer = values_to_vec(roots, options)?;
    writer.write_all(&buffer).map_err(From::from)
}
