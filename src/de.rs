// Copyright (c) 2015-2021 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! # Pickle deserialization
//!
//! Note: Pickles are not a declarative format, but a program for a stack-based
//! VM.  Each value that is decoded is simply put on the stack, and some
//! operations pop items from the stack and construct new data with them.
//!
//! The unpickler keeps a value stack, a stack of marks (stack depths saved by
//! MARK, delimiting the arguments of TUPLE, APPENDS and SETITEMS), and the
//! memo.  Memo lookups push the *same* object that was memoized, which is how
//! shared references survive a round-trip.
//!
//! Besides values, the stack can hold a few things that only make sense as
//! operands of REDUCE: class markers pushed by GLOBAL, raw bytes objects, and
//! argument tuples containing those.  They are rejected anywhere else.
//!
//! Adding to a list or dict is checked for cycles and for the nesting
//! limit.  Every container's depth is tracked as it is built.  A container
//! can only be reached from the values added to it if a memo lookup pushed
//! it again, so only those containers are searched, and only through
//! containers deeper than them.  That work is capped in proportion to the
//! input size.

use std::io;
use std::mem;
use std::str;
use std::rc::Rc;
use std::convert::TryFrom;
use std::collections::{HashMap, HashSet};
use byteorder::{ByteOrder, BigEndian, LittleEndian};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use log::{debug, trace, warn};

use crate::consts::*;
use crate::error::{Error, ErrorCode, Result};
use crate::tensor::Tensor;
use crate::value::IValue;

/// Node visits allowed for cycle checks and depth updates, per input byte.
const CHECK_WORK_PER_BYTE: usize = 64;
const CHECK_WORK_BASE: usize = 1 << 16;

/// Options for unpickling.
#[derive(Clone, Copy, Debug)]
pub struct DeOptions<'t> {
    tensor_table: Option<&'t [Tensor]>,
    deny_trailing_bytes: bool,
    max_depth: usize,
}

impl<'t> Default for DeOptions<'t> {
    fn default() -> Self {
        DeOptions { tensor_table: None, deny_trailing_bytes: false,
                    max_depth: DEFAULT_MAX_DEPTH }
    }
}

impl<'t> DeOptions<'t> {
    /// Construct with default options:
    ///
    /// - no tensor table; tensor references fail to resolve
    /// - bytes after the STOP opcode are ignored
    /// - containers may be nested 1000 levels deep
    pub fn new() -> Self {
        Default::default()
    }

    /// Resolve tensor references against `table`.
    pub fn tensor_table(mut self, table: &'t [Tensor]) -> Self {
        self.tensor_table = Some(table);
        self
    }

    /// Fail with `TrailingBytes` if anything follows the STOP opcode.
    pub fn deny_trailing_bytes(mut self) -> Self {
        self.deny_trailing_bytes = true;
        self
    }

    /// Fail with `NestingLimit` when containers (including argument tuples)
    /// nest deeper than `depth` levels.  Dropping, comparing, printing and
    /// encoding values recurse once per level, so raising the limit needs a
    /// correspondingly large stack.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

#[derive(Clone, Debug)]
enum Item<'a> {
    Value(IValue),
    Class(PicklerClass),
    Bytes(&'a [u8]),
    // Items and nesting depth.
    Args(Vec<Item<'a>>, usize),
}

impl<'a> Item<'a> {
    fn type_name(&self) -> &'static str {
        match *self {
            Item::Value(ref v) => v.type_name(),
            Item::Class(_)     => "class marker",
            Item::Bytes(_)     => "bytes",
            Item::Args(..)     => "argument tuple",
        }
    }
}

/// Decodes pickle streams into IValues.
pub struct Unpickler<'a> {
    data: &'a [u8],
    pos: usize,
    // Start of the instruction being executed.
    op_pos: usize,
    last_opcode: Option<u8>,
    stack: Vec<Item<'a>>,
    marks: Vec<usize>,
    memo: Vec<Item<'a>>,
    tensor_table: Option<&'a [Tensor]>,
    deny_trailing_bytes: bool,
    max_depth: usize,
    // Nesting depth of every container built so far, by identity.
    depths: HashMap<*const (), usize>,
    // Containers pushed again by a memo lookup.
    fetched: HashSet<*const ()>,
    // Node visits left for cycle checks and depth updates.
    budget: usize,
}

impl<'a> Unpickler<'a> {
    pub fn new(data: &'a [u8], options: DeOptions<'a>) -> Unpickler<'a> {
        Unpickler {
            data,
            pos: 0,
            op_pos: 0,
            last_opcode: None,
            stack: Vec::with_capacity(128),
            marks: Vec::with_capacity(16),
            memo: Vec::new(),
            tensor_table: options.tensor_table,
            deny_trailing_bytes: options.deny_trailing_bytes,
            max_depth: options.max_depth,
            depths: HashMap::new(),
            fetched: HashSet::new(),
            budget: data.len().saturating_mul(CHECK_WORK_PER_BYTE)
                              .saturating_add(CHECK_WORK_BASE),
        }
    }

    /// Run the pickle program until STOP, and return what is left on the
    /// stack.
    pub fn parse_ivalue_list(mut self) -> Result<Vec<IValue>> {
        loop {
            self.op_pos = self.pos;
            let op = self.read_u8()?;
            self.last_opcode = Some(op);
            trace!("{:>8}: {}", self.op_pos, opcode_name(op));
            match op {
                // Specials
                STOP => return self.finish(),
                MARK => self.marks.push(self.stack.len()),
                PROTO => {
                    let version = self.read_u8()?;
                    if !(2..=4).contains(&version) {
                        return self.error(ErrorCode::UnsupportedProtocol(version));
                    }
                }
                FRAME => {
                    // The frame length is only a hint; we have everything in memory.
                    self.read_bytes(8)?;
                }

                // Memo ops
                MEMOIZE => {
                    let id = self.memo.len();
                    self.put(id)?;
                }
                BINPUT => {
                    let id = self.read_u8()? as usize;
                    self.put(id)?;
                }
                LONG_BINPUT => {
                    let id = LittleEndian::read_u32(self.read_bytes(4)?) as usize;
                    self.put(id)?;
                }
                BINGET => {
                    let id = self.read_u8()? as u32;
                    self.get(id)?;
                }
                LONG_BINGET => {
                    let id = LittleEndian::read_u32(self.read_bytes(4)?);
                    self.get(id)?;
                }

                // Singletons
                NONE => self.push(IValue::None),
                NEWFALSE => self.push(IValue::Bool(false)),
                NEWTRUE => self.push(IValue::Bool(true)),

                // Binary-coded numbers
                BININT1 => {
                    let byte = self.read_u8()?;
                    self.push(IValue::Int(i64::from(byte)));
                }
                BININT2 => {
                    let bytes = self.read_bytes(2)?;
                    self.push(IValue::Int(i64::from(LittleEndian::read_u16(bytes))));
                }
                BININT => {
                    let bytes = self.read_bytes(4)?;
                    self.push(IValue::Int(i64::from(LittleEndian::read_i32(bytes))));
                }
                BINFLOAT => {
                    let bytes = self.read_bytes(8)?;
                    self.push(IValue::Double(BigEndian::read_f64(bytes)));
                }

                // Length-prefixed longs
                LONG1 => {
                    let len = self.read_u8()? as usize;
                    let bytes = self.read_bytes(len)?;
                    let long = self.decode_long(bytes)?;
                    self.push(long);
                }
                LONG4 => {
                    let len = LittleEndian::read_i32(self.read_bytes(4)?);
                    if len < 0 {
                        return self.error(ErrorCode::Overflow);
                    }
                    let bytes = self.read_bytes(len as usize)?;
                    let long = self.decode_long(bytes)?;
                    self.push(long);
                }

                // Length-prefixed strings
                SHORT_BINUNICODE => {
                    let len = self.read_u8()? as usize;
                    let string = self.read_bytes(len)?;
                    let decoded = self.decode_unicode(string)?;
                    self.push(decoded);
                }
                BINUNICODE => {
                    let len = self.read_u32_len()?;
                    let string = self.read_bytes(len)?;
                    let decoded = self.decode_unicode(string)?;
                    self.push(decoded);
                }
                BINUNICODE8 => {
                    let len = self.read_u64_len()?;
                    let string = self.read_bytes(len)?;
                    let decoded = self.decode_unicode(string)?;
                    self.push(decoded);
                }
                SHORT_BINBYTES => {
                    let len = self.read_u8()? as usize;
                    let bytes = self.read_bytes(len)?;
                    self.stack.push(Item::Bytes(bytes));
                }
                BINBYTES => {
                    let len = self.read_u32_len()?;
                    let bytes = self.read_bytes(len)?;
                    self.stack.push(Item::Bytes(bytes));
                }
                BINBYTES8 => {
                    let len = self.read_u64_len()?;
                    let bytes = self.read_bytes(len)?;
                    self.stack.push(Item::Bytes(bytes));
                }

                // Containers
                EMPTY_TUPLE => self.push_tuple(vec![])?,
                TUPLE1 => {
                    let item = self.pop()?;
                    self.push_tuple(vec![item])?;
                }
                TUPLE2 => {
                    let item2 = self.pop()?;
                    let item1 = self.pop()?;
                    self.push_tuple(vec![item1, item2])?;
                }
                TUPLE3 => {
                    let item3 = self.pop()?;
                    let item2 = self.pop()?;
                    let item1 = self.pop()?;
                    self.push_tuple(vec![item1, item2, item3])?;
                }
                TUPLE => {
                    let items = self.pop_mark()?;
                    self.push_tuple(items)?;
                }
                EMPTY_LIST => self.push_container(IValue::list(vec![]), 1)?,
                APPEND => {
                    let item = self.pop()?;
                    self.extend_list(vec![item])?;
                }
                APPENDS => {
                    let items = self.pop_mark()?;
                    self.extend_list(items)?;
                }
                EMPTY_DICT => self.push_container(IValue::dict(vec![]), 1)?,
                SETITEM => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    self.set_items(vec![key, value])?;
                }
                SETITEMS => {
                    let items = self.pop_mark()?;
                    self.set_items(items)?;
                }

                // Reserved classes
                GLOBAL => {
                    let modname = self.read_line()?;
                    let globname = self.read_line()?;
                    match PicklerClass::from_global(modname, globname) {
                        Some(cls) => self.stack.push(Item::Class(cls)),
                        None => return self.error(ErrorCode::UnknownGlobal(modname.into(),
                                                                           globname.into())),
                    }
                }
                REDUCE | NEWOBJ => self.reduce()?,
                BUILD => {
                    // Nothing we produce needs state; accept and drop it.
                    let state = self.pop()?;
                    let target = self.top()?;
                    warn!("discarding BUILD state {} for {} at offset {}",
                          state.type_name(), target.type_name(), self.op_pos);
                }

                code => return self.error(ErrorCode::UnknownOpcode(code))
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<IValue>> {
        if self.pos < self.data.len() {
            if self.deny_trailing_bytes {
                return Err(Error::Eval { code: ErrorCode::TrailingBytes, offset: self.pos,
                                         opcode: self.last_opcode });
            }
            warn!("ignoring {} trailing bytes after STOP", self.data.len() - self.pos);
        }
        let stack = mem::take(&mut self.stack);
        let mut values = Vec::with_capacity(stack.len());
        for item in stack {
            values.push(self.into_value(item)?);
        }
        debug!("unpickled {} roots from {} bytes ({} memo entries)",
               values.len(), self.pos, self.memo.len());
        Ok(values)
    }

    fn push(&mut self, value: IValue) {
        self.stack.push(Item::Value(value));
    }

    /// Push a newly built list, tuple or dict that is `depth` levels deep.
    fn push_container(&mut self, value: IValue, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return self.error(ErrorCode::NestingLimit(self.max_depth));
        }
        if let Some(ptr) = container_ptr(&value) {
            // The address may have belonged to an object that is gone.
            self.depths.insert(ptr, depth);
            self.fetched.remove(&ptr);
        }
        self.push(value);
        Ok(())
    }

    /// Push a tuple of values, or an argument tuple if any item is not a
    /// value.
    fn push_tuple(&mut self, items: Vec<Item<'a>>) -> Result<()> {
        let depth = 1 + items.iter().map(|item| self.item_depth(item)).max().unwrap_or(0);
        if items.iter().all(|item| match *item { Item::Value(_) => true, _ => false }) {
            let values = items.into_iter().filter_map(|item| match item {
                Item::Value(value) => Some(value),
                _ => None,
            }).collect();
            self.push_container(IValue::tuple(values), depth)
        } else if depth > self.max_depth {
            self.error(ErrorCode::NestingLimit(self.max_depth))
        } else {
            self.stack.push(Item::Args(items, depth));
            Ok(())
        }
    }

    fn depth_of(&self, value: &IValue) -> usize {
        match container_ptr(value) {
            Some(ptr) => self.depths.get(&ptr).copied().unwrap_or(1),
            None => 0,
        }
    }

    fn item_depth(&self, item: &Item<'a>) -> usize {
        match *item {
            Item::Value(ref value) => self.depth_of(value),
            Item::Args(_, depth) => depth,
            _ => 0,
        }
    }

    /// Pop the stack top; the stack can't be popped below the last mark.
    fn pop(&mut self) -> Result<Item<'a>> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() > floor {
            if let Some(item) = self.stack.pop() {
                return Ok(item);
            }
        }
        self.error(ErrorCode::StackUnderflow)
    }

    fn top(&self) -> Result<&Item<'a>> {
        let floor = self.marks.last().copied().unwrap_or(0);
        match self.stack.last() {
            Some(item) if self.stack.len() > floor => Ok(item),
            _ => self.error(ErrorCode::StackUnderflow),
        }
    }

    fn pop_mark(&mut self) -> Result<Vec<Item<'a>>> {
        match self.marks.pop() {
            Some(mark) if mark <= self.stack.len() => Ok(self.stack.split_off(mark)),
            _ => self.error(ErrorCode::StackUnderflow),
        }
    }

    fn put(&mut self, id: usize) -> Result<()> {
        if id != self.memo.len() {
            let expected = u32::try_from(self.memo.len()).unwrap_or(u32::MAX);
            let found = u32::try_from(id).unwrap_or(u32::MAX);
            return self.error(ErrorCode::MemoGap { expected, found });
        }
        let top = self.top()?.clone();
        self.memo.push(top);
        Ok(())
    }

    fn get(&mut self, id: u32) -> Result<()> {
        let item = match self.memo.get(id as usize) {
            Some(item) => item.clone(),
            None => return self.error(ErrorCode::MemoMiss(id)),
        };
        if let Item::Value(ref value) = item {
            if let Some(ptr) = container_ptr(value) {
                self.fetched.insert(ptr);
            }
        }
        self.stack.push(item);
        Ok(())
    }

    fn extend_list(&mut self, items: Vec<Item<'a>>) -> Result<()> {
        let list = match *self.top()? {
            Item::Value(IValue::List(ref list)) => list.clone(),
            ref other => return self.error(ErrorCode::TypeMismatch("List",
                                                                   other.type_name().into())),
        };
        let target = Rc::as_ptr(&list) as *const ();
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(self.into_value(item)?);
        }
        let deepened = self.check_links(target, &values)?;
        list.borrow_mut().extend(values);
        if deepened {
            self.refresh_depths()?;
        }
        Ok(())
    }

    fn set_items(&mut self, items: Vec<Item<'a>>) -> Result<()> {
        let dict = match *self.top()? {
            Item::Value(IValue::Dict(ref dict)) => dict.clone(),
            ref other => return self.error(ErrorCode::TypeMismatch("Dict",
                                                                   other.type_name().into())),
        };
        if items.len() % 2 != 0 {
            return self.error(ErrorCode::TypeMismatch(
                "key/value pairs", format!("{} items", items.len())));
        }
        let target = Rc::as_ptr(&dict) as *const ();
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            let key = match self.into_value(key)?.into_key() {
                Ok(key) => key,
                Err(code) => return self.error(code),
            };
            pairs.push((key, self.into_value(value)?));
        }
        let deepened = self.check_links(target, pairs.iter().map(|&(_, ref value)| value))?;
        dict.borrow_mut().extend(pairs);
        if deepened {
            self.refresh_depths()?;
        }
        Ok(())
    }

    /// Check that adding `values` to the container `target` closes no cycle
    /// and stays within the nesting limit, and record its new depth.
    /// Returns true if a container that others may hold got deeper; their
    /// recorded depths are stale then.
    fn check_links<'v, I>(&mut self, target: *const (), values: I) -> Result<bool>
        where I: IntoIterator<Item = &'v IValue>
    {
        // Without a memo lookup of the target, the stack slot below the
        // values is its only handle, and nothing being added can hold it.
        let fetched = self.fetched.contains(&target);
        let old_depth = self.depths.get(&target).copied().unwrap_or(1);
        let mut depth = old_depth;
        for value in values {
            if fetched && self.leads_to(value, target, old_depth)? {
                return self.error(ErrorCode::Recursive);
            }
            depth = depth.max(self.depth_of(value) + 1);
        }
        if depth > self.max_depth {
            return self.error(ErrorCode::NestingLimit(self.max_depth));
        }
        self.depths.insert(target, depth);
        Ok(fetched && depth > old_depth)
    }

    /// Whether the container `target`, `target_depth` levels deep, can be
    /// reached from `value`.  Only deeper containers can hold it, so no
    /// other container is entered.
    fn leads_to(&mut self, value: &IValue, target: *const (),
                target_depth: usize) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut todo = vec![value.clone()];
        while let Some(value) = todo.pop() {
            let ptr = match container_ptr(&value) {
                Some(ptr) => ptr,
                None => continue,
            };
            if ptr == target {
                return Ok(true);
            }
            if self.depth_of(&value) <= target_depth || !seen.insert(ptr) {
                continue;
            }
            let children = value.children();
            self.spend(1 + children.len())?;
            todo.extend(children);
        }
        Ok(false)
    }

    /// Recompute the depth of every container reachable from the stack or
    /// the memo.
    fn refresh_depths(&mut self) -> Result<()> {
        enum Step { Enter(IValue), Leave(IValue, *const ()) }

        self.spend(self.stack.len() + self.memo.len())?;
        let mut todo = Vec::new();
        let mut items: Vec<&Item<'a>> = self.stack.iter().chain(self.memo.iter()).collect();
        while let Some(item) = items.pop() {
            match *item {
                Item::Value(ref value) => todo.push(Step::Enter(value.clone())),
                Item::Args(ref inner, _) => items.extend(inner.iter()),
                _ => {}
            }
        }

        let mut depths = HashMap::new();
        while let Some(step) = todo.pop() {
            match step {
                Step::Enter(value) => {
                    let ptr = match container_ptr(&value) {
                        Some(ptr) => ptr,
                        None => continue,
                    };
                    if depths.contains_key(&ptr) {
                        continue;
                    }
                    let children = value.children();
                    self.spend(1 + children.len())?;
                    todo.push(Step::Leave(value, ptr));
                    todo.extend(children.into_iter().map(Step::Enter));
                }
                // Values are acyclic, so all children are done by now.
                Step::Leave(value, ptr) => {
                    let depth = 1 + value.children().iter()
                        .filter_map(container_ptr)
                        .map(|child| depths.get(&child).copied().unwrap_or(1))
                        .max().unwrap_or(0);
                    if depth > self.max_depth {
                        return self.error(ErrorCode::NestingLimit(self.max_depth));
                    }
                    depths.insert(ptr, depth);
                }
            }
        }
        trace!("refreshed depths of {} containers", depths.len());
        self.depths.extend(depths);
        Ok(())
    }

    fn spend(&mut self, work: usize) -> Result<()> {
        match self.budget.checked_sub(work) {
            Some(left) => {
                self.budget = left;
                Ok(())
            }
            None => self.error(ErrorCode::CheckBudget),
        }
    }

    /// Apply a class marker to its argument tuple.
    fn reduce(&mut self) -> Result<()> {
        let args = self.pop()?;
        let cls = match self.pop()? {
            Item::Class(cls) => cls,
            other => return self.error(ErrorCode::TypeMismatch("class marker",
                                                               other.type_name().into())),
        };
        let args = match args {
            Item::Value(IValue::Tuple(items)) => items.iter().cloned().map(Item::Value).collect(),
            Item::Args(items, _) => items,
            other => return self.error(ErrorCode::TypeMismatch("argument tuple",
                                                               other.type_name().into())),
        };
        let value = match (cls, args.as_slice()) {
            (PicklerClass::Tensor, [Item::Value(IValue::Int(index))]) => {
                let table = self.tensor_table.unwrap_or(&[]);
                match usize::try_from(*index).ok().and_then(|i| table.get(i)) {
                    Some(tensor) => IValue::Tensor(tensor.clone()),
                    None => return self.error(ErrorCode::MissingTensor(*index)),
                }
            }
            (PicklerClass::IntList, [Item::Value(IValue::List(list))]) => {
                let list = list.borrow();
                let mut ints = Vec::with_capacity(list.len());
                for item in list.iter() {
                    match *item {
                        IValue::Int(i) => ints.push(i),
                        ref other => return self.error(ErrorCode::TypeMismatch(
                            "Int", other.type_name().into())),
                    }
                }
                IValue::int_list(ints)
            }
            (PicklerClass::LiteralTensor, [Item::Bytes(bytes)]) => {
                match Tensor::from_literal(bytes) {
                    Ok(tensor) => IValue::Tensor(tensor),
                    Err(code) => return self.error(code),
                }
            }
            (cls, args) => {
                let expected = match cls {
                    PicklerClass::Tensor        => "(Int,)",
                    PicklerClass::IntList       => "(List,)",
                    PicklerClass::LiteralTensor => "(bytes,)",
                };
                let got = args.iter().map(Item::type_name).collect::<Vec<_>>().join(", ");
                return self.error(ErrorCode::TypeMismatch(expected, format!("({})", got)));
            }
        };
        self.push(value);
        Ok(())
    }

    fn into_value(&self, item: Item<'a>) -> Result<IValue> {
        match item {
            Item::Value(value) => Ok(value),
            other => self.error(ErrorCode::TypeMismatch("value", other.type_name().into())),
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        match self.data.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => self.truncated(),
        }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let data = self.data;
        if n > data.len() - self.pos {
            return self.truncated();
        }
        let bytes = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_u32_len(&mut self) -> Result<usize> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_u32(bytes) as usize)
    }

    fn read_u64_len(&mut self) -> Result<usize> {
        let len = LittleEndian::read_u64(self.read_bytes(8)?);
        match usize::try_from(len) {
            Ok(len) => Ok(len),
            // Can't possibly be in memory.
            Err(_) => self.truncated(),
        }
    }

    fn read_line(&mut self) -> Result<&'a [u8]> {
        let data = self.data;
        let rest = &data[self.pos..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(n) => {
                self.pos += n + 1;
                Ok(&rest[..n])
            }
            None => self.truncated(),
        }
    }

    fn decode_long(&self, bytes: &[u8]) -> Result<IValue> {
        match BigInt::from_signed_bytes_le(bytes).to_i64() {
            Some(i) => Ok(IValue::Int(i)),
            None => self.error(ErrorCode::Overflow),
        }
    }

    fn decode_unicode(&self, string: &[u8]) -> Result<IValue> {
        match str::from_utf8(string) {
            Ok(s) => Ok(IValue::string(s)),
            Err(_) => self.error(ErrorCode::Utf8),
        }
    }

    fn truncated<T>(&self) -> Result<T> {
        Err(Error::Eval { code: ErrorCode::Truncated, offset: self.pos,
                          opcode: self.last_opcode })
    }

    fn error<T>(&self, reason: ErrorCode) -> Result<T> {
        Err(Error::Eval { code: reason, offset: self.op_pos, opcode: self.last_opcode })
    }
}

fn container_ptr(value: &IValue) -> Option<*const ()> {
    match *value {
        IValue::List(_) | IValue::Tuple(_) | IValue::Dict(_) => value.identity(),
        _ => None,
    }
}

/// Decodes the values from a byte slice `&[u8]`.
pub fn values_from_slice(data: &[u8], options: DeOptions) -> Result<Vec<IValue>> {
    Unpickler::new(data, options).parse_ivalue_list()
}

/// Decodes a stream holding exactly one value from a byte slice `&[u8]`.
pub fn value_from_slice(data: &[u8], options: DeOptions) -> Result<IValue> {
    let mut values = values_from_slice(data, options)?;
    if values.len() == 1 {
        if let Some(value) = values.pop() {
            return Ok(value);
        }
    }
    Err(Error::Syntax(ErrorCode::TypeMismatch("a single root value",
                                              format!("{} roots", values.len()))))
}

/// Decodes the values from a `std::io::Read`.  The whole input is read into
/// memory first.
pub fn values_from_reader<R: io::Read>(mut rdr: R, options: DeOptions) -> Result<Vec<IValue>> {
    let mut data = Vec::new();
    rdr.read_to_end(&mut data)?;
    values_from_slice(&data, options)
}
