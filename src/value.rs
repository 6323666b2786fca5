// Copyright (c) 2015-2021 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Runtime values, and the hashable subset usable as dictionary keys.

use std::fmt;
use std::mem;
use std::any::Any;
use std::rc::Rc;
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use indexmap::IndexMap;

use crate::error::ErrorCode;
use crate::tensor::Tensor;

pub type List = Rc<RefCell<Vec<IValue>>>;
pub type Tuple = Rc<[IValue]>;
pub type Dict = Rc<RefCell<IndexMap<DictKey, IValue>>>;
pub type IntList = Rc<RefCell<Vec<i64>>>;

/// A tagged runtime value.
///
/// Strings, containers and tensors are reference counted.  Cloning an
/// `IValue` of those variants yields the *same* object, and a graph in which
/// one object is reachable along several paths keeps that sharing through a
/// pickle round-trip.  Use `is_same` to compare identity; `==` compares
/// structure.
#[derive(Clone, Debug)]
pub enum IValue {
    /// None
    None,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// Float
    Double(f64),
    /// Unicode string
    String(Rc<str>),
    /// Tensor handle
    Tensor(Tensor),
    /// Mutable list
    List(List),
    /// Immutable tuple
    Tuple(Tuple),
    /// Dictionary, iterated in insertion order
    Dict(Dict),
    /// Specialized list of integers
    IntList(IntList),
    /// Opaque host object; cannot be pickled
    Capsule(Capsule),
}

/// An opaque object owned by the host environment.
#[derive(Clone)]
pub struct Capsule(Rc<dyn Any>);

impl Capsule {
    pub fn new<T: Any>(object: T) -> Capsule {
        Capsule(Rc::new(object))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for Capsule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Capsule(..)")
    }
}

impl PartialEq for Capsule {
    fn eq(&self, other: &Capsule) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// The values that can be used as dictionary keys.
///
/// Doubles hash and compare by bit pattern; tensors by identity.  Integer
/// and double keys with the same numeric value are different keys.
#[derive(Clone, Debug)]
pub enum DictKey {
    None,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(Rc<str>),
    Tensor(Tensor),
}

impl IValue {
    pub fn string<S: Into<Rc<str>>>(s: S) -> IValue {
        IValue::String(s.into())
    }

    pub fn list(items: Vec<IValue>) -> IValue {
        IValue::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<IValue>) -> IValue {
        IValue::Tuple(Rc::from(items))
    }

    pub fn dict<I: IntoIterator<Item=(DictKey, IValue)>>(items: I) -> IValue {
        IValue::Dict(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn int_list(items: Vec<i64>) -> IValue {
        IValue::IntList(Rc::new(RefCell::new(items)))
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match *self {
            IValue::None       => "None",
            IValue::Bool(_)    => "Bool",
            IValue::Int(_)     => "Int",
            IValue::Double(_)  => "Double",
            IValue::String(_)  => "String",
            IValue::Tensor(_)  => "Tensor",
            IValue::List(_)    => "List",
            IValue::Tuple(_)   => "Tuple",
            IValue::Dict(_)    => "Dict",
            IValue::IntList(_) => "IntList",
            IValue::Capsule(_) => "Capsule",
        }
    }

    /// Whether both values are the same heap object.  Scalars are never the
    /// same object.
    pub fn is_same(&self, other: &IValue) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Address of the underlying allocation, for reference variants.
    pub(crate) fn identity(&self) -> Option<*const ()> {
        match *self {
            IValue::String(ref s)  => Some(Rc::as_ptr(s) as *const ()),
            IValue::Tensor(ref t)  => Some(t.as_ptr()),
            IValue::List(ref l)    => Some(Rc::as_ptr(l) as *const ()),
            IValue::Tuple(ref t)   => Some(Rc::as_ptr(t) as *const ()),
            IValue::Dict(ref d)    => Some(Rc::as_ptr(d) as *const ()),
            IValue::IntList(ref l) => Some(Rc::as_ptr(l) as *const ()),
            IValue::Capsule(ref c) => Some(Rc::as_ptr(&c.0) as *const ()),
            _ => None,
        }
    }

    /// The values a list, tuple or dict holds directly.  Other variants
    /// have none.
    pub(crate) fn children(&self) -> Vec<IValue> {
        match *self {
            IValue::List(ref l)  => l.borrow().clone(),
            IValue::Tuple(ref t) => t.to_vec(),
            IValue::Dict(ref d)  => d.borrow().values().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Convert the value into a dictionary key, if it is of a hashable kind.
    pub fn into_key(self) -> Result<DictKey, ErrorCode> {
        match self {
            IValue::None      => Ok(DictKey::None),
            IValue::Bool(b)   => Ok(DictKey::Bool(b)),
            IValue::Int(i)    => Ok(DictKey::Int(i)),
            IValue::Double(f) => Ok(DictKey::Double(f)),
            IValue::String(s) => Ok(DictKey::String(s)),
            IValue::Tensor(t) => Ok(DictKey::Tensor(t)),
            other => Err(ErrorCode::TypeMismatch("hashable dict key", other.type_name().into())),
        }
    }
}

impl DictKey {
    /// Convert the key into a value.  This always works.
    pub fn into_value(self) -> IValue {
        match self {
            DictKey::None      => IValue::None,
            DictKey::Bool(b)   => IValue::Bool(b),
            DictKey::Int(i)    => IValue::Int(i),
            DictKey::Double(f) => IValue::Double(f),
            DictKey::String(s) => IValue::String(s),
            DictKey::Tensor(t) => IValue::Tensor(t),
        }
    }

    pub fn to_value(&self) -> IValue {
        self.clone().into_value()
    }
}

impl From<bool> for IValue {
    fn from(b: bool) -> IValue { IValue::Bool(b) }
}

impl From<i64> for IValue {
    fn from(i: i64) -> IValue { IValue::Int(i) }
}

impl From<f64> for IValue {
    fn from(f: f64) -> IValue { IValue::Double(f) }
}

impl<'a> From<&'a str> for IValue {
    fn from(s: &'a str) -> IValue { IValue::string(s) }
}

impl From<String> for IValue {
    fn from(s: String) -> IValue { IValue::string(s) }
}

impl From<Tensor> for IValue {
    fn from(t: Tensor) -> IValue { IValue::Tensor(t) }
}

impl From<Vec<IValue>> for IValue {
    fn from(items: Vec<IValue>) -> IValue { IValue::list(items) }
}

impl<'a> From<&'a str> for DictKey {
    fn from(s: &'a str) -> DictKey { DictKey::String(s.into()) }
}

impl From<i64> for DictKey {
    fn from(i: i64) -> DictKey { DictKey::Int(i) }
}

impl From<bool> for DictKey {
    fn from(b: bool) -> DictKey { DictKey::Bool(b) }
}

/// Structural equality.  Doubles compare by their bit pattern, so a NaN
/// equals an identical NaN and `0.0` differs from `-0.0`; this matches what
/// survives a round-trip.
impl PartialEq for IValue {
    fn eq(&self, other: &IValue) -> bool {
        use self::IValue::*;
        match (self, other) {
            (&None, &None)                   => true,
            (&Bool(a), &Bool(b))             => a == b,
            (&Int(a), &Int(b))               => a == b,
            (&Double(a), &Double(b))         => a.to_bits() == b.to_bits(),
            (&String(ref a), &String(ref b)) => a == b,
            (&Tensor(ref a), &Tensor(ref b)) => a == b,
            (&List(ref a), &List(ref b))     => *a.borrow() == *b.borrow(),
            (&Tuple(ref a), &Tuple(ref b))   => a == b,
            (&Dict(ref a), &Dict(ref b))     => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (&IntList(ref a), &IntList(ref b)) => *a.borrow() == *b.borrow(),
            (&Capsule(ref a), &Capsule(ref b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for DictKey {
    fn eq(&self, other: &DictKey) -> bool {
        use self::DictKey::*;
        match (self, other) {
            (&None, &None)                   => true,
            (&Bool(a), &Bool(b))             => a == b,
            (&Int(a), &Int(b))               => a == b,
            (&Double(a), &Double(b))         => a.to_bits() == b.to_bits(),
            (&String(ref a), &String(ref b)) => a == b,
            (&Tensor(ref a), &Tensor(ref b)) => a.is_same(b),
            _ => false,
        }
    }
}

impl Eq for DictKey {}

impl Hash for DictKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match *self {
            DictKey::None          => {}
            DictKey::Bool(b)       => b.hash(state),
            DictKey::Int(i)        => i.hash(state),
            DictKey::Double(f)     => f.to_bits().hash(state),
            DictKey::String(ref s) => s.hash(state),
            DictKey::Tensor(ref t) => (t.as_ptr() as usize).hash(state),
        }
    }
}

fn write_elements<'a, I, T>(f: &mut fmt::Formatter, it: I,
                            prefix: &'static str, suffix: &'static str,
                            len: usize, always_comma: bool) -> fmt::Result
    where I: Iterator<Item=&'a T>, T: fmt::Display + 'a
{
    f.write_str(prefix)?;
    for (i, item) in it.enumerate() {
        if i < len - 1 || always_comma {
            write!(f, "{}, ", item)?;
        } else {
            write!(f, "{}", item)?;
        }
    }
    f.write_str(suffix)
}

impl fmt::Display for IValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            IValue::None          => write!(f, "None"),
            IValue::Bool(b)       => write!(f, "{}", if b { "True" } else { "False" }),
            IValue::Int(i)        => write!(f, "{}", i),
            IValue::Double(v)     => write!(f, "{:?}", v),
            IValue::String(ref s) => write!(f, "{:?}", s),
            IValue::Tensor(ref t) => write!(f, "{}", t),
            IValue::List(ref v)   => {
                let v = v.borrow();
                write_elements(f, v.iter(), "[", "]", v.len(), false)
            }
            IValue::Tuple(ref v)  => write_elements(f, v.iter(), "(", ")", v.len(), v.len() == 1),
            IValue::IntList(ref v) => {
                let v = v.borrow();
                write_elements(f, v.iter(), "[", "]", v.len(), false)
            }
            IValue::Dict(ref v) => {
                let v = v.borrow();
                write!(f, "{{")?;
                for (i, (key, value)) in v.iter().enumerate() {
                    if i < v.len() - 1 {
                        write!(f, "{}: {}, ", key, value)?;
                    } else {
                        write!(f, "{}: {}", key, value)?;
                    }
                }
                write!(f, "}}")
            }
            IValue::Capsule(_) => write!(f, "<capsule>"),
        }
    }
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DictKey::None          => write!(f, "None"),
            DictKey::Bool(b)       => write!(f, "{}", if b { "True" } else { "False" }),
            DictKey::Int(i)        => write!(f, "{}", i),
            DictKey::Double(v)     => write!(f, "{:?}", v),
            DictKey::String(ref s) => write!(f, "{:?}", s),
            DictKey::Tensor(ref t) => write!(f, "{}", t),
        }
    }
}
