// Copyright (c) 2015-2016 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Serialize/Deserialize implementations for `value::IValue`, so values can
//! be exchanged with other serde data formats.
//!
//! Lists, tuples and int lists all serialize as sequences, and sequences
//! deserialize as lists.  Tensors serialize as a struct of dtype, sizes and
//! raw data; they cannot be deserialized.  Sharing is not preserved.

use std::fmt;
use std::result::Result as StdResult;
use serde::{ser, de};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, SerializeStruct};
use serde::de::{Deserialize, Visitor};

use crate::tensor::Tensor;
use crate::value::{IValue, DictKey};

impl Serialize for IValue {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        match *self {
            IValue::None          => serializer.serialize_none(),
            IValue::Bool(b)       => serializer.serialize_bool(b),
            IValue::Int(i)        => serializer.serialize_i64(i),
            IValue::Double(f)     => serializer.serialize_f64(f),
            IValue::String(ref s) => serializer.serialize_str(s),
            IValue::Tensor(ref t) => t.serialize(serializer),
            IValue::List(ref l)   => {
                let l = l.borrow();
                let mut seq = serializer.serialize_seq(Some(l.len()))?;
                for item in l.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            IValue::Tuple(ref t)  => {
                let mut seq = serializer.serialize_seq(Some(t.len()))?;
                for item in t.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            IValue::IntList(ref l) => {
                let l = l.borrow();
                let mut seq = serializer.serialize_seq(Some(l.len()))?;
                for item in l.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            IValue::Dict(ref d) => {
                let d = d.borrow();
                let mut map = serializer.serialize_map(Some(d.len()))?;
                for (key, value) in d.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            IValue::Capsule(_) => Err(ser::Error::custom("cannot serialize Capsule values")),
        }
    }
}

impl Serialize for DictKey {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        match *self {
            DictKey::None          => serializer.serialize_none(),
            DictKey::Bool(b)       => serializer.serialize_bool(b),
            DictKey::Int(i)        => serializer.serialize_i64(i),
            DictKey::Double(f)     => serializer.serialize_f64(f),
            DictKey::String(ref s) => serializer.serialize_str(s),
            DictKey::Tensor(ref t) => t.serialize(serializer),
        }
    }
}

impl Serialize for Tensor {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("Tensor", 3)?;
        st.serialize_field("dtype", self.dtype().name())?;
        st.serialize_field("sizes", self.sizes())?;
        st.serialize_field("data", self.data())?;
        st.end()
    }
}

impl<'de> Deserialize<'de> for IValue {
    fn deserialize<D: de::Deserializer<'de>>(deser: D) -> StdResult<IValue, D::Error> {
        struct IValueVisitor;

        impl<'de> Visitor<'de> for IValueVisitor {
            type Value = IValue;

            fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
                fmt.write_str("any value representable as an IValue")
            }

            #[inline]
            fn visit_bool<E>(self, value: bool) -> StdResult<IValue, E> {
                Ok(IValue::Bool(value))
            }

            #[inline]
            fn visit_i64<E>(self, value: i64) -> StdResult<IValue, E> {
                Ok(IValue::Int(value))
            }

            #[inline]
            fn visit_u64<E: de::Error>(self, value: u64) -> StdResult<IValue, E> {
                if value < 0x8000_0000_0000_0000 {
                    Ok(IValue::Int(value as i64))
                } else {
                    Err(E::custom(format!("integer {} does not fit into an Int", value)))
                }
            }

            #[inline]
            fn visit_f64<E>(self, value: f64) -> StdResult<IValue, E> {
                Ok(IValue::Double(value))
            }

            #[inline]
            fn visit_str<E>(self, value: &str) -> StdResult<IValue, E> {
                Ok(IValue::string(value))
            }

            #[inline]
            fn visit_string<E>(self, value: String) -> StdResult<IValue, E> {
                Ok(IValue::string(value))
            }

            #[inline]
            fn visit_none<E>(self) -> StdResult<IValue, E> {
                Ok(IValue::None)
            }

            #[inline]
            fn visit_some<D: de::Deserializer<'de>>(self, deser: D) -> StdResult<IValue, D::Error> {
                Deserialize::deserialize(deser)
            }

            #[inline]
            fn visit_unit<E>(self) -> StdResult<IValue, E> {
                Ok(IValue::None)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> StdResult<IValue, A::Error> {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(IValue::list(items))
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> StdResult<IValue, A::Error> {
                let mut items = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<IValue, IValue>()? {
                    let key = key.into_key().map_err(<A::Error as de::Error>::custom)?;
                    items.push((key, value));
                }
                Ok(IValue::dict(items))
            }
        }

        deser.deserialize_any(IValueVisitor)
    }
}
