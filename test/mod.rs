// Copyright (c) 2015-2016 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.


use crate::IValue;

/// The sequence of memoized objects met in a depth-first walk, each
/// replaced by the position of its first occurrence.  Two graphs with the
/// same layout share the same objects in the same places.
fn shared_layout(roots: &[IValue]) -> Vec<usize> {
    fn walk(value: &IValue, seen: &mut Vec<IValue>, out: &mut Vec<usize>) {
        let memoized = match *value {
            IValue::String(ref s) => !s.is_empty(),
            IValue::List(_) | IValue::Tuple(_) | IValue::Dict(_) |
            IValue::IntList(_) | IValue::Tensor(_) => true,
            _ => false,
        };
        if memoized {
            if let Some(i) = seen.iter().position(|v| v.is_same(value)) {
                out.push(i);
                return;
            }
            out.push(seen.len());
            seen.push(value.clone());
        }
        match *value {
            IValue::List(ref l) => for item in l.borrow().iter() { walk(item, seen, out) },
            IValue::Tuple(ref t) => for item in t.iter() { walk(item, seen, out) },
            IValue::Dict(ref d) => for item in d.borrow().values() { walk(item, seen, out) },
            _ => {}
        }
    }
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for root in roots {
        walk(root, &mut seen, &mut out);
    }
    out
}

mod encode_tests {
    use crate::{value_to_vec, values_to_vec, values_to_writer, value_from_slice, values_from_slice,
                SerOptions, DeOptions};
    use crate::{IValue, DictKey, Capsule, Tensor, ScalarType};
    use crate::error::{Error, ErrorCode};

    fn encode(value: &IValue) -> Vec<u8> {
        value_to_vec(value, SerOptions::new()).unwrap()
    }

    /// The instructions for the value, without PROTO and STOP.
    fn body(value: &IValue) -> Vec<u8> {
        let vec = encode(value);
        assert_eq!(&vec[..2], b"\x80\x02");
        assert_eq!(vec[vec.len() - 1], b'.');
        vec[2..vec.len() - 1].to_vec()
    }

    #[test]
    fn encode_scalars() {
        assert_eq!(body(&IValue::None), b"N");
        assert_eq!(body(&IValue::Bool(true)), b"\x88");
        assert_eq!(body(&IValue::Bool(false)), b"\x89");
        assert_eq!(body(&IValue::Int(1)), b"K\x01");
        assert_eq!(body(&IValue::Int(300)), b"M\x2c\x01");
        assert_eq!(body(&IValue::Int(65536)), b"J\x00\x00\x01\x00");
        assert_eq!(body(&IValue::Int(-1)), b"J\xff\xff\xff\xff");
        assert_eq!(body(&IValue::Int(1 << 31)), b"\x8a\x05\x00\x00\x00\x80\x00");
        assert_eq!(body(&IValue::Int(-(1 << 31) - 1)), b"\x8a\x05\xff\xff\xff\x7f\xff");
        assert_eq!(body(&IValue::Int(i64::min_value())),
                   b"\x8a\x08\x00\x00\x00\x00\x00\x00\x00\x80");
        assert_eq!(body(&IValue::Double(1.5)), b"G\x3f\xf8\x00\x00\x00\x00\x00\x00");
        assert_eq!(body(&IValue::string("hi")), b"\x8c\x02hi\x94");
        assert_eq!(body(&IValue::string("")), b"\x8c\x00");
    }

    #[test]
    fn encode_scalar_roots() {
        let roots = vec![
            IValue::None, IValue::Bool(true), IValue::Bool(false),
            IValue::Int(0), IValue::Int(1), IValue::Int(-1), IValue::Int(127),
            IValue::Int(128), IValue::Int(65535), IValue::Int(65536),
            IValue::Int(-(1 << 31)), IValue::Int(1 << 31), IValue::Double(3.14),
        ];
        let vec = values_to_vec(&roots, SerOptions::new()).unwrap();
        let expected: &[u8] = b"\x80\x02N\x88\x89K\x00K\x01J\xff\xff\xff\xffK\x7fK\x80\
                                M\xff\xffJ\x00\x00\x01\x00J\x00\x00\x00\x80\
                                \x8a\x05\x00\x00\x00\x80\x00\
                                G\x40\x09\x1e\xb8\x51\xeb\x85\x1f.";
        assert_eq!(vec, expected);
        assert_eq!(values_from_slice(&vec, DeOptions::new()).unwrap(), roots);
    }

    #[test]
    fn encode_nested_dict() {
        let dict = IValue::dict(vec![
            (DictKey::from("k"), IValue::list(vec![IValue::Int(1), IValue::Int(2)])),
            (DictKey::from("m"), IValue::dict(vec![(DictKey::from("inner"), IValue::Bool(true))])),
        ]);
        let tripped = value_from_slice(&encode(&dict), DeOptions::new()).unwrap();
        assert_eq!(tripped, dict);
        match tripped {
            IValue::Dict(ref d) => {
                let keys: Vec<String> = d.borrow().keys().map(|k| k.to_string()).collect();
                assert_eq!(keys, vec!["\"k\"", "\"m\""]);
            }
            ref other => panic!("unexpected value {}", other),
        }
    }

    #[test]
    fn encode_large_ints() {
        for &i in &[1 << 31, -(1 << 31) - 1, i64::max_value(), i64::min_value(), 1 << 40] {
            let value = IValue::Int(i);
            assert_eq!(value_from_slice(&encode(&value), DeOptions::new()).unwrap(), value);
        }
    }

    #[test]
    fn encode_framing() {
        assert_eq!(values_to_vec(&[], SerOptions::new()).unwrap(), b"\x80\x02.");
        let roots = vec![IValue::Int(1), IValue::None];
        assert_eq!(values_to_vec(&roots, SerOptions::new()).unwrap(), b"\x80\x02K\x01N.");
        let mut out = Vec::new();
        values_to_writer(&mut out, &roots, SerOptions::new()).unwrap();
        assert_eq!(out, b"\x80\x02K\x01N.");
    }

    #[test]
    fn encode_long_string() {
        let long = "x".repeat(300);
        let vec = body(&IValue::string(long.as_str()));
        assert_eq!(&vec[..5], b"X\x2c\x01\x00\x00");
        assert_eq!(&vec[5..305], long.as_bytes());
        assert_eq!(&vec[305..], b"\x94");
    }

    #[test]
    fn encode_shared_list() {
        let inner = IValue::list(vec![IValue::Int(1)]);
        let outer = IValue::list(vec![inner.clone(), inner]);
        assert_eq!(body(&outer), b"]\x94(]\x94(K\x01eh\x01e");
        let tripped = value_from_slice(&encode(&outer), DeOptions::new()).unwrap();
        assert_eq!(tripped, outer);
        match tripped {
            IValue::List(ref l) => {
                let l = l.borrow();
                assert!(l[0].is_same(&l[1]));
            }
            ref other => panic!("unexpected value {}", other),
        }
    }

    #[test]
    fn encode_shared_string() {
        let s = IValue::string("abc");
        let list = IValue::list(vec![s.clone(), s.clone(), IValue::string("abc")]);
        assert_eq!(body(&list), b"]\x94(\x8c\x03abc\x94h\x01\x8c\x03abc\x94e");
    }

    #[test]
    fn encode_long_memo_ids() {
        // The list takes memo id 0 and the strings 1 to 300, so references
        // past id 255 need LONG_BINGET.
        let strings: Vec<_> = (0..300).map(|i| IValue::string(format!("s{}", i))).collect();
        let items = strings.iter().chain(strings.iter()).cloned().collect();
        let list = IValue::list(items);
        let body = body(&list);
        assert!(body.windows(7).any(|w| w == b"h\xffj\x00\x01\x00\x00"));
        assert!(body.ends_with(b"j\x2c\x01\x00\x00e"));

        let tripped = value_from_slice(&encode(&list), DeOptions::new()).unwrap();
        assert_eq!(tripped, list);
        let items = match tripped {
            IValue::List(ref l) => l.borrow().clone(),
            ref other => panic!("unexpected value {:?}", other),
        };
        for i in 0..300 {
            assert!(items[i].is_same(&items[i + 300]));
        }
        assert!(!items[0].is_same(&items[1]));
    }

    #[test]
    fn encode_dict_order() {
        let inner = IValue::dict(vec![(DictKey::from("z"), IValue::Int(1)),
                                      (DictKey::from("a"), IValue::Int(2))]);
        let dict = IValue::dict(vec![(DictKey::Int(5), inner),
                                     (DictKey::Bool(true), IValue::None)]);
        assert_eq!(body(&dict),
                   &b"}\x94(K\x05}\x94(\x8c\x01z\x94K\x01\x8c\x01a\x94K\x02u\x88Nu"[..]);
        let tripped = value_from_slice(&encode(&dict), DeOptions::new()).unwrap();
        assert_eq!(tripped, dict);
        assert_eq!(format!("{}", tripped), r#"{5: {"z": 1, "a": 2}, True: None}"#);
    }

    #[test]
    fn encode_tuples() {
        assert_eq!(body(&IValue::tuple(vec![])), b")");
        assert_eq!(body(&IValue::tuple(vec![IValue::Int(1)])), b"K\x01\x85");
        assert_eq!(body(&IValue::tuple(vec![IValue::Int(1), IValue::Int(2)])),
                   b"K\x01K\x02\x86");
        assert_eq!(body(&IValue::tuple(vec![IValue::None, IValue::None, IValue::None])),
                   b"NNN\x87");
        assert_eq!(body(&IValue::tuple(vec![IValue::None; 4])), b"(NNNNt");
        for arity in 0..6 {
            let tuple = IValue::tuple((0..arity).map(IValue::Int).collect());
            assert_eq!(value_from_slice(&encode(&tuple), DeOptions::new()).unwrap(), tuple);
        }
    }

    #[test]
    fn encode_shared_tuple() {
        let tuple = IValue::tuple(vec![IValue::Int(1)]);
        let list = IValue::list(vec![tuple.clone(), tuple]);
        assert_eq!(body(&list), b"]\x94(K\x01\x85\x94h\x01e");
        let tripped = value_from_slice(&encode(&list), DeOptions::new()).unwrap();
        match tripped {
            IValue::List(ref l) => assert!(l.borrow()[0].is_same(&l.borrow()[1])),
            ref other => panic!("unexpected value {}", other),
        }
        // Equal, but distinct tuples are not memoized.
        let list = IValue::list(vec![IValue::tuple(vec![IValue::Int(1)]),
                                     IValue::tuple(vec![IValue::Int(1)])]);
        assert_eq!(body(&list), b"]\x94(K\x01\x85K\x01\x85e");
    }

    #[test]
    fn encode_int_list() {
        let ints = IValue::int_list(vec![1, 2]);
        assert_eq!(body(&ints), &b"c__main__\nIntList\n]\x94(K\x01K\x02e\x85R\x94"[..]);
        let tripped = value_from_slice(&encode(&ints), DeOptions::new()).unwrap();
        assert_eq!(tripped.type_name(), "IntList");
        assert_eq!(tripped, ints);
        // The inner list takes memo slot 0, the int list slot 1.
        let list = IValue::list(vec![ints.clone(), ints]);
        let vec = body(&list);
        assert_eq!(&vec[vec.len() - 3..], b"h\x02e");
    }

    #[test]
    fn encode_tensor_table() {
        let tensor = Tensor::from_f32(vec![2], &[1.0, 2.0]).unwrap();
        let value = IValue::Tensor(tensor.clone());
        let mut table = Vec::new();
        let vec = value_to_vec(&value, SerOptions::new().tensor_table(&mut table)).unwrap();
        assert_eq!(vec, &b"\x80\x02c__main__\nTensorID\nK\x00\x85R."[..]);
        assert_eq!(table.len(), 1);
        assert!(table[0].is_same(&tensor));

        let tripped = value_from_slice(&vec, DeOptions::new().tensor_table(&table)).unwrap();
        match tripped {
            IValue::Tensor(ref t) => assert!(t.is_same(&tensor)),
            ref other => panic!("unexpected value {}", other),
        }
        match value_from_slice(&vec, DeOptions::new()) {
            Err(Error::Eval { code: ErrorCode::MissingTensor(0), .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn encode_literal_tensor() {
        let tensor = Tensor::from_i64(vec![2, 2], &[1, 2, 3, 4]).unwrap();
        let list = IValue::list(vec![IValue::Tensor(tensor.clone()),
                                     IValue::Tensor(tensor.clone())]);
        let vec = encode(&list);
        assert_eq!(&vec[5..29], &b"c__main__\nLiteralTensor\n"[..]);
        assert_eq!(&vec[29..34], b"B\x3d\x00\x00\x00");
        let tripped = value_from_slice(&vec, DeOptions::new()).unwrap();
        assert_eq!(tripped, list);
        match tripped {
            IValue::List(ref l) => {
                let l = l.borrow();
                assert!(l[0].is_same(&l[1]));
                match l[0] {
                    IValue::Tensor(ref t) => {
                        assert_eq!(t.dtype(), ScalarType::Int64);
                        assert_eq!(t.sizes(), &[2, 2]);
                        assert!(!t.is_same(&tensor));
                    }
                    ref other => panic!("unexpected value {}", other),
                }
            }
            ref other => panic!("unexpected value {}", other),
        }
    }

    #[test]
    fn encode_failures() {
        let bad = Tensor::from_raw_parts(ScalarType::Float32, vec![3], vec![0; 4]);
        match value_to_vec(&IValue::Tensor(bad), SerOptions::new()) {
            Err(Error::Encode { code: ErrorCode::TensorEncoding(_), variant: "Tensor" }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        let capsule = IValue::list(vec![IValue::Capsule(Capsule::new(5u32))]);
        match value_to_vec(&capsule, SerOptions::new()) {
            Err(Error::Encode { code: ErrorCode::Unsupported("Capsule"), .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn encode_recursive() {
        let list = IValue::list(vec![]);
        let inner = match list {
            IValue::List(ref l) => l.clone(),
            _ => unreachable!(),
        };
        inner.borrow_mut().push(IValue::tuple(vec![list.clone()]));
        match value_to_vec(&list, SerOptions::new()) {
            Err(Error::Encode { code: ErrorCode::Recursive, .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        // Break the cycle so the test doesn't leak.
        inner.borrow_mut().clear();
    }

    fn nested(depth: usize) -> IValue {
        let mut value = IValue::list(vec![]);
        for _ in 1..depth {
            value = IValue::list(vec![value]);
        }
        value
    }

    #[test]
    fn encode_nesting_limit() {
        let value = nested(50);
        match value_to_vec(&value, SerOptions::new().max_depth(10)) {
            Err(Error::Encode { code: ErrorCode::NestingLimit(10), variant: "List" }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        // Shared containers count once, at their first occurrence.
        let inner = nested(8);
        let pair = IValue::tuple(vec![inner.clone(), IValue::list(vec![inner])]);
        assert!(value_to_vec(&pair, SerOptions::new().max_depth(9)).is_ok());

        let vec = value_to_vec(&value, SerOptions::new().max_depth(50)).unwrap();
        assert_eq!(value_from_slice(&vec, DeOptions::new()).unwrap(), value);
        match value_from_slice(&vec, DeOptions::new().max_depth(49)) {
            Err(Error::Eval { code: ErrorCode::NestingLimit(49), .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn encode_deterministic() {
        let shared = IValue::string("shared");
        let value = IValue::list(vec![
            shared.clone(),
            IValue::dict(vec![(DictKey::from("k"), shared), (DictKey::Int(1), IValue::Double(0.5))]),
            IValue::int_list(vec![-5, 1 << 40]),
        ]);
        assert_eq!(encode(&value), encode(&value));
    }
}

mod decode_tests {
    use std::io::Cursor;
    use crate::{values_from_slice, value_from_slice, values_from_reader, DeOptions};
    use crate::IValue;
    use crate::error::{Error, ErrorCode};

    fn decode(data: &[u8]) -> Result<Vec<IValue>, Error> {
        values_from_slice(data, DeOptions::new())
    }

    fn assert_eval_error(data: &[u8], expected: ErrorCode, offset: usize) {
        match decode(data) {
            Err(Error::Eval { ref code, offset: o, .. }) if *code == expected && o == offset => {}
            other => panic!("expected {:?} at {}, got {:?}", expected, offset, other),
        }
    }

    #[test]
    fn decode_python_stream() {
        // pickle.dumps([1, "a", {"b": 2.5}], protocol=2)
        let data = b"\x80\x02]q\x00(K\x01X\x01\x00\x00\x00aq\x01}q\x02\
                     X\x01\x00\x00\x00bq\x03G@\x04\x00\x00\x00\x00\x00\x00se.";
        let value = value_from_slice(data, DeOptions::new()).unwrap();
        assert_eq!(format!("{}", value), r#"[1, "a", {"b": 2.5}]"#);
    }

    #[test]
    fn decode_protocols() {
        assert_eq!(decode(b"\x80\x03K\x01.").unwrap(), vec![IValue::Int(1)]);
        assert_eq!(decode(b"\x80\x04\x95\x03\x00\x00\x00\x00\x00\x00\x00K\x01.").unwrap(),
                   vec![IValue::Int(1)]);
        assert!(decode(b"\x80\x02.").unwrap().is_empty());
        assert_eq!(decode(b"K\x01K\x02.").unwrap(), vec![IValue::Int(1), IValue::Int(2)]);
        assert_eval_error(b"\x80\x05K\x01.", ErrorCode::UnsupportedProtocol(5), 0);
    }

    #[test]
    fn decode_longs() {
        assert_eq!(decode(b"\x8a\x04\x00\x00\x00\x80.").unwrap(),
                   vec![IValue::Int(-(1 << 31))]);
        assert_eq!(decode(b"\x8a\x00.").unwrap(), vec![IValue::Int(0)]);
        assert_eq!(decode(b"\x8b\x02\x00\x00\x00\xff\x00.").unwrap(), vec![IValue::Int(255)]);
        assert_eval_error(b"\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x00\x01.", ErrorCode::Overflow, 0);
        assert_eval_error(b"\x8b\xff\xff\xff\xff.", ErrorCode::Overflow, 0);
    }

    #[test]
    fn decode_extra_opcodes() {
        // APPEND, SETITEM and NEWOBJ are accepted even though we never write them.
        let data = b"]K\x01a}\x8c\x01kK\x02s\x86.";
        assert_eq!(format!("{}", value_from_slice(data, DeOptions::new()).unwrap()),
                   r#"([1], {"k": 2})"#);
        let data = b"\x80\x02c__main__\nIntList\n](K\x07e\x85\x81.";
        assert_eq!(value_from_slice(data, DeOptions::new()).unwrap(),
                   IValue::int_list(vec![7]));
    }

    #[test]
    fn decode_memo() {
        let data = b"\x80\x02]q\x00h\x00\x86.";
        match value_from_slice(data, DeOptions::new()).unwrap() {
            IValue::Tuple(ref t) => assert!(t[0].is_same(&t[1])),
            ref other => panic!("unexpected value {}", other),
        }
        let data = b"\x80\x02]r\x00\x00\x00\x00j\x00\x00\x00\x00\x86.";
        assert_eq!(decode(data).unwrap().len(), 1);
        assert_eval_error(b"\x80\x02h\x03.", ErrorCode::MemoMiss(3), 2);
        assert_eval_error(b"\x80\x02Nq\x05.", ErrorCode::MemoGap { expected: 0, found: 5 }, 3);
        assert_eval_error(b"\x80\x02\x94.", ErrorCode::StackUnderflow, 2);
    }

    #[test]
    fn decode_errors() {
        assert_eval_error(b"\x80\x02X\x05\x00", ErrorCode::Truncated, 3);
        assert_eval_error(b"\x80\x02K", ErrorCode::Truncated, 3);
        assert_eval_error(b"\x80\x02N", ErrorCode::Truncated, 3);
        assert_eval_error(b"\x80\x02{", ErrorCode::UnknownOpcode(b'{'), 2);
        assert_eval_error(b"\x80\x02\x8c\x01\xff.", ErrorCode::Utf8, 2);
        assert_eval_error(b"\x80\x02\x85.", ErrorCode::StackUnderflow, 2);
        // Pops can't reach below a mark.
        assert_eval_error(b"\x80\x02N(\x86.", ErrorCode::StackUnderflow, 4);
        assert_eval_error(b"\x80\x02e.", ErrorCode::StackUnderflow, 2);
        assert_eval_error(b"\x80\x02cos\nsystem\n.",
                          ErrorCode::UnknownGlobal(b"os".to_vec(), b"system".to_vec()), 2);
        assert_eval_error(b"\x80\x02c__main__\nTensorID",
                          ErrorCode::Truncated, 12);
    }

    #[test]
    fn decode_type_mismatch() {
        let cases: &[&[u8]] = &[
            // SETITEMS on a list
            b"\x80\x02](K\x01K\x02u.",
            // APPENDS on a dict
            b"\x80\x02}(K\x01e.",
            // odd number of SETITEMS arguments
            b"\x80\x02}(K\x01u.",
            // unhashable key
            b"\x80\x02}]K\x01s.",
            // REDUCE without a class
            b"\x80\x02K\x01)R.",
            // bad IntList argument
            b"\x80\x02c__main__\nIntList\nK\x01\x85R.",
            // a class marker left over at STOP
            b"\x80\x02c__main__\nIntList\n.",
            // an argument tuple holding bytes outside of REDUCE
            b"\x80\x02C\x01a\x85.",
        ];
        for case in cases {
            match decode(case) {
                Err(Error::Eval { code: ErrorCode::TypeMismatch(..), .. }) => {}
                other => panic!("unexpected result {:?} for {:?}", other, case),
            }
        }
    }

    #[test]
    fn decode_bad_literal_tensor() {
        match decode(b"\x80\x02c__main__\nLiteralTensor\nC\x01\x00\x85R.") {
            Err(Error::Eval { code: ErrorCode::TensorEncoding(_), .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn decode_recursive() {
        assert_eval_error(b"\x80\x02]\x94(h\x00e.", ErrorCode::Recursive, 7);
        assert_eval_error(b"\x80\x02}\x94(K\x01h\x00\x85u.", ErrorCode::Recursive, 10);
    }

    #[test]
    fn decode_build() {
        // BUILD state is dropped.
        assert_eq!(decode(b"\x80\x02]Nb.").unwrap(), vec![IValue::list(vec![])]);
        assert_eval_error(b"\x80\x02Nb.", ErrorCode::StackUnderflow, 3);
    }

    #[test]
    fn decode_trailing_bytes() {
        assert_eq!(decode(b"\x80\x02N.\x00").unwrap(), vec![IValue::None]);
        match values_from_slice(b"\x80\x02N.\x00", DeOptions::new().deny_trailing_bytes()) {
            Err(Error::Eval { code: ErrorCode::TrailingBytes, offset: 4, .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn decode_stops_after_stop() {
        let data = b"\x80\x02]\x94(K\x01K\x02e.XYZ";
        let stop = data.iter().position(|&b| b == b'.').unwrap();
        assert_eq!(decode(data).unwrap(),
                   vec![IValue::list(vec![IValue::Int(1), IValue::Int(2)])]);
        let err = values_from_slice(data, DeOptions::new().deny_trailing_bytes()).unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::TrailingBytes));
        assert_eq!(err.offset(), Some(stop + 1));
    }

    /// The depth of a chain of single-element lists.
    fn chain_depth(value: &IValue) -> usize {
        let mut depth = 0;
        let mut cur = Some(value.clone());
        while let Some(value) = cur {
            cur = match value {
                IValue::List(ref l) => { depth += 1; l.borrow().first().cloned() }
                _ => None,
            };
        }
        depth
    }

    #[test]
    fn decode_append_chain() {
        let mut data = b"\x80\x02".to_vec();
        data.extend(vec![b']'; 1000]);
        data.extend(vec![b'a'; 999]);
        data.push(b'.');
        let roots = decode(&data).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(chain_depth(&roots[0]), 1000);

        // One list referenced from many others.
        let mut data = b"\x80\x02]\x94(".to_vec();
        for _ in 0..20000 {
            data.extend(b"K\x01");
        }
        data.push(b'e');
        for _ in 0..20000 {
            data.extend(b"]h\x00a");
        }
        data.push(b'.');
        let roots = decode(&data).unwrap();
        assert_eq!(roots.len(), 20001);
        match roots[20000] {
            IValue::List(ref l) => assert!(l.borrow()[0].is_same(&roots[0])),
            ref other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn decode_nesting_limit() {
        let mut data = b"\x80\x02".to_vec();
        data.extend(vec![b']'; 200_000]);
        data.extend(vec![b'a'; 199_999]);
        data.push(b'.');
        assert_eval_error(&data, ErrorCode::NestingLimit(1000), 2 + 200_000 + 999);

        let mut data = b"\x80\x02N".to_vec();
        data.extend(vec![b'\x85'; 5000]);
        data.push(b'.');
        assert_eval_error(&data, ErrorCode::NestingLimit(1000), 3 + 1000);

        // Argument tuples count as well.
        let mut data = b"\x80\x02c__main__\nIntList\n".to_vec();
        data.extend(vec![b'\x85'; 5000]);
        data.push(b'.');
        assert_eval_error(&data, ErrorCode::NestingLimit(1000), 20 + 1000);

        let options = DeOptions::new().max_depth(2);
        assert!(values_from_slice(b"\x80\x02]]a.", options).is_ok());
        match values_from_slice(b"\x80\x02]]]aa.", options) {
            Err(Error::Eval { code: ErrorCode::NestingLimit(2), offset: 6, .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn decode_fetched_container() {
        // Adding to a list fetched from the memo is fine without a cycle.
        let roots = decode(b"\x80\x02]\x94h\x00K\x01a.").unwrap();
        assert_eq!(roots[1], IValue::list(vec![IValue::Int(1)]));
        assert!(roots[0].is_same(&roots[1]));

        // The fetched list gets deeper, and so does the list holding it.
        let data = b"\x80\x02]]\x94ah\x00]]aa.";
        let roots = decode(data).unwrap();
        assert_eq!(chain_depth(&roots[0]), 4);
        assert_eq!(chain_depth(&roots[1]), 3);
        match roots[0] {
            IValue::List(ref l) => assert!(l.borrow()[0].is_same(&roots[1])),
            ref other => panic!("unexpected value {:?}", other),
        }
        match values_from_slice(data, DeOptions::new().max_depth(3)) {
            Err(Error::Eval { code: ErrorCode::NestingLimit(3), offset: 11, .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn decode_check_budget() {
        // Every APPEND deepens a fetched list while the memo is large, so
        // each one has to revisit the whole memo.
        let mut data = b"\x80\x02".to_vec();
        for _ in 0..20_000 {
            data.extend(b"K\x01\x94");
        }
        for i in 0..1000u32 {
            data.extend(b"]\x94j");
            data.extend(&(20_000 + i).to_le_bytes());
            data.extend(b"]a");
        }
        data.push(b'.');
        match decode(&data) {
            Err(Error::Eval { code: ErrorCode::CheckBudget, .. }) => {}
            other => panic!("unexpected result {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn decode_single_root() {
        match value_from_slice(b"\x80\x02NN.", DeOptions::new()) {
            Err(Error::Syntax(ErrorCode::TypeMismatch(..))) => {}
            other => panic!("unexpected result {:?}", other),
        }
        match value_from_slice(b"\x80\x02.", DeOptions::new()) {
            Err(Error::Syntax(ErrorCode::TypeMismatch(..))) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn decode_reader() {
        let values = values_from_reader(Cursor::new(b"\x80\x02K\x01\x88.".to_vec()),
                                        DeOptions::new()).unwrap();
        assert_eq!(values, vec![IValue::Int(1), IValue::Bool(true)]);
    }

    #[test]
    fn error_display() {
        let err = decode(b"\x80\x02X\x05\x00").unwrap_err();
        assert_eq!(err.offset(), Some(3));
        assert_eq!(err.code(), Some(&ErrorCode::Truncated));
        assert_eq!(format!("{}", err),
                   "eval error at offset 3 (opcode BINUNICODE): unexpected end of pickle data");
    }
}

mod value_tests {
    use rand::{Rng, thread_rng};
    use quickcheck::{QuickCheck, StdGen};
    use crate::{values_to_vec, values_from_slice, value_to_vec, value_from_slice};
    use crate::{SerOptions, DeOptions, IValue};
    use super::arby::Graph;
    use super::shared_layout;

    #[test]
    fn fuzzing() {
        // Tries to ensure that we don't panic when encountering strange streams.
        for _ in 0..1000 {
            let mut stream = [0u8; 1000];
            thread_rng().fill(&mut stream[..]);
            if *stream.last().unwrap() == b'.' { continue; }
            // These must all fail with an error, since STOP can only be
            // followed by trailing bytes.
            assert!(values_from_slice(&stream, DeOptions::new().deny_trailing_bytes()).is_err());
        }
    }

    #[test]
    fn qc_roundtrip() {
        fn roundtrip(graph: Graph) {
            let original = graph.build();
            let vec = values_to_vec(&original, SerOptions::new()).unwrap();
            let tripped = values_from_slice(&vec, DeOptions::new()).unwrap();
            assert_eq!(original, tripped);
            assert_eq!(shared_layout(&original), shared_layout(&tripped));
        }
        QuickCheck::new().gen(StdGen::new(thread_rng(), 10))
                         .tests(2000)
                         .quickcheck(roundtrip as fn(_));
    }

    #[test]
    fn roundtrip_special_floats() {
        let value = IValue::list(vec![IValue::Double(f64::NAN), IValue::Double(-0.0),
                                      IValue::Double(f64::NEG_INFINITY)]);
        let vec = value_to_vec(&value, SerOptions::new()).unwrap();
        let tripped = value_from_slice(&vec, DeOptions::new()).unwrap();
        assert_eq!(tripped, value);
        assert_eq!(IValue::Double(f64::NAN), IValue::Double(f64::NAN));
        assert_ne!(IValue::Double(0.0), IValue::Double(-0.0));
    }

    #[test]
    fn roundtrip_json() {
        let original: serde_json::Value = serde_json::from_str(r#"[
            {"null": null,
             "false": false,
             "true": true,
             "int": -1238571,
             "float": 1.5e10,
             "list": [false, 5, "true", 3.8]
            }
        ]"#).unwrap();
        let value: IValue = serde_json::from_value(original.clone()).unwrap();
        let vec = value_to_vec(&value, SerOptions::new()).unwrap();
        let tripped = value_from_slice(&vec, DeOptions::new()).unwrap();
        assert_eq!(serde_json::to_value(&tripped).unwrap(), original);
    }
}
