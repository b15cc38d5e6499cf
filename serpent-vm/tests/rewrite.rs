
use quickcheck_macros::quickcheck;

use serpent_vm::prelude::*;
use test_helpers::*;

use serpent_bytecode::Opcode::*;

#[test]
fn rewrites_load_attr_operations() {
    let code = new_code_with_bytes(compiler_units(&[
        (Nop, 99),
        (ExtendedArg, 0xca),
        (LoadAttr, 0xfe),
        (Nop, 106),
        (ExtendedArg, 1),
        (ExtendedArg, 2),
        (ExtendedArg, 3),
        (LoadAttr, 4),
        (LoadAttr, 77),
    ]));
    let function = Function::with_code("", code);

    let expected = rewritten_units(&[
        (Nop, 99, 0),
        (ExtendedArg, 0xca, 0),
        (LoadAttrAnamorphic, 0xfe, 0),
        (Nop, 106, 0),
        (ExtendedArg, 1, 0),
        (ExtendedArg, 2, 0),
        (ExtendedArg, 3, 0),
        (LoadAttrAnamorphic, 4, 1),
        (LoadAttrAnamorphic, 77, 2),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);

    let caches = function.caches().expect("attr sites allocate caches");
    assert_eq!(caches.len(), 3 * IC_POINTERS_PER_ENTRY);
    assert!(caches.iter().all(Value::is_none));
}

#[test]
fn rewrites_load_method_operations() {
    let code = new_code_with_bytes(compiler_units(&[
        (Nop, 99),
        (ExtendedArg, 0xca),
        (LoadMethod, 0xfe),
        (Nop, 160),
        (ExtendedArg, 1),
        (ExtendedArg, 2),
        (ExtendedArg, 3),
        (LoadMethod, 4),
        (LoadMethod, 77),
    ]));
    let function = Function::with_code("", code);

    let expected = rewritten_units(&[
        (Nop, 99, 0),
        (ExtendedArg, 0xca, 0),
        (LoadMethodAnamorphic, 0xfe, 0),
        (Nop, 160, 0),
        (ExtendedArg, 1, 0),
        (ExtendedArg, 2, 0),
        (ExtendedArg, 3, 0),
        (LoadMethodAnamorphic, 4, 1),
        (LoadMethodAnamorphic, 77, 2),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);

    let caches = function.caches().expect("method sites allocate caches");
    assert_eq!(caches.len(), 3 * IC_POINTERS_PER_ENTRY);
    assert!(caches.iter().all(Value::is_none));
}

#[test]
fn rewrites_store_attr() {
    let code = new_code_with_bytes(compiler_units(&[(StoreAttr, 48)]));
    let function = Function::with_code("", code);
    assert_eq!(
        function.rewritten_bytecode(),
        rewritten_units(&[(StoreAttrAnamorphic, 48, 0)])
    );
}

#[test]
fn rewrites_binary_opcodes() {
    let code = new_code_with_bytes(compiler_units(&[
        (BinaryMatrixMultiply, 0),
        (BinaryPower, 0),
        (BinaryMultiply, 0),
        (BinaryModulo, 0),
        (BinaryAdd, 0),
        (BinarySubtract, 0),
        (BinaryFloorDivide, 0),
        (BinaryTrueDivide, 0),
        (BinaryLshift, 0),
        (BinaryRshift, 0),
        (BinaryAnd, 0),
        (BinaryXor, 0),
        (BinaryOr, 0),
    ]));
    let function = Function::with_code("", code);

    let expected: Vec<(serpent_bytecode::Opcode, u8, u16)> = [
        BinaryOp::Matmul,
        BinaryOp::Pow,
        BinaryOp::Mul,
        BinaryOp::Mod,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Floordiv,
        BinaryOp::Truediv,
        BinaryOp::Lshift,
        BinaryOp::Rshift,
        BinaryOp::And,
        BinaryOp::Xor,
        BinaryOp::Or,
    ]
    .iter()
    .enumerate()
    .map(|(cache, kind)| (BinaryOpAnamorphic, *kind as u8, cache as u16))
    .collect();
    assert_eq!(function.rewritten_bytecode(), rewritten_units(&expected));
    assert_eq!(
        function.caches().expect("operator sites allocate caches").len(),
        13 * IC_POINTERS_PER_ENTRY
    );
}

#[test]
fn rewrites_inplace_opcodes() {
    let code = new_code_with_bytes(compiler_units(&[
        (InplaceMatrixMultiply, 0),
        (InplacePower, 0),
        (InplaceMultiply, 0),
        (InplaceModulo, 0),
        (InplaceAdd, 0),
        (InplaceSubtract, 0),
        (InplaceFloorDivide, 0),
        (InplaceTrueDivide, 0),
        (InplaceLshift, 0),
        (InplaceRshift, 0),
        (InplaceAnd, 0),
        (InplaceXor, 0),
        (InplaceOr, 0),
    ]));
    let function = Function::with_code("", code);

    let expected: Vec<(serpent_bytecode::Opcode, u8, u16)> = (0u8..=12)
        .map(|tag| (InplaceOpAnamorphic, tag, u16::from(tag)))
        .collect();
    assert_eq!(function.rewritten_bytecode(), rewritten_units(&expected));
}

#[test]
fn rewrites_compare_op_opcodes() {
    let code = new_code_with_bytes(compiler_units(&[
        (CompareOp, serpent_bytecode::CompareOp::Lt as u8),
        (CompareOp, serpent_bytecode::CompareOp::Le as u8),
        (CompareOp, serpent_bytecode::CompareOp::Eq as u8),
        (CompareOp, serpent_bytecode::CompareOp::Ne as u8),
        (CompareOp, serpent_bytecode::CompareOp::Gt as u8),
        (CompareOp, serpent_bytecode::CompareOp::Ge as u8),
        (CompareOp, serpent_bytecode::CompareOp::In as u8),
        (CompareOp, serpent_bytecode::CompareOp::NotIn as u8),
        (CompareOp, serpent_bytecode::CompareOp::Is as u8),
        (CompareOp, serpent_bytecode::CompareOp::IsNot as u8),
        (CompareOp, serpent_bytecode::CompareOp::ExcMatch as u8),
    ]));
    let function = Function::with_code("", code);

    let expected = rewritten_units(&[
        (CompareOpAnamorphic, serpent_bytecode::CompareOp::Lt as u8, 0),
        (CompareOpAnamorphic, serpent_bytecode::CompareOp::Le as u8, 1),
        (CompareOpAnamorphic, serpent_bytecode::CompareOp::Eq as u8, 2),
        (CompareOpAnamorphic, serpent_bytecode::CompareOp::Ne as u8, 3),
        (CompareOpAnamorphic, serpent_bytecode::CompareOp::Gt as u8, 4),
        (CompareOpAnamorphic, serpent_bytecode::CompareOp::Ge as u8, 5),
        (CompareInAnamorphic, 0, 6),
        (CompareOp, serpent_bytecode::CompareOp::NotIn as u8, 0),
        (CompareIs, 0, 0),
        (CompareIsNot, 0, 0),
        (CompareOp, serpent_bytecode::CompareOp::ExcMatch as u8, 0),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);
    assert_eq!(
        function.caches().expect("compare sites allocate caches").len(),
        7 * IC_POINTERS_PER_ENTRY
    );
}

#[test]
fn rewrites_load_const_operations() {
    let consts = vec![
        Value::None,
        Value::Int(0),
        Value::str(""),
        // Not immediate: does not fit the operand byte.
        Value::Int(64),
        // Not immediate: a heap object.
        Value::List(Vec::new().into()),
    ];
    let code = new_code_with_bytes_consts(
        compiler_units(&[
            (LoadConst, 0),
            (LoadConst, 1),
            (LoadConst, 2),
            (LoadConst, 3),
            (LoadConst, 4),
        ]),
        consts,
    );
    let function = Function::with_code("", code);

    let none_tag = oparg_from_value(&Value::None).unwrap();
    let zero_tag = oparg_from_value(&Value::Int(0)).unwrap();
    let empty_tag = oparg_from_value(&Value::str("")).unwrap();
    let expected = rewritten_units(&[
        (LoadImmediate, none_tag, 0),
        (LoadImmediate, zero_tag, 0),
        (LoadImmediate, empty_tag, 0),
        (LoadConst, 3, 0),
        (LoadConst, 4, 0),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);
    assert!(function.caches().is_none());
}

#[test]
fn immediate_loads_decode_back_to_their_constant() {
    let consts = vec![Value::None, Value::Int(-64), Value::Int(63), Value::str("")];
    let code = new_code_with_bytes_consts(
        compiler_units(&[
            (LoadConst, 0),
            (LoadConst, 1),
            (LoadConst, 2),
            (LoadConst, 3),
        ]),
        consts.clone(),
    );
    let function = Function::with_code("", code);

    let mut index = 0;
    for konst in &consts {
        let op = next_op(function.rewritten_bytecode(), &mut index);
        assert_eq!(op.op(), LoadImmediate);
        assert_eq!(value_from_oparg(op.arg() as u8).as_ref(), Some(konst));
    }
}

#[test]
fn rewrites_load_const_to_load_bool() {
    let code = new_code_with_bytes_consts(
        compiler_units(&[(LoadConst, 0), (LoadConst, 1)]),
        vec![Value::Bool(true), Value::Bool(false)],
    );
    let function = Function::with_code("", code);
    assert_eq!(
        function.rewritten_bytecode(),
        rewritten_units(&[(LoadBool, 0x80, 0), (LoadBool, 0x00, 0)])
    );
}

#[test]
fn reserves_caches_for_global_variables() {
    let code = new_code_with_bytes_consts_names(
        compiler_units(&[
            (LoadGlobal, 0),
            (StoreGlobal, 1),
            (LoadAttr, 9),
            (DeleteGlobal, 2),
            (StoreName, 3),
            (DeleteName, 4),
            (LoadAttr, 9),
            (LoadName, 5),
        ]),
        vec![],
        global_names(12),
    );
    let function = Function::with_code("", code);

    // The attr cache indices start at 6: the first 6 entries are reserved
    // for the 12 global names.
    let expected = rewritten_units(&[
        (LoadGlobal, 0, 0),
        (StoreGlobal, 1, 0),
        (LoadAttrAnamorphic, 9, 6),
        (DeleteGlobal, 2, 0),
        (StoreName, 3, 0),
        (DeleteName, 4, 0),
        (LoadAttrAnamorphic, 9, 7),
        (LoadName, 5, 0),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);

    let num_global = 6;
    let num_attr = 2;
    assert_eq!(
        function.caches().expect("globals reserve caches").len(),
        (num_global + num_attr) * IC_POINTERS_PER_ENTRY
    );

    // Distinct global name operands get distinct reserved slots in source
    // order; namespace operations do not participate.
    assert_eq!(function.global_cache_slot(0), Some(0));
    assert_eq!(function.global_cache_slot(1), Some(1));
    assert_eq!(function.global_cache_slot(2), Some(2));
    assert_eq!(function.global_cache_slot(3), None);
    assert_eq!(function.global_cache_slot(5), None);
    assert_eq!(function.global_cache_slot_count(), 3);
}

#[test]
fn caps_rewriting_past_the_cache_limit() {
    let mut units: Vec<(serpent_bytecode::Opcode, u8)> = (0..IC_CACHE_LIMIT)
        .map(|i| (LoadAttr, (i * 3) as u8))
        .collect();
    // LOAD_GLOBAL 1039 == 4 * 256 + 15.
    units.push((ExtendedArg, 4));
    units.push((LoadGlobal, 15));

    let global_names_length = 600;
    let code = new_code_with_bytes_consts_names(
        compiler_units(&units),
        vec![],
        global_names(global_names_length),
    );
    let function = Function::with_code("", code);
    let rewritten = function.rewritten_bytecode();

    let reserved = global_names_length / IC_POINTERS_PER_ENTRY;
    let mut expected_cache = reserved;
    let mut index = 0;
    while index < IC_CACHE_LIMIT - reserved {
        let op = next_op(rewritten, &mut index);
        assert_eq!(op.op(), LoadAttrAnamorphic, "unexpected {} at index {index}", op.op());
        assert_eq!(op.arg(), (((index - 1) * 3) % 256) as u32);
        assert_eq!(usize::from(op.cache()), expected_cache);
        expected_cache += 1;
    }
    while index < IC_CACHE_LIMIT {
        let op = next_op(rewritten, &mut index);
        assert_eq!(op.op(), LoadAttr, "unexpected {} at index {index}", op.op());
        assert_eq!(op.cache(), 0);
    }
    let op = next_op(rewritten, &mut index);
    assert_eq!(op.op(), LoadGlobal);
    assert_eq!(op.arg(), 1039);
    assert_eq!(op.cache(), 0);

    assert_eq!(
        function.caches().expect("capped functions still allocate").len(),
        IC_CACHE_LIMIT * IC_POINTERS_PER_ENTRY
    );
    assert_eq!(function.global_cache_slot(1039), Some(0));
}

#[test]
fn rewrites_load_fast_and_store_fast_opcodes() {
    let code = new_code_with_locals(
        compiler_units(&[
            (LoadFast, 2),
            (LoadFast, 1),
            (LoadFast, 1),
            (StoreFast, 2),
            (StoreFast, 1),
            (StoreFast, 0),
        ]),
        3,
    );
    let function = Function::with_code("", code);

    // Five frame slots: three locals plus one free and one cell variable.
    let expected = rewritten_units(&[
        (LoadFastReverse, 2, 0),
        (LoadFastReverse, 3, 0),
        (LoadFastReverse, 3, 0),
        (StoreFastReverse, 2, 0),
        (StoreFastReverse, 3, 0),
        (StoreFastReverse, 4, 0),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);
    assert!(function.caches().is_none());
}

#[test]
fn does_not_rewrite_locals_with_large_local_count() {
    let source = compiler_units(&[
        (LoadFast, 2),
        (LoadFast, 1),
        (LoadFast, 1),
        (StoreFast, 2),
        (StoreFast, 1),
        (StoreFast, 0),
    ]);
    let code = new_code_with_locals(source, usize::from(u8::MAX) + 3);
    let function = Function::with_code("", code);

    let expected = rewritten_units(&[
        (LoadFast, 2, 0),
        (LoadFast, 1, 0),
        (LoadFast, 1, 0),
        (StoreFast, 2, 0),
        (StoreFast, 1, 0),
        (StoreFast, 0, 0),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);
    assert!(function.caches().is_none());
}

#[test]
fn reverses_locals_when_delete_fast_is_present() {
    let code = new_code_with_locals(
        compiler_units(&[
            (LoadFast, 2),
            (LoadFast, 1),
            (LoadFast, 0),
            (StoreFast, 2),
            (StoreFast, 1),
            (StoreFast, 0),
            (DeleteFast, 0),
            (ReturnValue, 0),
        ]),
        3,
    );
    let function = Function::with_code("", code);

    // The deleted slot keeps its forward operand; loads and stores still
    // reverse.
    let expected = rewritten_units(&[
        (LoadFastReverse, 2, 0),
        (LoadFastReverse, 3, 0),
        (LoadFastReverse, 4, 0),
        (StoreFastReverse, 2, 0),
        (StoreFastReverse, 3, 0),
        (StoreFastReverse, 4, 0),
        (DeleteFast, 0, 0),
        (ReturnValue, 0, 0),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);
    assert!(function.caches().is_none());
}

#[test]
fn does_not_rewrite_without_optimized_and_newlocals_flags() {
    let source = compiler_units(&[
        (Nop, 99),
        (ExtendedArg, 0xca),
        (LoadAttr, 0xfe),
        (Nop, 106),
        (ExtendedArg, 1),
        (ExtendedArg, 2),
        (ExtendedArg, 3),
        (LoadAttr, 4),
        (LoadAttr, 77),
    ]);
    let code = Code::new(
        0,
        0,
        CodeFlags::empty(),
        source,
        vec![],
        vec![],
        vec![],
        vec![],
        vec![],
    )
    .unwrap();
    let function = Function::with_code("", code);

    let expected = rewritten_units(&[
        (Nop, 99, 0),
        (ExtendedArg, 0xca, 0),
        (LoadAttr, 0xfe, 0),
        (Nop, 106, 0),
        (ExtendedArg, 1, 0),
        (ExtendedArg, 2, 0),
        (ExtendedArg, 3, 0),
        (LoadAttr, 4, 0),
        (LoadAttr, 77, 0),
    ]);
    assert_eq!(function.rewritten_bytecode(), expected);
    assert!(function.caches().is_none());
    assert_eq!(function.global_cache_slot_count(), 0);
}

#[test]
fn retains_the_original_bytecode_unchanged() {
    let source = compiler_units(&[(LoadAttr, 7), (ReturnValue, 0)]);
    let code = new_code_with_bytes(source.clone());
    let function = Function::with_code("f", code);
    assert_eq!(function.original_bytecode(), source);
    assert_eq!(
        function.rewritten_bytecode().len(),
        source.len() * 2
    );
}

#[test]
fn reconstruction_from_the_same_code_is_idempotent() {
    let code = new_code_with_bytes_consts_names(
        compiler_units(&[(LoadGlobal, 1), (LoadAttr, 0), (ReturnValue, 0)]),
        vec![],
        global_names(3),
    );
    let first = Function::with_code("f", code.clone());
    let second = Function::with_code("f", code);
    assert_eq!(first.rewritten_bytecode(), second.rewritten_bytecode());
    assert_eq!(first.caches(), second.caches());
    assert_eq!(first.global_cache_slot(1), second.global_cache_slot(1));
}

#[test]
fn decoding_the_rewritten_stream_preserves_the_logical_sequence() {
    let source = compiler_units(&[
        (Nop, 9),
        (ExtendedArg, 0x01),
        (LoadAttr, 0x02),
        (BinaryAdd, 0),
        (CompareOp, serpent_bytecode::CompareOp::Lt as u8),
        (LoadGlobal, 2),
        (ReturnValue, 0),
    ]);
    let code = new_code_with_bytes_consts_names(source.clone(), vec![], global_names(4));
    let function = Function::with_code("", code);

    let mut src_index = 0;
    let mut dst_index = 0;
    let mut pairs = Vec::new();
    while src_index < source.len() / COMPILER_CODE_UNIT_SIZE {
        let src = next_compiler_op(&source, &mut src_index);
        let dst = next_op(function.rewritten_bytecode(), &mut dst_index);
        pairs.push((src, dst));
    }
    assert_eq!(dst_index * CODE_UNIT_SIZE, function.rewritten_bytecode().len());

    for (src, dst) in pairs {
        match src.op() {
            LoadAttr => {
                assert_eq!(dst.op(), LoadAttrAnamorphic);
                assert_eq!(dst.arg(), src.arg());
            }
            BinaryAdd => {
                assert_eq!(dst.op(), BinaryOpAnamorphic);
                assert_eq!(dst.arg(), BinaryOp::Add as u32);
            }
            CompareOp => {
                assert_eq!(dst.op(), CompareOpAnamorphic);
                assert_eq!(dst.arg(), src.arg());
            }
            _ => {
                assert_eq!(dst.op(), src.op());
                assert_eq!(dst.arg(), src.arg());
            }
        }
    }
}

#[quickcheck]
fn widening_doubles_arbitrary_unoptimized_streams(bytes: Vec<u8>) -> bool {
    let mut bytes = bytes;
    if bytes.len() % COMPILER_CODE_UNIT_SIZE != 0 {
        bytes.pop();
    }
    let code = Code::new(
        0,
        0,
        CodeFlags::empty(),
        bytes.clone(),
        vec![],
        vec![],
        vec![],
        vec![],
        vec![],
    )
    .unwrap();
    let function = Function::with_code("f", code);
    let rewritten = function.rewritten_bytecode();
    rewritten.len() == bytes.len() * 2
        && rewritten
            .chunks_exact(CODE_UNIT_SIZE)
            .zip(bytes.chunks_exact(COMPILER_CODE_UNIT_SIZE))
            .all(|(wide, narrow)| wide == [narrow[0], narrow[1], 0, 0])
}

#[quickcheck]
fn oparg_encoding_round_trips_small_ints(value: i64) -> bool {
    let konst = Value::Int(value);
    match oparg_from_value(&konst) {
        Some(tag) => value_from_oparg(tag) == Some(konst),
        None => !(MIN_IMMEDIATE_INT..=MAX_IMMEDIATE_INT).contains(&value),
    }
}
