//! The bytecode rewriter.
//!
//! One linear pass over the compiler stream widens every 2-byte unit into a
//! 4-byte unit, retags specializable opcodes into their anamorphic
//! variants, folds encodable constants into immediate operands, remaps
//! local slots to the reverse frame layout, and assigns inline-cache
//! entries. The pass is total: every ineligible site degrades to its
//! original opcode, still widened.

use std::collections::HashMap;

use tracing::{debug, trace};

use serpent_bytecode::{
    next_compiler_op, CompareOp, Opcode, CODE_UNIT_SIZE, COMPILER_CODE_UNIT_SIZE,
};

use crate::ic::{self, IC_CACHE_LIMIT};
use crate::object::{oparg_from_value, Code, CodeFlags, Value};

/// Operand byte of a boolean load pushing `True`; `False` is all zeros.
const LOAD_BOOL_TRUE: u8 = 0x80;

/// Artifacts of one rewrite, attached to the function under construction.
pub(crate) struct Rewritten {
    pub(crate) bytecode: Vec<u8>,
    pub(crate) caches: Option<Vec<Value>>,
    pub(crate) global_cache_slots: HashMap<u32, u32>,
}

/// Appends one rewritten code unit.
fn push_unit(out: &mut Vec<u8>, op: u8, arg: u8, cache: u16) {
    let [lo, hi] = cache.to_le_bytes();
    out.extend_from_slice(&[op, arg, lo, hi]);
}

/// Widens a compiler stream unit-for-unit with zeroed cache fields.
fn widen(source: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(source.len() * 2);
    for unit in source.chunks_exact(COMPILER_CODE_UNIT_SIZE) {
        push_unit(&mut out, unit[0], unit[1], 0);
    }
    out
}

/// Hands out the next per-site cache entry, or `None` once the cap is hit.
fn allocate(cache_index: &mut usize) -> Option<u16> {
    if *cache_index < IC_CACHE_LIMIT {
        let assigned = *cache_index as u16;
        *cache_index += 1;
        Some(assigned)
    } else {
        None
    }
}

/// Rewrites a code object's bytecode for execution.
///
/// Without both `OPTIMIZED` and `NEWLOCALS` the stream is only widened and
/// no cache array exists. Otherwise the stream is retagged as described in
/// the module docs, and the cache array covers the reserved globals region
/// followed by one entry per specialized site.
pub(crate) fn rewrite_code(code: &Code) -> Rewritten {
    if !code
        .flags()
        .contains(CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS)
    {
        return Rewritten {
            bytecode: widen(code.bytecode()),
            caches: None,
            global_cache_slots: HashMap::new(),
        };
    }

    let source = code.bytecode();
    let num_units = source.len() / COMPILER_CODE_UNIT_SIZE;
    let mut out = Vec::with_capacity(num_units * CODE_UNIT_SIZE);

    let reserved = ic::reserved_global_entries(code.names().len()).min(IC_CACHE_LIMIT);
    let mut cache_index = reserved;
    let mut global_cache_slots: HashMap<u32, u32> = HashMap::new();
    let mut over_cap_sites = 0usize;

    let total_locals = code.total_locals();
    // A reverse slot must fit the one operand byte; with more locals the
    // extended-argument prefix the index would need defeats the point.
    let reverse_locals = total_locals <= usize::from(u8::MAX);

    let mut index = 0;
    while index < num_units {
        let start = index;
        let instr = next_compiler_op(source, &mut index);

        // Prefix units pass through unchanged; only the terminal unit of an
        // operation may be retagged or carry a cache index.
        for unit in start..index - 1 {
            let base = unit * COMPILER_CODE_UNIT_SIZE;
            push_unit(&mut out, source[base], source[base + 1], 0);
        }
        let terminal = (index - 1) * COMPILER_CODE_UNIT_SIZE;
        let raw_op = source[terminal];
        let raw_arg = source[terminal + 1];

        match instr.op() {
            Opcode::LoadAttr | Opcode::StoreAttr | Opcode::LoadMethod => {
                match allocate(&mut cache_index) {
                    Some(cache) => {
                        let retagged = match instr.op() {
                            Opcode::LoadAttr => Opcode::LoadAttrAnamorphic,
                            Opcode::StoreAttr => Opcode::StoreAttrAnamorphic,
                            _ => Opcode::LoadMethodAnamorphic,
                        };
                        push_unit(&mut out, retagged as u8, raw_arg, cache);
                    }
                    None => {
                        over_cap_sites += 1;
                        push_unit(&mut out, raw_op, raw_arg, 0);
                    }
                }
            }
            Opcode::CompareOp => {
                let comparator = u8::try_from(instr.arg())
                    .ok()
                    .and_then(|b| CompareOp::try_from(b).ok());
                match comparator {
                    Some(c) if c.is_ordered() => match allocate(&mut cache_index) {
                        Some(cache) => {
                            push_unit(&mut out, Opcode::CompareOpAnamorphic as u8, raw_arg, cache)
                        }
                        None => {
                            over_cap_sites += 1;
                            push_unit(&mut out, raw_op, raw_arg, 0);
                        }
                    },
                    Some(CompareOp::In) => match allocate(&mut cache_index) {
                        Some(cache) => {
                            push_unit(&mut out, Opcode::CompareInAnamorphic as u8, 0, cache)
                        }
                        None => {
                            over_cap_sites += 1;
                            push_unit(&mut out, raw_op, raw_arg, 0);
                        }
                    },
                    Some(CompareOp::Is) => push_unit(&mut out, Opcode::CompareIs as u8, 0, 0),
                    Some(CompareOp::IsNot) => {
                        push_unit(&mut out, Opcode::CompareIsNot as u8, 0, 0)
                    }
                    _ => push_unit(&mut out, raw_op, raw_arg, 0),
                }
            }
            Opcode::LoadConst => {
                let folded = code.consts().get(instr.arg() as usize).and_then(|konst| {
                    if let Some(truth) = konst.as_bool() {
                        Some((Opcode::LoadBool, if truth { LOAD_BOOL_TRUE } else { 0 }))
                    } else {
                        oparg_from_value(konst).map(|tag| (Opcode::LoadImmediate, tag))
                    }
                });
                match folded {
                    Some((retagged, arg)) => push_unit(&mut out, retagged as u8, arg, 0),
                    None => push_unit(&mut out, raw_op, raw_arg, 0),
                }
            }
            Opcode::LoadGlobal | Opcode::StoreGlobal | Opcode::DeleteGlobal => {
                let next_slot = global_cache_slots.len() as u32;
                global_cache_slots.entry(instr.arg()).or_insert(next_slot);
                push_unit(&mut out, raw_op, raw_arg, 0);
            }
            Opcode::LoadFast | Opcode::StoreFast
                if reverse_locals && (instr.arg() as usize) < total_locals =>
            {
                // A slot unbound by DELETE_FAST stays addressable: reversal
                // is index arithmetic only, and DELETE_FAST itself keeps its
                // forward operand.
                let reverse = (total_locals - 1 - instr.arg() as usize) as u8;
                let retagged = if instr.op() == Opcode::LoadFast {
                    Opcode::LoadFastReverse
                } else {
                    Opcode::StoreFastReverse
                };
                push_unit(&mut out, retagged as u8, reverse, 0);
            }
            op => {
                if let Some(kind) = op.binary_op() {
                    match allocate(&mut cache_index) {
                        Some(cache) => {
                            push_unit(&mut out, Opcode::BinaryOpAnamorphic as u8, kind as u8, cache)
                        }
                        None => {
                            over_cap_sites += 1;
                            push_unit(&mut out, raw_op, raw_arg, 0);
                        }
                    }
                } else if let Some(kind) = op.inplace_binary_op() {
                    match allocate(&mut cache_index) {
                        Some(cache) => push_unit(
                            &mut out,
                            Opcode::InplaceOpAnamorphic as u8,
                            kind as u8,
                            cache,
                        ),
                        None => {
                            over_cap_sites += 1;
                            push_unit(&mut out, raw_op, raw_arg, 0);
                        }
                    }
                } else {
                    push_unit(&mut out, raw_op, raw_arg, 0);
                }
            }
        }
    }

    if over_cap_sites > 0 {
        debug!(
            sites = over_cap_sites,
            "inline cache capacity reached; remaining sites stay unspecialized"
        );
    }
    trace!(
        entries = cache_index,
        reserved_globals = reserved,
        "rewrote bytecode"
    );

    let caches = (cache_index > 0).then(|| ic::new_cache(cache_index));
    Rewritten {
        bytecode: out,
        caches,
        global_cache_slots,
    }
}
