//! `F_INDEX`/`F_RINDEX`/range opcodes, and the [`Lvalue`] cursor type `Value::Lvalue` carries
//! (§4.2 "Indexing", §9 design note: "lvalues become a separate variant holding a typed
//! cursor").
//!
//! A known narrowing from a literal reading of the source behavior: a string character can be
//! taken as an lvalue only once the string is already in [`LpcString::Owned`] form (i.e. has
//! already been uniquified by some prior mutation). A `Shared`/`Constant` string indexed in
//! lvalue position raises [`VmError::BadType`] rather than silently uniquifying a disconnected
//! copy that would not write back to the variable it came from — see `DESIGN.md`.

use std::cell::RefCell;
use std::rc::Rc;

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::array::{resolve_index, LpcArray};
use crate::buffer::LpcBuffer;
use crate::class::ClassInstance;
use crate::error::{VmError, VmResult};
use crate::instruction::{Instruction, Operand, SlotKind};
use crate::mapping::LpcMapping;
use crate::state::VmState;
use crate::value::{LpcString, Value};

/// The container an `Lvalue::Range` cursor indexes into — only the three sliceable heap types
/// `arr[a..b] = ...` can target.
#[derive(Debug)]
pub enum RangeTarget {
    Array(Rc<RefCell<LpcArray>>),
    Buffer(Rc<RefCell<LpcBuffer>>),
    String(Rc<RefCell<String>>),
}

#[derive(Debug)]
pub enum Lvalue {
    Local(u16),
    Global(u32),
    ArrayElement(Rc<RefCell<LpcArray>>, usize),
    MappingEntry(Rc<RefCell<LpcMapping>>, Value),
    ClassMember(Rc<RefCell<ClassInstance>>, usize),
    BufferByte(Rc<RefCell<LpcBuffer>>, usize),
    StringChar(Rc<RefCell<String>>, usize),
    /// `arr[a..b] = ...` (§3.1 "lvalue-range", §4.2): assigning replaces the `range` slice of
    /// the container, growing or shrinking it to fit the assigned value's length.
    Range(RangeTarget, std::ops::Range<usize>),
}

pub(crate) fn read_lvalue(lvalue: &Lvalue, state: &VmState) -> Value {
    match lvalue {
        Lvalue::Local(slot) => state.local(*slot),
        Lvalue::Global(slot) => state.global(*slot),
        Lvalue::ArrayElement(arr, idx) => {
            arr.borrow().items.get(*idx).cloned().unwrap_or(Value::Int(0))
        }
        Lvalue::MappingEntry(map, key) => map.borrow().get(key).cloned().unwrap_or(Value::Undefined),
        Lvalue::ClassMember(class, idx) => {
            class.borrow().members.get(*idx).cloned().unwrap_or(Value::Int(0))
        }
        Lvalue::BufferByte(buf, idx) => {
            buf.borrow().bytes.get(*idx).map_or(Value::Int(0), |b| Value::Int(*b as i64))
        }
        Lvalue::StringChar(s, idx) => {
            s.borrow().as_bytes().get(*idx).map_or(Value::Int(0), |b| Value::Int(*b as i64))
        }
        Lvalue::Range(target, range) => match target {
            RangeTarget::Array(arr) => {
                let items = arr.borrow();
                let out = items.items.get(range.clone()).map(<[Value]>::to_vec).unwrap_or_default();
                Value::Array(Rc::new(RefCell::new(LpcArray::new(out))))
            }
            RangeTarget::Buffer(buf) => {
                let buf = buf.borrow();
                let out = buf.bytes.get(range.clone()).map(<[u8]>::to_vec).unwrap_or_default();
                Value::Buffer(Rc::new(RefCell::new(LpcBuffer::new(out))))
            }
            RangeTarget::String(s) => {
                let bytes = s.borrow().clone().into_bytes();
                let out = bytes
                    .get(range.clone())
                    .map(|b| b.iter().map(|&c| c as char).collect::<String>())
                    .unwrap_or_default();
                Value::String(LpcString::Owned(Rc::new(RefCell::new(out))))
            }
        },
    }
}

pub(crate) fn write_lvalue(
    lvalue: &Lvalue,
    state: &mut VmState,
    value: Value,
    max_mapping_size: usize,
) -> VmResult<()> {
    match lvalue {
        Lvalue::Local(slot) => {
            state.set_local(*slot, value);
            Ok(())
        }
        Lvalue::Global(slot) => {
            state.set_global(*slot, value);
            Ok(())
        }
        Lvalue::ArrayElement(arr, idx) => {
            let mut arr = arr.borrow_mut();
            if *idx < arr.items.len() {
                arr.items[*idx] = value;
            }
            Ok(())
        }
        Lvalue::MappingEntry(map, key) => map
            .borrow_mut()
            .insert(key.clone(), value, max_mapping_size)
            .map_err(|()| VmError::MappingTooLarge.into()),
        Lvalue::ClassMember(class, idx) => {
            let mut class = class.borrow_mut();
            if *idx < class.members.len() {
                class.members[*idx] = value;
            }
            Ok(())
        }
        Lvalue::BufferByte(buf, idx) => {
            let byte = value
                .as_int()
                .ok_or(VmError::BadType { op: "buffer[]=", expected: "int" })?;
            let mut buf = buf.borrow_mut();
            if *idx < buf.bytes.len() {
                buf.bytes[*idx] = byte as u8;
            }
            Ok(())
        }
        Lvalue::StringChar(s, idx) => {
            let byte = value
                .as_int()
                .ok_or(VmError::BadType { op: "string[]=", expected: "int" })?;
            if byte == 0 {
                return Err(VmError::NulByteAssignment.into());
            }
            let mut bytes = s.borrow().clone().into_bytes();
            if *idx < bytes.len() {
                bytes[*idx] = byte as u8;
                if let Ok(new_s) = String::from_utf8(bytes) {
                    *s.borrow_mut() = new_s;
                }
            }
            Ok(())
        }
        Lvalue::Range(target, range) => {
            let end = range.end.min(range_target_len(target));
            let start = range.start.min(end);
            match (target, value) {
                (RangeTarget::Array(arr), Value::Array(new_arr)) => {
                    let new_items = new_arr.borrow().items.clone();
                    arr.borrow_mut().items.splice(start..end, new_items);
                    Ok(())
                }
                (RangeTarget::Buffer(buf), Value::Buffer(new_buf)) => {
                    let new_bytes = new_buf.borrow().bytes.clone();
                    buf.borrow_mut().bytes.splice(start..end, new_bytes);
                    Ok(())
                }
                (RangeTarget::String(s), Value::String(new_s)) => {
                    let mut bytes = s.borrow().clone().into_bytes();
                    let new_bytes = new_s.with_str(|ns| ns.as_bytes().to_vec());
                    bytes.splice(start..end, new_bytes);
                    if let Ok(new_s) = String::from_utf8(bytes) {
                        *s.borrow_mut() = new_s;
                    }
                    Ok(())
                }
                _ => Err(VmError::BadType { op: "[..]=", expected: "matching array, buffer, or string" }.into()),
            }
        }
    }
}

fn range_target_len(target: &RangeTarget) -> usize {
    match target {
        RangeTarget::Array(arr) => arr.borrow().len(),
        RangeTarget::Buffer(buf) => buf.borrow().len(),
        RangeTarget::String(s) => s.borrow().len(),
    }
}

fn out_of_bounds(idx: i64, size: usize) -> VmError {
    VmError::IndexOutOfBounds { index: idx, size }
}

fn access(
    state: &mut VmState,
    container: Value,
    index: Value,
    from_end: bool,
    slot_kind: SlotKind,
    max_mapping_size: usize,
) -> VmResult<()> {
    match container {
        Value::Mapping(rc) => {
            let v = match slot_kind {
                SlotKind::Value => match rc.borrow_mut().get_mut(&index) {
                    Some(value) => crate::value::resolve(value),
                    None => Value::Undefined,
                },
                SlotKind::Lvalue => Value::Lvalue(Rc::new(RefCell::new(Lvalue::MappingEntry(rc, index)))),
            };
            state.push(v)
        }
        Value::Undefined => state.push(Value::Undefined),
        other => {
            let requested =
                index.as_int().ok_or(VmError::BadType { op: "[]", expected: "int" })?;
            match other {
                Value::Array(rc) => {
                    let len = rc.borrow().len();
                    let i = resolve_index(len, requested, from_end)
                        .ok_or_else(|| out_of_bounds(requested, len))?;
                    let v = match slot_kind {
                        SlotKind::Value => crate::value::resolve(&mut rc.borrow_mut().items[i]),
                        SlotKind::Lvalue => {
                            Value::Lvalue(Rc::new(RefCell::new(Lvalue::ArrayElement(rc, i))))
                        }
                    };
                    state.push(v)
                }
                Value::Class(rc) => {
                    let len = rc.borrow().members.len();
                    let i = resolve_index(len, requested, from_end)
                        .ok_or_else(|| out_of_bounds(requested, len))?;
                    let v = match slot_kind {
                        SlotKind::Value => crate::value::resolve(&mut rc.borrow_mut().members[i]),
                        SlotKind::Lvalue => {
                            Value::Lvalue(Rc::new(RefCell::new(Lvalue::ClassMember(rc, i))))
                        }
                    };
                    state.push(v)
                }
                Value::Buffer(rc) => {
                    let len = rc.borrow().len();
                    let i = resolve_index(len, requested, from_end)
                        .ok_or_else(|| out_of_bounds(requested, len))?;
                    let v = match slot_kind {
                        SlotKind::Value => Value::Int(rc.borrow().bytes[i] as i64),
                        SlotKind::Lvalue => {
                            Value::Lvalue(Rc::new(RefCell::new(Lvalue::BufferByte(rc, i))))
                        }
                    };
                    state.push(v)
                }
                Value::String(s) => {
                    let len = s.len();
                    let i = resolve_index(len, requested, from_end)
                        .ok_or_else(|| out_of_bounds(requested, len))?;
                    let v = match slot_kind {
                        SlotKind::Value => {
                            Value::Int(s.with_str(|s| s.as_bytes()[i] as i64))
                        }
                        SlotKind::Lvalue => match s {
                            LpcString::Owned(rc) => {
                                Value::Lvalue(Rc::new(RefCell::new(Lvalue::StringChar(rc, i))))
                            }
                            LpcString::Shared(_) | LpcString::Constant(_) => {
                                return Err(VmError::BadType {
                                    op: "string[]=",
                                    expected: "a previously-mutated (owned) string",
                                }
                                .into())
                            }
                        },
                    };
                    state.push(v)
                }
                _ => Err(VmError::BadType {
                    op: "[]",
                    expected: "array, mapping, string, buffer, or class",
                }
                .into()),
            }
        }
    }
}

pub(crate) fn index<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
    max_mapping_size: usize,
) -> VmResult<()> {
    boilerplate::<opcodes::Index, _>(state, tracer, |state| {
        let idx = state.pop();
        let container = state.pop();
        access(state, container, idx, false, instr.slot_kind, max_mapping_size)
    })
}

pub(crate) fn rindex<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
    max_mapping_size: usize,
) -> VmResult<()> {
    boilerplate::<opcodes::RIndex, _>(state, tracer, |state| {
        let idx = state.pop();
        let container = state.pop();
        access(state, container, idx, true, instr.slot_kind, max_mapping_size)
    })
}

pub(crate) fn range<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    let (left_from_end, right_from_end) = match instr.operand {
        Operand::Range { left_from_end, right_from_end } => (left_from_end, right_from_end),
        _ => (false, false),
    };
    let slot_kind = instr.slot_kind;
    boilerplate::<opcodes::Range, _>(state, tracer, |state| {
        let right = state.pop();
        let left = state.pop();
        let container = state.pop();
        let left = left.as_int().ok_or(VmError::BadType { op: "..", expected: "int" })?;
        let right = right.as_int().ok_or(VmError::BadType { op: "..", expected: "int" })?;
        match container {
            Value::Array(rc) => {
                let len = rc.borrow().len();
                let range = slice_bounds(len, left, left_from_end, right, right_from_end).unwrap_or(0..0);
                match slot_kind {
                    SlotKind::Value => {
                        let out = rc.borrow().items[range].to_vec();
                        state.push(Value::Array(Rc::new(RefCell::new(LpcArray::new(out)))))
                    }
                    SlotKind::Lvalue => state.push(Value::Lvalue(Rc::new(RefCell::new(Lvalue::Range(
                        RangeTarget::Array(rc),
                        range,
                    ))))),
                }
            }
            Value::Buffer(rc) => {
                let len = rc.borrow().len();
                let range = slice_bounds(len, left, left_from_end, right, right_from_end).unwrap_or(0..0);
                match slot_kind {
                    SlotKind::Value => {
                        let out = rc.borrow().bytes[range].to_vec();
                        state.push(Value::Buffer(Rc::new(RefCell::new(LpcBuffer::new(out)))))
                    }
                    SlotKind::Lvalue => state.push(Value::Lvalue(Rc::new(RefCell::new(Lvalue::Range(
                        RangeTarget::Buffer(rc),
                        range,
                    ))))),
                }
            }
            Value::String(s) => {
                let len = s.len();
                let range = slice_bounds(len, left, left_from_end, right, right_from_end).unwrap_or(0..0);
                match slot_kind {
                    SlotKind::Value => {
                        let out = s.with_str(|s| {
                            s.as_bytes()[range].iter().map(|&b| b as char).collect::<String>()
                        });
                        state.push(Value::String(LpcString::Owned(Rc::new(RefCell::new(out)))))
                    }
                    SlotKind::Lvalue => match s {
                        LpcString::Owned(rc) => state.push(Value::Lvalue(Rc::new(RefCell::new(
                            Lvalue::Range(RangeTarget::String(rc), range),
                        )))),
                        LpcString::Shared(_) | LpcString::Constant(_) => Err(VmError::BadType {
                            op: "[..]=",
                            expected: "a previously-mutated (owned) string",
                        }
                        .into()),
                    },
                }
            }
            Value::Undefined => state.push(Value::Undefined),
            _ => Err(VmError::BadType { op: "..", expected: "array, string, or buffer" }.into()),
        }
    })
}

/// Resolves a `[left..right]` range to a `Range<usize>`, or `None` for an empty range — the left
/// bound is out of bounds, mirroring `resolve_index`'s own-bounds rule (§8, array.rs tests).
fn slice_bounds(
    len: usize,
    left: i64,
    left_from_end: bool,
    right: i64,
    right_from_end: bool,
) -> Option<std::ops::Range<usize>> {
    let start = resolve_index(len, left, left_from_end)?;
    let end_inclusive = if right_from_end {
        (len as i64 - 1 - right).clamp(-1, len as i64 - 1)
    } else {
        right.clamp(-1, len as i64 - 1)
    };
    if end_inclusive < start as i64 {
        return Some(start..start);
    }
    Some(start..(end_inclusive as usize + 1))
}
