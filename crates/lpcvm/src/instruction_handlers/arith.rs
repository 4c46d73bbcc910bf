//! `F_ADD`/`F_SUBTRACT`/`F_MULTIPLY`/`F_DIVIDE`/`F_MOD`/bitwise/`F_NEGATE`/`F_NOT`/`F_COMPL`
//! collapsed into one `Arith` opcode parameterized by [`ArithOp`] (§4.2 "Arithmetic and
//! comparison").
//!
//! Numeric coercion: `int op int -> int`; `(int|float) op (int|float) -> float` once either
//! side is a float; `string + string/int` concatenates; `array + array` concatenates;
//! `mapping + mapping` merges (§4.2, §9 "numeric coercion").

use std::cell::RefCell;
use std::rc::Rc;

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::array::LpcArray;
use crate::error::{VmError, VmResult};
use crate::instruction::{ArithOp, Instruction, Op};
use crate::mapping::LpcMapping;
use crate::state::VmState;
use crate::value::{LpcString, Value};

fn op_of(instr: &Instruction) -> ArithOp {
    match instr.op {
        Op::Arith(op) => op,
        _ => unreachable!("arith handler dispatched for non-Arith opcode"),
    }
}

/// Whether `op` takes one operand (negate/not/complement) or two.
fn is_unary(op: ArithOp) -> bool {
    matches!(op, ArithOp::Negate | ArithOp::Not | ArithOp::Complement)
}

pub(crate) fn arith<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
    max_string_length: usize,
    max_array_size: usize,
    max_mapping_size: usize,
) -> VmResult<()> {
    let op = op_of(instr);
    boilerplate::<opcodes::Arith, _>(state, tracer, |state| {
        if is_unary(op) {
            let v = state.pop();
            state.push(unary(op, v)?)
        } else {
            let b = state.pop();
            let a = state.pop();
            state.push(binary(op, a, b, max_string_length, max_array_size, max_mapping_size)?)
        }
    })
}

fn unary(op: ArithOp, v: Value) -> VmResult<Value> {
    match op {
        ArithOp::Negate => match v {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Real(r) => Ok(Value::Real(-r)),
            _ => Err(VmError::BadType { op: "unary -", expected: "int or float" }.into()),
        },
        ArithOp::Not => Ok(Value::Int(i64::from(!v.is_truthy()))),
        ArithOp::Complement => {
            let i = v.as_int().ok_or(VmError::BadType { op: "~", expected: "int" })?;
            Ok(Value::Int(!i))
        }
        _ => unreachable!("non-unary op routed to unary()"),
    }
}

fn binary(
    op: ArithOp,
    a: Value,
    b: Value,
    max_string_length: usize,
    max_array_size: usize,
    max_mapping_size: usize,
) -> VmResult<Value> {
    use ArithOp::*;

    if matches!(op, Add) {
        if let Some(v) = try_add_non_numeric(&a, &b, max_string_length, max_array_size, max_mapping_size)? {
            return Ok(v);
        }
    }

    if let (Some(ai), Some(bi)) = (as_pure_int(&a), as_pure_int(&b)) {
        return int_arith(op, ai, bi);
    }

    let af = a.as_real().ok_or(VmError::BadType { op: "arithmetic", expected: "int or float" })?;
    let bf = b.as_real().ok_or(VmError::BadType { op: "arithmetic", expected: "int or float" })?;
    real_arith(op, af, bf)
}

/// `Value::as_int`/`as_real` both happily coerce `Undefined`, which would make `0.0 / 0` look
/// numeric instead of a type error; this only returns `Some` for the two genuinely numeric
/// variants.
fn as_pure_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Undefined => Some(0),
        _ => None,
    }
}

fn int_arith(op: ArithOp, a: i64, b: i64) -> VmResult<Value> {
    use ArithOp::*;
    Ok(match op {
        Add => Value::Int(a.wrapping_add(b)),
        Subtract => Value::Int(a.wrapping_sub(b)),
        Multiply => Value::Int(a.wrapping_mul(b)),
        Divide => {
            if b == 0 {
                return Err(VmError::DivisionByZero.into());
            }
            Value::Int(a.wrapping_div(b))
        }
        Mod => {
            if b == 0 {
                return Err(VmError::ModulusByZero.into());
            }
            Value::Int(a.wrapping_rem(b))
        }
        And => Value::Int(a & b),
        Or => Value::Int(a | b),
        Xor => Value::Int(a ^ b),
        LeftShift => Value::Int(a.wrapping_shl(b as u32)),
        RightShift => Value::Int(a.wrapping_shr(b as u32)),
        Negate | Not | Complement => unreachable!("unary op routed to int_arith()"),
    })
}

fn real_arith(op: ArithOp, a: f64, b: f64) -> VmResult<Value> {
    use ArithOp::*;
    Ok(match op {
        Add => Value::Real(a + b),
        Subtract => Value::Real(a - b),
        Multiply => Value::Real(a * b),
        Divide => {
            if b == 0.0 {
                return Err(VmError::DivisionByZero.into());
            }
            Value::Real(a / b)
        }
        Mod | And | Or | Xor | LeftShift | RightShift => {
            Err(VmError::BadType { op: "bitwise/modulus", expected: "int" })?
        }
        Negate | Not | Complement => unreachable!("unary op routed to real_arith()"),
    })
}

/// String concatenation, array/mapping `+` (§4.2). Returns `None` when neither operand is one
/// of these container types, so the caller falls through to numeric coercion.
fn try_add_non_numeric(
    a: &Value,
    b: &Value,
    max_string_length: usize,
    max_array_size: usize,
    max_mapping_size: usize,
) -> VmResult<Option<Value>> {
    match (a, b) {
        (Value::String(_), _) | (_, Value::String(_)) if is_stringlike(a) && is_stringlike(b) => {
            let mut s = String::new();
            a.to_owned_stringlike(&mut s);
            b.to_owned_stringlike(&mut s);
            if s.len() > max_string_length {
                return Err(VmError::StringTooLarge.into());
            }
            Ok(Some(Value::String(LpcString::Owned(Rc::new(RefCell::new(s))))))
        }
        (Value::Array(x), Value::Array(y)) => {
            let mut items = x.borrow().items.clone();
            items.extend(y.borrow().items.iter().cloned());
            if items.len() > max_array_size {
                return Err(VmError::Custom("array too large".into()).into());
            }
            Ok(Some(Value::Array(Rc::new(RefCell::new(LpcArray::new(items))))))
        }
        (Value::Mapping(x), Value::Mapping(y)) => {
            let merged = x
                .borrow()
                .merged_with(&y.borrow(), max_mapping_size)
                .map_err(|()| VmError::MappingTooLarge)?;
            Ok(Some(Value::Mapping(Rc::new(RefCell::new(merged)))))
        }
        _ => Ok(None),
    }
}

fn is_stringlike(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Int(_) | Value::Undefined)
}

trait ToOwnedStringlike {
    fn to_owned_stringlike(&self, out: &mut String);
}

impl ToOwnedStringlike for Value {
    fn to_owned_stringlike(&self, out: &mut String) {
        match self {
            Value::String(s) => s.with_str(|s| out.push_str(s)),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Undefined => out.push('0'),
            _ => unreachable!("to_owned_stringlike called on a non-stringlike value"),
        }
    }
}
