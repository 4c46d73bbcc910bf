//! `F_AGGREGATE`/`F_AGGREGATE_ASSOC`/`F_NEW_CLASS`/`F_NEW_EMPTY_CLASS` (§4.2 "Aggregate
//! construction"): pop `count` (or `2*count` for mappings) values off the stack in reverse push
//! order and build the literal.

use std::cell::RefCell;
use std::rc::Rc;

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::array::LpcArray;
use crate::class::ClassInstance;
use crate::error::{VmError, VmResult};
use crate::instruction::{AggregateKind, Instruction, Operand};
use crate::mapping::LpcMapping;
use crate::state::VmState;
use crate::value::Value;

pub(crate) fn aggregate<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
    max_array_size: usize,
    max_mapping_size: usize,
) -> VmResult<()> {
    let (kind, count) = match instr.operand {
        Operand::Aggregate { kind, count } => (kind, count as usize),
        _ => return Err(VmError::Custom("Aggregate with no operand".into()).into()),
    };
    boilerplate::<opcodes::Aggregate, _>(state, tracer, |state| match kind {
        AggregateKind::Array => {
            if count > max_array_size {
                return Err(VmError::Custom("array literal too large".into()).into());
            }
            let items = pop_n(state, count);
            state.push(Value::Array(Rc::new(RefCell::new(LpcArray::new(items)))))
        }
        AggregateKind::Mapping => {
            let pairs = pop_n(state, count * 2);
            let mut mapping = LpcMapping::new();
            for pair in pairs.chunks_exact(2) {
                mapping
                    .insert(pair[0].clone(), pair[1].clone(), max_mapping_size)
                    .map_err(|()| VmError::MappingTooLarge)?;
            }
            state.push(Value::Mapping(Rc::new(RefCell::new(mapping))))
        }
        AggregateKind::Class => {
            let members = pop_n(state, count);
            state.push(Value::Class(Rc::new(RefCell::new(ClassInstance::new(0, members)))))
        }
        AggregateKind::EmptyClass => {
            state.push(Value::Class(Rc::new(RefCell::new(ClassInstance::new(0, vec![Value::Int(0); count])))))
        }
    })
}

/// Pops `count` values and returns them in original left-to-right push order.
fn pop_n(state: &mut VmState, count: usize) -> Vec<Value> {
    let mut items = vec![Value::Int(0); count];
    for slot in items.iter_mut().rev() {
        *slot = state.pop();
    }
    items
}
