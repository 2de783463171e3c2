//! The stack-mapping verifier: an external collaborator, specified here only
//! through its interface, plus [`ReplayVerifier`], a default good enough to
//! drive the stack analyzer over the deterministic, stack-map-free bytecode
//! used throughout this crate's own tests.
//!
//! The analyzer never consults the verifier for `load`/`store`/`iinc` or the
//! `dup*`/`swap` family: those are pure stack/local shuffles it can resolve
//! from its own running frame state. The verifier supplies pop/push arity
//! and pushed types for every other instruction.

use crate::frame::FrameValue;
use crate::instruction::{ArithmeticOp, ArrayElementType, CompareOp, IfOperands, Instruction, NumericType};
use crate::jvm::code::ProgramCounter;
use crate::jvm::references::{ClassRef, MethodRef};
use crate::metadata::ConstantValue;
use crate::types::field_type::FieldType;
use crate::types::method_descriptor::ReturnType;

/// What an instruction does to the operand stack, in slots: how many it
/// pops, and the value of each slot it pushes, bottom-first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackEffect {
    /// The number of stack slots this instruction consumes.
    pub pop_count: usize,
    /// The slots this instruction pushes, in push order.
    pub pushed: Vec<FrameValue>,
}

/// Produces per-instruction abstract stack effects for the stack analyzer.
///
/// A host application normally backs this with the same verifier it uses
/// elsewhere (a full `StackMapTable` replay). [`ReplayVerifier`] is a
/// default good enough for this crate's own tests.
pub trait StackMappingVisitor {
    /// Returns the stack effect of the instruction at `pc`.
    fn visit(&mut self, pc: ProgramCounter, instruction: &Instruction) -> StackEffect;
}

/// A [`StackMappingVisitor`] that derives every instruction's stack effect
/// purely from its own declared operand types — no external `StackMapTable`
/// is consulted. It does not implement full JVM verification (merging
/// reference types at a lattice join, rejecting ill-typed bytecode); it is
/// only as precise as each [`Instruction`] variant's own fields allow.
#[derive(Debug, Default)]
pub struct ReplayVerifier;

impl StackMappingVisitor for ReplayVerifier {
    fn visit(&mut self, pc: ProgramCounter, instruction: &Instruction) -> StackEffect {
        stack_effect_of(pc, instruction)
    }
}

fn width(value: &FrameValue) -> usize {
    if value.is_wide() {
        2
    } else {
        1
    }
}

fn wide_push(value: FrameValue) -> Vec<FrameValue> {
    if value.is_wide() {
        vec![value, FrameValue::Top]
    } else {
        vec![value]
    }
}

fn object() -> ClassRef {
    ClassRef::new("java/lang/Object")
}

#[allow(clippy::too_many_lines)]
fn stack_effect_of(pc: ProgramCounter, instruction: &Instruction) -> StackEffect {
    use Instruction as I;
    let push = |pushed: Vec<FrameValue>| StackEffect {
        pop_count: 0,
        pushed,
    };
    let pop = |pop_count: usize| StackEffect {
        pop_count,
        pushed: vec![],
    };

    match instruction {
        I::Nop | I::SyntheticNop | I::IInc(..) => StackEffect::default(),
        I::AConstNull => push(vec![FrameValue::Null]),
        I::IConst(_) | I::BiPush(_) | I::SiPush(_) => push(vec![FrameValue::Integer]),
        I::LConst(_) => push(wide_push(FrameValue::Long)),
        I::FConst(_) => push(vec![FrameValue::Float]),
        I::DConst(_) => push(wide_push(FrameValue::Double)),
        I::Ldc(constant) => push(wide_push(constant_value_type(constant))),
        I::Load(var_load_type, _) => push(wide_push(load_type_value(*var_load_type))),
        I::Store(var_load_type, _) => pop(width(&load_type_value(*var_load_type))),
        I::ArrayLoad(element_type) => StackEffect {
            pop_count: 2,
            pushed: wide_push(array_element_value(*element_type)),
        },
        I::ArrayStore(element_type) => StackEffect {
            pop_count: 2 + width(&array_element_value(*element_type)),
            pushed: vec![],
        },
        I::ArrayLength => StackEffect {
            pop_count: 1,
            pushed: vec![FrameValue::Integer],
        },
        I::NewArray(_) => StackEffect {
            pop_count: 1,
            pushed: vec![FrameValue::Reference(object())],
        },
        I::ANewArray(element) => StackEffect {
            pop_count: 1,
            pushed: vec![FrameValue::Reference(ClassRef::new(format!(
                "[L{};",
                element.binary_name
            )))],
        },
        I::MultiANewArray(class, dims) => StackEffect {
            pop_count: usize::from(*dims),
            pushed: vec![FrameValue::Reference(class.clone())],
        },
        I::Pop => pop(1),
        I::Pop2 => pop(2),
        // DUP*/SWAP are resolved directly by the analyzer against its own
        // stack state; this arity is never consulted.
        I::Dup | I::DupX1 | I::DupX2 | I::Dup2 | I::Dup2X1 | I::Dup2X2 | I::Swap => StackEffect::default(),
        I::Arithmetic(op) => arithmetic_effect(*op),
        I::Compare(op) => compare_effect(*op),
        I::If(_, operands, _) => pop(if_operand_pop_count(*operands)),
        I::Switch(_) => pop(1),
        I::Goto(_) | I::Jsr(_) | I::Ret(_) | I::Return(_) => StackEffect::default(),
        I::New(_) => push(vec![FrameValue::Uninitialized { at: pc }]),
        I::AThrow => pop(1),
        I::CheckCast(class) => StackEffect {
            pop_count: 1,
            pushed: vec![FrameValue::Reference(class.clone())],
        },
        I::InstanceOf(_) => StackEffect {
            pop_count: 1,
            pushed: vec![FrameValue::Integer],
        },
        I::MonitorEnter | I::MonitorExit => pop(1),
        I::GetStatic(field) => push(wide_push(field_value(&field.field_type))),
        I::PutStatic(field) => pop(width(&field_value(&field.field_type))),
        I::GetField(field) => StackEffect {
            pop_count: 1,
            pushed: wide_push(field_value(&field.field_type)),
        },
        I::PutField(field) => StackEffect {
            pop_count: 1 + width(&field_value(&field.field_type)),
            pushed: vec![],
        },
        I::InvokeVirtual(method) | I::InvokeSpecial(method) => invoke_effect(method, 1),
        I::InvokeStatic(method) => invoke_effect(method, 0),
        I::InvokeInterface(method, _) => invoke_effect(method, 1),
        I::InvokeDynamic(call_site) => StackEffect {
            pop_count: 0,
            pushed: return_type_push(&call_site.descriptor.return_type),
        },
    }
}

/// Number of stack slots an `if` comparison consumes: one against an
/// implicit zero/null, two comparing against another stack value.
fn if_operand_pop_count(operands: IfOperands) -> usize {
    match operands {
        IfOperands::IntVsZero | IfOperands::RefVsNull => 1,
        IfOperands::IntVsInt | IfOperands::RefVsRef => 2,
    }
}

pub(crate) fn field_value(field_type: &FieldType) -> FrameValue {
    use crate::types::field_type::PrimitiveType;
    match field_type {
        FieldType::Base(PrimitiveType::Long) => FrameValue::Long,
        FieldType::Base(PrimitiveType::Double) => FrameValue::Double,
        FieldType::Base(PrimitiveType::Float) => FrameValue::Float,
        FieldType::Base(_) => FrameValue::Integer,
        FieldType::Object(class) => FrameValue::Reference(class.clone()),
        FieldType::Array(_) => FrameValue::Reference(object()),
    }
}

pub(crate) fn load_type_value(var_load_type: crate::instruction::VarLoadType) -> FrameValue {
    use crate::instruction::VarLoadType as V;
    match var_load_type {
        V::Int => FrameValue::Integer,
        V::Long => FrameValue::Long,
        V::Float => FrameValue::Float,
        V::Double => FrameValue::Double,
        V::Reference => FrameValue::Reference(object()),
    }
}

fn array_element_value(element_type: ArrayElementType) -> FrameValue {
    match element_type {
        ArrayElementType::Int | ArrayElementType::Byte | ArrayElementType::Char | ArrayElementType::Short => {
            FrameValue::Integer
        }
        ArrayElementType::Long => FrameValue::Long,
        ArrayElementType::Float => FrameValue::Float,
        ArrayElementType::Double => FrameValue::Double,
        ArrayElementType::Reference => FrameValue::Reference(object()),
    }
}

fn constant_value_type(constant: &ConstantValue) -> FrameValue {
    match constant {
        ConstantValue::Integer(_) => FrameValue::Integer,
        ConstantValue::Float(_) => FrameValue::Float,
        ConstantValue::Long(_) => FrameValue::Long,
        ConstantValue::Double(_) => FrameValue::Double,
        ConstantValue::String(_) => FrameValue::Reference(ClassRef::new("java/lang/String")),
        ConstantValue::Class(_) => FrameValue::Reference(ClassRef::new("java/lang/Class")),
        ConstantValue::MethodType(_) => FrameValue::Reference(ClassRef::new("java/lang/invoke/MethodType")),
        ConstantValue::MethodHandle => {
            FrameValue::Reference(ClassRef::new("java/lang/invoke/MethodHandle"))
        }
        ConstantValue::Dynamic(_) => FrameValue::Reference(object()),
    }
}

fn numeric_value(numeric_type: NumericType) -> FrameValue {
    match numeric_type {
        NumericType::Int => FrameValue::Integer,
        NumericType::Long => FrameValue::Long,
        NumericType::Float => FrameValue::Float,
        NumericType::Double => FrameValue::Double,
    }
}

fn integral_value(integral_type: crate::instruction::IntegralType) -> FrameValue {
    match integral_type {
        crate::instruction::IntegralType::Int => FrameValue::Integer,
        crate::instruction::IntegralType::Long => FrameValue::Long,
    }
}

fn arithmetic_effect(op: ArithmeticOp) -> StackEffect {
    match op {
        ArithmeticOp::Add(t) | ArithmeticOp::Sub(t) | ArithmeticOp::Mul(t) | ArithmeticOp::Div(t)
        | ArithmeticOp::Rem(t) => {
            let value = numeric_value(t);
            StackEffect {
                pop_count: 2 * width(&value),
                pushed: wide_push(value),
            }
        }
        ArithmeticOp::Neg(t) => {
            let value = numeric_value(t);
            StackEffect {
                pop_count: width(&value),
                pushed: wide_push(value),
            }
        }
        ArithmeticOp::Shl(t) | ArithmeticOp::Shr(t) | ArithmeticOp::UShr(t) => {
            let value = integral_value(t);
            StackEffect {
                pop_count: width(&value) + 1,
                pushed: wide_push(value),
            }
        }
        ArithmeticOp::And(t) | ArithmeticOp::Or(t) | ArithmeticOp::Xor(t) => {
            let value = integral_value(t);
            StackEffect {
                pop_count: 2 * width(&value),
                pushed: wide_push(value),
            }
        }
        ArithmeticOp::Convert(from, to) => StackEffect {
            pop_count: width(&numeric_value(from)),
            pushed: wide_push(numeric_value(to)),
        },
    }
}

fn compare_effect(op: CompareOp) -> StackEffect {
    let pop_count = match op {
        CompareOp::Long | CompareOp::DoubleL | CompareOp::DoubleG => 4,
        CompareOp::FloatL | CompareOp::FloatG => 2,
    };
    StackEffect {
        pop_count,
        pushed: vec![FrameValue::Integer],
    }
}

fn return_type_push(return_type: &ReturnType) -> Vec<FrameValue> {
    match return_type {
        ReturnType::Void => vec![],
        ReturnType::Some(field_type) => wide_push(field_value(field_type)),
    }
}

fn invoke_effect(method: &MethodRef, receiver_slots: usize) -> StackEffect {
    let param_slots: usize = method
        .descriptor
        .parameters_types
        .iter()
        .map(|t| width(&field_value(t)))
        .sum();
    StackEffect {
        pop_count: receiver_slots + param_slots,
        pushed: return_type_push(&method.descriptor.return_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Condition, VarLoadType};

    #[test]
    fn iadd_pops_two_ints_pushes_one() {
        let effect = stack_effect_of(0.into(), &Instruction::Arithmetic(ArithmeticOp::Add(NumericType::Int)));
        assert_eq!(effect.pop_count, 2);
        assert_eq!(effect.pushed, vec![FrameValue::Integer]);
    }

    #[test]
    fn lcmp_pops_four_pushes_int() {
        let effect = stack_effect_of(0.into(), &Instruction::Compare(CompareOp::Long));
        assert_eq!(effect.pop_count, 4);
        assert_eq!(effect.pushed, vec![FrameValue::Integer]);
    }

    #[test]
    fn lload_pushes_two_wide_slots() {
        let effect = stack_effect_of(0.into(), &Instruction::Load(VarLoadType::Long, 0));
        assert_eq!(effect.pushed, vec![FrameValue::Long, FrameValue::Top]);
    }

    #[test]
    fn if_vs_int_pops_two() {
        let effect = stack_effect_of(0.into(), &Instruction::If(Condition::Eq, IfOperands::IntVsInt, 0.into()));
        assert_eq!(effect.pop_count, 2);
    }

    #[test]
    fn if_vs_zero_pops_one() {
        let effect = stack_effect_of(0.into(), &Instruction::If(Condition::Eq, IfOperands::IntVsZero, 0.into()));
        assert_eq!(effect.pop_count, 1);
    }

    #[test]
    fn if_ref_vs_null_pops_one() {
        let effect = stack_effect_of(0.into(), &Instruction::If(Condition::Eq, IfOperands::RefVsNull, 0.into()));
        assert_eq!(effect.pop_count, 1);
    }

    #[test]
    fn switch_pops_the_selector() {
        let effect = stack_effect_of(
            0.into(),
            &Instruction::Switch(crate::instruction::SwitchInfo {
                default: 0.into(),
                branches: vec![],
            }),
        );
        assert_eq!(effect.pop_count, 1);
    }

    #[test]
    fn new_pushes_uninitialized_tagged_with_its_own_pc() {
        let effect = stack_effect_of(
            10.into(),
            &Instruction::New(crate::jvm::references::ClassRef::new("java/lang/Object")),
        );
        assert_eq!(effect.pushed, vec![FrameValue::Uninitialized { at: 10.into() }]);
    }
}
