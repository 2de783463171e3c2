//! Abstract interpretation over the operand stack and local-variable array
//! (§4.5): a fixed-point worklist analysis that assigns every reachable
//! instruction its pre-state [`Frame`].
//!
//! `load`/`store`/`iinc` and the `dup*`/`swap` family are resolved directly
//! against the running [`Frame`]; every other instruction's effect comes
//! from the external [`StackMappingVisitor`](crate::verifier::StackMappingVisitor).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::analysis::fixed_point::Analyzer;
use crate::cfg::{branch_targets, falls_through};
use crate::context::DecompilerContext;
use crate::exceptions::ExceptionHandler;
use crate::frame::{FrameValue, StackSlot, VariableSlot};
use crate::instruction::{Instruction, VarLoadType};
use crate::jvm::code::{InstructionList, ProgramCounter};
use crate::jvm::references::{ClassRef, CONSTRUCTOR_NAME};
use crate::verifier::{field_value, load_type_value, StackMappingVisitor};

/// The abstract state immediately before an instruction executes: the
/// operand stack (bottom first) and the local-variable array (sparse;
/// absent slots have never been written, the `Uninitialized` default).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Frame {
    /// The operand stack, bottom first.
    pub stack: Vec<StackSlot>,
    /// The local-variable array, keyed by slot.
    pub variables: BTreeMap<u16, VariableSlot>,
}

/// A fatal inconsistency the stack analyzer detected.
#[derive(Debug, Error)]
pub enum StackAnalysisError {
    /// Two control-flow paths reach the same point with different stack depths.
    #[error("stack depth mismatch: {expected} vs {found}")]
    StackDepthMismatch {
        /// The depth already recorded at this location.
        expected: usize,
        /// The depth of the newly-arriving fact.
        found: usize,
    },
    /// An instruction popped more values than the stack held.
    #[error("stack underflow at {0}")]
    StackUnderflow(ProgramCounter),
    /// Control fell through past the last instruction without an explicit return.
    #[error("control fell off the end of the method body after {0}")]
    FellOffEnd(ProgramCounter),
}

/// Runs the fixed-point stack analysis over a decoded, normalized method body.
///
/// Implements [`Analyzer`] with `Location = ProgramCounter`, `Fact = Frame`.
pub struct StackAnalyzer<'a> {
    instructions: &'a InstructionList<Instruction>,
    handlers: &'a [ExceptionHandler],
    verifier: &'a mut dyn StackMappingVisitor,
    context: &'a DecompilerContext,
}

impl<'a> StackAnalyzer<'a> {
    /// Creates an analyzer over `instructions`, seeded from `handlers`'
    /// catch/finally entries and `context`'s parameter/receiver layout.
    #[must_use]
    pub fn new(
        instructions: &'a InstructionList<Instruction>,
        handlers: &'a [ExceptionHandler],
        verifier: &'a mut dyn StackMappingVisitor,
        context: &'a DecompilerContext,
    ) -> Self {
        Self {
            instructions,
            handlers,
            verifier,
            context,
        }
    }

    fn initial_variables(&self) -> BTreeMap<u16, VariableSlot> {
        let mut variables = BTreeMap::new();
        let mut slot = 0u16;
        if self.context.has_receiver() {
            let this_value = if self.context.is_constructor() {
                FrameValue::UninitializedThis
            } else {
                FrameValue::Reference(self.context.declaring_class.clone())
            };
            variables.insert(slot, VariableSlot::stored_by(this_value, ProgramCounter::ZERO));
            slot += 1;
        }
        for param_type in &self.context.method.descriptor.parameters_types {
            let value = field_value(param_type);
            let wide = value.is_wide();
            variables.insert(slot, VariableSlot::stored_by(value, ProgramCounter::ZERO));
            slot += if wide { 2 } else { 1 };
        }
        variables
    }

    fn successors(&self, pc: ProgramCounter, instruction: &Instruction) -> Vec<ProgramCounter> {
        let mut targets = branch_targets(instruction);
        if falls_through(instruction) {
            if let Some(next) = self.instructions.next_pc_of(&pc) {
                targets.push(next);
            }
        }
        targets
    }
}

impl Analyzer for StackAnalyzer<'_> {
    type Location = ProgramCounter;
    type Fact = Frame;
    type Err = StackAnalysisError;
    type AffectedLocations = Vec<(ProgramCounter, Frame)>;

    fn entry_fact(&self) -> Result<Self::AffectedLocations, Self::Err> {
        let mut seeds = Vec::new();
        if let Some((&entry_pc, _)) = self.instructions.entry_point() {
            seeds.push((
                entry_pc,
                Frame {
                    stack: Vec::new(),
                    variables: self.initial_variables(),
                },
            ));
        }
        for handler in self.handlers {
            let handler_pc = handler.handler_block().first;
            let caught_type = handler
                .catch_type()
                .cloned()
                .unwrap_or_else(|| ClassRef::new("java/lang/Throwable"));
            seeds.push((
                handler_pc,
                Frame {
                    stack: vec![StackSlot::produced_by(FrameValue::Reference(caught_type), handler_pc)],
                    variables: BTreeMap::new(),
                },
            ));
        }
        Ok(seeds)
    }

    fn analyze_location(
        &mut self,
        location: &Self::Location,
        fact: &Self::Fact,
    ) -> Result<Self::AffectedLocations, Self::Err> {
        let pc = *location;
        let Some(instruction) = self.instructions.get(&pc) else {
            return Ok(Vec::new());
        };

        let mut stack = fact.stack.clone();
        let mut variables = fact.variables.clone();

        match instruction {
            Instruction::Load(var_load_type, slot) => {
                push_variable(&mut stack, &variables, *var_load_type, *slot)
            }
            Instruction::Store(var_load_type, slot) => {
                pop_into_variable(&mut stack, &mut variables, *var_load_type, *slot, pc)?;
            }
            Instruction::IInc(slot, _) => {
                variables.insert(*slot, VariableSlot::stored_by(FrameValue::Integer, pc));
            }
            Instruction::Ret(_) => {}
            Instruction::Dup => duplicate(&mut stack, 1, 0, pc)?,
            Instruction::DupX1 => duplicate(&mut stack, 1, 1, pc)?,
            Instruction::DupX2 => duplicate(&mut stack, 1, 2, pc)?,
            Instruction::Dup2 => duplicate(&mut stack, 2, 0, pc)?,
            Instruction::Dup2X1 => duplicate(&mut stack, 2, 1, pc)?,
            Instruction::Dup2X2 => duplicate(&mut stack, 2, 2, pc)?,
            Instruction::Swap => {
                let len = stack.len();
                if len < 2 {
                    return Err(StackAnalysisError::StackUnderflow(pc));
                }
                stack.swap(len - 1, len - 2);
            }
            _ => {
                let effect = self.verifier.visit(pc, instruction);
                if stack.len() < effect.pop_count {
                    return Err(StackAnalysisError::StackUnderflow(pc));
                }
                let receiver = if let Instruction::InvokeSpecial(method) = instruction {
                    (method.name == CONSTRUCTOR_NAME)
                        .then(|| receiver_of(&stack, method))
                        .flatten()
                        .map(|value| (method, value))
                } else {
                    None
                };
                stack.truncate(stack.len() - effect.pop_count);
                for value in effect.pushed {
                    stack.push(StackSlot::produced_by(value, pc));
                }
                if let Some((method, receiver)) = receiver {
                    apply_initialization(&mut stack, &mut variables, method, receiver, self.context);
                }
            }
        }

        let successors = self.successors(pc, instruction);
        if successors.is_empty() && falls_through(instruction) {
            return Err(StackAnalysisError::FellOffEnd(pc));
        }

        let new_frame = Frame { stack, variables };
        Ok(successors.into_iter().map(|succ| (succ, new_frame.clone())).collect())
    }

    fn merge_facts(
        &self,
        current_fact: &Self::Fact,
        incoming_fact: Self::Fact,
    ) -> Result<Self::Fact, Self::Err> {
        if current_fact.stack.len() != incoming_fact.stack.len() {
            return Err(StackAnalysisError::StackDepthMismatch {
                expected: current_fact.stack.len(),
                found: incoming_fact.stack.len(),
            });
        }
        let stack = current_fact
            .stack
            .iter()
            .zip(incoming_fact.stack.iter())
            .map(|(a, b)| a.merge(b))
            .collect();

        let mut variables = current_fact.variables.clone();
        for (slot, incoming) in incoming_fact.variables {
            variables
                .entry(slot)
                .and_modify(|existing| *existing = existing.merge(&incoming))
                .or_insert(incoming);
        }

        Ok(Frame { stack, variables })
    }
}

fn push_variable(
    stack: &mut Vec<StackSlot>,
    variables: &BTreeMap<u16, VariableSlot>,
    var_load_type: VarLoadType,
    slot: u16,
) {
    let existing = variables.get(&slot);
    let value = existing
        .and_then(|v| v.value.clone())
        .unwrap_or_else(|| load_type_value(var_load_type));
    let definitions = existing.map(|v| v.definitions.clone()).unwrap_or_default();
    let wide = value.is_wide();
    stack.push(StackSlot {
        value: Some(value),
        definitions: definitions.clone(),
        load_from: Some(slot),
    });
    if wide {
        stack.push(StackSlot {
            value: Some(FrameValue::Top),
            definitions,
            load_from: None,
        });
    }
}

fn pop_into_variable(
    stack: &mut Vec<StackSlot>,
    variables: &mut BTreeMap<u16, VariableSlot>,
    var_load_type: VarLoadType,
    slot: u16,
    pc: ProgramCounter,
) -> Result<(), StackAnalysisError> {
    let width = usize::from(matches!(var_load_type, VarLoadType::Long | VarLoadType::Double)) + 1;
    if stack.len() < width {
        return Err(StackAnalysisError::StackUnderflow(pc));
    }
    let base = stack.len() - width;
    let value = stack[base]
        .value
        .clone()
        .unwrap_or_else(|| load_type_value(var_load_type));
    stack.truncate(base);
    variables.insert(slot, VariableSlot::stored_by(value, pc));
    Ok(())
}

/// Inserts `count` copies of the top `group` slots, `depth` slots down from
/// the top (before insertion). `group=1, depth=0` is `dup`; `group=2,
/// depth=1` is `dup2_x1`; and so on.
fn duplicate(
    stack: &mut Vec<StackSlot>,
    group: usize,
    depth: usize,
    pc: ProgramCounter,
) -> Result<(), StackAnalysisError> {
    let needed = group + depth;
    if stack.len() < needed {
        return Err(StackAnalysisError::StackUnderflow(pc));
    }
    let top: Vec<StackSlot> = stack[stack.len() - group..].to_vec();
    let insert_at = stack.len() - needed;
    stack.splice(insert_at..insert_at, top);
    Ok(())
}

/// Reads the would-be receiver of an `invokespecial <init>` call off the
/// pre-pop stack, if it is still an uninitialized value. Must run before the
/// call's operands are popped, since the receiver sits below them.
fn receiver_of(stack: &[StackSlot], method: &crate::jvm::references::MethodRef) -> Option<FrameValue> {
    let param_slots: usize = method
        .descriptor
        .parameters_types
        .iter()
        .map(|t| usize::from(field_value(t).is_wide()) + 1)
        .sum();
    let receiver_index = stack.len().checked_sub(param_slots + 1)?;
    let value = stack.get(receiver_index)?.value.clone()?;
    value.is_uninitialized().then_some(value)
}

/// After a constructor call on an `Uninitialized` receiver, every occurrence
/// of that same abstract value (on the stack or in locals) becomes a
/// concrete `Reference` — per §4.5, "any Uninitialized(atNew) slot whose
/// new-instruction has just been initialized becomes Reference(concreteType)".
fn apply_initialization(
    stack: &mut [StackSlot],
    variables: &mut BTreeMap<u16, VariableSlot>,
    method: &crate::jvm::references::MethodRef,
    receiver: FrameValue,
    context: &DecompilerContext,
) {
    let concrete = match receiver {
        FrameValue::UninitializedThis => FrameValue::Reference(context.declaring_class.clone()),
        FrameValue::Uninitialized { .. } => FrameValue::Reference(method.owner.clone()),
        _ => return,
    };
    let matches_receiver = |value: &FrameValue| *value == receiver;
    for slot in stack.iter_mut() {
        if slot.value.as_ref().is_some_and(matches_receiver) {
            slot.value = Some(concrete.clone());
        }
    }
    for variable in variables.values_mut() {
        if variable.value.as_ref().is_some_and(matches_receiver) {
            variable.value = Some(concrete.clone());
        }
    }
}
