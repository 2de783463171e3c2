//! The stack-to-variable rewriter (§4.6): turns each instruction's implicit
//! stack traffic into named temporaries, then coalesces the ones a `dup`-like
//! merge point produced back down to a single shared variable.

use std::collections::{BTreeMap, BTreeSet};

use crate::frame::FrameValue;
use crate::instruction::{Instruction, VarLoadType};
use crate::jvm::code::{InstructionList, ProgramCounter};
use crate::stack_analysis::Frame;
use crate::verifier::StackMappingVisitor;

/// A temporary variable synthesized to carry one stack slot from its
/// producing instruction(s) to a consuming instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum Temporary {
    /// A not-yet-coalesced temporary, named after the instruction that
    /// popped it and its position among that instruction's pops.
    #[display("stack_{consumer}_{index}")]
    Stack {
        /// The instruction that consumed this value.
        consumer: ProgramCounter,
        /// Position among that instruction's popped operands.
        index: usize,
    },
    /// A coalesced temporary shared by every load site a single producer's
    /// pushed value reaches, named after the producer.
    #[display("expr_{producer}")]
    Expr {
        /// The instruction that produced this value.
        producer: ProgramCounter,
    },
}

/// The result of rewriting one method body's stack traffic into temporaries.
#[derive(Debug, Clone, Default)]
pub struct RewrittenBody {
    /// For each popped operand, keyed by `(consumer, index among its pops)`,
    /// the temporary supplying it.
    pub loads: BTreeMap<(ProgramCounter, usize), Temporary>,
    /// For each producer, the temporaries its pushed value must be stored
    /// into (more than one before coalescing, exactly one after).
    pub stores: BTreeMap<ProgramCounter, Vec<Temporary>>,
    /// The type each temporary carries.
    pub types: BTreeMap<Temporary, FrameValue>,
}

/// Rewrites `instructions`' implicit stack traffic into [`Temporary`]
/// variables, given the stack analyzer's per-instruction pre-states.
#[must_use]
pub fn rewrite(
    instructions: &InstructionList<Instruction>,
    facts: &BTreeMap<ProgramCounter, Frame>,
    verifier: &mut dyn StackMappingVisitor,
) -> RewrittenBody {
    let mut loads = BTreeMap::new();
    let mut stores: BTreeMap<ProgramCounter, Vec<Temporary>> = BTreeMap::new();
    let mut types = BTreeMap::new();
    let mut origins: BTreeMap<Temporary, BTreeSet<ProgramCounter>> = BTreeMap::new();

    for (pc, instruction) in instructions {
        let Some(frame) = facts.get(pc) else {
            continue;
        };
        let pop_count = pop_count_of(instruction, verifier, *pc);
        if pop_count == 0 {
            continue;
        }
        let start = frame.stack.len().saturating_sub(pop_count);
        for (index, slot) in frame.stack[start..].iter().enumerate() {
            let temp = Temporary::Stack {
                consumer: *pc,
                index,
            };
            loads.insert((*pc, index), temp);
            types.insert(temp, slot.value.clone().unwrap_or(FrameValue::Top));
            origins.insert(temp, slot.definitions.clone());
            for &producer in &slot.definitions {
                stores.entry(producer).or_default().push(temp);
            }
        }
    }

    coalesce(&mut loads, &mut stores, &types, &origins);

    RewrittenBody {
        loads,
        stores,
        types,
    }
}

/// How many raw stack slots an instruction consumes, for rewriting purposes.
/// `dup*`/`swap` consume nothing here: they only rearrange which temporary a
/// slot already points to, they never originate a value themselves.
fn pop_count_of(
    instruction: &Instruction,
    verifier: &mut dyn StackMappingVisitor,
    pc: ProgramCounter,
) -> usize {
    match instruction {
        Instruction::Store(var_load_type, _) => {
            usize::from(matches!(
                var_load_type,
                VarLoadType::Long | VarLoadType::Double
            )) + 1
        }
        Instruction::Load(..)
        | Instruction::IInc(..)
        | Instruction::Ret(_)
        | Instruction::Dup
        | Instruction::DupX1
        | Instruction::DupX2
        | Instruction::Dup2
        | Instruction::Dup2X1
        | Instruction::Dup2X2
        | Instruction::Swap => 0,
        _ => verifier.visit(pc, instruction).pop_count,
    }
}

/// Collapses a producer's `storeTo` set down to one shared temporary when
/// every one of its loads is single-site, single-definition, and same-typed
/// — the case a `dup` produces, since every copy shares the original's sole
/// definition.
fn coalesce(
    loads: &mut BTreeMap<(ProgramCounter, usize), Temporary>,
    stores: &mut BTreeMap<ProgramCounter, Vec<Temporary>>,
    types: &BTreeMap<Temporary, FrameValue>,
    origins: &BTreeMap<Temporary, BTreeSet<ProgramCounter>>,
) {
    for (&producer, temps) in stores.iter_mut() {
        if temps.len() < 2 {
            continue;
        }
        let single_definition = temps.iter().all(|temp| {
            origins
                .get(temp)
                .is_some_and(|defs| defs.len() == 1 && defs.contains(&producer))
        });
        let same_type = temps
            .windows(2)
            .all(|pair| types.get(&pair[0]) == types.get(&pair[1]));
        if !single_definition || !same_type {
            continue;
        }
        let merged = Temporary::Expr { producer };
        let superseded: BTreeSet<Temporary> = temps.iter().copied().collect();
        for temp in loads.values_mut() {
            if superseded.contains(temp) {
                *temp = merged;
            }
        }
        *temps = vec![merged];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_flags::MethodAccessFlags;
    use crate::context::{DecompilerContext, DecompilerSettings};
    use crate::instruction::{ArithmeticOp, NumericType};
    use crate::jvm::references::{ClassRef, MethodRef};
    use crate::stack_analysis::StackAnalyzer;
    use crate::types::method_descriptor::{MethodDescriptor, ReturnType};
    use crate::verifier::ReplayVerifier;

    fn context() -> DecompilerContext {
        DecompilerContext::new(
            ClassRef::new("pkg/Foo"),
            MethodRef {
                owner: ClassRef::new("pkg/Foo"),
                name: "bar".to_owned(),
                descriptor: MethodDescriptor {
                    parameters_types: vec![],
                    return_type: ReturnType::Void,
                },
            },
            MethodAccessFlags::empty(),
            DecompilerSettings::default(),
        )
    }

    #[test]
    fn two_independent_pushes_get_distinct_temporaries() {
        let instructions = InstructionList::from([
            (0.into(), Instruction::IConst(1)),
            (1.into(), Instruction::IConst(2)),
            (
                2.into(),
                Instruction::Arithmetic(ArithmeticOp::Add(NumericType::Int)),
            ),
            (
                3.into(),
                Instruction::Return(Some(crate::instruction::ReturnValueType::Int)),
            ),
        ]);
        let handlers = Vec::new();
        let ctx = context();
        let mut verifier = ReplayVerifier;
        let mut analyzer = StackAnalyzer::new(&instructions, &handlers, &mut verifier, &ctx);
        let facts = analyzer.analyze().expect("analysis should succeed");

        let mut verifier = ReplayVerifier;
        let rewritten = rewrite(&instructions, &facts, &mut verifier);

        let lhs = rewritten.loads[&(2.into(), 0)];
        let rhs = rewritten.loads[&(2.into(), 1)];
        assert_ne!(lhs, rhs);
        assert_eq!(rewritten.stores[&ProgramCounter::from(0)], vec![lhs]);
        assert_eq!(rewritten.stores[&ProgramCounter::from(1)], vec![rhs]);
    }

    #[test]
    fn dup_then_two_pops_coalesce_to_one_shared_temporary() {
        let instructions = InstructionList::from([
            (0.into(), Instruction::IConst(1)),
            (1.into(), Instruction::Dup),
            (2.into(), Instruction::Pop),
            (3.into(), Instruction::Pop),
            (4.into(), Instruction::Return(None)),
        ]);
        let handlers = Vec::new();
        let ctx = context();
        let mut verifier = ReplayVerifier;
        let mut analyzer = StackAnalyzer::new(&instructions, &handlers, &mut verifier, &ctx);
        let facts = analyzer.analyze().expect("analysis should succeed");

        let mut verifier = ReplayVerifier;
        let rewritten = rewrite(&instructions, &facts, &mut verifier);

        let first_pop = rewritten.loads[&(2.into(), 0)];
        let second_pop = rewritten.loads[&(3.into(), 0)];
        assert_eq!(first_pop, second_pop);
        assert_eq!(first_pop, Temporary::Expr { producer: 0.into() });
        assert_eq!(
            rewritten.stores[&ProgramCounter::from(0)],
            vec![Temporary::Expr { producer: 0.into() }]
        );
    }
}
