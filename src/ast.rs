//! The AST assembler (§4.8): the last pass, turning the linear instruction
//! list plus the pruned handler list, rewriter output, and splitter output
//! into a tree of [`Node`]s.
//!
//! Try/catch/finally nesting is recovered by recursing over half-open
//! instruction ranges, peeling off the widest-shared try-block at each
//! level; everywhere else instructions are emitted linearly, wrapped into
//! [`Node::Store`] where the rewriter recorded a temporary, and annotated
//! with whichever [`splitter::Variable`](crate::splitter::Variable) the
//! splitter resolved a local-variable access to.

use std::collections::BTreeMap;
use std::ops::Range;

use thiserror::Error;

use crate::cfg::{branch_targets, falls_through};
use crate::context::DecompilerContext;
use crate::exceptions::ExceptionHandler;
use crate::instruction::Instruction;
use crate::jvm::code::{InstructionList, ProgramCounter};
use crate::jvm::references::ClassRef;
use crate::rewriter::{RewrittenBody, Temporary};
use crate::splitter::SplitVariables;

/// One node of the assembled tree. Replaces the source hierarchy's
/// `Node`/`Expression`/`Block`/`TryCatchBlock`/`CatchBlock`/`Label` classes
/// with a single tagged variant plus a sequence of children.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A branch target, carrying a unique, assembly-order index.
    Label(usize),
    /// One bytecode instruction, reconstructed with its operand sub-trees.
    Expression {
        /// The instruction this expression wraps.
        instruction: Instruction,
        /// The instruction's offset.
        pc: ProgramCounter,
        /// The local variable this instruction reads, if any and if resolved
        /// by the splitter (an index into the splitter's `variables`).
        variable: Option<usize>,
        /// The popped operands, each a [`Node::Load`] of the temporary the
        /// rewriter assigned, in pop order.
        operands: Vec<Node>,
        /// The source byte ranges this expression covers.
        ranges: Vec<Range<ProgramCounter>>,
    },
    /// Reads a rewriter-assigned temporary.
    Load(Temporary),
    /// Defines a rewriter-assigned temporary with the given expression's value.
    Store(Temporary, Box<Node>),
    /// A straight-line sequence of nodes.
    Block(Vec<Node>),
    /// A try-block with its catch and/or finally handlers.
    TryCatchBlock(TryCatchBlock),
    /// A synthetic marker appended to a try-block that does not end in
    /// unconditional control flow, so the tree stays explicit about where
    /// control leaves the block.
    Leave,
}

/// A try-block together with the handlers protecting it.
#[derive(Debug, Clone, PartialEq)]
pub struct TryCatchBlock {
    /// The protected body.
    pub try_block: Box<Node>,
    /// The `catch` handlers, in handler-start order.
    pub catches: Vec<CatchBlock>,
    /// The `finally` handler, if one protects this try-block.
    pub finally: Option<FinallyBlock>,
}

/// One `catch` handler, possibly a multi-catch alias of several exception types.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchBlock {
    /// The exception type(s) this handler catches. More than one entry means
    /// a multi-catch alias (several exception-table entries sharing one
    /// handler body); this crate keeps the full caught-type list rather than
    /// resolving a common supertype, since no class-hierarchy resolver is
    /// exposed to this pass.
    pub exception_types: Vec<ClassRef>,
    /// The temporary the caught value was stored to, if the handler body
    /// consumes it at all.
    pub exception_variable: Option<Temporary>,
    /// The handler body.
    pub body: Box<Node>,
}

/// A `finally` handler.
#[derive(Debug, Clone, PartialEq)]
pub struct FinallyBlock {
    /// The temporary the caught value was stored to, if the handler body
    /// consumes it at all.
    pub exception_variable: Option<Temporary>,
    /// The handler body.
    pub body: Box<Node>,
}

/// A fatal inconsistency the assembler detected in its inputs.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// A range boundary did not land on a real instruction offset.
    #[error("no instruction at {0}")]
    MissingInstruction(ProgramCounter),
}

/// Assembles the full method body into a sequence of top-level [`Node`]s.
///
/// # Errors
/// Returns [`AssembleError`] if `handlers` or `code_size` reference an
/// offset absent from `instructions`.
pub fn assemble(
    instructions: &InstructionList<Instruction>,
    handlers: &[ExceptionHandler],
    rewritten: &RewrittenBody,
    split: &SplitVariables,
    code_size: ProgramCounter,
    context: &DecompilerContext,
) -> Result<Vec<Node>, AssembleError> {
    let Some((&start, _)) = instructions.entry_point() else {
        return Ok(Vec::new());
    };
    let labels = collect_labels(instructions);
    assemble_range(
        start,
        code_size,
        handlers,
        instructions,
        rewritten,
        split,
        &labels,
        context,
    )
}

fn collect_labels(instructions: &InstructionList<Instruction>) -> BTreeMap<ProgramCounter, usize> {
    let mut targets = std::collections::BTreeSet::new();
    for (_, instruction) in instructions {
        for target in branch_targets(instruction) {
            targets.insert(target);
        }
    }
    targets.into_iter().enumerate().map(|(i, pc)| (pc, i)).collect()
}

#[allow(clippy::too_many_arguments)]
fn assemble_range(
    start: ProgramCounter,
    end: ProgramCounter,
    active: &[ExceptionHandler],
    instructions: &InstructionList<Instruction>,
    rewritten: &RewrittenBody,
    split: &SplitVariables,
    labels: &BTreeMap<ProgramCounter, usize>,
    context: &DecompilerContext,
) -> Result<Vec<Node>, AssembleError> {
    let mut out = Vec::new();
    let mut cursor = start;
    let mut remaining: Vec<ExceptionHandler> = active.to_vec();

    loop {
        let chosen_try = remaining
            .iter()
            .map(ExceptionHandler::try_block)
            .filter(|range| range.first >= cursor && range.first < end)
            .min_by_key(|range| range.first);
        let Some(chosen_try) = chosen_try else { break };

        out.extend(linear(cursor, chosen_try.first, instructions, rewritten, split, labels)?);

        let (mut siblings, rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|h| h.try_block() == chosen_try);
        remaining = rest;
        siblings.sort_by_key(|h| h.handler_block().first);

        let try_end = next_or(instructions, chosen_try.last, end);
        let try_body = assemble_range(chosen_try.first, try_end, &remaining, instructions, rewritten, split, labels, context)?;
        let try_block = wrap_block_with_leave(try_body, chosen_try.first, try_end, instructions);

        let mut catches: Vec<CatchBlock> = Vec::new();
        let mut catch_starts: BTreeMap<ProgramCounter, usize> = BTreeMap::new();
        let mut finally: Option<FinallyBlock> = None;
        let mut tail_start = try_end;

        for handler in &siblings {
            let handler_block = handler.handler_block();
            let handler_end = next_or(instructions, handler_block.last, end);
            tail_start = tail_start.max(handler_end);

            if let ExceptionHandler::Catch { catch_type, .. } = handler {
                if let Some(&index) = catch_starts.get(&handler_block.first) {
                    catches[index].exception_types.push(catch_type.clone());
                    continue;
                }
                let body = assemble_range(
                    handler_block.first,
                    handler_end,
                    &remaining,
                    instructions,
                    rewritten,
                    split,
                    labels,
                    context,
                )?;
                let exception_variable = exception_variable_of(handler_block.first, rewritten, context.settings);
                catch_starts.insert(handler_block.first, catches.len());
                catches.push(CatchBlock {
                    exception_types: vec![catch_type.clone()],
                    exception_variable,
                    body: Box::new(Node::Block(body)),
                });
            } else {
                let body = assemble_range(
                    handler_block.first,
                    handler_end,
                    &remaining,
                    instructions,
                    rewritten,
                    split,
                    labels,
                    context,
                )?;
                let exception_variable = exception_variable_of(handler_block.first, rewritten, context.settings);
                finally = Some(FinallyBlock {
                    exception_variable,
                    body: Box::new(Node::Block(body)),
                });
            }
        }

        out.push(Node::TryCatchBlock(TryCatchBlock {
            try_block: Box::new(try_block),
            catches,
            finally,
        }));

        cursor = tail_start;
    }

    out.extend(linear(cursor, end, instructions, rewritten, split, labels)?);
    Ok(out)
}

fn next_or(instructions: &InstructionList<Instruction>, pc: ProgramCounter, fallback: ProgramCounter) -> ProgramCounter {
    instructions.next_pc_of(&pc).unwrap_or(fallback)
}

/// The temporary the handler's seeded caught-exception value flows into, if
/// the handler body consumes it at all. The stack analyzer stamps that
/// seeded value's `definitions` with the handler's own entry offset, so it
/// takes part in the rewriter's ordinary producer/temporary bookkeeping like
/// any other instruction's pushed value — no separate `LoadException`
/// pseudo-node is needed.
///
/// When the body never reads the caught value, `rewritten.stores` has no
/// entry for it at all; `settings.always_generate_exception_variable_for_catch_blocks`
/// forces one anyway, naming it after the handler's own entry offset like any
/// other coalesced, producer-named temporary.
fn exception_variable_of(
    handler_start: ProgramCounter,
    rewritten: &RewrittenBody,
    settings: crate::context::DecompilerSettings,
) -> Option<Temporary> {
    rewritten
        .stores
        .get(&handler_start)
        .and_then(|temps| temps.first().copied())
        .or_else(|| {
            settings
                .always_generate_exception_variable_for_catch_blocks
                .then_some(Temporary::Expr { producer: handler_start })
        })
}

/// Wraps `body` in a [`Node::Block`], appending [`Node::Leave`] when the last
/// instruction in `[start, end)` does not itself transfer control away
/// unconditionally.
fn wrap_block_with_leave(
    mut body: Vec<Node>,
    start: ProgramCounter,
    end: ProgramCounter,
    instructions: &InstructionList<Instruction>,
) -> Node {
    let last_falls_through = instructions
        .previous_pc_of(&end)
        .filter(|pc| *pc >= start)
        .and_then(|pc| instructions.get(&pc))
        .is_none_or(falls_through);
    if last_falls_through {
        body.push(Node::Leave);
    }
    Node::Block(body)
}

fn linear(
    start: ProgramCounter,
    end: ProgramCounter,
    instructions: &InstructionList<Instruction>,
    rewritten: &RewrittenBody,
    split: &SplitVariables,
    labels: &BTreeMap<ProgramCounter, usize>,
) -> Result<Vec<Node>, AssembleError> {
    let mut out = Vec::new();
    let mut pc = start;
    while pc < end {
        let instruction = instructions.get(&pc).ok_or(AssembleError::MissingInstruction(pc))?;

        if let Some(&label) = labels.get(&pc) {
            out.push(Node::Label(label));
        }

        if is_structural_only(instruction) {
            pc = next_or(instructions, pc, end);
            continue;
        }

        let mut operands = Vec::new();
        let mut index = 0;
        while let Some(&temp) = rewritten.loads.get(&(pc, index)) {
            operands.push(Node::Load(temp));
            index += 1;
        }

        let expr = Node::Expression {
            instruction: instruction.clone(),
            pc,
            variable: split.reference_variable.get(&pc).copied(),
            operands,
            ranges: vec![pc..next_or(instructions, pc, end)],
        };

        out.extend(wrap_store(pc, expr, rewritten));
        pc = next_or(instructions, pc, end);
    }
    Ok(out)
}

/// `dup*`/`swap` never appear in the emitted tree: the rewriter already
/// folded their effect into which temporary a load resolves to.
fn is_structural_only(instruction: &Instruction) -> bool {
    matches!(
        instruction,
        Instruction::Dup
            | Instruction::DupX1
            | Instruction::DupX2
            | Instruction::Dup2
            | Instruction::Dup2X1
            | Instruction::Dup2X2
            | Instruction::Swap
    )
}

fn wrap_store(pc: ProgramCounter, expr: Node, rewritten: &RewrittenBody) -> Vec<Node> {
    let Some(temps) = rewritten.stores.get(&pc) else {
        return vec![expr];
    };
    match temps.as_slice() {
        [] => vec![expr],
        [only] => vec![Node::Store(*only, Box::new(expr))],
        [primary, rest @ ..] => {
            let mut out = vec![Node::Store(*primary, Box::new(expr))];
            out.extend(
                rest.iter()
                    .rev()
                    .map(|temp| Node::Store(*temp, Box::new(Node::Load(*primary)))),
            );
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::ReturnValueType;
    use crate::stack_analysis::StackAnalyzer;
    use crate::access_flags::MethodAccessFlags;
    use crate::context::{DecompilerContext, DecompilerSettings};
    use crate::jvm::references::{ClassRef as CRef, MethodRef};
    use crate::types::method_descriptor::{MethodDescriptor, ReturnType};
    use crate::verifier::ReplayVerifier;
    use crate::{rewriter, splitter, variables};

    fn context() -> DecompilerContext {
        DecompilerContext::new(
            CRef::new("pkg/Foo"),
            MethodRef {
                owner: CRef::new("pkg/Foo"),
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

    fn run(
        instructions: InstructionList<Instruction>,
        handlers: Vec<ExceptionHandler>,
        code_size: u16,
    ) -> Vec<Node> {
        let ctx = context();
        let mut verifier = ReplayVerifier;
        let mut analyzer = StackAnalyzer::new(&instructions, &handlers, &mut verifier, &ctx);
        let facts = analyzer.analyze().expect("analysis should succeed");

        let mut verifier = ReplayVerifier;
        let rewritten = rewriter::rewrite(&instructions, &facts, &mut verifier);
        let table = variables::merge(&instructions, None, 0, false, code_size.into());
        let split = splitter::split(&instructions, &table, &facts, &ctx);

        assemble(&instructions, &handlers, &rewritten, &split, code_size.into(), &ctx)
            .expect("assembly should succeed")
    }

    #[test]
    fn empty_body_assembles_to_an_empty_sequence() {
        let instructions = InstructionList::from([]);
        assert!(run(instructions, Vec::new(), 0).is_empty());
    }

    #[test]
    fn straight_line_add_has_no_surviving_temporaries() {
        let instructions = InstructionList::from([
            (0.into(), Instruction::IConst(1)),
            (1.into(), Instruction::IConst(2)),
            (
                2.into(),
                Instruction::Arithmetic(crate::instruction::ArithmeticOp::Add(crate::instruction::NumericType::Int)),
            ),
            (3.into(), Instruction::Return(Some(ReturnValueType::Int))),
        ]);
        let nodes = run(instructions, Vec::new(), 4);
        // iconst_1 and iconst_2 each get stored into a temporary consumed once
        // by the add, then the add's own result flows straight into return
        // with no further store.
        assert_eq!(nodes.len(), 3);
        assert!(matches!(nodes[2], Node::Expression { instruction: Instruction::Return(_), .. }));
    }

    #[test]
    fn dup_does_not_appear_in_the_emitted_tree() {
        let instructions = InstructionList::from([
            (0.into(), Instruction::IConst(1)),
            (1.into(), Instruction::Dup),
            (2.into(), Instruction::Pop),
            (3.into(), Instruction::Pop),
            (4.into(), Instruction::Return(None)),
        ]);
        let nodes = run(instructions, Vec::new(), 5);
        let has_dup = nodes.iter().any(|n| matches!(n, Node::Expression { instruction: Instruction::Dup, .. }));
        assert!(!has_dup);
    }

    #[test]
    fn forward_branch_target_gets_a_label() {
        let instructions = InstructionList::from([
            (0.into(), Instruction::Load(crate::instruction::VarLoadType::Int, 0)),
            (
                1.into(),
                Instruction::If(crate::instruction::Condition::Eq, crate::instruction::IfOperands::IntVsZero, 4.into()),
            ),
            (2.into(), Instruction::IConst(1)),
            (3.into(), Instruction::Return(Some(ReturnValueType::Int))),
            (4.into(), Instruction::IConst(0)),
            (5.into(), Instruction::Return(Some(ReturnValueType::Int))),
        ]);
        let mut ctx = context();
        ctx.method.descriptor.parameters_types = vec![crate::types::field_type::FieldType::Base(
            crate::types::field_type::PrimitiveType::Int,
        )];
        let mut verifier = ReplayVerifier;
        let mut analyzer = StackAnalyzer::new(&instructions, &[], &mut verifier, &ctx);
        let facts = analyzer.analyze().expect("analysis should succeed");
        let mut verifier = ReplayVerifier;
        let rewritten = rewriter::rewrite(&instructions, &facts, &mut verifier);
        let table = variables::merge(&instructions, None, 1, false, 6.into());
        let split = splitter::split(&instructions, &table, &facts, &ctx);
        let nodes = assemble(&instructions, &[], &rewritten, &split, 6.into(), &ctx).unwrap();

        assert!(nodes.iter().any(|n| matches!(n, Node::Label(_))));
    }

    #[test]
    fn exception_variable_is_none_when_unread_and_flag_is_off() {
        let rewritten = RewrittenBody::default();
        let settings = DecompilerSettings::default();
        assert_eq!(exception_variable_of(0.into(), &rewritten, settings), None);
    }

    #[test]
    fn exception_variable_is_synthesized_when_unread_and_flag_is_on() {
        let rewritten = RewrittenBody::default();
        let settings = DecompilerSettings {
            always_generate_exception_variable_for_catch_blocks: true,
            ..DecompilerSettings::default()
        };
        assert_eq!(
            exception_variable_of(5.into(), &rewritten, settings),
            Some(Temporary::Expr { producer: 5.into() })
        );
    }

    #[test]
    fn identity_rethrow_produces_one_catch_block() {
        let instructions = InstructionList::from([
            (0.into(), Instruction::AThrow),
            (1.into(), Instruction::Load(crate::instruction::VarLoadType::Reference, 1)),
            (2.into(), Instruction::AThrow),
        ]);
        let handlers = vec![ExceptionHandler::Catch {
            try_block: crate::exceptions::InstructionRange::new(0.into(), 0.into()),
            handler_block: crate::exceptions::InstructionRange::new(1.into(), 2.into()),
            catch_type: CRef::new("java/lang/Throwable"),
        }];
        let nodes = run(instructions, handlers, 3);
        let try_catch = nodes.iter().find_map(|n| match n {
            Node::TryCatchBlock(tc) => Some(tc),
            _ => None,
        });
        let try_catch = try_catch.expect("one try/catch block");
        assert_eq!(try_catch.catches.len(), 1);
        assert_eq!(try_catch.catches[0].exception_types, vec![CRef::new("java/lang/Throwable")]);
    }
}
