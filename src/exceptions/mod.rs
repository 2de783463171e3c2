//! Exception handler data model and the exception table normalizer (§4.3):
//! reconstructing each handler's true end offset from control flow, since the
//! class file only records where it begins.

use thiserror::Error;

use crate::cfg::{CfgNodeKind, ControlFlowGraph};
use crate::jvm::code::{ExceptionTableEntry, InstructionList, ProgramCounter};
use crate::jvm::references::ClassRef;
use crate::instruction::Instruction;

/// A half-open (inclusive) range of instructions, identified by their
/// first and last offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstructionRange {
    /// The first instruction in the range.
    pub first: ProgramCounter,
    /// The last instruction in the range (inclusive).
    pub last: ProgramCounter,
}

impl InstructionRange {
    /// Creates a range covering `[first, last]`.
    #[must_use]
    pub const fn new(first: ProgramCounter, last: ProgramCounter) -> Self {
        Self { first, last }
    }

    /// Whether `pc` lies within this range.
    #[must_use]
    pub fn contains(&self, pc: ProgramCounter) -> bool {
        self.first <= pc && pc <= self.last
    }

    /// Whether this range and `other` share any instruction.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// One normalized exception handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionHandler {
    /// Catches a specific exception type.
    Catch {
        /// The protected range.
        try_block: InstructionRange,
        /// The handler body.
        handler_block: InstructionRange,
        /// The type of exception caught.
        catch_type: ClassRef,
    },
    /// Runs unconditionally on the way out of the try-block, catching any `Throwable`.
    Finally {
        /// The protected range.
        try_block: InstructionRange,
        /// The handler body.
        handler_block: InstructionRange,
    },
}

impl ExceptionHandler {
    /// The protected range, regardless of handler kind.
    #[must_use]
    pub const fn try_block(&self) -> InstructionRange {
        match self {
            Self::Catch { try_block, .. } | Self::Finally { try_block, .. } => *try_block,
        }
    }

    /// The handler body, regardless of handler kind.
    #[must_use]
    pub const fn handler_block(&self) -> InstructionRange {
        match self {
            Self::Catch { handler_block, .. } | Self::Finally { handler_block, .. } => {
                *handler_block
            }
        }
    }

    /// The caught exception type, or `None` for a `finally` handler.
    #[must_use]
    pub const fn catch_type(&self) -> Option<&ClassRef> {
        match self {
            Self::Catch { catch_type, .. } => Some(catch_type),
            Self::Finally { .. } => None,
        }
    }

    /// Rebuilds this handler with a different handler-block end offset.
    #[must_use]
    pub fn with_handler_end(&self, end: ProgramCounter) -> Self {
        match self.clone() {
            Self::Catch {
                try_block,
                handler_block,
                catch_type,
            } => Self::Catch {
                try_block,
                handler_block: InstructionRange::new(handler_block.first, end),
                catch_type,
            },
            Self::Finally {
                try_block,
                handler_block,
            } => Self::Finally {
                try_block,
                handler_block: InstructionRange::new(handler_block.first, end),
            },
        }
    }

    /// Rebuilds this handler with a different try-block range.
    #[must_use]
    pub fn with_try_block(&self, try_block: InstructionRange) -> Self {
        match self.clone() {
            Self::Catch {
                handler_block,
                catch_type,
                ..
            } => Self::Catch {
                try_block,
                handler_block,
                catch_type,
            },
            Self::Finally { handler_block, .. } => Self::Finally {
                try_block,
                handler_block,
            },
        }
    }
}

/// A fatal failure while normalizing the exception table.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A raw exception-table entry's try or handler range did not correspond
    /// to any instruction in the decoded method body.
    #[error("exception table entry references a non-existent instruction at {0}")]
    DanglingReference(ProgramCounter),
}

/// Reconstructs each raw exception-table entry's handler end offset using
/// the CFG's dominance relation, per §4.3.
///
/// # Errors
/// Returns [`NormalizeError`] if a raw entry's offsets do not correspond to
/// real instructions in `instructions`.
pub fn normalize(
    raw: &[ExceptionTableEntry],
    instructions: &InstructionList<Instruction>,
    cfg: &dyn ControlFlowGraph,
) -> Result<Vec<ExceptionHandler>, NormalizeError> {
    let mut handlers = Vec::with_capacity(raw.len());

    for entry in raw {
        let try_first = *entry.covered_pc.start();
        let try_last = *entry.covered_pc.end();
        if instructions.get(&try_first).is_none() {
            return Err(NormalizeError::DanglingReference(try_first));
        }

        let handler_first = entry.handler_pc;
        if instructions.get(&handler_first).is_none() {
            return Err(NormalizeError::DanglingReference(handler_first));
        }

        let handler_end = reconstruct_handler_end(handler_first, instructions, cfg, raw, entry);
        let try_block = InstructionRange::new(try_first, try_last);
        let handler_block = InstructionRange::new(handler_first, handler_end);

        handlers.push(match &entry.catch_type {
            Some(catch_type) => ExceptionHandler::Catch {
                try_block,
                handler_block,
                catch_type: catch_type.clone(),
            },
            None => ExceptionHandler::Finally {
                try_block,
                handler_block,
            },
        });
    }

    Ok(handlers)
}

/// Walks forward from a handler's entry, following CFG successors, to find
/// where control leaves the handler for good: the first node whose
/// dominance frontier does not loop back into the handler itself, lower
/// bounded by the next entry's handler start so a handler never swallows an
/// enclosing one.
fn reconstruct_handler_end(
    handler_first: ProgramCounter,
    instructions: &InstructionList<Instruction>,
    cfg: &dyn ControlFlowGraph,
    raw: &[ExceptionTableEntry],
    own_entry: &ExceptionTableEntry,
) -> ProgramCounter {
    let bound = raw
        .iter()
        .filter(|other| {
            !std::ptr::eq(*other, own_entry) && other.handler_pc > handler_first
        })
        .map(|other| other.handler_pc)
        .min();

    let mut visited = std::collections::BTreeSet::new();
    let mut stack = vec![handler_first];
    let mut end = handler_first;

    while let Some(pc) = stack.pop() {
        if !visited.insert(pc) {
            continue;
        }
        if let Some(bound) = bound {
            if pc >= bound {
                continue;
            }
        }
        // Control leaving the handler into a tagged exit/entry node ends the
        // handler at the instruction before it, not at the node itself.
        if pc != handler_first && !matches!(cfg.kind_at(pc), None | Some(CfgNodeKind::Normal)) {
            continue;
        }
        end = end.max(pc);

        let frontier = cfg.dominance_frontier(pc);
        let still_within_handler = frontier
            .iter()
            .all(|&f| matches!(cfg.kind_at(f), None | Some(CfgNodeKind::Normal)) && f > handler_first);

        if still_within_handler {
            for succ in cfg.successors(pc) {
                if succ > end || !visited.contains(&succ) {
                    stack.push(succ);
                }
            }
        }
    }

    let clamp = bound
        .and_then(|b| instructions.previous_pc_of(&b))
        .unwrap_or(end);
    let last_instruction = instructions
        .iter()
        .map(|(pc, _)| *pc)
        .next_back()
        .unwrap_or(end);
    end.min(clamp).min(last_instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{ControlFlowGraphBuilder, PetgraphCfgBuilder};
    use crate::instruction::{Condition, IfOperands};
    use crate::jvm::code::InstructionList;

    fn body(instructions: &[(u16, Instruction)]) -> InstructionList<Instruction> {
        instructions
            .iter()
            .map(|(pc, i)| (ProgramCounter::from(*pc), i.clone()))
            .collect::<std::collections::BTreeMap<_, _>>()
            .into()
    }

    /// A catch handler that branches before reaching its regular exit: the
    /// `if` at 30 splits into a fall-through and a `goto`, both converging on
    /// the `goto` at 60 that leaves the handler for the method's shared
    /// `return` at 70. The reconstructed handler end must land on 60, not on
    /// the shared return the handler merely jumps into.
    #[test]
    fn handler_end_stops_before_the_branch_merges_back_into_the_method() {
        let instructions = body(&[
            (0, Instruction::Nop),
            (10, Instruction::AThrow),
            (20, Instruction::Nop),
            (30, Instruction::If(Condition::Eq, IfOperands::IntVsZero, 60.into())),
            (40, Instruction::Nop),
            (50, Instruction::Goto(60.into())),
            (60, Instruction::Goto(70.into())),
            (70, Instruction::Return(None)),
        ]);
        let entry = ExceptionTableEntry {
            covered_pc: 0.into()..=10.into(),
            handler_pc: 20.into(),
            catch_type: Some(ClassRef::new("java/lang/Exception")),
        };
        let handler = ExceptionHandler::Catch {
            try_block: InstructionRange::new(0.into(), 10.into()),
            handler_block: InstructionRange::new(20.into(), 20.into()),
            catch_type: ClassRef::new("java/lang/Exception"),
        };
        let cfg = PetgraphCfgBuilder.build(&instructions, std::slice::from_ref(&handler));

        let normalized = normalize(std::slice::from_ref(&entry), &instructions, &cfg).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].handler_block(), InstructionRange::new(20.into(), 60.into()));
    }

    #[test]
    fn ranges_overlap() {
        let a = InstructionRange::new(0.into(), 5.into());
        let b = InstructionRange::new(5.into(), 10.into());
        let c = InstructionRange::new(6.into(), 10.into());
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn handler_end_rebuild_preserves_kind() {
        let handler = ExceptionHandler::Catch {
            try_block: InstructionRange::new(0.into(), 3.into()),
            handler_block: InstructionRange::new(4.into(), 4.into()),
            catch_type: ClassRef::new("java/lang/Exception"),
        };
        let updated = handler.with_handler_end(8.into());
        assert_eq!(updated.handler_block().last, 8.into());
        assert!(updated.catch_type().is_some());
    }
}
