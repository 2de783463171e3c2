//! The handler pruner (§4.4): a sequence of passes over the normalized
//! exception handler list, each idempotent on its own output, that collapses
//! the raw per-entry handlers into the canonical nesting the AST assembler
//! expects.

use crate::exceptions::{ExceptionHandler, InstructionRange};
use crate::instruction::Instruction;
use crate::jvm::code::InstructionList;

/// Runs every pruning pass in order. Each pass is individually idempotent;
/// running the whole pipeline twice on its own output is a fixed point.
#[must_use]
pub fn prune(
    handlers: Vec<ExceptionHandler>,
    instructions: &InstructionList<Instruction>,
) -> Vec<ExceptionHandler> {
    let handlers = remove_self_handling_finally(handlers);
    let handlers = close_gaps(handlers, instructions);
    let handlers = align_siblings(handlers, instructions, false);
    let handlers = align_siblings(handlers, instructions, true);
    let handlers = remove_redundant_finally(handlers);
    let handlers = remove_finally_duplicating_outer_catch(handlers);
    extend_try_end(handlers, instructions)
}

/// Pass 1: a `finally` whose handler begins where its own try-block begins,
/// and whose try-block ends before the handler does, can never observe a
/// distinct exception — drop it.
fn remove_self_handling_finally(handlers: Vec<ExceptionHandler>) -> Vec<ExceptionHandler> {
    handlers
        .into_iter()
        .filter(|h| {
            let is_self_handling = h.catch_type().is_none()
                && h.try_block().first == h.handler_block().first
                && h.try_block().last < h.handler_block().last;
            !is_self_handling
        })
        .collect()
}

/// Pass 2: two handlers with identical handler blocks whose try-ranges are
/// adjacent except for a single unconditional branch merge into one handler
/// spanning both ranges.
fn close_gaps(
    handlers: Vec<ExceptionHandler>,
    instructions: &InstructionList<Instruction>,
) -> Vec<ExceptionHandler> {
    let mut result: Vec<ExceptionHandler> = Vec::with_capacity(handlers.len());
    'outer: for handler in handlers {
        for existing in &mut result {
            if existing.handler_block() != handler.handler_block() {
                continue;
            }
            if let Some(merged_try) =
                adjacent_via_single_goto(existing.try_block(), handler.try_block(), instructions)
            {
                *existing = existing.with_try_block(merged_try);
                continue 'outer;
            }
        }
        result.push(handler);
    }
    result
}

fn adjacent_via_single_goto(
    a: InstructionRange,
    b: InstructionRange,
    instructions: &InstructionList<Instruction>,
) -> Option<InstructionRange> {
    let (first, second) = if a.last < b.first { (a, b) } else { (b, a) };
    let gap_start = instructions.next_pc_of(&first.last)?;
    if gap_start == second.first {
        return Some(InstructionRange::new(first.first, second.last));
    }
    let gap_end = instructions.previous_pc_of(&second.first)?;
    if gap_start != gap_end {
        return None;
    }
    matches!(instructions.get(&gap_start), Some(Instruction::Goto(_)))
        .then(|| InstructionRange::new(first.first, second.last))
}

/// Passes 3 and 4: handlers sharing a try-block (pass 3: all siblings; pass
/// 4: catch siblings only) end exactly one instruction before the next
/// sibling's handler begins.
fn align_siblings(
    handlers: Vec<ExceptionHandler>,
    instructions: &InstructionList<Instruction>,
    catches_only: bool,
) -> Vec<ExceptionHandler> {
    let mut handlers = handlers;
    let indices: Vec<usize> = (0..handlers.len()).collect();
    for &i in &indices {
        let try_block = handlers[i].try_block();
        let is_eligible = |h: &ExceptionHandler| {
            h.try_block() == try_block && (!catches_only || h.catch_type().is_some())
        };
        if catches_only && handlers[i].catch_type().is_none() {
            continue;
        }
        let next_sibling_start = handlers
            .iter()
            .filter(|h| is_eligible(h) && h.handler_block().first > handlers[i].handler_block().first)
            .map(|h| h.handler_block().first)
            .min();
        if let Some(next_start) = next_sibling_start {
            if let Some(new_end) = instructions.previous_pc_of(&next_start) {
                if new_end < handlers[i].handler_block().last {
                    handlers[i] = handlers[i].with_handler_end(new_end);
                }
            }
        }
    }
    handlers
}

/// Pass 5: a `finally` whose handler block exactly matches a sibling
/// `finally` nested inside it (a strictly narrower try-block reaching the
/// same handler code) is redundant; keep only the most-nested one.
fn remove_redundant_finally(handlers: Vec<ExceptionHandler>) -> Vec<ExceptionHandler> {
    let redundant: Vec<bool> = handlers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            h.catch_type().is_none()
                && handlers.iter().enumerate().any(|(j, other)| {
                    j != i
                        && other.catch_type().is_none()
                        && other.handler_block() == h.handler_block()
                        && strictly_contains(h.try_block(), other.try_block())
                })
        })
        .collect();
    handlers
        .into_iter()
        .zip(redundant)
        .filter_map(|(h, is_redundant)| (!is_redundant).then_some(h))
        .collect()
}

/// Pass 6: a `finally` nested inside an outer `catch` whose handler code is
/// identical just re-enters that catch; drop it.
fn remove_finally_duplicating_outer_catch(handlers: Vec<ExceptionHandler>) -> Vec<ExceptionHandler> {
    let duplicate: Vec<bool> = handlers
        .iter()
        .map(|h| {
            h.catch_type().is_none()
                && handlers.iter().any(|outer| {
                    outer.catch_type().is_some()
                        && outer.handler_block() == h.handler_block()
                        && strictly_contains(outer.try_block(), h.try_block())
                })
        })
        .collect();
    handlers
        .into_iter()
        .zip(duplicate)
        .filter_map(|(h, is_duplicate)| (!is_duplicate).then_some(h))
        .collect()
}

/// Pass 7: if the instruction right before a try-block group's first
/// handler is an unconditional branch, a throw, or a return carrying a
/// value, and it immediately follows the try-block, fold it into the
/// try-block. Applied to every sibling sharing that try-block.
fn extend_try_end(
    handlers: Vec<ExceptionHandler>,
    instructions: &InstructionList<Instruction>,
) -> Vec<ExceptionHandler> {
    let mut handlers = handlers;
    let try_blocks: std::collections::BTreeSet<InstructionRange> =
        handlers.iter().map(ExceptionHandler::try_block).collect();
    let mut extensions = std::collections::BTreeMap::new();
    for &try_block in &try_blocks {
        let first_handler_start = handlers
            .iter()
            .filter(|h| h.try_block() == try_block)
            .map(|h| h.handler_block().first)
            .min();
        let Some(first_handler_start) = first_handler_start else {
            continue;
        };
        let Some(preceding) = instructions.previous_pc_of(&first_handler_start) else {
            continue;
        };
        if preceding <= try_block.last {
            continue;
        }
        if instructions.next_pc_of(&try_block.last) != Some(preceding) {
            continue;
        }
        if instructions
            .get(&preceding)
            .is_some_and(is_trailing_control_transfer)
        {
            extensions.insert(try_block, InstructionRange::new(try_block.first, preceding));
        }
    }
    for handler in &mut handlers {
        if let Some(&extended) = extensions.get(&handler.try_block()) {
            *handler = handler.with_try_block(extended);
        }
    }
    handlers
}

fn is_trailing_control_transfer(instruction: &Instruction) -> bool {
    matches!(instruction, Instruction::Goto(_) | Instruction::AThrow)
        || matches!(instruction, Instruction::Return(Some(_)))
}

fn strictly_contains(outer: InstructionRange, inner: InstructionRange) -> bool {
    outer != inner && outer.contains(inner.first) && outer.contains(inner.last)
}
