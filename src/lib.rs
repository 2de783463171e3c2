#![warn(
    clippy::pedantic,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    rust_2021_compatibility
)]
// #![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

//! A library that lifts decoded JVM method bodies, stack machine code, into
//! a variable-based abstract syntax tree.
//! ## Features
#![doc = document_features::document_features!()]

pub mod access_flags;
pub mod analysis;
pub mod ast;
#[cfg(feature = "parallel")]
pub mod batch;
pub mod cfg;
pub mod context;
pub mod error;
pub mod exceptions;
pub mod frame;
pub mod instruction;
pub mod jvm;
pub mod metadata;
pub mod pruner;
pub mod rewriter;
pub mod splitter;
pub mod stack_analysis;
pub mod types;
pub mod variables;
pub mod verifier;

/// Test utilities
#[cfg(test)]
pub mod tests;

use crate::analysis::fixed_point::Analyzer;
use crate::cfg::ControlFlowGraphBuilder;
use crate::context::DecompilerContext;
use crate::error::DecompileError;
use crate::jvm::code::{MethodBody, ProgramCounter};
use crate::metadata::MetadataScope;
use crate::verifier::{field_value, StackMappingVisitor};

/// Runs the full pipeline on one method body: decode, normalize the
/// exception table, prune handlers, run the stack analyzer to a fixed
/// point, rewrite stack traffic into temporaries, split local variables,
/// then assemble the AST.
///
/// `cfg_builder` is only consulted for the exception table normalizer; the
/// stack analyzer computes its own successors directly from the shared
/// `cfg` helpers rather than a full graph, so no second build is needed
/// after pruning.
///
/// # Errors
/// Returns [`DecompileError`] if any pass fails; see its variants.
pub fn decompile_method(
    body: &MethodBody,
    metadata: &dyn MetadataScope,
    cfg_builder: &impl ControlFlowGraphBuilder,
    verifier: &mut dyn StackMappingVisitor,
    context: &DecompilerContext,
) -> Result<Vec<ast::Node>, DecompileError> {
    let decoded = instruction::decoder::decode(body, metadata)?;
    let code_size = ProgramCounter::from(u16::try_from(body.code.len()).unwrap_or(u16::MAX));

    let raw_cfg = cfg_builder.build(&decoded.instructions, &[]);
    let handlers = exceptions::normalize(&body.exception_table, &decoded.instructions, &raw_cfg)?;
    let handlers = pruner::prune(handlers, &decoded.instructions);

    let mut analyzer = stack_analysis::StackAnalyzer::new(&decoded.instructions, &handlers, verifier, context);
    let facts = analyzer.analyze()?;

    let rewritten = rewriter::rewrite(&decoded.instructions, &facts, verifier);

    let param_slot_count = parameter_slot_count(context);
    let table = variables::merge(
        &decoded.instructions,
        body.local_variable_table.as_ref(),
        param_slot_count,
        context.has_receiver(),
        code_size,
    );
    let split = splitter::split(&decoded.instructions, &table, &facts, context);

    let nodes = ast::assemble(&decoded.instructions, &handlers, &rewritten, &split, code_size, context)?;
    Ok(nodes)
}

fn parameter_slot_count(context: &DecompilerContext) -> u16 {
    let mut count = u16::from(context.has_receiver());
    for param_type in &context.method.descriptor.parameters_types {
        count += if field_value(param_type).is_wide() { 2 } else { 1 };
    }
    count
}
