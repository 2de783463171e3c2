//! Parallel batch decompilation (§5): a thin `rayon` fan-out over independent
//! [`decompile_method`] jobs. Each job gets its own [`StackMappingVisitor`],
//! since the verifier carries per-body state and is never shared across
//! method bodies; no additional synchronization is introduced because none
//! is needed.

use rayon::prelude::*;

use crate::cfg::ControlFlowGraphBuilder;
use crate::context::DecompilerContext;
use crate::error::DecompileError;
use crate::jvm::code::MethodBody;
use crate::metadata::MetadataScope;
use crate::verifier::StackMappingVisitor;
use crate::{ast::Node, decompile_method};

/// One independent method-decompilation job.
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    /// The method body to decompile.
    pub body: &'a MethodBody,
    /// The declaring class, method, and settings to decompile it under.
    pub context: &'a DecompilerContext,
}

/// Decompiles every job in `jobs` concurrently, one `rayon` task per job, and
/// returns results in the same order as `jobs`.
///
/// `metadata` and `cfg_builder` are shared, read-only, across every job. `V`
/// is instantiated fresh for each job via [`Default`], matching the rule
/// that a verifier never outlives the single method body it analyzes.
pub fn decompile_many<B, V>(
    jobs: &[Job<'_>],
    metadata: &(dyn MetadataScope + Sync),
    cfg_builder: &B,
) -> Vec<Result<Vec<Node>, DecompileError>>
where
    B: ControlFlowGraphBuilder + Sync,
    V: StackMappingVisitor + Default,
{
    jobs.par_iter()
        .map(|job| {
            let mut verifier = V::default();
            decompile_method(job.body, metadata, cfg_builder, &mut verifier, job.context)
        })
        .collect()
}
