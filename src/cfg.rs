//! The control-flow graph builder: an external collaborator, specified here
//! only through its interface, plus a `petgraph`-backed default
//! implementation good enough to drive the normalizer and analyzer in tests.

use std::collections::{BTreeMap, BTreeSet};

use crate::instruction::Instruction;
use crate::jvm::code::{InstructionList, ProgramCounter};

/// What role a CFG node plays, consulted by the exception table normalizer
/// and handler pruner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgNodeKind {
    /// An ordinary instruction.
    Normal,
    /// The method's single entry point.
    EntryPoint,
    /// A normal (non-exceptional) method exit.
    RegularExit,
    /// An exceptional method exit (an uncaught `athrow`).
    ExceptionalExit,
    /// The first instruction of a `catch` handler.
    CatchHandler,
    /// The first instruction of a `finally` handler.
    FinallyHandler,
    /// The instruction ending a `finally` handler (`athrow` re-raising, or a `ret`).
    EndFinally,
}

/// One node of the control-flow graph: the (non-exceptional) instruction
/// range `[start, end]` it represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CfgNode {
    /// The first instruction in this node.
    pub start: ProgramCounter,
    /// The last instruction in this node.
    pub end: ProgramCounter,
}

/// A control-flow graph over one method body's instructions, with computed
/// dominance and dominance-frontier relations.
///
/// This is an external collaborator: a host application supplies its own
/// implementation (typically backed by the same CFG it uses for other
/// analyses). [`PetgraphCfgBuilder`] is a default good enough for this
/// crate's own tests.
pub trait ControlFlowGraph {
    /// Returns the node kind for the node starting at `pc`, if `pc` starts a node.
    fn kind_at(&self, pc: ProgramCounter) -> Option<CfgNodeKind>;

    /// Returns the node starting at `pc`, if any.
    fn node_at(&self, pc: ProgramCounter) -> Option<CfgNode>;

    /// Returns the successors of the node starting at `pc`.
    fn successors(&self, pc: ProgramCounter) -> Vec<ProgramCounter>;

    /// Returns the immediate dominator of the node starting at `pc`, or
    /// `None` for the entry point.
    fn immediate_dominator(&self, pc: ProgramCounter) -> Option<ProgramCounter>;

    /// Returns the dominance frontier of the node starting at `pc`: nodes
    /// that `pc` dominates a predecessor of but does not itself dominate.
    fn dominance_frontier(&self, pc: ProgramCounter) -> BTreeSet<ProgramCounter>;
}

/// Builds a [`ControlFlowGraph`] for a decoded instruction list plus its
/// (raw or normalized) exception handlers.
pub trait ControlFlowGraphBuilder {
    /// The graph type this builder produces.
    type Graph: ControlFlowGraph;

    /// Builds the graph.
    fn build(
        &self,
        instructions: &InstructionList<Instruction>,
        exception_handlers: &[crate::exceptions::ExceptionHandler],
    ) -> Self::Graph;
}

/// The default [`ControlFlowGraphBuilder`], backed by `petgraph`.
///
/// It computes basic blocks by splitting at every branch/return/throw
/// instruction and every known branch target, links them by fall-through and
/// branch edges (including one edge per exception handler from every
/// instruction in its try-range to its handler entry), and derives dominance
/// with `petgraph`'s Lengauer-Tarjan implementation.
#[cfg(feature = "petgraph")]
#[derive(Debug, Default)]
pub struct PetgraphCfgBuilder;

#[cfg(feature = "petgraph")]
impl ControlFlowGraphBuilder for PetgraphCfgBuilder {
    type Graph = PetgraphCfg;

    fn build(
        &self,
        instructions: &InstructionList<Instruction>,
        exception_handlers: &[crate::exceptions::ExceptionHandler],
    ) -> Self::Graph {
        PetgraphCfg::build(instructions, exception_handlers)
    }
}

/// A [`ControlFlowGraph`] backed by `petgraph::graph::DiGraph`.
#[cfg(feature = "petgraph")]
#[derive(Debug)]
pub struct PetgraphCfg {
    nodes: BTreeMap<ProgramCounter, CfgNode>,
    kinds: BTreeMap<ProgramCounter, CfgNodeKind>,
    graph: petgraph::graph::DiGraph<ProgramCounter, ()>,
    index_of: BTreeMap<ProgramCounter, petgraph::graph::NodeIndex>,
    idom: BTreeMap<ProgramCounter, ProgramCounter>,
    entry: Option<ProgramCounter>,
}

#[cfg(feature = "petgraph")]
impl PetgraphCfg {
    fn build(
        instructions: &InstructionList<Instruction>,
        exception_handlers: &[crate::exceptions::ExceptionHandler],
    ) -> Self {
        use petgraph::graph::DiGraph;

        let mut leaders = BTreeSet::new();
        if let Some((entry, _)) = instructions.entry_point() {
            leaders.insert(*entry);
        }
        for (pc, instruction) in instructions {
            if let Some(next) = instructions.next_pc_of(pc) {
                if is_branch(instruction) {
                    leaders.insert(next);
                }
            }
            for target in branch_targets(instruction) {
                leaders.insert(target);
            }
        }
        for handler in exception_handlers {
            leaders.insert(handler.try_block().first);
            leaders.insert(handler.handler_block().first);
        }

        let mut nodes = BTreeMap::new();
        let leader_vec: Vec<_> = leaders.into_iter().collect();
        for (i, &start) in leader_vec.iter().enumerate() {
            let end = leader_vec
                .get(i + 1)
                .and_then(|&next| instructions.previous_pc_of(&next))
                .unwrap_or_else(|| {
                    instructions
                        .iter()
                        .map(|(pc, _)| *pc)
                        .next_back()
                        .unwrap_or(start)
                });
            nodes.insert(start, CfgNode { start, end });
        }

        let mut graph = DiGraph::new();
        let mut index_of = BTreeMap::new();
        for &start in nodes.keys() {
            index_of.insert(start, graph.add_node(start));
        }
        for (&start, node) in &nodes {
            if let Some(instruction) = instructions.get(&node.end) {
                for target in branch_targets(instruction) {
                    if let Some(&to) = index_of.get(&target) {
                        graph.add_edge(index_of[&start], to, ());
                    }
                }
                if falls_through(instruction) {
                    if let Some(next) = instructions.next_pc_of(&node.end) {
                        if let Some(&to) = index_of.get(&next) {
                            graph.add_edge(index_of[&start], to, ());
                        }
                    }
                }
            }
        }
        for handler in exception_handlers {
            if let (Some(&from), Some(&to)) = (
                index_of.get(&handler.try_block().first),
                index_of.get(&handler.handler_block().first),
            ) {
                graph.add_edge(from, to, ());
            }
        }

        let mut kinds = BTreeMap::new();
        let entry = instructions.entry_point().map(|(pc, _)| *pc);
        if let Some(entry) = entry {
            kinds.insert(entry, CfgNodeKind::EntryPoint);
        }
        for handler in exception_handlers {
            let kind = if handler.catch_type().is_some() {
                CfgNodeKind::CatchHandler
            } else {
                CfgNodeKind::FinallyHandler
            };
            kinds.insert(handler.handler_block().first, kind);
        }
        for (&start, node) in &nodes {
            if let Some(instruction) = instructions.get(&node.end) {
                if matches!(instruction, Instruction::Return(_)) {
                    kinds.entry(start).or_insert(CfgNodeKind::RegularExit);
                } else if matches!(instruction, Instruction::AThrow) {
                    kinds.entry(start).or_insert(CfgNodeKind::ExceptionalExit);
                }
            }
        }

        let idom = entry
            .and_then(|e| index_of.get(&e).copied())
            .map(|entry_idx| {
                petgraph::algo::dominators::simple_fast(&graph, entry_idx)
            })
            .map(|dominators| {
                index_of
                    .iter()
                    .filter_map(|(&pc, &idx)| {
                        dominators
                            .immediate_dominator(idx)
                            .map(|d| (pc, graph[d]))
                    })
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        Self {
            nodes,
            kinds,
            graph,
            index_of,
            idom,
            entry,
        }
    }
}

#[cfg(feature = "petgraph")]
impl ControlFlowGraph for PetgraphCfg {
    fn kind_at(&self, pc: ProgramCounter) -> Option<CfgNodeKind> {
        self.kinds.get(&pc).copied()
    }

    fn node_at(&self, pc: ProgramCounter) -> Option<CfgNode> {
        self.nodes.get(&pc).copied()
    }

    fn successors(&self, pc: ProgramCounter) -> Vec<ProgramCounter> {
        let Some(&idx) = self.index_of.get(&pc) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect()
    }

    fn immediate_dominator(&self, pc: ProgramCounter) -> Option<ProgramCounter> {
        self.idom.get(&pc).copied()
    }

    fn dominance_frontier(&self, pc: ProgramCounter) -> BTreeSet<ProgramCounter> {
        // DF(n) = { m : n dominates a predecessor of m, but n does not strictly dominate m }
        let dominates = |candidate: ProgramCounter, of: ProgramCounter| -> bool {
            let mut current = of;
            loop {
                if current == candidate {
                    return true;
                }
                match self.idom.get(&current) {
                    Some(&next) if next != current => current = next,
                    _ => return current == candidate,
                }
            }
        };
        self.nodes
            .keys()
            .filter(|&&m| {
                self.predecessors(m)
                    .into_iter()
                    .any(|p| dominates(pc, p))
                    && !(dominates(pc, m) && pc != m)
            })
            .copied()
            .collect()
    }
}

#[cfg(feature = "petgraph")]
impl PetgraphCfg {
    fn predecessors(&self, pc: ProgramCounter) -> Vec<ProgramCounter> {
        let Some(&idx) = self.index_of.get(&pc) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .map(|n| self.graph[n])
            .collect()
    }
}

fn is_branch(instruction: &Instruction) -> bool {
    !falls_through(instruction) || !branch_targets(instruction).is_empty()
}

/// Whether control may reach the textually-next instruction without taking
/// an explicit branch. Shared with the stack analyzer's successor walk.
pub(crate) fn falls_through(instruction: &Instruction) -> bool {
    !matches!(
        instruction,
        Instruction::Goto(_)
            | Instruction::Return(_)
            | Instruction::AThrow
            | Instruction::Switch(_)
            | Instruction::Ret(_)
    )
}

/// The set of instructions a branch instruction may jump to. Shared with the
/// stack analyzer's successor walk.
pub(crate) fn branch_targets(instruction: &Instruction) -> Vec<ProgramCounter> {
    match instruction {
        Instruction::Goto(target) | Instruction::Jsr(target) => vec![*target],
        Instruction::If(_, _, target) => vec![*target],
        Instruction::Switch(info) => {
            let mut targets = vec![info.default];
            targets.extend(info.branches.iter().map(|(_, t)| *t));
            targets
        }
        _ => vec![],
    }
}
