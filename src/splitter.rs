//! The local-variable splitter (§4.7): decides, per raw local-variable slot,
//! whether its occurrences become one [`Variable`] or several, based on
//! reaching definitions.
//!
//! A slot carrying a declared `LocalVariableTable` entry keeps that entry's
//! name, type, and scope verbatim — declared identity is authoritative and
//! is never split or merged. Everything else (no debug info at all, the
//! common case for release-built class files) is grouped per raw slot and
//! handled per [`DecompilerSettings::optimize`](crate::context::DecompilerSettings::optimize).

use std::collections::{BTreeMap, BTreeSet};

use crate::context::DecompilerContext;
use crate::frame::FrameValue;
use crate::instruction::Instruction;
use crate::jvm::code::{InstructionList, ProgramCounter};
use crate::stack_analysis::Frame;
use crate::types::field_type::{FieldType, PrimitiveType};
use crate::variables::{parameter_slots, VariableDefinition, VariableTable};

/// One split-out local variable: a name, a type, and the instructions that
/// define and read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// The local-variable slot this variable occupies.
    pub slot: u16,
    /// The variable's name, if known.
    pub name: Option<String>,
    /// The variable's type, if known.
    pub var_type: Option<FieldType>,
    /// The instructions that write this variable.
    pub definitions: BTreeSet<ProgramCounter>,
    /// The instructions that read this variable.
    pub references: BTreeSet<ProgramCounter>,
}

/// The splitter's output: every [`Variable`] it produced, plus which one
/// each reference (`load`/`ret`/`iinc`) resolves to.
#[derive(Debug, Clone, Default)]
pub struct SplitVariables {
    /// The produced variables, in no particular order.
    pub variables: Vec<Variable>,
    /// Maps a referencing instruction to the index into `variables` it reads.
    pub reference_variable: BTreeMap<ProgramCounter, usize>,
}

/// Splits `table`'s slots into [`Variable`]s, in optimized or unoptimized
/// mode per `context.settings.optimize`.
#[must_use]
pub fn split(
    instructions: &InstructionList<Instruction>,
    table: &VariableTable,
    facts: &BTreeMap<ProgramCounter, Frame>,
    context: &DecompilerContext,
) -> SplitVariables {
    let params = parameter_slots(
        &context.method.descriptor.parameters_types,
        context.has_receiver(),
    );
    let mut out = SplitVariables::default();
    let mut undeclared_slots: BTreeSet<u16> = BTreeSet::new();

    for def in table.iter() {
        if def.declared {
            emit_declared(def, instructions, &mut out);
        } else {
            undeclared_slots.insert(def.slot);
        }
    }

    for slot in undeclared_slots {
        let kept_parameter = params.contains(&slot)
            && table
                .definition_at(slot, ProgramCounter::ZERO)
                .is_some_and(|def| !def.declared);
        let (definitions, references) = scan_slot(instructions, slot, |_| true);
        if kept_parameter || !context.settings.optimize {
            let hint = table.definition_at(slot, ProgramCounter::ZERO);
            emit_single_variable(slot, hint, definitions, references, instructions, facts, &mut out);
        } else {
            split_optimized(slot, definitions, references, instructions, facts, &mut out);
        }
    }
    out
}

fn scan_slot(
    instructions: &InstructionList<Instruction>,
    slot: u16,
    mut in_scope: impl FnMut(ProgramCounter) -> bool,
) -> (BTreeSet<ProgramCounter>, BTreeSet<ProgramCounter>) {
    let mut definitions = BTreeSet::new();
    let mut references = BTreeSet::new();
    for (pc, instruction) in instructions {
        if !in_scope(*pc) {
            continue;
        }
        match instruction {
            Instruction::Store(_, s) if *s == slot => {
                definitions.insert(*pc);
            }
            Instruction::IInc(s, _) if *s == slot => {
                definitions.insert(*pc);
                references.insert(*pc);
            }
            Instruction::Load(_, s) if *s == slot => {
                references.insert(*pc);
            }
            Instruction::Ret(s) if *s == slot => {
                references.insert(*pc);
            }
            _ => {}
        }
    }
    (definitions, references)
}

/// The value a store instruction left behind, read from the analyzer's
/// pre-state at the instruction immediately following it.
fn value_after(
    instructions: &InstructionList<Instruction>,
    facts: &BTreeMap<ProgramCounter, Frame>,
    slot: u16,
    def_pc: ProgramCounter,
) -> Option<FrameValue> {
    let next = instructions.next_pc_of(&def_pc)?;
    facts.get(&next)?.variables.get(&slot)?.value.clone()
}

fn frame_value_to_field_type(value: FrameValue) -> Option<FieldType> {
    match value {
        FrameValue::Integer => Some(FieldType::Base(PrimitiveType::Int)),
        FrameValue::Float => Some(FieldType::Base(PrimitiveType::Float)),
        FrameValue::Long => Some(FieldType::Base(PrimitiveType::Long)),
        FrameValue::Double => Some(FieldType::Base(PrimitiveType::Double)),
        FrameValue::Reference(class) => Some(FieldType::Object(class)),
        FrameValue::Null
        | FrameValue::Top
        | FrameValue::UninitializedThis
        | FrameValue::Uninitialized { .. } => None,
    }
}

/// Always emitted verbatim: a declared `LocalVariableTable` entry is never
/// split or merged by reaching-definition analysis.
fn emit_declared(
    def: &VariableDefinition,
    instructions: &InstructionList<Instruction>,
    out: &mut SplitVariables,
) {
    let (definitions, references) = scan_slot(instructions, def.slot, |pc| def.scope.contains(&pc));
    let index = out.variables.len();
    for &pc in &references {
        out.reference_variable.insert(pc, index);
    }
    out.variables.push(Variable {
        slot: def.slot,
        name: def.name.clone(),
        var_type: def.var_type.clone(),
        definitions,
        references,
    });
}

fn emit_single_variable(
    slot: u16,
    hint: Option<&VariableDefinition>,
    definitions: BTreeSet<ProgramCounter>,
    references: BTreeSet<ProgramCounter>,
    instructions: &InstructionList<Instruction>,
    facts: &BTreeMap<ProgramCounter, Frame>,
    out: &mut SplitVariables,
) {
    let var_type = hint.and_then(|d| d.var_type.clone()).or_else(|| {
        definitions
            .iter()
            .find_map(|&pc| value_after(instructions, facts, slot, pc))
            .and_then(frame_value_to_field_type)
    });
    let name = hint
        .and_then(|d| d.name.clone())
        .or_else(|| Some(format!("var_{slot}")));
    let index = out.variables.len();
    for &pc in &references {
        out.reference_variable.insert(pc, index);
    }
    out.variables.push(Variable {
        slot,
        name,
        var_type,
        definitions,
        references,
    });
}

/// A minimal union-find, used to merge candidate per-definition variables
/// whenever a reference's reaching-definition set spans more than one of them.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a != root_b {
            self.parent[root_a] = root_b;
        }
    }
}

fn split_optimized(
    slot: u16,
    definitions: BTreeSet<ProgramCounter>,
    references: BTreeSet<ProgramCounter>,
    instructions: &InstructionList<Instruction>,
    facts: &BTreeMap<ProgramCounter, Frame>,
    out: &mut SplitVariables,
) {
    if definitions.is_empty() {
        emit_single_variable(slot, None, definitions, references, instructions, facts, out);
        return;
    }

    let def_list: Vec<ProgramCounter> = definitions.into_iter().collect();
    let index_of_def: BTreeMap<ProgramCounter, usize> = def_list
        .iter()
        .enumerate()
        .map(|(i, &pc)| (pc, i))
        .collect();

    let mut dsu = DisjointSet::new(def_list.len());
    let mut ref_candidates: Vec<(ProgramCounter, Vec<usize>)> = Vec::new();
    for ref_pc in &references {
        let reaching = facts
            .get(ref_pc)
            .and_then(|frame| frame.variables.get(&slot))
            .map(|v| v.definitions.clone())
            .unwrap_or_default();
        let candidates: Vec<usize> = reaching
            .iter()
            .filter_map(|pc| index_of_def.get(pc).copied())
            .collect();
        if let [first, rest @ ..] = candidates.as_slice() {
            for &other in rest {
                dsu.union(*first, other);
            }
        }
        ref_candidates.push((*ref_pc, candidates));
    }

    let mut variable_of_root: BTreeMap<usize, usize> = BTreeMap::new();
    for (i, &def_pc) in def_list.iter().enumerate() {
        let root = dsu.find(i);
        let index = *variable_of_root.entry(root).or_insert_with(|| {
            out.variables.push(Variable {
                slot,
                name: None,
                var_type: None,
                definitions: BTreeSet::new(),
                references: BTreeSet::new(),
            });
            out.variables.len() - 1
        });
        out.variables[index].definitions.insert(def_pc);
        if out.variables[index].var_type.is_none() {
            out.variables[index].var_type =
                value_after(instructions, facts, slot, def_pc).and_then(frame_value_to_field_type);
        }
    }
    for variable in out.variables.iter_mut().filter(|v| v.slot == slot) {
        if variable.name.is_none() {
            variable.name = Some(format!("var_{slot}"));
        }
    }

    for (ref_pc, candidates) in ref_candidates {
        let Some(&first) = candidates.first() else {
            continue;
        };
        let root = dsu.find(first);
        let Some(&index) = variable_of_root.get(&root) else {
            continue;
        };
        out.variables[index].references.insert(ref_pc);
        out.reference_variable.insert(ref_pc, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_flags::MethodAccessFlags;
    use crate::context::DecompilerSettings;
    use crate::instruction::VarLoadType;
    use crate::jvm::references::{ClassRef, MethodRef};
    use crate::stack_analysis::StackAnalyzer;
    use crate::types::method_descriptor::{MethodDescriptor, ReturnType};
    use crate::verifier::ReplayVerifier;

    fn context(optimize: bool) -> DecompilerContext {
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
            DecompilerSettings {
                optimize,
                ..DecompilerSettings::default()
            },
        )
    }

    // slot 0 is stored to twice on a straight line, then read once.
    fn two_definitions_one_read() -> InstructionList<Instruction> {
        InstructionList::from([
            (0.into(), Instruction::IConst(1)),
            (1.into(), Instruction::Store(VarLoadType::Int, 0)),
            (2.into(), Instruction::IConst(2)),
            (3.into(), Instruction::Store(VarLoadType::Int, 0)),
            (4.into(), Instruction::Load(VarLoadType::Int, 0)),
            (
                5.into(),
                Instruction::Return(Some(crate::instruction::ReturnValueType::Int)),
            ),
        ])
    }

    #[test]
    fn unoptimized_mode_keeps_one_variable_per_slot() {
        let instructions = two_definitions_one_read();
        let handlers = Vec::new();
        let ctx = context(false);
        let mut verifier = ReplayVerifier;
        let mut analyzer = StackAnalyzer::new(&instructions, &handlers, &mut verifier, &ctx);
        let facts = analyzer.analyze().expect("analysis should succeed");

        let table = crate::variables::merge(&instructions, None, 0, false, 6.into());
        let result = split(&instructions, &table, &facts, &ctx);

        assert_eq!(result.variables.len(), 1);
        assert_eq!(result.variables[0].definitions.len(), 2);
        assert_eq!(result.variables[0].references.len(), 1);
    }

    #[test]
    fn optimized_mode_resolves_the_single_reaching_definition() {
        let instructions = two_definitions_one_read();
        let handlers = Vec::new();
        let ctx = context(true);
        let mut verifier = ReplayVerifier;
        let mut analyzer = StackAnalyzer::new(&instructions, &handlers, &mut verifier, &ctx);
        let facts = analyzer.analyze().expect("analysis should succeed");

        let table = crate::variables::merge(&instructions, None, 0, false, 6.into());
        let result = split(&instructions, &table, &facts, &ctx);

        // Straight-line code: the second store always overwrites the first
        // before the read, so there is exactly one reaching definition.
        let read = result.reference_variable[&ProgramCounter::from(4)];
        assert_eq!(
            result.variables[read].definitions,
            BTreeSet::from([3.into()])
        );
    }

    #[test]
    fn parameter_slot_is_never_split_even_in_optimized_mode() {
        let instructions = InstructionList::from([
            (0.into(), Instruction::Load(VarLoadType::Int, 0)),
            (
                1.into(),
                Instruction::Return(Some(crate::instruction::ReturnValueType::Int)),
            ),
        ]);
        let mut ctx = context(true);
        ctx.method.descriptor.parameters_types =
            vec![crate::types::field_type::FieldType::Base(PrimitiveType::Int)];
        let handlers = Vec::new();
        let mut verifier = ReplayVerifier;
        let mut analyzer = StackAnalyzer::new(&instructions, &handlers, &mut verifier, &ctx);
        let facts = analyzer.analyze().expect("analysis should succeed");

        let table = crate::variables::merge(&instructions, None, 1, false, 2.into());
        let result = split(&instructions, &table, &facts, &ctx);

        assert_eq!(result.variables.len(), 1);
        assert!(result.variables[0].definitions.is_empty());
    }
}
