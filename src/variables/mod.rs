//! The variable table merger (§4.2): reconciles the slot accesses the
//! decoder visited with any declared `LocalVariableTable`, then collapses
//! and clamps the result.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use crate::instruction::{Instruction, VarLoadType};
use crate::jvm::code::{
    InstructionList, LocalVariableId, LocalVariableTable, LocalVariableTableEntry, ProgramCounter,
};
use crate::types::field_type::FieldType;
use crate::verifier::field_value;

/// One variable's declared or inferred name, type, and live range within a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    /// The local variable slot this definition occupies.
    pub slot: u16,
    /// The half-open range of offsets over which this definition is live.
    pub scope: Range<ProgramCounter>,
    /// The variable's name, if declared.
    pub name: Option<String>,
    /// The variable's type, if declared.
    pub var_type: Option<FieldType>,
    /// Whether `name`/`var_type` came from a declared table entry rather
    /// than being inferred purely from slot accesses.
    pub declared: bool,
}

impl VariableDefinition {
    fn inferred(slot: u16, scope: Range<ProgramCounter>) -> Self {
        Self {
            slot,
            scope,
            name: None,
            var_type: None,
            declared: false,
        }
    }

    fn overlaps(&self, other: &Range<ProgramCounter>) -> bool {
        self.scope.start < other.end && other.start < self.scope.end
    }
}

/// The merged variable table for one method body.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    by_slot: BTreeMap<u16, Vec<VariableDefinition>>,
}

impl VariableTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Widens or creates the inferred scope for `slot` to cover `[offset,
    /// next)`. The decoder's loads/stores/increments drive this eagerly, in
    /// offset order.
    pub fn ensure(&mut self, slot: u16, offset: ProgramCounter, next: ProgramCounter) {
        let defs = self.by_slot.entry(slot).or_default();
        if let Some(last) = defs.last_mut() {
            if !last.declared && last.scope.end >= offset {
                last.scope.end = last.scope.end.max(next);
                return;
            }
        }
        defs.push(VariableDefinition::inferred(slot, offset..next));
    }

    /// Folds in declared entries from a class file's `LocalVariableTable`.
    /// A declared entry overlapping an inferred one in the same slot wins
    /// the name/type for that overlap; the non-overlapping remainder of the
    /// inferred scope stays a distinct, slot-sharing variable.
    pub fn merge_declared(&mut self, declared: &LocalVariableTable) {
        let mut entries: Vec<_> = declared.iter().collect();
        entries.sort_by_key(|(id, _)| id.effective_range.start);
        for (id, entry) in entries {
            self.merge_one_declared(id, entry);
        }
    }

    fn merge_one_declared(&mut self, id: &LocalVariableId, entry: &LocalVariableTableEntry) {
        let defs = self.by_slot.entry(id.index).or_default();
        let mut remainder = Vec::new();
        defs.retain(|def| {
            if def.declared || !def.overlaps(&id.effective_range) {
                return true;
            }
            if def.scope.start < id.effective_range.start {
                remainder.push(VariableDefinition::inferred(
                    id.index,
                    def.scope.start..id.effective_range.start,
                ));
            }
            if id.effective_range.end < def.scope.end {
                remainder.push(VariableDefinition::inferred(
                    id.index,
                    id.effective_range.end..def.scope.end,
                ));
            }
            false
        });
        defs.extend(remainder);
        defs.push(VariableDefinition {
            slot: id.index,
            scope: id.effective_range.clone(),
            name: entry.name.clone(),
            var_type: entry.var_type.clone(),
            declared: true,
        });
        defs.sort_by_key(|d| d.scope.start);
    }

    /// Collapses adjacent, identically-named/typed definitions in the same
    /// slot into one.
    pub fn merge_variables(&mut self) {
        for defs in self.by_slot.values_mut() {
            defs.sort_by_key(|d| d.scope.start);
            let mut merged: Vec<VariableDefinition> = Vec::with_capacity(defs.len());
            for def in defs.drain(..) {
                if let Some(last) = merged.last_mut() {
                    if last.scope.end == def.scope.start
                        && last.name == def.name
                        && last.var_type == def.var_type
                        && last.declared == def.declared
                    {
                        last.scope.end = def.scope.end;
                        continue;
                    }
                }
                merged.push(def);
            }
            *defs = merged;
        }
    }

    /// Clamps every scope end to `code_size`.
    pub fn update_scopes(&mut self, code_size: ProgramCounter) {
        for defs in self.by_slot.values_mut() {
            for def in defs.iter_mut() {
                def.scope.end = def.scope.end.min(code_size);
            }
        }
    }

    /// Claims slots `[0, param_count)` as parameters with scope `[0,
    /// code_size)`. For instance methods, slot 0 is named `this`. Has no
    /// effect on a slot that already carries a declared definition.
    pub fn claim_parameters(&mut self, param_count: u16, has_receiver: bool, code_size: ProgramCounter) {
        for slot in 0..param_count {
            let defs = self.by_slot.entry(slot).or_default();
            if defs.iter().any(|d| d.declared) {
                continue;
            }
            let name = (has_receiver && slot == 0).then(|| "this".to_string());
            *defs = vec![VariableDefinition {
                slot,
                scope: ProgramCounter::ZERO..code_size,
                name,
                var_type: None,
                declared: false,
            }];
        }
    }

    /// Looks up the definition covering `slot` at `pc`, if any.
    #[must_use]
    pub fn definition_at(&self, slot: u16, pc: ProgramCounter) -> Option<&VariableDefinition> {
        self.by_slot.get(&slot)?.iter().find(|d| d.scope.contains(&pc))
    }

    /// Iterates over every definition, grouped by slot in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.by_slot.values().flatten()
    }
}

/// Runs the full merger: scans `instructions` for local-variable accesses to
/// seed the inferred scopes, folds in `declared` (if present), claims
/// parameter slots, then collapses and clamps.
#[must_use]
pub fn merge(
    instructions: &InstructionList<Instruction>,
    declared: Option<&LocalVariableTable>,
    param_count: u16,
    has_receiver: bool,
    code_size: ProgramCounter,
) -> VariableTable {
    let mut table = VariableTable::new();
    for (pc, instruction) in instructions {
        let Some(slot) = accessed_slot(instruction) else {
            continue;
        };
        let next = instructions.next_pc_of(pc).unwrap_or(code_size);
        table.ensure(slot, *pc, next);
    }
    if let Some(declared) = declared {
        table.merge_declared(declared);
    }
    table.claim_parameters(param_count, has_receiver, code_size);
    table.merge_variables();
    table.update_scopes(code_size);
    table
}

fn accessed_slot(instruction: &Instruction) -> Option<u16> {
    match instruction {
        Instruction::Load(_, slot) | Instruction::Store(_, slot) | Instruction::IInc(slot, _) => {
            Some(*slot)
        }
        Instruction::Ret(slot) => Some(*slot),
        _ => None,
    }
}

/// The number of local-variable slots a [`VarLoadType`] occupies: two for
/// `long`/`double`, one otherwise.
#[must_use]
pub const fn slot_width(var_load_type: VarLoadType) -> u16 {
    match var_load_type {
        VarLoadType::Long | VarLoadType::Double => 2,
        VarLoadType::Int | VarLoadType::Float | VarLoadType::Reference => 1,
    }
}

/// The slots occupied by the receiver (if any) and declared parameters, per
/// JVM calling convention: the receiver takes slot 0, then each parameter in
/// order, advancing two slots for `long`/`double`.
#[must_use]
pub fn parameter_slots(parameters_types: &[FieldType], has_receiver: bool) -> BTreeSet<u16> {
    let mut slots = BTreeSet::new();
    let mut slot = 0u16;
    if has_receiver {
        slots.insert(slot);
        slot += 1;
    }
    for param_type in parameters_types {
        slots.insert(slot);
        slot += if field_value(param_type).is_wide() { 2 } else { 1 };
    }
    slots
}
