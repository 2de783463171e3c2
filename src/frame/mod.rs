//! The abstract value domain the stack analyzer propagates: per-slot value
//! kinds tagged with the set of instructions that may have produced them.

use std::collections::BTreeSet;

use crate::jvm::code::ProgramCounter;
use crate::jvm::references::ClassRef;

/// The abstract type of a single stack or local-variable slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameValue {
    /// The upper half of a `long` or `double`, or an unused local slot.
    Top,
    /// An `int`, `boolean`, `byte`, `char`, or `short`.
    Integer,
    /// A `float`.
    Float,
    /// The lower half of a `long`.
    Long,
    /// The lower half of a `double`.
    Double,
    /// The `null` reference.
    Null,
    /// The receiver of a constructor before `this()`/`super()` has run.
    UninitializedThis,
    /// An object allocated by [`New`](crate::instruction::Instruction::New) at
    /// `at`, before its constructor has run.
    Uninitialized {
        /// The offset of the `new` instruction that created this object.
        at: ProgramCounter,
    },
    /// An initialized reference of the given static type.
    Reference(ClassRef),
}

impl FrameValue {
    /// Whether this value occupies two adjacent slots (the second holding [`FrameValue::Top`]).
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// Whether this value denotes an object that has not finished construction.
    #[must_use]
    pub const fn is_uninitialized(&self) -> bool {
        matches!(self, Self::UninitializedThis | Self::Uninitialized { .. })
    }
}

/// One slot of the abstract operand stack: its value kind plus the set of
/// instructions that may have produced it (a singleton outside of merges),
/// and the source variable it was loaded from, if it is a bare load.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct StackSlot {
    /// The abstract value.
    pub value: Option<FrameValue>,
    /// The instructions that may have produced this value.
    pub definitions: BTreeSet<ProgramCounter>,
    /// If this slot is a direct, unmodified load of a local variable slot,
    /// the slot it came from (used by the rewriter to skip a redundant copy).
    pub load_from: Option<u16>,
}

impl StackSlot {
    /// Creates a slot produced solely by `definition`.
    #[must_use]
    pub fn produced_by(value: FrameValue, definition: ProgramCounter) -> Self {
        Self {
            value: Some(value),
            definitions: BTreeSet::from([definition]),
            load_from: None,
        }
    }

    /// Merges two slots flowing into the same join point. Definitions union;
    /// the value must agree up to wideness, or merging is an error the
    /// caller should surface as a structural analysis failure.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut definitions = self.definitions.clone();
        definitions.extend(other.definitions.iter().copied());
        Self {
            value: self.value.clone().or_else(|| other.value.clone()),
            definitions,
            load_from: self.load_from.filter(|l| Some(*l) == other.load_from),
        }
    }
}

/// One slot of the abstract local-variable array.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct VariableSlot {
    /// The abstract value, or `None` if the slot has never been written.
    pub value: Option<FrameValue>,
    /// The store instructions that may have produced this value.
    pub definitions: BTreeSet<ProgramCounter>,
}

impl VariableSlot {
    /// Creates a slot written by a single store instruction.
    #[must_use]
    pub fn stored_by(value: FrameValue, definition: ProgramCounter) -> Self {
        Self {
            value: Some(value),
            definitions: BTreeSet::from([definition]),
        }
    }

    /// Merges two variable slots flowing into the same join point.
    ///
    /// Per the analysis design, if either side is uninitialized the merged
    /// slot is uninitialized: a join that has not definitely run the
    /// constructor on every path must still treat the value as unready.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let either_uninit = self.value.as_ref().is_some_and(FrameValue::is_uninitialized)
            || other.value.as_ref().is_some_and(FrameValue::is_uninitialized);
        let mut definitions = self.definitions.clone();
        definitions.extend(other.definitions.iter().copied());
        let value = if either_uninit {
            self.value
                .clone()
                .filter(|v| v.is_uninitialized())
                .or_else(|| other.value.clone())
        } else {
            self.value.clone().or_else(|| other.value.clone())
        };
        Self { value, definitions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_slot_merge_unions_definitions() {
        let a = StackSlot::produced_by(FrameValue::Integer, 0.into());
        let b = StackSlot::produced_by(FrameValue::Integer, 4.into());
        let merged = a.merge(&b);
        assert_eq!(merged.definitions.len(), 2);
    }

    #[test]
    fn variable_slot_merge_prefers_uninitialized() {
        let ready = VariableSlot::stored_by(FrameValue::Reference(ClassRef::new("java/lang/Object")), 0.into());
        let uninit = VariableSlot::stored_by(FrameValue::UninitializedThis, 4.into());
        let merged = ready.merge(&uninit);
        assert!(merged.value.unwrap().is_uninitialized());
    }
}
