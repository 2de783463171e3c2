//! The forward-branch fixup table.
//!
//! Every branch target is resolved to a [`ProgramCounter`] eagerly (it's a
//! matter of arithmetic, not lookup). What genuinely has to wait is *label
//! assignment*: a backward branch's target instruction already exists in the
//! list being built, so it can be labeled immediately, but a forward
//! branch's target doesn't exist yet. [`FixupTable`] defers that half of the
//! work: it hands out a [`Label`] for any offset on request, and the decoder
//! drains the ones waiting on a given offset the moment it emits the
//! instruction there.

use std::collections::BTreeMap;

use crate::jvm::code::ProgramCounter;

/// An opaque label identifying a branch target within one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

/// The set of instructions that are branch targets, keyed by their offset.
#[derive(Debug, Clone, Default)]
pub struct Labels(BTreeMap<ProgramCounter, Label>);

impl Labels {
    /// Returns the label assigned to an instruction at `pc`, if it is a branch target.
    #[must_use]
    pub fn get(&self, pc: ProgramCounter) -> Option<Label> {
        self.0.get(&pc).copied()
    }

    /// Returns an iterator over all labeled offsets.
    pub fn iter(&self) -> impl Iterator<Item = (ProgramCounter, Label)> + '_ {
        self.0.iter().map(|(pc, l)| (*pc, *l))
    }
}

/// Accumulates label requests while the instruction list is being built, and
/// resolves them to offsets already known to be valid instruction
/// boundaries, or chains of not-yet-emitted ones.
#[derive(Debug, Default)]
pub struct FixupTable {
    next_label: u32,
    issued: BTreeMap<ProgramCounter, Label>,
    /// Requests for offsets that have not been emitted as an instruction yet.
    /// The count is the fan-in (how many branches target this offset); it is
    /// informational only since all of them resolve to the same [`Label`].
    pending: BTreeMap<ProgramCounter, u32>,
    emitted: std::collections::BTreeSet<ProgramCounter>,
}

impl FixupTable {
    /// Creates an empty fixup table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a label for `target`. If `target` has already been emitted
    /// (a backward or self branch), the label is final immediately.
    /// Otherwise the request is queued as a fixup and satisfied later by
    /// [`Self::emit`].
    pub fn request(&mut self, target: ProgramCounter) -> Label {
        let label = *self.issued.entry(target).or_insert_with(|| {
            let id = self.next_label;
            self.next_label += 1;
            Label(id)
        });
        if !self.emitted.contains(&target) {
            *self.pending.entry(target).or_insert(0) += 1;
        }
        label
    }

    /// Marks `pc` as emitted as an instruction boundary. Any fixups chained
    /// on this offset are considered satisfied; the now-final label (if one
    /// was ever requested for this offset) is returned so the caller can
    /// attach it to the instruction it just inserted.
    pub fn emit(&mut self, pc: ProgramCounter) -> Option<Label> {
        self.emitted.insert(pc);
        self.pending.remove(&pc);
        self.issued.get(&pc).copied()
    }

    /// Offsets that were requested as branch targets but never matched an
    /// emitted instruction boundary: dangling forward branches past the end
    /// of the code array. The decoder synthesizes a trailing `nop` for each.
    #[must_use]
    pub fn dangling(&self) -> impl Iterator<Item = ProgramCounter> + '_ {
        self.pending.keys().copied()
    }

    /// Consumes the table, returning the finished label assignment.
    #[must_use]
    pub fn into_labels(self) -> Labels {
        Labels(self.issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_branch_resolves_immediately() {
        let mut table = FixupTable::new();
        table.emit(0.into());
        let label = table.request(0.into());
        assert_eq!(table.dangling().count(), 0);
        assert_eq!(table.into_labels().get(0.into()), Some(label));
    }

    #[test]
    fn forward_branch_is_pending_until_emitted() {
        let mut table = FixupTable::new();
        let requested = table.request(10.into());
        assert_eq!(table.dangling().collect::<Vec<_>>(), vec![10.into()]);
        let satisfied = table.emit(10.into());
        assert_eq!(satisfied, Some(requested));
        assert_eq!(table.dangling().count(), 0);
    }

    #[test]
    fn fan_in_shares_one_label() {
        let mut table = FixupTable::new();
        let a = table.request(10.into());
        let b = table.request(10.into());
        assert_eq!(a, b);
        table.emit(10.into());
        assert_eq!(table.dangling().count(), 0);
    }
}
