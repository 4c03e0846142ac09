// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixpoint driver state for one method.
//!
//! The abstract interpreter runs straight-line from an entry point until it reaches a terminator
//! or hands control to a jump target. Contexts are persisted at checkpoints and joined with every
//! incoming edge; an entry point is re-queued only when its checkpoint context actually changes,
//! so the loop terminates once every checkpoint has reached a fixpoint.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::analysis::bitset::BitSet;
use crate::bytecode::Reg;
use crate::reg_context::{Origin, RegContext};
use crate::type_system::TypeSystem;

/// Why the interpreter (re)starts at an address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKind {
    /// First instruction of the method.
    MethodStart,
    /// Target of a jump, or a jump target reached by falling through.
    Jump,
    /// Start of a catch handler.
    ExceptionHandler,
}

/// Result of [`ExecContext::get_entry_point_for_checking`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NextEntry {
    /// Resume at `pc`; the current context has been loaded from its checkpoint.
    Ready {
        /// Entry address.
        pc: u32,
        /// Entry kind.
        kind: EntryKind,
    },
    /// Nothing left to do.
    AllDone,
    /// Entry points remain but none has a stored context; their code is unreachable.
    NoEntryPointsWithContext,
}

/// Result of storing the current context at a checkpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreOutcome {
    /// The stored context was created or changed.
    pub changed: bool,
    /// Registers that became undefined because their incoming types conflict.
    pub conflicting: Vec<Reg>,
}

/// Worklist and checkpoint state for one method verification.
#[derive(Clone, Debug)]
pub struct ExecContext {
    checkpoints: BitSet,
    contexts: HashMap<u32, RegContext>,
    entry_points: BTreeSet<(u32, EntryKind)>,
    processed_jumps: BitSet,
    processed_fallthroughs: BitSet,
    current: RegContext,
    next_origin: u32,
}

impl ExecContext {
    /// Creates driver state for a method of `code_len` bytes with `num_regs` registers.
    #[must_use]
    pub fn new(code_len: usize, num_regs: usize) -> Self {
        Self {
            checkpoints: BitSet::new_empty(code_len),
            contexts: HashMap::new(),
            entry_points: BTreeSet::new(),
            processed_jumps: BitSet::new_empty(code_len),
            processed_fallthroughs: BitSet::new_empty(code_len),
            current: RegContext::new(num_regs),
            next_origin: 0,
        }
    }

    /// Marks `pc` as a place where contexts are persisted.
    pub fn set_check_point(&mut self, pc: u32) {
        self.checkpoints.insert(pc as usize);
    }

    /// Returns `true` if `pc` is a checkpoint.
    #[must_use]
    pub fn is_check_point(&self, pc: u32) -> bool {
        self.checkpoints.get(pc as usize)
    }

    /// Queues `pc` for interpretation.
    pub fn add_entry_point(&mut self, pc: u32, kind: EntryKind) {
        self.entry_points.insert((pc, kind));
    }

    /// Pending entry points, in address order.
    pub fn entry_points(&self) -> impl Iterator<Item = (u32, EntryKind)> + '_ {
        self.entry_points.iter().copied()
    }

    /// Drops every pending entry point.
    pub fn clear_entry_points(&mut self) {
        self.entry_points.clear();
    }

    /// The context being mutated by the interpreter.
    #[must_use]
    pub fn current(&self) -> &RegContext {
        &self.current
    }

    /// Mutable access to the context being mutated by the interpreter.
    pub fn current_mut(&mut self) -> &mut RegContext {
        &mut self.current
    }

    /// Replaces the current context.
    pub fn set_current(&mut self, ctx: RegContext) {
        self.current = ctx;
    }

    /// Mints a value identity not used before in this method.
    pub fn fresh_origin(&mut self) -> Origin {
        let o = Origin(self.next_origin);
        self.next_origin = self.next_origin.wrapping_add(1);
        o
    }

    /// Stored context at `pc`.
    #[must_use]
    pub fn reg_context_at(&self, pc: u32) -> Option<&RegContext> {
        self.contexts.get(&pc)
    }

    /// Installs `ctx` at `pc`, joining with any context already stored there.
    pub fn store_reg_context_for_addr(
        &mut self,
        pc: u32,
        ctx: &RegContext,
        ts: &mut TypeSystem,
    ) -> StoreOutcome {
        if let Some(stored) = self.contexts.get_mut(&pc) {
            let changed = stored.union_with(ctx, ts);
            let conflicting: Vec<Reg> = stored.conflicting().collect();
            stored.remove_inconsistent_regs();
            stored.clear_conflicts();
            return StoreOutcome {
                changed,
                conflicting,
            };
        }
        if !self.is_check_point(pc) {
            return StoreOutcome::default();
        }
        let mut snapshot = ctx.clone();
        snapshot.clear_conflicts();
        self.contexts.insert(pc, snapshot);
        StoreOutcome {
            changed: true,
            conflicting: Vec::new(),
        }
    }

    /// Persists the current context at `pc` (see [`ExecContext::store_reg_context_for_addr`]).
    pub fn store_current_reg_context_for_addr(
        &mut self,
        pc: u32,
        ts: &mut TypeSystem,
    ) -> StoreOutcome {
        let current = core::mem::take(&mut self.current);
        let out = self.store_reg_context_for_addr(pc, &current, ts);
        self.current = current;
        out
    }

    /// Propagates the current context along the jump `from -> to`.
    ///
    /// The first time a jump is processed its target is always queued; afterwards only if the
    /// target's context changed.
    pub fn process_jump(
        &mut self,
        from: u32,
        to: u32,
        kind: EntryKind,
        ts: &mut TypeSystem,
    ) -> StoreOutcome {
        let first = self.processed_jumps.insert(from as usize);
        self.propagate(first, to, kind, ts)
    }

    /// Propagates the current context along the fallthrough edge `from -> to` into a jump target.
    pub fn process_fallthrough(&mut self, from: u32, to: u32, ts: &mut TypeSystem) -> StoreOutcome {
        let first = self.processed_fallthroughs.insert(from as usize);
        self.propagate(first, to, EntryKind::Jump, ts)
    }

    fn propagate(
        &mut self,
        first: bool,
        to: u32,
        kind: EntryKind,
        ts: &mut TypeSystem,
    ) -> StoreOutcome {
        let out = self.store_current_reg_context_for_addr(to, ts);
        if first || out.changed {
            log::trace!("queue {to} ({kind:?}), first={first} changed={}", out.changed);
            self.add_entry_point(to, kind);
        }
        out
    }

    /// Pops the lowest pending entry point that has a stored context and loads that context.
    pub fn get_entry_point_for_checking(&mut self) -> NextEntry {
        if self.entry_points.is_empty() {
            return NextEntry::AllDone;
        }
        let ready = self
            .entry_points
            .iter()
            .copied()
            .find(|(pc, _)| self.contexts.contains_key(pc));
        let Some((pc, kind)) = ready else {
            return NextEntry::NoEntryPointsWithContext;
        };
        self.entry_points.remove(&(pc, kind));
        if let Some(ctx) = self.contexts.get(&pc) {
            self.current = ctx.clone();
        }
        NextEntry::Ready { pc, kind }
    }

    /// Stored contexts at checkpoints in `[start, end)`.
    pub fn contexts_in(
        &self,
        start: u32,
        end: u32,
    ) -> impl Iterator<Item = (u32, &RegContext)> + '_ {
        self.contexts
            .iter()
            .filter(move |(pc, _)| (start..end).contains(*pc))
            .map(|(pc, c)| (*pc, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::ProgramBuilder;
    use crate::program::SourceLang;
    use crate::reg_context::Atv;
    use crate::types::Type;
    use alloc::sync::Arc;

    fn ts() -> TypeSystem {
        TypeSystem::new(Arc::new(ProgramBuilder::new().build()), SourceLang::Core)
    }

    #[test]
    fn first_jump_always_queues_target() {
        let mut ts = ts();
        let mut ec = ExecContext::new(32, 2);
        ec.set_check_point(10);
        let out = ec.process_jump(0, 10, EntryKind::Jump, &mut ts);
        assert!(out.changed);
        assert_eq!(ec.entry_points().collect::<Vec<_>>(), [(10, EntryKind::Jump)]);
    }

    #[test]
    fn back_edge_requeues_only_on_change() {
        let mut ts = ts();
        let mut ec = ExecContext::new(32, 2);
        ec.set_check_point(10);
        ec.current_mut().set(Reg::V(0), Atv::new(Type::U8, None));
        ec.process_jump(20, 10, EntryKind::Jump, &mut ts);
        assert!(matches!(ec.get_entry_point_for_checking(), NextEntry::Ready { pc: 10, .. }));

        // Same context again: nothing to do.
        let out = ec.process_jump(20, 10, EntryKind::Jump, &mut ts);
        assert!(!out.changed);
        assert_eq!(ec.get_entry_point_for_checking(), NextEntry::AllDone);

        // A wider type changes the checkpoint and re-queues it.
        ec.current_mut().set(Reg::V(0), Atv::new(Type::I8, None));
        let out = ec.process_jump(20, 10, EntryKind::Jump, &mut ts);
        assert!(out.changed);
        assert_eq!(
            ec.reg_context_at(10).unwrap().get(Reg::V(0)).unwrap().ty,
            Type::I16
        );
        assert!(matches!(ec.get_entry_point_for_checking(), NextEntry::Ready { pc: 10, .. }));
    }

    #[test]
    fn conflicting_registers_are_reported_and_cleared() {
        let mut ts = ts();
        let mut ec = ExecContext::new(32, 2);
        ec.set_check_point(4);
        ec.current_mut().set(Reg::V(1), Atv::new(Type::I32, None));
        ec.store_current_reg_context_for_addr(4, &mut ts);
        ec.current_mut().set(Reg::V(1), Atv::new(Type::NULL_REF, None));
        let out = ec.store_current_reg_context_for_addr(4, &mut ts);
        assert!(out.changed);
        assert_eq!(out.conflicting, [Reg::V(1)]);
        assert!(!ec.reg_context_at(4).unwrap().is_defined(Reg::V(1)));
    }

    #[test]
    fn entry_points_without_context_are_reported() {
        let mut ec = ExecContext::new(8, 0);
        assert_eq!(ec.get_entry_point_for_checking(), NextEntry::AllDone);
        ec.add_entry_point(3, EntryKind::Jump);
        assert_eq!(
            ec.get_entry_point_for_checking(),
            NextEntry::NoEntryPointsWithContext
        );
    }

    #[test]
    fn non_checkpoints_are_not_stored() {
        let mut ts = ts();
        let mut ec = ExecContext::new(8, 0);
        let out = ec.store_current_reg_context_for_addr(2, &mut ts);
        assert!(!out.changed);
        assert!(ec.reg_context_at(2).is_none());
    }
}
