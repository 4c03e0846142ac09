// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Abstract register file.
//!
//! A [`RegContext`] maps the accumulator and every virtual register to an [`Atv`] or leaves it
//! undefined. Contexts from different control-flow predecessors are merged with
//! [`RegContext::union_with`]; registers whose join has no consistent type are remembered as
//! conflicting until [`RegContext::remove_inconsistent_regs`] clears them.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

use crate::bytecode::Reg;
use crate::type_system::TypeSystem;
use crate::types::Type;

/// Identity of one logical value, shared by every register that holds a copy of it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin(pub u32);

/// Abstract typed value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Atv {
    /// Abstract type.
    pub ty: Type,
    /// Value identity; `None` for constants and for values merged from different origins.
    pub origin: Option<Origin>,
    /// Offset of the defining instruction; `None` for arguments and merged values.
    pub def_pc: Option<u32>,
}

impl Atv {
    /// A value with no identity, such as a constant load.
    #[must_use]
    pub fn new(ty: Type, def_pc: Option<u32>) -> Self {
        Self {
            ty,
            origin: None,
            def_pc,
        }
    }

    /// A value with identity `origin`.
    #[must_use]
    pub fn with_origin(ty: Type, origin: Origin, def_pc: Option<u32>) -> Self {
        Self {
            ty,
            origin: Some(origin),
            def_pc,
        }
    }

    /// Merges two values. Identity and defining offset survive only if both sides agree.
    pub fn join(&self, other: &Self, ts: &mut TypeSystem) -> Self {
        Self {
            ty: ts.join(self.ty, other.ty),
            origin: if self.origin == other.origin {
                self.origin
            } else {
                None
            },
            def_pc: if self.def_pc == other.def_pc {
                self.def_pc
            } else {
                None
            },
        }
    }
}

const fn slot(reg: Reg) -> usize {
    match reg {
        Reg::Acc => 0,
        Reg::V(n) => n as usize + 1,
    }
}

fn reg_of(slot: usize) -> Reg {
    match slot {
        0 => Reg::Acc,
        n => Reg::V(u16::try_from(n - 1).unwrap_or(u16::MAX)),
    }
}

/// Abstract register file.
#[derive(Clone, Debug, Default)]
pub struct RegContext {
    regs: Vec<Option<Atv>>,
    conflicting: BTreeSet<Reg>,
}

impl PartialEq for RegContext {
    fn eq(&self, other: &Self) -> bool {
        // Conflict bookkeeping is diagnostic state, and slots past either end are undefined.
        let n = self.regs.len().max(other.regs.len());
        (0..n).all(|i| self.regs.get(i).copied().flatten() == other.regs.get(i).copied().flatten())
    }
}

impl Eq for RegContext {}

impl RegContext {
    /// Creates a context with room for `num_vregs` virtual registers, all undefined.
    #[must_use]
    pub fn new(num_vregs: usize) -> Self {
        Self {
            regs: alloc::vec![None; num_vregs + 1],
            conflicting: BTreeSet::new(),
        }
    }

    /// Returns the value in `reg`, if defined.
    #[must_use]
    pub fn get(&self, reg: Reg) -> Option<&Atv> {
        self.regs.get(slot(reg)).and_then(Option::as_ref)
    }

    /// Returns `true` if `reg` holds a value.
    #[must_use]
    pub fn is_defined(&self, reg: Reg) -> bool {
        self.get(reg).is_some()
    }

    /// Stores `atv` into `reg`, growing the register file if needed.
    pub fn set(&mut self, reg: Reg, atv: Atv) {
        let i = slot(reg);
        if i >= self.regs.len() {
            self.regs.resize(i + 1, None);
        }
        self.regs[i] = Some(atv);
    }

    /// Makes `reg` undefined.
    pub fn clear(&mut self, reg: Reg) {
        if let Some(s) = self.regs.get_mut(slot(reg)) {
            *s = None;
        }
    }

    /// Iterates over defined registers, accumulator first.
    pub fn iter(&self) -> impl Iterator<Item = (Reg, &Atv)> + '_ {
        self.regs
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_ref().map(|a| (reg_of(i), a)))
    }

    /// Joins `other` into `self` and returns `true` if any register changed type or became
    /// undefined.
    ///
    /// Registers whose joined type is inconsistent are added to the conflicting set but keep
    /// their joined value until [`RegContext::remove_inconsistent_regs`].
    pub fn union_with(&mut self, other: &Self, ts: &mut TypeSystem) -> bool {
        let mut updated = false;
        for i in 0..self.regs.len() {
            let Some(mine) = self.regs[i] else {
                continue;
            };
            let Some(theirs) = other.regs.get(i).copied().flatten() else {
                self.regs[i] = None;
                updated = true;
                continue;
            };
            if mine == theirs {
                continue;
            }
            let joined = mine.join(&theirs, ts);
            let conflict = joined.ty.is_top()
                || (joined.ty.is_bot() && !mine.ty.is_bot() && !theirs.ty.is_bot());
            if conflict {
                self.conflicting.insert(reg_of(i));
            }
            if joined.ty != mine.ty {
                updated = true;
            }
            self.regs[i] = Some(joined);
        }
        updated
    }

    /// Registers recorded as conflicting by earlier joins.
    pub fn conflicting(&self) -> impl Iterator<Item = Reg> + '_ {
        self.conflicting.iter().copied()
    }

    /// Returns `true` if `reg` was recorded as conflicting.
    #[must_use]
    pub fn is_conflicting(&self, reg: Reg) -> bool {
        self.conflicting.contains(&reg)
    }

    /// Makes every conflicting register undefined. The conflicting set is kept for diagnostics.
    pub fn remove_inconsistent_regs(&mut self) {
        for reg in &self.conflicting {
            if let Some(s) = self.regs.get_mut(slot(*reg)) {
                *s = None;
            }
        }
    }

    /// Forgets recorded conflicts.
    pub fn clear_conflicts(&mut self) {
        self.conflicting.clear();
    }

    /// Replaces the value in `reg` and every register sharing its origin with `atv`.
    ///
    /// If `reg` has no origin only `reg` itself is updated.
    pub fn change_values_of_same_origin(&mut self, reg: Reg, atv: Atv) {
        let origin = self.get(reg).and_then(|a| a.origin);
        if let Some(origin) = origin {
            for a in self.regs.iter_mut().flatten() {
                if a.origin == Some(origin) {
                    *a = atv;
                }
            }
        }
        self.set(reg, atv);
    }

    /// Renders the defined registers as `acc=i32 v0=A ...`.
    #[must_use]
    pub fn dump(&self, ts: &TypeSystem) -> String {
        let mut out = String::new();
        for (reg, atv) in self.iter() {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{reg}={}", ts.type_name(atv.ty));
            if let Some(o) = atv.origin {
                let _ = write!(out, "#{}", o.0);
            }
        }
        out
    }
}
