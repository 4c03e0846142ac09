// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Assignability of primitive values to primitive slots (fields, array elements, parameters,
//! return values).

use crate::status::VerificationStatus;
use crate::type_system::TypeSystem;
use crate::types::Type;

/// Outcome of a primitive assignability check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compat {
    /// The value fits the slot.
    Ok,
    /// Same category and width group, but the value may be truncated or change signedness.
    Narrowing,
    /// Different category (integer/float) or width group (32/64 bits).
    Incompatible,
}

impl Compat {
    /// Status this outcome contributes before configuration is applied.
    #[must_use]
    pub fn status(self) -> VerificationStatus {
        match self {
            Self::Ok => VerificationStatus::Ok,
            Self::Narrowing => VerificationStatus::Warning,
            Self::Incompatible => VerificationStatus::Error,
        }
    }
}

/// Checks whether a value of type `value` may be stored into a slot of type `slot`.
pub fn check_primitive(ts: &mut TypeSystem, value: Type, slot: Type) -> Compat {
    if ts.is_subtype(value, slot) {
        return Compat::Ok;
    }
    let nv = ts.normalized_type_of(value);
    let ns = ts.normalized_type_of(slot);
    if nv == ns && matches!(nv, Type::INTEGRAL32 | Type::INTEGRAL64) {
        Compat::Narrowing
    } else {
        Compat::Incompatible
    }
}
