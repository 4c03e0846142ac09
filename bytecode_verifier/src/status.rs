// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Verification outcome ordering.

use core::fmt;

/// Outcome of a single check, or of a whole method.
///
/// Statuses are totally ordered (`Ok < Warning < Error`); a method's status is the maximum over
/// every check performed while verifying it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum VerificationStatus {
    /// No problem found.
    #[default]
    Ok,
    /// Suspicious but tolerated.
    Warning,
    /// The method must not be executed.
    Error,
}

impl VerificationStatus {
    /// Returns `true` for [`VerificationStatus::Error`].
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Raises `self` to at least `other`.
    pub fn raise(&mut self, other: Self) {
        if other > *self {
            *self = other;
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}
