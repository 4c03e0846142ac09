// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Control-flow analysis shared by the verifier phases.

pub(crate) mod bitset;
pub mod cflow;
