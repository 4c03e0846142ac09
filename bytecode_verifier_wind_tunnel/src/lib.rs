// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `bytecode_verifier` live in `benches/`.
