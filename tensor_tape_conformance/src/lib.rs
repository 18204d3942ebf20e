// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance tests for the `tensor_tape` executable format live in
//! `tests/`.
