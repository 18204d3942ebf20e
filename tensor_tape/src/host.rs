// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! External collaborator contracts.
//!
//! The executable codec never interprets constant values and never calls
//! into the compiled operator library; both are supplied by the surrounding
//! toolchain through the traits in this module.

use alloc::sync::Arc;

use crate::format::{DecodeError, Reader, Writer};

/// Serializes the opaque constant-pool values embedded in an executable.
///
/// Constants are produced by the compiler and consumed by the interpreter;
/// this crate only delegates their wire form to the codec, one value at a
/// time, in pool order.
pub trait ConstantCodec {
    /// The constant value type this codec understands.
    type Value;

    /// Writes `value` to `w`.
    fn serialize_value(&self, w: &mut Writer, value: &Self::Value);

    /// Reads one value from `r`.
    fn deserialize_value(&self, r: &mut Reader<'_>) -> Result<Self::Value, DecodeError>;
}

/// Opaque handle to the compiled operator library shipped alongside an
/// executable.
///
/// Resolving and invoking kernels is the interpreter's job; an executable
/// only holds a shared reference for its lifetime so the library outlives
/// every `InvokePacked` site that names it.
pub trait OpLibrary {
    /// Stable identifier for diagnostics.
    fn name(&self) -> &str;
}

/// Shared reference to an operator library.
pub type LibRef = Arc<dyn OpLibrary + Send + Sync>;
