// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `tensor_tape`: the bytecode executable format for a tensor-program
//! register VM.
//!
//! An executable is the persisted, portable form of a compiled model
//! program: named functions over virtual registers, a constant pool, and
//! directories of global functions and externally compiled primitive
//! operators. This crate owns the in-memory model, the binary save/load
//! codec, and the human-readable disassembly. Interpreting the bytecode is
//! the VM's job; serializing constant values and providing the operator
//! library are the embedder's, via the [`host`] collaborator traits.
//!
//! ## Example
//!
//! ```
//! extern crate alloc;
//!
//! use alloc::sync::Arc;
//! use alloc::vec;
//!
//! use tensor_tape::executable::{Executable, Function};
//! use tensor_tape::format::{DecodeError, Reader, Writer};
//! use tensor_tape::host::{ConstantCodec, OpLibrary};
//! use tensor_tape::instruction::Instruction;
//!
//! // The embedder decides what a constant is and how it serializes.
//! struct I64Constants;
//!
//! impl ConstantCodec for I64Constants {
//!     type Value = i64;
//!
//!     fn serialize_value(&self, w: &mut Writer, value: &i64) {
//!         w.write_i64_le(*value);
//!     }
//!
//!     fn deserialize_value(&self, r: &mut Reader<'_>) -> Result<i64, DecodeError> {
//!         r.read_i64_le()
//!     }
//! }
//!
//! struct NullLib;
//!
//! impl OpLibrary for NullLib {
//!     fn name(&self) -> &str {
//!         "null"
//!     }
//! }
//!
//! let main = Function::new(
//!     "main",
//!     vec!["x".into()],
//!     2,
//!     vec![
//!         Instruction::Move { from: 0, dst: 1 },
//!         Instruction::Ret { result: 1 },
//!     ],
//! );
//! let mut exec = Executable::new(Arc::new(NullLib), vec![], Default::default(), vec![main]);
//!
//! let code = exec.save(&I64Constants).to_vec();
//! let back = Executable::load(&I64Constants, &code, Arc::new(NullLib)).unwrap();
//! assert_eq!(back.function_arity("main"), Some(1));
//! assert!(back.bytecode().contains("VM Function[0]: main(x)"));
//! ```

#![no_std]

extern crate alloc;

pub mod codec;
pub mod disasm;
pub mod dtype;
pub mod executable;
pub mod format;
pub mod host;
pub mod instruction;
pub mod opcode;
pub mod queries;
