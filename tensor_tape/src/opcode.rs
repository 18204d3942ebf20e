// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opcode values for the VM instruction set.
//!
//! Numeric values are part of the serialized format and must stay stable.

/// The tag distinguishing instruction variants.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Register-to-register copy.
    Move = 0,
    /// Return a register to the caller.
    Ret = 1,
    /// Abort execution.
    Fatal = 2,
    /// Invoke a compiled primitive operator by packed index.
    InvokePacked = 3,
    /// Allocate a tensor view with a static shape.
    AllocTensor = 4,
    /// Allocate a tensor view with a shape taken from a register.
    AllocTensorReg = 5,
    /// Allocate a raw storage buffer.
    AllocStorage = 6,
    /// Release a storage or tensor register.
    Free = 7,
    /// Allocate a tuple from field registers.
    AllocTuple = 8,
    /// Allocate a closure over captured registers.
    AllocClosure = 9,
    /// Attach a shape to tensor data.
    SetShape = 10,
    /// Conditional branch on two registers.
    If = 11,
    /// Invoke a global function by index.
    InvokeFunc = 12,
    /// Invoke a closure register.
    InvokeClosure = 13,
    /// Load a constant-pool entry.
    LoadConst = 14,
    /// Load an immediate integer.
    LoadConsti = 15,
    /// Read a tuple field.
    GetField = 16,
    /// Unconditional relative jump.
    Goto = 17,
    /// Invoke a JIT-compiled operator held in a register.
    InvokeJit = 18,
    /// Run type inference for an operator held in a register.
    InferType = 19,
    /// Select the active CUDA stream on a device.
    CudaSetStream = 20,
    /// Record a CUDA event on a stream.
    CudaAddEvent = 21,
    /// Make a stream wait on a CUDA event.
    CudaWaitEvent = 22,
    /// Barrier across all CUDA streams.
    CudaStreamBarrier = 23,
}

impl Opcode {
    /// Returns the serialized opcode value.
    #[must_use]
    pub const fn index(self) -> i64 {
        self as i64
    }

    /// Parses an opcode from its serialized value.
    #[must_use]
    pub fn from_index(v: i64) -> Option<Self> {
        Some(match v {
            0 => Self::Move,
            1 => Self::Ret,
            2 => Self::Fatal,
            3 => Self::InvokePacked,
            4 => Self::AllocTensor,
            5 => Self::AllocTensorReg,
            6 => Self::AllocStorage,
            7 => Self::Free,
            8 => Self::AllocTuple,
            9 => Self::AllocClosure,
            10 => Self::SetShape,
            11 => Self::If,
            12 => Self::InvokeFunc,
            13 => Self::InvokeClosure,
            14 => Self::LoadConst,
            15 => Self::LoadConsti,
            16 => Self::GetField,
            17 => Self::Goto,
            18 => Self::InvokeJit,
            19 => Self::InferType,
            20 => Self::CudaSetStream,
            21 => Self::CudaAddEvent,
            22 => Self::CudaWaitEvent,
            23 => Self::CudaStreamBarrier,
            _ => return None,
        })
    }

    /// Returns the lowercase mnemonic used by the disassembler.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Ret => "ret",
            Self::Fatal => "fatal",
            Self::InvokePacked => "invoke_packed",
            Self::AllocTensor => "alloc_tensor",
            Self::AllocTensorReg => "alloc_tensor_reg",
            Self::AllocStorage => "alloc_storage",
            Self::Free => "free",
            Self::AllocTuple => "alloc_tuple",
            Self::AllocClosure => "alloc_closure",
            Self::SetShape => "set_shape",
            Self::If => "if",
            Self::InvokeFunc => "invoke_func",
            Self::InvokeClosure => "invoke_closure",
            Self::LoadConst => "load_const",
            Self::LoadConsti => "load_consti",
            Self::GetField => "get_field",
            Self::Goto => "goto",
            Self::InvokeJit => "invoke_jit",
            Self::InferType => "infer_type",
            Self::CudaSetStream => "cuda_set_stream",
            Self::CudaAddEvent => "cuda_add_event",
            Self::CudaWaitEvent => "cuda_wait_event",
            Self::CudaStreamBarrier => "cuda_stream_barrier",
        }
    }
}
