// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The VM instruction set.
//!
//! Instructions are a tagged sum over per-opcode payloads. Variable-length
//! tails (shapes, call arguments, captured variables) are owned inline by the
//! variant; their counts are not stored separately, they are the tail
//! lengths. Every variant with a defined result carries a `dst` register.

use alloc::vec::Vec;
use core::fmt;

use crate::dtype::DataType;
use crate::opcode::Opcode;

/// A virtual register name within a function's register file. Nonnegative.
pub type RegName = i64;

/// A generic offset, count, or table index. Branch offsets may be negative.
pub type Index = i64;

/// A single VM instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// `dst = from`.
    Move {
        /// Source register.
        from: RegName,
        /// Destination register.
        dst: RegName,
    },
    /// Return `result` to the caller.
    Ret {
        /// Register holding the return value.
        result: RegName,
    },
    /// Abort execution.
    Fatal,
    /// Invoke a compiled primitive operator.
    ///
    /// `args` carries both inputs and outputs; the trailing `output_size`
    /// registers receive results.
    InvokePacked {
        /// Packed index of the primitive operator.
        packed_index: Index,
        /// Number of trailing output registers in `args`.
        output_size: Index,
        /// Input and output registers, inputs first.
        args: Vec<RegName>,
    },
    /// Allocate a tensor view over a storage with a static shape.
    AllocTensor {
        /// Register holding the backing storage.
        storage: RegName,
        /// Byte offset into the storage.
        offset: Index,
        /// Element type of the tensor.
        dtype: DataType,
        /// Whether the tensor releases its storage on drop.
        own: bool,
        /// Destination register.
        dst: RegName,
        /// Tensor shape.
        shape: Vec<Index>,
    },
    /// Allocate a tensor view whose shape is read from a register.
    AllocTensorReg {
        /// Register holding the backing storage.
        storage: RegName,
        /// Byte offset into the storage.
        offset: Index,
        /// Register holding the shape tuple.
        shape_register: RegName,
        /// Element type of the tensor.
        dtype: DataType,
        /// Whether the tensor releases its storage on drop.
        own: bool,
        /// Destination register.
        dst: RegName,
    },
    /// Reserve a raw storage buffer.
    AllocStorage {
        /// Allocation size in bytes.
        allocation_size: Index,
        /// Required alignment in bytes.
        alignment: Index,
        /// Element type hint for the allocator.
        dtype_hint: DataType,
        /// Target device type.
        device_type: Index,
        /// Target device ordinal.
        device_id: Index,
        /// Destination register.
        dst: RegName,
    },
    /// Release the storage or tensor held in `memory`.
    Free {
        /// Register to release.
        memory: RegName,
    },
    /// Allocate a tuple from field registers.
    AllocTuple {
        /// Field registers in order.
        fields: Vec<RegName>,
        /// Destination register.
        dst: RegName,
    },
    /// Allocate a closure over a global function and captured registers.
    AllocClosure {
        /// Index of the closed-over function.
        func_index: Index,
        /// Captured registers.
        free_vars: Vec<RegName>,
        /// Destination register.
        dst: RegName,
    },
    /// View `data` with the shape held in `shape`.
    SetShape {
        /// Register holding the tensor data.
        data: RegName,
        /// Register holding the new shape.
        shape: RegName,
        /// Destination register.
        dst: RegName,
    },
    /// Branch relative to the current pc.
    If {
        /// Register holding the test value.
        test: RegName,
        /// Register holding the comparison target.
        target: RegName,
        /// Relative offset taken when equal. May be negative.
        true_offset: Index,
        /// Relative offset taken otherwise. May be negative.
        false_offset: Index,
    },
    /// Invoke a global function by index.
    InvokeFunc {
        /// Index of the callee in the function table.
        func_index: Index,
        /// Argument registers.
        args: Vec<RegName>,
        /// Destination register.
        dst: RegName,
    },
    /// Invoke the closure held in `closure`.
    InvokeClosure {
        /// Register holding the closure.
        closure: RegName,
        /// Argument registers.
        args: Vec<RegName>,
        /// Destination register.
        dst: RegName,
    },
    /// Load a constant-pool entry.
    LoadConst {
        /// Constant pool index.
        const_index: Index,
        /// Destination register.
        dst: RegName,
    },
    /// Load an immediate integer.
    LoadConsti {
        /// Immediate value.
        val: Index,
        /// Destination register.
        dst: RegName,
    },
    /// Read a tuple field at an immediate index.
    GetField {
        /// Register holding the tuple.
        object: RegName,
        /// Field index.
        field_index: Index,
        /// Destination register.
        dst: RegName,
    },
    /// Jump relative to the current pc.
    Goto {
        /// Relative offset. May be negative.
        pc_offset: Index,
    },
    /// Invoke a JIT-compiled operator held in a register.
    ///
    /// `args` carries both inputs and outputs, as with
    /// [`Instruction::InvokePacked`].
    InvokeJit {
        /// Register holding the operator.
        op_reg: RegName,
        /// Number of trailing output registers in `args`.
        output_size: Index,
        /// Input and output registers, inputs first.
        args: Vec<RegName>,
    },
    /// Run type inference for the operator held in `op_reg`.
    InferType {
        /// Register holding the operator.
        op_reg: RegName,
        /// Argument registers.
        args: Vec<RegName>,
        /// Destination register.
        dst: RegName,
    },
    /// Select the active CUDA stream on a device.
    CudaSetStream {
        /// Device ordinal.
        device_id: Index,
        /// Stream identifier.
        stream_id: Index,
    },
    /// Record a CUDA event on a stream.
    CudaAddEvent {
        /// Event identifier.
        event_id: Index,
        /// Stream identifier.
        stream_id: Index,
    },
    /// Make a stream wait on a CUDA event.
    CudaWaitEvent {
        /// Event identifier.
        event_id: Index,
        /// Stream identifier.
        stream_id: Index,
    },
    /// Barrier across all CUDA streams.
    CudaStreamBarrier,
}

impl Instruction {
    /// Returns the opcode tag for this instruction.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Move { .. } => Opcode::Move,
            Self::Ret { .. } => Opcode::Ret,
            Self::Fatal => Opcode::Fatal,
            Self::InvokePacked { .. } => Opcode::InvokePacked,
            Self::AllocTensor { .. } => Opcode::AllocTensor,
            Self::AllocTensorReg { .. } => Opcode::AllocTensorReg,
            Self::AllocStorage { .. } => Opcode::AllocStorage,
            Self::Free { .. } => Opcode::Free,
            Self::AllocTuple { .. } => Opcode::AllocTuple,
            Self::AllocClosure { .. } => Opcode::AllocClosure,
            Self::SetShape { .. } => Opcode::SetShape,
            Self::If { .. } => Opcode::If,
            Self::InvokeFunc { .. } => Opcode::InvokeFunc,
            Self::InvokeClosure { .. } => Opcode::InvokeClosure,
            Self::LoadConst { .. } => Opcode::LoadConst,
            Self::LoadConsti { .. } => Opcode::LoadConsti,
            Self::GetField { .. } => Opcode::GetField,
            Self::Goto { .. } => Opcode::Goto,
            Self::InvokeJit { .. } => Opcode::InvokeJit,
            Self::InferType { .. } => Opcode::InferType,
            Self::CudaSetStream { .. } => Opcode::CudaSetStream,
            Self::CudaAddEvent { .. } => Opcode::CudaAddEvent,
            Self::CudaWaitEvent { .. } => Opcode::CudaWaitEvent,
            Self::CudaStreamBarrier => Opcode::CudaStreamBarrier,
        }
    }

    /// Returns the destination register, when the instruction has a result.
    #[must_use]
    pub fn dst(&self) -> Option<RegName> {
        match self {
            Self::Move { dst, .. }
            | Self::AllocTensor { dst, .. }
            | Self::AllocTensorReg { dst, .. }
            | Self::AllocStorage { dst, .. }
            | Self::AllocTuple { dst, .. }
            | Self::AllocClosure { dst, .. }
            | Self::SetShape { dst, .. }
            | Self::InvokeFunc { dst, .. }
            | Self::InvokeClosure { dst, .. }
            | Self::LoadConst { dst, .. }
            | Self::LoadConsti { dst, .. }
            | Self::GetField { dst, .. }
            | Self::InferType { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    /// Visits every register this instruction reads or writes.
    pub fn for_each_register(&self, mut f: impl FnMut(RegName)) {
        match self {
            Self::Move { from, dst } => {
                f(*from);
                f(*dst);
            }
            Self::Ret { result } => f(*result),
            Self::Fatal | Self::CudaStreamBarrier => {}
            Self::InvokePacked { args, .. } => args.iter().copied().for_each(f),
            Self::AllocTensor { storage, dst, .. } => {
                f(*storage);
                f(*dst);
            }
            Self::AllocTensorReg {
                storage,
                shape_register,
                dst,
                ..
            } => {
                f(*storage);
                f(*shape_register);
                f(*dst);
            }
            Self::AllocStorage { dst, .. }
            | Self::LoadConst { dst, .. }
            | Self::LoadConsti { dst, .. } => f(*dst),
            Self::Free { memory } => f(*memory),
            Self::AllocTuple { fields, dst } => {
                fields.iter().copied().for_each(&mut f);
                f(*dst);
            }
            Self::AllocClosure { free_vars, dst, .. } => {
                free_vars.iter().copied().for_each(&mut f);
                f(*dst);
            }
            Self::SetShape { data, shape, dst } => {
                f(*data);
                f(*shape);
                f(*dst);
            }
            Self::If { test, target, .. } => {
                f(*test);
                f(*target);
            }
            Self::InvokeFunc { args, dst, .. } => {
                args.iter().copied().for_each(&mut f);
                f(*dst);
            }
            Self::InvokeClosure { closure, args, dst } => {
                f(*closure);
                args.iter().copied().for_each(&mut f);
                f(*dst);
            }
            Self::GetField { object, dst, .. } => {
                f(*object);
                f(*dst);
            }
            Self::Goto { .. }
            | Self::CudaSetStream { .. }
            | Self::CudaAddEvent { .. }
            | Self::CudaWaitEvent { .. } => {}
            Self::InvokeJit { op_reg, args, .. } => {
                f(*op_reg);
                args.iter().copied().for_each(&mut f);
            }
            Self::InferType { op_reg, args, dst } => {
                f(*op_reg);
                args.iter().copied().for_each(&mut f);
                f(*dst);
            }
        }
    }
}

fn fmt_regs(f: &mut fmt::Formatter<'_>, regs: &[RegName]) -> fmt::Result {
    write!(f, "[")?;
    for (i, r) in regs.iter().enumerate() {
        if i != 0 {
            write!(f, ", ")?;
        }
        write!(f, "${r}")?;
    }
    write!(f, "]")
}

fn fmt_indices(f: &mut fmt::Formatter<'_>, vals: &[Index]) -> fmt::Result {
    write!(f, "[")?;
    for (i, v) in vals.iter().enumerate() {
        if i != 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "]")
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().name();
        match self {
            Self::Move { from, dst } => write!(f, "{name} ${dst} ${from}"),
            Self::Ret { result } => write!(f, "{name} ${result}"),
            Self::Fatal | Self::CudaStreamBarrier => write!(f, "{name}"),
            Self::InvokePacked {
                packed_index,
                output_size,
                args,
            } => {
                write!(f, "{name} prim[{packed_index}] out={output_size} args=")?;
                fmt_regs(f, args)
            }
            Self::AllocTensor {
                storage,
                offset,
                dtype,
                own,
                dst,
                shape,
            } => {
                write!(f, "{name} ${dst} storage=${storage} offset={offset} ")?;
                fmt_indices(f, shape)?;
                write!(f, " {dtype} own={own}")
            }
            Self::AllocTensorReg {
                storage,
                offset,
                shape_register,
                dtype,
                own,
                dst,
            } => write!(
                f,
                "{name} ${dst} storage=${storage} offset={offset} shape=${shape_register} {dtype} own={own}"
            ),
            Self::AllocStorage {
                allocation_size,
                alignment,
                dtype_hint,
                device_type,
                device_id,
                dst,
            } => write!(
                f,
                "{name} ${dst} size={allocation_size} align={alignment} hint={dtype_hint} device={device_type}:{device_id}"
            ),
            Self::Free { memory } => write!(f, "{name} ${memory}"),
            Self::AllocTuple { fields, dst } => {
                write!(f, "{name} ${dst} ")?;
                fmt_regs(f, fields)
            }
            Self::AllocClosure {
                func_index,
                free_vars,
                dst,
            } => {
                write!(f, "{name} ${dst} func[{func_index}] free_vars=")?;
                fmt_regs(f, free_vars)
            }
            Self::SetShape { data, shape, dst } => {
                write!(f, "{name} ${dst} data=${data} shape=${shape}")
            }
            Self::If {
                test,
                target,
                true_offset,
                false_offset,
            } => write!(f, "{name} ${test} ${target} {true_offset} {false_offset}"),
            Self::InvokeFunc {
                func_index,
                args,
                dst,
            } => {
                write!(f, "{name} ${dst} func[{func_index}] args=")?;
                fmt_regs(f, args)
            }
            Self::InvokeClosure { closure, args, dst } => {
                write!(f, "{name} ${dst} ${closure} args=")?;
                fmt_regs(f, args)
            }
            Self::LoadConst { const_index, dst } => {
                write!(f, "{name} ${dst} const[{const_index}]")
            }
            Self::LoadConsti { val, dst } => write!(f, "{name} ${dst} {val}"),
            Self::GetField {
                object,
                field_index,
                dst,
            } => write!(f, "{name} ${dst} ${object}[{field_index}]"),
            Self::Goto { pc_offset } => write!(f, "{name} {pc_offset}"),
            Self::InvokeJit {
                op_reg,
                output_size,
                args,
            } => {
                write!(f, "{name} ${op_reg} out={output_size} args=")?;
                fmt_regs(f, args)
            }
            Self::InferType { op_reg, args, dst } => {
                write!(f, "{name} ${dst} ${op_reg} args=")?;
                fmt_regs(f, args)
            }
            Self::CudaSetStream {
                device_id,
                stream_id,
            } => write!(f, "{name} device={device_id} stream={stream_id}"),
            Self::CudaAddEvent {
                event_id,
                stream_id,
            }
            | Self::CudaWaitEvent {
                event_id,
                stream_id,
            } => write!(f, "{name} event={event_id} stream={stream_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn display_renders_register_and_index_operands() {
        assert_eq!(
            Instruction::Move { from: 0, dst: 1 }.to_string(),
            "move $1 $0"
        );
        assert_eq!(
            Instruction::If {
                test: 0,
                target: 1,
                true_offset: 2,
                false_offset: -3
            }
            .to_string(),
            "if $0 $1 2 -3"
        );
        assert_eq!(
            Instruction::AllocTensor {
                storage: 0,
                offset: 0,
                dtype: DataType::float(32),
                own: true,
                dst: 4,
                shape: vec![2, 3, 5],
            }
            .to_string(),
            "alloc_tensor $4 storage=$0 offset=0 [2, 3, 5] float32 own=true"
        );
    }

    #[test]
    fn dst_is_present_only_for_result_producing_variants() {
        assert_eq!(Instruction::Move { from: 0, dst: 3 }.dst(), Some(3));
        assert_eq!(
            Instruction::LoadConsti { val: 7, dst: 2 }.dst(),
            Some(2)
        );
        assert_eq!(Instruction::Ret { result: 1 }.dst(), None);
        assert_eq!(Instruction::Goto { pc_offset: -5 }.dst(), None);
        assert_eq!(Instruction::Fatal.dst(), None);
    }

    #[test]
    fn for_each_register_visits_operands_and_dst() {
        let instr = Instruction::InvokeClosure {
            closure: 4,
            args: vec![1, 2],
            dst: 5,
        };
        let mut seen = vec![];
        instr.for_each_register(|r| seen.push(r));
        assert_eq!(seen, vec![4, 1, 2, 5]);

        let mut seen = vec![];
        Instruction::CudaSetStream {
            device_id: 0,
            stream_id: 9,
        }
        .for_each_register(|r| seen.push(r));
        assert!(seen.is_empty());
    }
}
