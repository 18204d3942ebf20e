// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instruction-level codec.
//!
//! Every instruction serializes to a flat record: the opcode value plus a
//! fixed-per-opcode field sequence, fixed fields first and variable-length
//! tails (shapes, call arguments, captured variables) last. On the wire a
//! record is a count-prefixed `Index` list `[hash, opcode, fields...]`, where
//! `hash` is a deterministic combine over the opcode and fields checked
//! before decoding.

use alloc::vec::Vec;
use core::fmt;

use crate::dtype::DataType;
use crate::format::{DecodeError, Reader, Writer};
use crate::instruction::{Index, Instruction};
use crate::opcode::Opcode;

/// A flattened instruction: opcode value plus field sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionRecord {
    /// Serialized opcode value.
    pub opcode: Index,
    /// Opcode-specific fields.
    pub fields: Vec<Index>,
}

/// An instruction decode failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstructionError {
    /// The opcode value is not recognized.
    UnknownOpcode {
        /// The offending opcode value.
        opcode: Index,
    },
    /// The record carries the wrong number of fields for its opcode.
    FieldCount {
        /// Opcode being decoded.
        opcode: Opcode,
        /// Required field count.
        expected: usize,
        /// Fields actually present.
        got: usize,
    },
    /// A field value is outside its legal range (dtype component, boolean
    /// flag, or tail length).
    FieldValue {
        /// Opcode being decoded.
        opcode: Opcode,
        /// Index of the offending field.
        index: usize,
    },
    /// The record hash does not match its contents.
    Integrity {
        /// Hash stored in the record.
        expected: u64,
        /// Hash recomputed from the record contents.
        got: u64,
    },
    /// The record framing was malformed.
    Stream(DecodeError),
}

impl fmt::Display for InstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { opcode } => write!(f, "unknown opcode {opcode}"),
            Self::FieldCount {
                opcode,
                expected,
                got,
            } => write!(
                f,
                "wrong field count for {}: expected {expected}, got {got}",
                opcode.name()
            ),
            Self::FieldValue { opcode, index } => {
                write!(f, "bad value in field {index} of {}", opcode.name())
            }
            Self::Integrity { expected, got } => write!(
                f,
                "instruction hash mismatch: stored {expected:#018x}, computed {got:#018x}"
            ),
            Self::Stream(e) => write!(f, "malformed instruction record: {e}"),
        }
    }
}

impl core::error::Error for InstructionError {}

impl From<DecodeError> for InstructionError {
    fn from(e: DecodeError) -> Self {
        Self::Stream(e)
    }
}

/// Flattens `instr` into its serialized record.
#[must_use]
pub fn serialize_instruction(instr: &Instruction) -> InstructionRecord {
    log::debug!("serializing: {instr}");
    let mut fields: Vec<Index> = Vec::new();
    match instr {
        Instruction::Move { from, dst } => fields.extend([*from, *dst]),
        Instruction::Ret { result } => fields.push(*result),
        Instruction::Fatal | Instruction::CudaStreamBarrier => {}
        Instruction::InvokePacked {
            packed_index,
            output_size,
            args,
        } => {
            fields.extend([*packed_index, args.len() as Index, *output_size]);
            fields.extend_from_slice(args);
        }
        Instruction::AllocTensor {
            storage,
            offset,
            dtype,
            own,
            dst,
            shape,
        } => {
            fields.extend([*storage, *offset]);
            push_dtype(&mut fields, *dtype);
            fields.push(Index::from(*own));
            // ndim equals shape.len(), but the decoder needs it before the
            // tail to know how many fields remain.
            fields.push(shape.len() as Index);
            fields.push(*dst);
            fields.extend_from_slice(shape);
        }
        Instruction::AllocTensorReg {
            storage,
            offset,
            shape_register,
            dtype,
            own,
            dst,
        } => {
            fields.extend([*storage, *offset, *shape_register]);
            push_dtype(&mut fields, *dtype);
            fields.push(*dst);
            fields.push(Index::from(*own));
        }
        Instruction::AllocStorage {
            allocation_size,
            alignment,
            dtype_hint,
            device_type,
            device_id,
            dst,
        } => {
            fields.extend([*allocation_size, *alignment]);
            push_dtype(&mut fields, *dtype_hint);
            fields.extend([*device_type, *device_id, *dst]);
        }
        Instruction::Free { memory } => fields.push(*memory),
        Instruction::AllocTuple { fields: tuple, dst } => {
            fields.extend([tuple.len() as Index, *dst]);
            fields.extend_from_slice(tuple);
        }
        Instruction::AllocClosure {
            func_index,
            free_vars,
            dst,
        } => {
            fields.extend([*func_index, free_vars.len() as Index, *dst]);
            fields.extend_from_slice(free_vars);
        }
        Instruction::SetShape { data, shape, dst } => fields.extend([*data, *shape, *dst]),
        Instruction::If {
            test,
            target,
            true_offset,
            false_offset,
        } => fields.extend([*test, *target, *true_offset, *false_offset]),
        Instruction::InvokeFunc {
            func_index,
            args,
            dst,
        } => {
            fields.extend([*func_index, args.len() as Index, *dst]);
            fields.extend_from_slice(args);
        }
        Instruction::InvokeClosure { closure, args, dst } => {
            fields.extend([*closure, args.len() as Index, *dst]);
            fields.extend_from_slice(args);
        }
        Instruction::LoadConst { const_index, dst } => fields.extend([*const_index, *dst]),
        Instruction::LoadConsti { val, dst } => fields.extend([*val, *dst]),
        Instruction::GetField {
            object,
            field_index,
            dst,
        } => fields.extend([*object, *field_index, *dst]),
        Instruction::Goto { pc_offset } => fields.push(*pc_offset),
        Instruction::InvokeJit {
            op_reg,
            output_size,
            args,
        } => {
            fields.extend([*op_reg, args.len() as Index, *output_size]);
            fields.extend_from_slice(args);
        }
        Instruction::InferType { op_reg, args, dst } => {
            fields.extend([*op_reg, args.len() as Index, *dst]);
            fields.extend_from_slice(args);
        }
        Instruction::CudaSetStream {
            device_id,
            stream_id,
        } => fields.extend([*device_id, *stream_id]),
        Instruction::CudaAddEvent {
            event_id,
            stream_id,
        }
        | Instruction::CudaWaitEvent {
            event_id,
            stream_id,
        } => fields.extend([*event_id, *stream_id]),
    }

    InstructionRecord {
        opcode: instr.opcode().index(),
        fields,
    }
}

/// Rebuilds an instruction from its serialized record.
pub fn deserialize_instruction(record: &InstructionRecord) -> Result<Instruction, InstructionError> {
    let opcode = Opcode::from_index(record.opcode).ok_or(InstructionError::UnknownOpcode {
        opcode: record.opcode,
    })?;
    let f = &record.fields;
    let instr = match opcode {
        Opcode::Move => {
            expect_len(opcode, f, 2)?;
            Instruction::Move {
                from: f[0],
                dst: f[1],
            }
        }
        Opcode::Ret => {
            expect_len(opcode, f, 1)?;
            Instruction::Ret { result: f[0] }
        }
        Opcode::Fatal => {
            expect_len(opcode, f, 0)?;
            Instruction::Fatal
        }
        Opcode::InvokePacked => {
            expect_min(opcode, f, 3)?;
            let args = tail(opcode, f, 3, 1)?;
            Instruction::InvokePacked {
                packed_index: f[0],
                output_size: f[2],
                args,
            }
        }
        Opcode::AllocTensor => {
            expect_min(opcode, f, 8)?;
            let dtype = dtype_at(opcode, f, 2)?;
            let own = flag_at(opcode, f, 5)?;
            let shape = tail(opcode, f, 8, 6)?;
            Instruction::AllocTensor {
                storage: f[0],
                offset: f[1],
                dtype,
                own,
                dst: f[7],
                shape,
            }
        }
        Opcode::AllocTensorReg => {
            expect_len(opcode, f, 8)?;
            let dtype = dtype_at(opcode, f, 3)?;
            let own = flag_at(opcode, f, 7)?;
            Instruction::AllocTensorReg {
                storage: f[0],
                offset: f[1],
                shape_register: f[2],
                dtype,
                dst: f[6],
                own,
            }
        }
        Opcode::AllocStorage => {
            expect_len(opcode, f, 8)?;
            let dtype_hint = dtype_at(opcode, f, 2)?;
            Instruction::AllocStorage {
                allocation_size: f[0],
                alignment: f[1],
                dtype_hint,
                device_type: f[5],
                device_id: f[6],
                dst: f[7],
            }
        }
        Opcode::Free => {
            expect_len(opcode, f, 1)?;
            Instruction::Free { memory: f[0] }
        }
        Opcode::AllocTuple => {
            expect_min(opcode, f, 2)?;
            let tuple = tail(opcode, f, 2, 0)?;
            Instruction::AllocTuple {
                fields: tuple,
                dst: f[1],
            }
        }
        Opcode::AllocClosure => {
            expect_min(opcode, f, 3)?;
            let free_vars = tail(opcode, f, 3, 1)?;
            Instruction::AllocClosure {
                func_index: f[0],
                free_vars,
                dst: f[2],
            }
        }
        Opcode::SetShape => {
            expect_len(opcode, f, 3)?;
            Instruction::SetShape {
                data: f[0],
                shape: f[1],
                dst: f[2],
            }
        }
        Opcode::If => {
            expect_len(opcode, f, 4)?;
            Instruction::If {
                test: f[0],
                target: f[1],
                true_offset: f[2],
                false_offset: f[3],
            }
        }
        Opcode::InvokeFunc => {
            expect_min(opcode, f, 3)?;
            let args = tail(opcode, f, 3, 1)?;
            Instruction::InvokeFunc {
                func_index: f[0],
                args,
                dst: f[2],
            }
        }
        Opcode::InvokeClosure => {
            expect_min(opcode, f, 3)?;
            let args = tail(opcode, f, 3, 1)?;
            Instruction::InvokeClosure {
                closure: f[0],
                args,
                dst: f[2],
            }
        }
        Opcode::LoadConst => {
            expect_len(opcode, f, 2)?;
            Instruction::LoadConst {
                const_index: f[0],
                dst: f[1],
            }
        }
        Opcode::LoadConsti => {
            expect_len(opcode, f, 2)?;
            Instruction::LoadConsti {
                val: f[0],
                dst: f[1],
            }
        }
        Opcode::GetField => {
            expect_len(opcode, f, 3)?;
            Instruction::GetField {
                object: f[0],
                field_index: f[1],
                dst: f[2],
            }
        }
        Opcode::Goto => {
            expect_len(opcode, f, 1)?;
            Instruction::Goto { pc_offset: f[0] }
        }
        Opcode::InvokeJit => {
            expect_min(opcode, f, 3)?;
            let args = tail(opcode, f, 3, 1)?;
            Instruction::InvokeJit {
                op_reg: f[0],
                output_size: f[2],
                args,
            }
        }
        Opcode::InferType => {
            expect_min(opcode, f, 3)?;
            let args = tail(opcode, f, 3, 1)?;
            Instruction::InferType {
                op_reg: f[0],
                args,
                dst: f[2],
            }
        }
        Opcode::CudaSetStream => {
            expect_len(opcode, f, 2)?;
            Instruction::CudaSetStream {
                device_id: f[0],
                stream_id: f[1],
            }
        }
        Opcode::CudaAddEvent => {
            expect_len(opcode, f, 2)?;
            Instruction::CudaAddEvent {
                event_id: f[0],
                stream_id: f[1],
            }
        }
        Opcode::CudaWaitEvent => {
            expect_len(opcode, f, 2)?;
            Instruction::CudaWaitEvent {
                event_id: f[0],
                stream_id: f[1],
            }
        }
        Opcode::CudaStreamBarrier => {
            expect_len(opcode, f, 0)?;
            Instruction::CudaStreamBarrier
        }
    };
    Ok(instr)
}

impl InstructionRecord {
    /// Writes this record as `[hash, opcode, fields...]`.
    pub(crate) fn save(&self, w: &mut Writer) {
        let hash = record_hash(self.opcode, &self.fields);
        w.write_u64_le(2 + self.fields.len() as u64);
        w.write_i64_le(hash as i64);
        w.write_i64_le(self.opcode);
        for &field in &self.fields {
            w.write_i64_le(field);
        }
    }

    /// Reads one record, verifying its stored hash.
    pub(crate) fn load(r: &mut Reader<'_>) -> Result<Self, InstructionError> {
        let n = r.read_count()?;
        if n < 2 {
            return Err(InstructionError::Stream(DecodeError::OutOfBounds));
        }
        let stored = r.read_i64_le()? as u64;
        let opcode = r.read_i64_le()?;
        let mut fields = Vec::with_capacity(n - 2);
        for _ in 0..n - 2 {
            fields.push(r.read_i64_le()?);
        }
        let computed = record_hash(opcode, &fields);
        if stored != computed {
            return Err(InstructionError::Integrity {
                expected: stored,
                got: computed,
            });
        }
        Ok(Self { opcode, fields })
    }
}

fn push_dtype(fields: &mut Vec<Index>, dtype: DataType) {
    fields.extend([
        Index::from(dtype.code),
        Index::from(dtype.bits),
        Index::from(dtype.lanes),
    ]);
}

fn dtype_at(opcode: Opcode, fields: &[Index], start: usize) -> Result<DataType, InstructionError> {
    let bad = |offset: usize| InstructionError::FieldValue {
        opcode,
        index: start + offset,
    };
    Ok(DataType {
        code: u8::try_from(fields[start]).map_err(|_| bad(0))?,
        bits: u8::try_from(fields[start + 1]).map_err(|_| bad(1))?,
        lanes: u16::try_from(fields[start + 2]).map_err(|_| bad(2))?,
    })
}

fn flag_at(opcode: Opcode, fields: &[Index], index: usize) -> Result<bool, InstructionError> {
    match fields[index] {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(InstructionError::FieldValue { opcode, index }),
    }
}

fn expect_len(opcode: Opcode, fields: &[Index], expected: usize) -> Result<(), InstructionError> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(InstructionError::FieldCount {
            opcode,
            expected,
            got: fields.len(),
        })
    }
}

fn expect_min(opcode: Opcode, fields: &[Index], min: usize) -> Result<(), InstructionError> {
    if fields.len() >= min {
        Ok(())
    } else {
        Err(InstructionError::FieldCount {
            opcode,
            expected: min,
            got: fields.len(),
        })
    }
}

/// Extracts the variable tail starting at `start`, whose length is stored in
/// the count field at `count_index`. The record must end exactly where the
/// tail does.
fn tail(
    opcode: Opcode,
    fields: &[Index],
    start: usize,
    count_index: usize,
) -> Result<Vec<Index>, InstructionError> {
    let count = usize::try_from(fields[count_index]).map_err(|_| InstructionError::FieldValue {
        opcode,
        index: count_index,
    })?;
    let expected = start
        .checked_add(count)
        .ok_or(InstructionError::FieldValue {
            opcode,
            index: count_index,
        })?;
    expect_len(opcode, fields, expected)?;
    Ok(fields[start..expected].to_vec())
}

fn combine(seed: u64, v: u64) -> u64 {
    seed ^ v
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

fn record_hash(opcode: Index, fields: &[Index]) -> u64 {
    let mut h = combine(0, opcode as u64);
    for &f in fields {
        h = combine(h, f as u64);
    }
    h
}
