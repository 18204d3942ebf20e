// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler example.
//!
//! Run with:
//! `cargo run -p tensor_tape --example disasm`

use std::sync::Arc;

use tensor_tape::dtype::DataType;
use tensor_tape::executable::{Executable, Function};
use tensor_tape::format::{DecodeError, Reader, Writer};
use tensor_tape::host::{ConstantCodec, OpLibrary};
use tensor_tape::instruction::Instruction;

struct I64Constants;

impl ConstantCodec for I64Constants {
    type Value = i64;

    fn serialize_value(&self, w: &mut Writer, value: &i64) {
        w.write_i64_le(*value);
    }

    fn deserialize_value(&self, r: &mut Reader<'_>) -> Result<i64, DecodeError> {
        r.read_i64_le()
    }
}

struct NullLib;

impl OpLibrary for NullLib {
    fn name(&self) -> &str {
        "null"
    }
}

fn main() {
    let main_fn = Function::new(
        "main",
        vec!["x".into(), "y".into()],
        6,
        vec![
            Instruction::AllocStorage {
                allocation_size: 96,
                alignment: 64,
                dtype_hint: DataType::float(32),
                device_type: 1,
                device_id: 0,
                dst: 2,
            },
            Instruction::AllocTensor {
                storage: 2,
                offset: 0,
                dtype: DataType::float(32),
                own: true,
                dst: 3,
                shape: vec![4, 6],
            },
            Instruction::InvokePacked {
                packed_index: 0,
                output_size: 1,
                args: vec![0, 1, 3],
            },
            Instruction::Ret { result: 3 },
        ],
    );

    let mut primitive_map = hashbrown::HashMap::new();
    primitive_map.insert("fused_add".to_string(), 0);
    let mut exec = Executable::new(Arc::new(NullLib), vec![7], primitive_map, vec![main_fn]);

    let code = exec.save(&I64Constants).to_vec();
    let exec = Executable::load(&I64Constants, &code, Arc::new(NullLib)).unwrap();

    println!("{}", exec.bytecode());
    println!("{}", exec.stats());
}
