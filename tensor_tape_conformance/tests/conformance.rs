// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use std::sync::Arc;

use hashbrown::HashMap;
use tensor_tape::codec::{deserialize_instruction, serialize_instruction};
use tensor_tape::dtype::DataType;
use tensor_tape::executable::{
    Executable, Function, LoadError, VM_BYTECODE_MAGIC,
};
use tensor_tape::format::{DecodeError, Reader, Writer};
use tensor_tape::host::{ConstantCodec, LibRef, OpLibrary};
use tensor_tape::instruction::Instruction;
use tensor_tape::queries::{self, QueryArg, QueryError, QueryReply};

/// Test constant codec: values are length-prefixed byte strings, standing in
/// for the toolchain's opaque tensor values.
struct BytesCodec;

impl ConstantCodec for BytesCodec {
    type Value = Vec<u8>;

    fn serialize_value(&self, w: &mut Writer, value: &Vec<u8>) {
        w.write_u64_le(value.len() as u64);
        w.write_bytes(value);
    }

    fn deserialize_value(&self, r: &mut Reader<'_>) -> Result<Vec<u8>, DecodeError> {
        let len = r.read_count()?;
        Ok(r.read_bytes(len)?.to_vec())
    }
}

struct FakeLib;

impl OpLibrary for FakeLib {
    fn name(&self) -> &str {
        "fake_kernels"
    }
}

fn lib() -> LibRef {
    Arc::new(FakeLib)
}

fn roundtrip(exec: &mut Executable<Vec<u8>>) -> Executable<Vec<u8>> {
    let code = exec.save(&BytesCodec).to_vec();
    Executable::load(&BytesCodec, &code, lib()).unwrap()
}

#[test]
fn empty_executable_roundtrips() {
    let mut exec: Executable<Vec<u8>> = Executable::new(lib(), vec![], HashMap::new(), vec![]);
    let back = roundtrip(&mut exec);
    assert!(back.constants.is_empty());
    assert!(back.global_map.is_empty());
    assert!(back.primitive_map.is_empty());
    assert!(back.functions.is_empty());
}

#[test]
fn single_instruction_function_roundtrips() {
    let main = Function::new(
        "main",
        vec!["x".into()],
        2,
        vec![
            Instruction::Move { from: 0, dst: 1 },
            Instruction::Ret { result: 1 },
        ],
    );
    let mut exec = Executable::new(lib(), vec![], HashMap::new(), vec![main]);
    let back = roundtrip(&mut exec);

    assert_eq!(back.functions, exec.functions);
    assert_eq!(back.function_arity("main"), Some(1));
    assert_eq!(queries::function_arity(&back, "main"), 1);
    assert!(back.bytecode().contains("VM Function[0]: main(x)"));
}

#[test]
fn variable_arity_invocation_roundtrips() {
    let instr = Instruction::InvokePacked {
        packed_index: 3,
        output_size: 2,
        args: vec![0, 1, 2, 3],
    };
    let record = serialize_instruction(&instr);
    assert_eq!(record.fields.len(), 7);

    let decoded = deserialize_instruction(&record).unwrap();
    let Instruction::InvokePacked { args, .. } = &decoded else {
        panic!("wrong variant: {decoded:?}");
    };
    assert_eq!(args.len(), 4);

    let func = Function::new("apply", vec![], 4, vec![instr, Instruction::Ret { result: 2 }]);
    let mut exec = Executable::new(lib(), vec![], HashMap::new(), vec![func]);
    let back = roundtrip(&mut exec);
    assert_eq!(back.functions, exec.functions);
}

#[test]
fn tensor_allocation_roundtrips() {
    let instr = Instruction::AllocTensor {
        storage: 0,
        offset: 0,
        dtype: DataType::new(0, 32, 1),
        own: true,
        dst: 4,
        shape: vec![2, 3, 5],
    };
    let record = serialize_instruction(&instr);
    assert_eq!(record.fields.len(), 11);
    assert_eq!(deserialize_instruction(&record), Ok(instr));
}

#[test]
fn control_flow_preserves_negative_offsets() {
    let body = vec![
        Instruction::If {
            test: 0,
            target: 1,
            true_offset: 2,
            false_offset: -3,
        },
        Instruction::Goto { pc_offset: -5 },
        Instruction::Ret { result: 0 },
    ];
    let func = Function::new("loopy", vec![], 2, body);
    let mut exec = Executable::new(lib(), vec![], HashMap::new(), vec![func]);
    let back = roundtrip(&mut exec);

    let Instruction::If { false_offset, .. } = &back.functions[0].instructions[0] else {
        panic!("wrong variant");
    };
    assert_eq!(*false_offset, -3);
    let Instruction::Goto { pc_offset } = &back.functions[0].instructions[1] else {
        panic!("wrong variant");
    };
    assert_eq!(*pc_offset, -5);
}

#[test]
fn directory_collision_fails_the_load() {
    let mut exec = Executable::new(
        lib(),
        vec![],
        HashMap::new(),
        vec![Function::new(
            "main",
            vec![],
            1,
            vec![Instruction::Ret { result: 0 }],
        )],
    );
    // The code section will name a function the global section never listed.
    exec.functions[0].name = "phantom".into();
    let code = exec.save(&BytesCodec).to_vec();

    let err = Executable::load(&BytesCodec, &code, lib()).unwrap_err();
    assert_eq!(
        err,
        LoadError::UnknownGlobal {
            name: "phantom".into()
        }
    );
}

#[test]
fn full_executable_roundtrips_across_all_tables() {
    let dtype = DataType::float(32);
    let main = Function::new(
        "main",
        vec!["input".into(), "weight".into()],
        8,
        vec![
            Instruction::AllocStorage {
                allocation_size: 4096,
                alignment: 64,
                dtype_hint: dtype,
                device_type: 2,
                device_id: 0,
                dst: 2,
            },
            Instruction::AllocTensor {
                storage: 2,
                offset: 0,
                dtype,
                own: true,
                dst: 3,
                shape: vec![32, 32],
            },
            Instruction::LoadConst {
                const_index: 1,
                dst: 4,
            },
            Instruction::InvokePacked {
                packed_index: 1,
                output_size: 1,
                args: vec![0, 1, 3],
            },
            Instruction::AllocTuple {
                fields: vec![3, 4],
                dst: 5,
            },
            Instruction::GetField {
                object: 5,
                field_index: 0,
                dst: 6,
            },
            Instruction::Free { memory: 2 },
            Instruction::Ret { result: 6 },
        ],
    );
    let schedule = Function::new(
        "schedule",
        vec![],
        2,
        vec![
            Instruction::CudaSetStream {
                device_id: 0,
                stream_id: 1,
            },
            Instruction::CudaAddEvent {
                event_id: 4,
                stream_id: 1,
            },
            Instruction::CudaWaitEvent {
                event_id: 4,
                stream_id: 2,
            },
            Instruction::CudaStreamBarrier,
            Instruction::Ret { result: 0 },
        ],
    );
    let closures = Function::new(
        "closures",
        vec!["f".into()],
        6,
        vec![
            Instruction::AllocClosure {
                func_index: 0,
                free_vars: vec![0],
                dst: 1,
            },
            Instruction::InvokeClosure {
                closure: 1,
                args: vec![0],
                dst: 2,
            },
            Instruction::InvokeFunc {
                func_index: 1,
                args: vec![2],
                dst: 3,
            },
            Instruction::InferType {
                op_reg: 3,
                args: vec![2],
                dst: 4,
            },
            Instruction::InvokeJit {
                op_reg: 4,
                output_size: 1,
                args: vec![2, 5],
            },
            Instruction::Ret { result: 5 },
        ],
    );

    let mut primitive_map = HashMap::new();
    primitive_map.insert("fused_add".to_string(), 0);
    primitive_map.insert("fused_matmul".to_string(), 1);
    let constants = vec![vec![1u8, 2, 3], vec![], vec![0xff; 16]];

    let mut exec = Executable::new(
        lib(),
        constants,
        primitive_map,
        vec![main, schedule, closures],
    );
    let back = roundtrip(&mut exec);

    assert_eq!(back.global_map, exec.global_map);
    assert_eq!(back.primitive_map, exec.primitive_map);
    assert_eq!(back.constants, exec.constants);
    assert_eq!(back.functions, exec.functions);
}

#[test]
fn saving_twice_is_byte_identical() {
    let mut primitive_map = HashMap::new();
    primitive_map.insert("fused_add".to_string(), 0);
    primitive_map.insert("fused_mul".to_string(), 1);
    primitive_map.insert("fused_relu".to_string(), 2);
    let mut exec = Executable::new(
        lib(),
        vec![vec![9u8]],
        primitive_map,
        vec![
            Function::new("a", vec![], 1, vec![Instruction::Ret { result: 0 }]),
            Function::new("b", vec![], 1, vec![Instruction::Fatal]),
        ],
    );
    let first = exec.save(&BytesCodec).to_vec();
    let second = exec.save(&BytesCodec).to_vec();
    assert_eq!(first, second);

    // A reloaded executable serializes identically as well.
    let mut reloaded = Executable::load(&BytesCodec, &first, lib()).unwrap();
    assert_eq!(reloaded.save(&BytesCodec), first.as_slice());
}

#[test]
fn header_and_version_gates_reject_mismatches() {
    let mut exec: Executable<Vec<u8>> = Executable::new(lib(), vec![], HashMap::new(), vec![]);
    let good = exec.save(&BytesCodec).to_vec();

    let mut bad_magic = good.clone();
    bad_magic[3] ^= 0x40;
    let err = Executable::<Vec<u8>>::load(&BytesCodec, &bad_magic, lib()).unwrap_err();
    assert!(matches!(err, LoadError::Header { .. }));

    let mut w = Writer::new();
    w.write_u64_le(VM_BYTECODE_MAGIC);
    w.write_string("0.0.0-prerelease");
    let err = Executable::<Vec<u8>>::load(&BytesCodec, w.as_slice(), lib()).unwrap_err();
    assert_eq!(
        err,
        LoadError::Version {
            found: "0.0.0-prerelease".into()
        }
    );
}

#[test]
fn disassembly_shape_matches_the_function_table() {
    let mut exec = Executable::new(
        lib(),
        vec![],
        HashMap::new(),
        vec![
            Function::new(
                "main",
                vec!["x".into()],
                2,
                vec![
                    Instruction::Move { from: 0, dst: 1 },
                    Instruction::Ret { result: 1 },
                ],
            ),
            Function::new("halt", vec![], 1, vec![Instruction::Fatal]),
        ],
    );
    let back = roundtrip(&mut exec);
    let text = back.bytecode();

    let blocks: Vec<&str> = text
        .split("\n\n")
        .filter(|b| !b.trim().is_empty())
        .collect();
    assert_eq!(blocks.len(), back.functions.len());

    for (func, block) in back.functions.iter().zip(&blocks) {
        let non_blank = block.lines().filter(|l| !l.trim().is_empty()).count();
        assert_eq!(non_blank, func.instructions.len() + 4);
        for idx in 0..func.instructions.len() {
            assert!(
                block.contains(&format!("{idx:>2}: ")),
                "missing instruction index {idx} in block:\n{block}"
            );
        }
    }
}

#[test]
fn stats_lists_directories_in_index_order() {
    let mut primitive_map = HashMap::new();
    primitive_map.insert("fused_relu".to_string(), 1);
    primitive_map.insert("fused_add".to_string(), 0);
    let mut exec = Executable::new(
        lib(),
        vec![vec![1u8], vec![2u8]],
        primitive_map,
        vec![
            Function::new("main", vec![], 1, vec![Instruction::Ret { result: 0 }]),
            Function::new("aux", vec![], 1, vec![Instruction::Ret { result: 0 }]),
        ],
    );
    let back = roundtrip(&mut exec);

    assert_eq!(
        back.stats(),
        "VM executable statistics:\n\
         \x20 Constants (#2)\n\
         \x20 Globals (#2): [(\"main\", 0), (\"aux\", 1)]\n\
         \x20 Primitive ops (#2): [fused_add, fused_relu]\n"
    );
}

#[test]
fn query_surface_covers_the_registered_entry_points() {
    let mut primitive_map = HashMap::new();
    primitive_map.insert("fused_add".to_string(), 0);
    let mut exec = Executable::new(
        lib(),
        vec![],
        primitive_map,
        vec![Function::new(
            "main",
            vec!["x".into(), "y".into()],
            3,
            vec![Instruction::Ret { result: 0 }],
        )],
    );

    // Load through the registered facade rather than the typed constructor.
    let code = exec.save(&BytesCodec).to_vec();
    let loaded = queries::load_executable(&BytesCodec, &code, lib()).unwrap();

    assert_eq!(
        queries::dispatch(&loaded, "vm.GetNumOfGlobals", &[]),
        Ok(QueryReply::Int(1))
    );
    assert_eq!(
        queries::dispatch(&loaded, "vm.GetGlobalFields", &[QueryArg::Int(0)]),
        Ok(QueryReply::Str("main".into()))
    );
    assert_eq!(
        queries::dispatch(&loaded, "vm.GetNumOfPrimitives", &[]),
        Ok(QueryReply::Int(1))
    );
    assert_eq!(
        queries::dispatch(&loaded, "vm.GetPrimitiveFields", &[QueryArg::Int(0)]),
        Ok(QueryReply::Str("fused_add".into()))
    );
    assert!(matches!(
        queries::dispatch(&loaded, "vm.GetGlobalFields", &[QueryArg::Int(7)]),
        Err(QueryError::IndexOutOfRange { .. })
    ));

    // Inspection queries report misses with sentinels, not errors.
    assert_eq!(queries::function_arity(&loaded, "missing"), -1);
    assert_eq!(queries::function_param_name(&loaded, "main", 2), "");
    assert_eq!(queries::function_param_name(&loaded, "main", 1), "y");
}
