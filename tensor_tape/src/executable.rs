// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The executable aggregate and its binary save/load framing.
//!
//! An executable is the persisted form of a compiled model program: the
//! constant pool, the global and primitive directories, the function table,
//! and a shared handle to the compiled operator library. The byte stream is
//! a fixed sequence of sections — header, globals, constants, primitive
//! names, code — read strictly forward.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::codec::{
    InstructionError, InstructionRecord, deserialize_instruction, serialize_instruction,
};
use crate::format::{DecodeError, Reader, Writer};
use crate::host::{ConstantCodec, LibRef};
use crate::instruction::{Index, Instruction};

/// Magic number identifying the executable byte stream.
pub const VM_BYTECODE_MAGIC: u64 = u64::from_le_bytes(*b"TTAPEVM\0");

/// Format version string; load requires an exact match.
pub const VM_BYTECODE_VERSION: &str = "0.1.0";

/// A compiled VM function: metadata plus its instruction sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    /// Global name of the function.
    pub name: String,
    /// Parameter names, in call order.
    pub params: Vec<String>,
    /// Number of virtual registers the function requires.
    pub register_file_size: Index,
    /// Instruction sequence.
    pub instructions: Vec<Instruction>,
}

impl Function {
    /// Creates a function record.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        params: Vec<String>,
        register_file_size: Index,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            register_file_size,
            instructions,
        }
    }

    /// Returns `true` if every register mentioned by an instruction lies in
    /// `[0, register_file_size)`.
    fn registers_in_bounds(&self) -> bool {
        let mut ok = true;
        for instr in &self.instructions {
            instr.for_each_register(|r| {
                if r < 0 || r >= self.register_file_size {
                    ok = false;
                }
            });
        }
        ok
    }
}

/// An executable load failure. Fatal: the partially built executable is
/// discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The magic number did not match.
    Header {
        /// Magic value found in the stream.
        magic: u64,
    },
    /// The version string did not match.
    Version {
        /// Version string found in the stream.
        found: String,
    },
    /// A section's framing was malformed.
    Section {
        /// Name of the section being read.
        section: &'static str,
        /// Underlying stream error.
        error: DecodeError,
    },
    /// An instruction record failed to decode.
    Instruction(InstructionError),
    /// The code section named a function absent from the global section.
    UnknownGlobal {
        /// The unresolvable function name.
        name: String,
    },
    /// The code section defined the same global twice.
    DuplicateFunction {
        /// The repeated function name.
        name: String,
    },
    /// The code section's function count disagrees with the global section.
    FunctionCount {
        /// Number of names in the global section.
        globals: usize,
        /// Number of functions in the code section.
        functions: usize,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { magic } => write!(
                f,
                "invalid VM file format in the header section (bad magic {magic:#018x})"
            ),
            Self::Version { found } => write!(
                f,
                "invalid VM file format in the version section (found \"{found}\", expected \"{VM_BYTECODE_VERSION}\")"
            ),
            Self::Section { section, error } => {
                write!(f, "invalid VM file format in the {section} section: {error}")
            }
            Self::Instruction(e) => {
                write!(f, "invalid VM file format in the code section: {e}")
            }
            Self::UnknownGlobal { name } => {
                write!(f, "code section references unknown global \"{name}\"")
            }
            Self::DuplicateFunction { name } => {
                write!(f, "code section defines global \"{name}\" twice")
            }
            Self::FunctionCount { globals, functions } => write!(
                f,
                "code section defines {functions} function(s) but the global section lists {globals}"
            ),
        }
    }
}

impl core::error::Error for LoadError {}

impl From<InstructionError> for LoadError {
    fn from(e: InstructionError) -> Self {
        Self::Instruction(e)
    }
}

/// A loaded or compiled VM executable.
///
/// Immutable from the VM's perspective once constructed; `save` only rewrites
/// the owned `code_buffer` scratch.
pub struct Executable<V> {
    /// Shared handle to the compiled operator library.
    pub lib: LibRef,
    /// Cached serialized form; rewritten by [`Executable::save`].
    pub code_buffer: Vec<u8>,
    /// Constant pool, in stable index order.
    pub constants: Vec<V>,
    /// Global function name to function-table index. Dense in
    /// `[0, functions.len())`.
    pub global_map: HashMap<String, Index>,
    /// Primitive operator name to packed index. Dense in the packed range.
    pub primitive_map: HashMap<String, Index>,
    /// Function table, indexed by the global map's values.
    pub functions: Vec<Function>,
}

impl<V: fmt::Debug> fmt::Debug for Executable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executable")
            .field("lib", &self.lib.name())
            .field("code_buffer", &self.code_buffer)
            .field("constants", &self.constants)
            .field("global_map", &self.global_map)
            .field("primitive_map", &self.primitive_map)
            .field("functions", &self.functions)
            .finish()
    }
}

impl<V> Executable<V> {
    /// Builds an executable from functions in index order; the global map is
    /// derived from the function names.
    #[must_use]
    pub fn new(
        lib: LibRef,
        constants: Vec<V>,
        primitive_map: HashMap<String, Index>,
        functions: Vec<Function>,
    ) -> Self {
        let global_map = functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i as Index))
            .collect();
        Self {
            lib,
            code_buffer: Vec::new(),
            constants,
            global_map,
            primitive_map,
            functions,
        }
    }

    /// Serializes the executable, returning a view of the bytes.
    ///
    /// The view borrows the executable's own `code_buffer` and is valid until
    /// the next `save` or destruction. Saving twice yields byte-identical
    /// buffers.
    pub fn save<C: ConstantCodec<Value = V>>(&mut self, codec: &C) -> &[u8] {
        for func in &self.functions {
            debug_assert!(
                func.registers_in_bounds(),
                "function {} uses a register outside its register file",
                func.name
            );
        }

        let mut w = Writer::new();
        save_header(&mut w);
        self.save_global_section(&mut w);
        self.save_constant_section(&mut w, codec);
        self.save_primitive_names(&mut w);
        self.save_code_section(&mut w);
        self.code_buffer = w.into_vec();
        &self.code_buffer
    }

    /// Reconstructs an executable from `code` and an operator library handle.
    pub fn load<C: ConstantCodec<Value = V>>(
        codec: &C,
        code: &[u8],
        lib: LibRef,
    ) -> Result<Self, LoadError> {
        let mut r = Reader::new(code);
        load_header(&mut r)?;
        let global_map = load_global_section(&mut r)?;
        let constants = load_constant_section(codec, &mut r)?;
        let primitive_map = load_primitive_names(&mut r)?;
        let functions = load_code_section(&mut r, &global_map)?;
        Ok(Self {
            lib,
            code_buffer: code.to_vec(),
            constants,
            global_map,
            primitive_map,
            functions,
        })
    }

    /// Returns the parameter count of the named function.
    #[must_use]
    pub fn function_arity(&self, name: &str) -> Option<usize> {
        self.function(name).map(|f| f.params.len())
    }

    /// Returns the `index`-th parameter name of the named function.
    #[must_use]
    pub fn function_param_name(&self, name: &str, index: usize) -> Option<&str> {
        self.function(name)?.params.get(index).map(String::as_str)
    }

    /// Looks up a function by global name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        let &index = self.global_map.get(name)?;
        self.functions.get(usize::try_from(index).ok()?)
    }

    /// Renders the per-function instruction listing.
    ///
    /// See [`crate::disasm::bytecode_text`].
    #[must_use]
    pub fn bytecode(&self) -> String {
        crate::disasm::bytecode_text(self)
    }

    /// Renders the statistics block.
    ///
    /// See [`crate::disasm::stats_text`].
    #[must_use]
    pub fn stats(&self) -> String {
        crate::disasm::stats_text(self)
    }

    /// Returns the global directory as `(name, index)` pairs ascending by
    /// index.
    #[must_use]
    pub fn sorted_globals(&self) -> Vec<(&str, Index)> {
        let mut globals: Vec<(&str, Index)> = self
            .global_map
            .iter()
            .map(|(name, &index)| (name.as_str(), index))
            .collect();
        globals.sort_by_key(|&(_, index)| index);
        globals
    }

    /// Returns the primitive directory as a name list positioned by packed
    /// index. Gaps render as empty strings.
    #[must_use]
    pub fn sorted_primitives(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, &index) in &self.primitive_map {
            assert!(index >= 0, "negative primitive index {index}");
            let slot = index as usize;
            if names.len() <= slot {
                names.resize(slot + 1, "");
            }
            names[slot] = name.as_str();
        }
        names
    }

    fn save_global_section(&self, w: &mut Writer) {
        let globals = self.sorted_globals();
        for (position, &(_, index)) in globals.iter().enumerate() {
            debug_assert_eq!(index, position as Index, "global map indices must be dense");
        }
        w.write_u64_le(globals.len() as u64);
        for (name, _) in globals {
            w.write_string(name);
        }
    }

    fn save_constant_section<C: ConstantCodec<Value = V>>(&self, w: &mut Writer, codec: &C) {
        w.write_u64_le(self.constants.len() as u64);
        for value in &self.constants {
            codec.serialize_value(w, value);
        }
    }

    fn save_primitive_names(&self, w: &mut Writer) {
        let names = self.sorted_primitives();
        w.write_u64_le(names.len() as u64);
        for name in names {
            w.write_string(name);
        }
    }

    fn save_code_section(&self, w: &mut Writer) {
        w.write_u64_le(self.functions.len() as u64);
        for func in &self.functions {
            w.write_string(&func.name);
            w.write_i64_le(func.register_file_size);
            w.write_u64_le(func.instructions.len() as u64);
            w.write_u64_le(func.params.len() as u64);
            for param in &func.params {
                w.write_string(param);
            }
            for instr in &func.instructions {
                serialize_instruction(instr).save(w);
            }
        }
    }
}

fn section_err(section: &'static str) -> impl Fn(DecodeError) -> LoadError {
    move |error| LoadError::Section { section, error }
}

fn save_header(w: &mut Writer) {
    w.write_u64_le(VM_BYTECODE_MAGIC);
    w.write_string(VM_BYTECODE_VERSION);
}

fn load_header(r: &mut Reader<'_>) -> Result<(), LoadError> {
    let magic = r.read_u64_le().map_err(section_err("header"))?;
    if magic != VM_BYTECODE_MAGIC {
        return Err(LoadError::Header { magic });
    }
    let version = r.read_string().map_err(section_err("version"))?;
    if version != VM_BYTECODE_VERSION {
        return Err(LoadError::Version { found: version });
    }
    Ok(())
}

fn load_global_section(r: &mut Reader<'_>) -> Result<HashMap<String, Index>, LoadError> {
    let names = r.read_string_list().map_err(section_err("global"))?;
    Ok(names
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, i as Index))
        .collect())
}

fn load_constant_section<C: ConstantCodec>(
    codec: &C,
    r: &mut Reader<'_>,
) -> Result<Vec<C::Value>, LoadError> {
    let err = section_err("constant");
    let count = r.read_count().map_err(&err)?;
    let mut constants = Vec::with_capacity(count);
    for _ in 0..count {
        constants.push(codec.deserialize_value(r).map_err(&err)?);
    }
    Ok(constants)
}

fn load_primitive_names(r: &mut Reader<'_>) -> Result<HashMap<String, Index>, LoadError> {
    let names = r
        .read_string_list()
        .map_err(section_err("primitive name"))?;
    // Empty slots are gap padding from ill-formed producers; a gap must not
    // manufacture a "" entry.
    Ok(names
        .into_iter()
        .enumerate()
        .filter(|(_, name)| !name.is_empty())
        .map(|(i, name)| (name, i as Index))
        .collect())
}

fn load_code_section(
    r: &mut Reader<'_>,
    global_map: &HashMap<String, Index>,
) -> Result<Vec<Function>, LoadError> {
    let err = section_err("code");
    let count = r.read_count().map_err(&err)?;
    if count != global_map.len() {
        return Err(LoadError::FunctionCount {
            globals: global_map.len(),
            functions: count,
        });
    }

    let mut slots: Vec<Option<Function>> = Vec::new();
    slots.resize_with(count, || None);
    for _ in 0..count {
        let name = r.read_string().map_err(&err)?;
        let register_file_size = r.read_i64_le().map_err(&err)?;
        let num_instructions = r.read_count().map_err(&err)?;
        let params = r.read_string_list().map_err(&err)?;

        let mut instructions = Vec::with_capacity(num_instructions);
        for _ in 0..num_instructions {
            let record = InstructionRecord::load(r)?;
            instructions.push(deserialize_instruction(&record)?);
        }

        let Some(&index) = global_map.get(&name) else {
            return Err(LoadError::UnknownGlobal { name });
        };
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| slots.get_mut(i))
            .ok_or_else(|| LoadError::UnknownGlobal { name: name.clone() })?;
        if slot.is_some() {
            return Err(LoadError::DuplicateFunction { name });
        }
        *slot = Some(Function {
            name,
            params,
            register_file_size,
            instructions,
        });
    }

    // Count equality plus duplicate rejection guarantee every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}
