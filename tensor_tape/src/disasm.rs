// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable renderings of an executable.
//!
//! [`bytecode_text`] lists every function with its serialized opcode/field
//! form next to the pretty-printed instruction; [`stats_text`] summarizes
//! the constant pool and the two directories. Both renderings are
//! deterministic: directory output is ordered by index, never by map
//! iteration order.

use alloc::string::String;
use core::fmt::Write as _;

use crate::codec::serialize_instruction;
use crate::executable::Executable;

/// Renders the per-function instruction listing.
///
/// Each function block is the four header lines followed by one line per
/// instruction (index right-aligned to width 2, opcode, raw fields, then the
/// pretty form), terminated by a blank line.
#[must_use]
pub fn bytecode_text<V>(exec: &Executable<V>) -> String {
    let mut out = String::new();
    for (i, func) in exec.functions.iter().enumerate() {
        let _ = writeln!(
            out,
            "VM Function[{i}]: {}({})",
            func.name,
            func.params.join(", ")
        );
        let _ = writeln!(out, "# reg file size = {}", func.register_file_size);
        let _ = writeln!(out, "# instruction count = {}", func.instructions.len());
        out.push_str("opcode, fields # inst(text):\n");
        for (idx, instr) in func.instructions.iter().enumerate() {
            let record = serialize_instruction(instr);
            let _ = write!(out, "{idx:>2}: {} ", record.opcode);
            for field in &record.fields {
                let _ = write!(out, "{field} ");
            }
            let _ = writeln!(out, "  # {instr}");
        }
        out.push('\n');
    }
    out
}

/// Renders the executable statistics block: constant count, the global
/// directory as ordered `(name, index)` pairs, and primitive ops in
/// packed-index order.
#[must_use]
pub fn stats_text<V>(exec: &Executable<V>) -> String {
    let mut out = String::new();
    out.push_str("VM executable statistics:\n");

    // TODO: render per-constant shapes once a shape-aware constant
    // inspector is available; until then this is count-only.
    let _ = writeln!(out, "  Constants (#{})", exec.constants.len());

    let globals = exec.sorted_globals();
    let _ = write!(out, "  Globals (#{}): [", globals.len());
    for (i, (name, index)) in globals.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "(\"{name}\", {index})");
    }
    out.push_str("]\n");

    let primitives = exec.sorted_primitives();
    let _ = write!(out, "  Primitive ops (#{}): [", primitives.len());
    for (i, name) in primitives.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        out.push_str(name);
    }
    out.push_str("]\n");

    out
}
