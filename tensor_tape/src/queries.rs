// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-facing query surface.
//!
//! An external host addresses an executable through a small name-indexed
//! dispatch table. Index queries fail with a checked [`QueryError`]; the two
//! function-inspection queries report misses with the directory's sentinel
//! values (`-1` / `""`) after logging, matching the behavior embedders
//! already rely on.

use alloc::string::{String, ToString};
use core::fmt;

use crate::executable::{Executable, LoadError};
use crate::host::{ConstantCodec, LibRef};

/// Query name for the global-directory size.
pub const GET_NUM_OF_GLOBALS: &str = "vm.GetNumOfGlobals";
/// Query name for a global name by position.
pub const GET_GLOBAL_FIELDS: &str = "vm.GetGlobalFields";
/// Query name for the primitive-directory size.
pub const GET_NUM_OF_PRIMITIVES: &str = "vm.GetNumOfPrimitives";
/// Query name for a primitive name by packed index.
pub const GET_PRIMITIVE_FIELDS: &str = "vm.GetPrimitiveFields";
/// Query name for a function's parameter count.
pub const GET_FUNCTION_ARITY: &str = "vm.GetFunctionArity";
/// Query name for a function's parameter name by position.
pub const GET_FUNCTION_PARAM_NAME: &str = "vm.GetFunctionParamName";

/// A positional query argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueryArg<'a> {
    /// An integer argument.
    Int(i64),
    /// A string argument.
    Str(&'a str),
}

/// A query result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryReply {
    /// An integer result.
    Int(i64),
    /// A string result.
    Str(String),
}

/// A checked query failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryError {
    /// The query name is not registered.
    UnknownQuery {
        /// The unrecognized name.
        name: String,
    },
    /// The query received the wrong number of arguments.
    ArgumentCount {
        /// Query being dispatched.
        query: &'static str,
        /// Required argument count.
        expected: usize,
        /// Arguments actually supplied.
        got: usize,
    },
    /// An argument had the wrong type.
    ArgumentType {
        /// Query being dispatched.
        query: &'static str,
        /// Position of the offending argument.
        index: usize,
    },
    /// An index argument was outside the directory.
    IndexOutOfRange {
        /// Query being dispatched.
        query: &'static str,
        /// The supplied index.
        index: i64,
        /// Size of the directory being indexed.
        len: usize,
    },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownQuery { name } => write!(f, "unknown query \"{name}\""),
            Self::ArgumentCount {
                query,
                expected,
                got,
            } => write!(
                f,
                "{query} takes {expected} argument(s), got {got}"
            ),
            Self::ArgumentType { query, index } => {
                write!(f, "wrong type for argument {index} of {query}")
            }
            Self::IndexOutOfRange { query, index, len } => {
                write!(f, "index {index} out of range for {query} (len {len})")
            }
        }
    }
}

impl core::error::Error for QueryError {}

/// Dispatches a named query against `exec`.
pub fn dispatch<V>(
    exec: &Executable<V>,
    name: &str,
    args: &[QueryArg<'_>],
) -> Result<QueryReply, QueryError> {
    match name {
        GET_NUM_OF_GLOBALS => {
            expect_args(GET_NUM_OF_GLOBALS, args, 0)?;
            Ok(QueryReply::Int(exec.global_map.len() as i64))
        }
        GET_GLOBAL_FIELDS => {
            expect_args(GET_GLOBAL_FIELDS, args, 1)?;
            let index = int_arg(GET_GLOBAL_FIELDS, args, 0)?;
            Ok(QueryReply::Str(global_field(exec, index)?.into()))
        }
        GET_NUM_OF_PRIMITIVES => {
            expect_args(GET_NUM_OF_PRIMITIVES, args, 0)?;
            Ok(QueryReply::Int(exec.primitive_map.len() as i64))
        }
        GET_PRIMITIVE_FIELDS => {
            expect_args(GET_PRIMITIVE_FIELDS, args, 1)?;
            let index = int_arg(GET_PRIMITIVE_FIELDS, args, 0)?;
            Ok(QueryReply::Str(primitive_field(exec, index)?.into()))
        }
        GET_FUNCTION_ARITY => {
            expect_args(GET_FUNCTION_ARITY, args, 1)?;
            let func = str_arg(GET_FUNCTION_ARITY, args, 0)?;
            Ok(QueryReply::Int(function_arity(exec, func)))
        }
        GET_FUNCTION_PARAM_NAME => {
            expect_args(GET_FUNCTION_PARAM_NAME, args, 2)?;
            let func = str_arg(GET_FUNCTION_PARAM_NAME, args, 0)?;
            let index = int_arg(GET_FUNCTION_PARAM_NAME, args, 1)?;
            Ok(QueryReply::Str(function_param_name(exec, func, index)))
        }
        _ => Err(QueryError::UnknownQuery {
            name: name.to_string(),
        }),
    }
}

/// Returns the global name at `index` when globals are ordered ascending by
/// assigned index.
pub fn global_field<V>(exec: &Executable<V>, index: i64) -> Result<&str, QueryError> {
    let globals = exec.sorted_globals();
    let i = usize::try_from(index)
        .ok()
        .filter(|&i| i < globals.len())
        .ok_or(QueryError::IndexOutOfRange {
            query: GET_GLOBAL_FIELDS,
            index,
            len: globals.len(),
        })?;
    Ok(globals[i].0)
}

/// Returns the primitive name whose packed index is `index`.
pub fn primitive_field<V>(exec: &Executable<V>, index: i64) -> Result<&str, QueryError> {
    exec.primitive_map
        .iter()
        .find(|&(_, &packed)| packed == index)
        .map(|(name, _)| name.as_str())
        .ok_or(QueryError::IndexOutOfRange {
            query: GET_PRIMITIVE_FIELDS,
            index,
            len: exec.primitive_map.len(),
        })
}

/// Returns the named function's parameter count, or `-1` if the name is
/// unknown.
#[must_use]
pub fn function_arity<V>(exec: &Executable<V>, name: &str) -> i64 {
    match exec.function_arity(name) {
        Some(arity) => arity as i64,
        None => {
            log::error!("cannot find function {name} in executable");
            -1
        }
    }
}

/// Returns the named function's `index`-th parameter name, or `""` on an
/// unknown name or out-of-range index.
#[must_use]
pub fn function_param_name<V>(exec: &Executable<V>, name: &str, index: i64) -> String {
    let Some(func) = exec.function(name) else {
        log::error!("cannot find function {name} in executable");
        return String::new();
    };
    let param = usize::try_from(index)
        .ok()
        .and_then(|i| func.params.get(i));
    match param {
        Some(p) => p.clone(),
        None => {
            log::error!("invalid parameter index {index} for {name}");
            String::new()
        }
    }
}

/// Reconstructs an executable from serialized `code` and a library handle.
///
/// Thin facade over [`Executable::load`] for hosts that route everything
/// through this module.
pub fn load_executable<C: ConstantCodec>(
    codec: &C,
    code: &[u8],
    lib: LibRef,
) -> Result<Executable<C::Value>, LoadError> {
    Executable::load(codec, code, lib)
}

fn expect_args(
    query: &'static str,
    args: &[QueryArg<'_>],
    expected: usize,
) -> Result<(), QueryError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(QueryError::ArgumentCount {
            query,
            expected,
            got: args.len(),
        })
    }
}

fn int_arg(query: &'static str, args: &[QueryArg<'_>], index: usize) -> Result<i64, QueryError> {
    match args[index] {
        QueryArg::Int(v) => Ok(v),
        QueryArg::Str(_) => Err(QueryError::ArgumentType { query, index }),
    }
}

fn str_arg<'a>(
    query: &'static str,
    args: &[QueryArg<'a>],
    index: usize,
) -> Result<&'a str, QueryError> {
    match args[index] {
        QueryArg::Str(s) => Ok(s),
        QueryArg::Int(_) => Err(QueryError::ArgumentType { query, index }),
    }
}
