//! Lowering of a typed SSA IR into the asm.js dialect.
//!
//! The input is a platform-neutral, pre-legalized SSA module (32-bit
//! pointers, integers at most 32 bits wide, vectors of at most 4 lanes);
//! the output is a single text stream of strictly-coerced statements plus
//! a metadata trailer, ready for a downstream driver to link against a
//! runtime.
//!
//! # Usage
//!
//! ```
//! use asmjs_backend::core::CodegenOptions;
//! use asmjs_backend::ir::{FunctionType, ModuleBuilder, Type};
//! use asmjs_backend::js::emit_module;
//!
//! let mut builder = ModuleBuilder::new("demo");
//! let mut f = builder.define_function(
//!     "f",
//!     FunctionType { ret: Type::Void, params: vec![] },
//! );
//! let entry = f.append_block("entry");
//! f.position_at_end(entry);
//! f.ret(None);
//! f.finish();
//!
//! let text = emit_module(&builder.finish(), &CodegenOptions::default()).unwrap();
//! assert!(text.contains("function _f()"));
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - the SSA input language, builders, data layout
//! - [`js`] - the backend: mangling, coercions, memory image, tables,
//!   frames, φ resolution, instruction translation, module emission
//! - [`relooper`] - the control-flow structurer boundary
//! - [`core`] - shared infrastructure (errors, config, session, output)
//! - [`passes`] - the upstream legalization plan the input must satisfy

pub mod core;
pub mod ir;
pub mod js;
pub mod passes;
pub mod relooper;

pub use crate::core::{CodegenOptions, CompileError, CompileResult, OptLevel};
pub use crate::js::emit_module;
