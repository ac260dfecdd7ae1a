//! The asm.js backend proper.
//!
//! [`Codegen`] composes the small subsystems around a borrowed view of
//! the IR module: name mangling, coercions, the global memory image,
//! function tables, frame planning, φ resolution, the instruction
//! translator, the call handler registry and the module emitter.
//! Per-function scratch state lives on the same struct and is reset at
//! each function boundary.
//!
//! The public entry point is [`emit::emit_module`].

pub mod calls;
pub mod cast;
pub mod emit;
pub mod expr;
pub mod frame;
pub mod function;
pub mod mangle;
pub mod memory;
pub mod metadata;
pub mod nativize;
pub mod phi;
pub mod simd;
pub mod tables;

pub use emit::emit_module;

use crate::core::{CodegenOptions, CodegenSession, CompileError, CompileResult};
use crate::ir::{BlockId, DataLayout, Instruction, Module, Type, ValueId};
use crate::js::calls::CallHandler;
use crate::js::cast::Cast;
use crate::js::frame::{AllocaColoring, FrameLayout};
use crate::js::memory::GlobalImage;
use crate::js::metadata::Metadata;
use crate::js::tables::FunctionTableSet;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Lane names of the four SIMD positions.
pub(crate) const SIMD_LANE_UPPER: [char; 4] = ['X', 'Y', 'Z', 'W'];
pub(crate) const SIMD_LANE_LOWER: [char; 4] = ['x', 'y', 'z', 'w'];

/// Emission state for one module.
pub(crate) struct Codegen<'m, 'a> {
    pub(crate) module: &'m Module,
    pub(crate) options: CodegenOptions,
    pub(crate) session: &'a CodegenSession<'a>,
    pub(crate) layout: DataLayout,

    // Module-wide accumulators.
    pub(crate) image: GlobalImage,
    pub(crate) tables: FunctionTableSet,
    pub(crate) meta: Metadata,
    pub(crate) post_sets: Vec<String>,
    pub(crate) handlers: HashMap<&'static str, CallHandler>,
    pub(crate) block_addresses: HashMap<ValueId, HashMap<BlockId, u32>>,
    pub(crate) module_used: HashSet<ValueId>,
    pub(crate) warned_many_locals: bool,

    // Per-function scratch, reset at function entry.
    pub(crate) names: HashMap<ValueId, &'a str>,
    pub(crate) unique_num: u32,
    pub(crate) used_vars: BTreeMap<String, Type>,
    pub(crate) use_counts: HashMap<ValueId, u32>,
    pub(crate) users: HashMap<ValueId, Vec<ValueId>>,
    pub(crate) nativized: HashSet<ValueId>,
    pub(crate) frame: FrameLayout,
    pub(crate) stack_bumped: bool,
    pub(crate) invoke_state: u8,
    pub(crate) current_function: Option<ValueId>,
}

impl<'m, 'a> Codegen<'m, 'a> {
    pub(crate) fn new(
        module: &'m Module,
        options: CodegenOptions,
        session: &'a CodegenSession<'a>,
    ) -> Self {
        let image = GlobalImage::new(options.global_base);
        Self {
            module,
            options,
            session,
            layout: DataLayout::new(),
            image,
            tables: FunctionTableSet::new(),
            meta: Metadata::default(),
            post_sets: Vec::new(),
            handlers: calls::setup_call_handlers(),
            block_addresses: HashMap::new(),
            module_used: HashSet::new(),
            warned_many_locals: false,
            names: HashMap::new(),
            unique_num: 0,
            used_vars: BTreeMap::new(),
            use_counts: HashMap::new(),
            users: HashMap::new(),
            nativized: HashSet::new(),
            frame: FrameLayout::default(),
            stack_bumped: false,
            invoke_state: 0,
            current_function: None,
        }
    }

    /// The mangled textual name of a value, established lazily and cached
    /// for the current function.
    pub(crate) fn js_name(&mut self, value: ValueId) -> CompileResult<&'a str> {
        if let Some(&name) = self.names.get(&value) {
            return Ok(name);
        }

        // An alloca coalesced into another uses the representative's name.
        if let Some(Instruction::Alloca { .. }) = self.module.as_instruction(value) {
            if self.frame.frame_offset(value).is_some() {
                let rep = self.frame.representative(value);
                if rep != value {
                    return self.js_name(rep);
                }
            }
        }

        let base = match &self.module.value(value).name {
            Some(name) => name.clone(),
            None => {
                let n = self.unique_num;
                self.unique_num += 1;
                n.to_string()
            }
        };
        let mangled = if self.module.is_global_namespace(value) {
            mangle::sanitize_global(&base)
        } else {
            mangle::sanitize_local(&base)
        };
        let interned = self.session.intern_str(&mangled);
        self.names.insert(value, interned);
        Ok(interned)
    }

    /// `name = `, registering `name` as a declared local of the current
    /// function.
    pub(crate) fn get_ad_hoc_assign(&mut self, name: &str, ty: &Type) -> String {
        self.used_vars.insert(name.to_string(), ty.clone());
        format!("{} = ", name)
    }

    pub(crate) fn get_assign(&mut self, inst: ValueId) -> CompileResult<String> {
        let name = self.js_name(inst)?;
        let ty = self.module.ty(inst).clone();
        Ok(self.get_ad_hoc_assign(name, &ty))
    }

    /// Assignment prefix only when the instruction's result is used.
    pub(crate) fn get_assign_if_needed(&mut self, value: ValueId) -> CompileResult<String> {
        if self.module.as_instruction(value).is_some()
            && self.use_counts.get(&value).copied().unwrap_or(0) > 0
        {
            return self.get_assign(value);
        }
        Ok(String::new())
    }

    /// Validate a vector type and mark the module as using SIMD.
    pub(crate) fn check_vector_type(&mut self, ty: &Type) -> CompileResult<()> {
        let (elem, lanes) = match ty {
            Type::Vector(elem, lanes) => (elem.as_ref(), *lanes),
            other => {
                return Err(CompileError::InvalidSimdShape {
                    reason: format!("{} is not a vector type", other),
                })
            }
        };
        let elem_bits = match elem {
            Type::Int(w @ (1 | 32)) => *w,
            Type::Float => 32,
            other => {
                return Err(CompileError::InvalidSimdShape {
                    reason: format!("unsupported lane type {}", other),
                })
            }
        };
        if lanes > 4 || elem_bits * lanes > 128 {
            return Err(CompileError::InvalidSimdShape {
                reason: format!("<{} x {}> exceeds 128 bits", lanes, elem),
            });
        }
        self.meta.uses_simd = true;
        Ok(())
    }

    /// Shorthand for the coercion layer with this emitter's options.
    pub(crate) fn cast_text(&self, s: &str, ty: &Type, cast: Cast) -> CompileResult<String> {
        cast::get_cast(s, ty, cast, &self.options)
    }

    pub(crate) fn paren_cast_text(&self, s: &str, ty: &Type, cast: Cast) -> CompileResult<String> {
        cast::get_paren_cast(s, ty, cast, &self.options)
    }
}
