//! Call handler registry.
//!
//! Calls dispatch through a name-indexed table of handler functions.
//! Runtime-library and intrinsic calls that need special emission (memory
//! intrinsics, elided markers, math intrinsics, SIMD builtins, the
//! setjmp/longjmp and invoke lowerings) get handlers; unknown callees
//! fall through to generic call emission. A handler is also invoked once
//! when its function is first placed in a table, with no instruction, for
//! registry side effects.

use super::cast::{ensure_float, Cast};
use super::tables::function_signature;
use super::Codegen;
use crate::core::{CompileError, CompileResult};
use crate::ir::{Instruction, ValueId};

/// A call handler: emission context, the call instruction (absent at
/// table-indexing time) and the mangled callee name.
pub(crate) type CallHandler =
    for<'m, 'a> fn(&mut Codegen<'m, 'a>, Option<ValueId>, &str) -> CompileResult<String>;

/// Build the registry.
pub(crate) fn setup_call_handlers() -> std::collections::HashMap<&'static str, CallHandler> {
    let mut handlers: std::collections::HashMap<&'static str, CallHandler> =
        std::collections::HashMap::new();

    for name in [
        "_llvm_memcpy_p0i8_p0i8_i32",
        "_llvm_memcpy_p0i8_p0i8_i64",
    ] {
        handlers.insert(name, handle_memcpy);
    }
    for name in ["_llvm_memset_p0i8_i32", "_llvm_memset_p0i8_i64"] {
        handlers.insert(name, handle_memset);
    }
    for name in [
        "_llvm_memmove_p0i8_p0i8_i32",
        "_llvm_memmove_p0i8_p0i8_i64",
    ] {
        handlers.insert(name, handle_memmove);
    }

    // Markers and debug info vanish from the output entirely.
    for name in [
        "_llvm_lifetime_start",
        "_llvm_lifetime_end",
        "_llvm_invariant_start",
        "_llvm_invariant_end",
        "_llvm_prefetch",
        "_llvm_dbg_declare",
        "_llvm_dbg_value",
    ] {
        handlers.insert(name, handle_elided);
    }
    for name in ["_llvm_expect_i32", "_llvm_expect_i1"] {
        handlers.insert(name, handle_expect);
    }

    for name in [
        "_llvm_sqrt_f32",
        "_llvm_sqrt_f64",
        "_llvm_fabs_f32",
        "_llvm_fabs_f64",
        "_llvm_ceil_f32",
        "_llvm_ceil_f64",
        "_llvm_floor_f32",
        "_llvm_floor_f64",
        "_llvm_pow_f32",
        "_llvm_pow_f64",
        "_llvm_sin_f32",
        "_llvm_sin_f64",
        "_llvm_cos_f32",
        "_llvm_cos_f64",
        "_llvm_exp_f64",
        "_llvm_log_f64",
    ] {
        handlers.insert(name, handle_math_builtin);
    }

    handlers.insert("_emscripten_preinvoke", handle_preinvoke);
    handlers.insert("_emscripten_postinvoke", handle_postinvoke);
    handlers.insert("_emscripten_landingpad", handle_eh_bridge);
    handlers.insert("_emscripten_resume", handle_eh_bridge);
    handlers.insert("_longjmp", handle_longjmp);
    handlers.insert("_emscripten_longjmp", handle_longjmp);
    handlers.insert("_saveSetjmp", handle_setjmp_family);
    handlers.insert("_testSetjmp", handle_setjmp_family);

    handlers
}

fn math_builtin_for(name: &str) -> Option<&'static str> {
    let stem = name
        .strip_prefix("_llvm_")?
        .rsplit_once('_')
        .map(|(stem, _suffix)| stem)?;
    Some(match stem {
        "sqrt" => "Math_sqrt",
        "fabs" => "Math_abs",
        "ceil" => "Math_ceil",
        "floor" => "Math_floor",
        "pow" => "Math_pow",
        "sin" => "Math_sin",
        "cos" => "Math_cos",
        "exp" => "Math_exp",
        "log" => "Math_log",
        _ => return None,
    })
}

impl<'m, 'a> Codegen<'m, 'a> {
    /// Signature string of a function type, validating any vector types on
    /// the way (which also raises the SIMD flag).
    pub(crate) fn get_function_signature(
        &mut self,
        ty: &crate::ir::FunctionType,
    ) -> CompileResult<String> {
        for part in std::iter::once(&ty.ret).chain(ty.params.iter()) {
            if part.is_vector() {
                self.check_vector_type(part)?;
            }
        }
        Ok(function_signature(ty, &self.options))
    }

    /// Index of a function in its signature's table, placing it on first
    /// use. Placement may fire the function's call handler once for
    /// registry side effects.
    pub(crate) fn function_index(&mut self, function: ValueId) -> CompileResult<u32> {
        let name = self.js_name(function)?.to_string();
        if let Some(index) = self.tables.cached_index(&name) {
            return Ok(index);
        }
        let data = self
            .module
            .as_function(function)
            .ok_or_else(|| CompileError::InvalidValue {
                reason: "function value expected".to_string(),
            })?;
        let data_ty = data.ty.clone();
        let alignment = data.alignment;
        let sig = self.get_function_signature(&data_ty)?;
        let index = self.tables.place(&name, &sig, alignment, &self.options)?;
        self.session.record_table_slot();

        // The function may only ever be indexed, never called directly;
        // its handler still needs its chance at side effects.
        if let Some(&handler) = self.handlers.get(name.as_str()) {
            handler(self, None, &name)?;
        }
        Ok(index)
    }

    /// Emit one call instruction through the registry.
    pub(crate) fn handle_call(&mut self, inst: ValueId) -> CompileResult<String> {
        let Instruction::Call { callee, .. } = self.module.as_instruction(inst).cloned().unwrap()
        else {
            unreachable!()
        };
        let callee = self.module.strip_pointer_casts(callee);

        if self.module.as_function(callee).is_some() {
            let name = self.js_name(callee)?.to_string();
            if let Some(&handler) = self.handlers.get(name.as_str()) {
                return handler(self, Some(inst), &name);
            }
            if name.starts_with("_emscripten_float32x4_")
                || name.starts_with("_emscripten_int32x4_")
            {
                return handle_simd_builtin(self, Some(inst), &name);
            }
            return self.generic_call(inst, callee, &name, false);
        }

        // Function-pointer call through the signature's table.
        let fn_ty = self
            .module
            .ty(callee)
            .fn_type()
            .cloned()
            .ok_or_else(|| CompileError::InvalidValue {
                reason: "call target must have a function type".to_string(),
            })?;
        let sig = self.get_function_signature(&fn_ty)?;
        self.tables.ensure(&sig, &self.options);
        let ptr = self.get_value_as_str(callee, Cast::SIGNED)?;
        let target = format!("FUNCTION_TABLE_{}[{} & #FM_{}#]", sig, ptr, sig);
        self.generic_call_to(inst, &target, false)
    }

    fn generic_call(
        &mut self,
        inst: ValueId,
        callee: ValueId,
        name: &str,
        force_ffi: bool,
    ) -> CompileResult<String> {
        let ffi = force_ffi
            || self
                .module
                .as_function(callee)
                .map(|f| f.is_declaration())
                .unwrap_or(false);
        self.generic_call_to(inst, name, ffi)
    }

    fn generic_call_to(&mut self, inst: ValueId, target: &str, ffi: bool) -> CompileResult<String> {
        let Instruction::Call { args, .. } = self.module.as_instruction(inst).cloned().unwrap()
        else {
            unreachable!()
        };

        // A call between preInvoke and postInvoke is the invoked call.
        if self.invoke_state == 1 {
            self.invoke_state = 2;
        }

        let arg_cast = if ffi {
            Cast::NONSPECIFIC | Cast::FFI_OUT
        } else {
            Cast::NONSPECIFIC
        };
        let mut arg_texts = Vec::with_capacity(args.len());
        for &arg in &args {
            arg_texts.push(self.get_value_as_cast_str(arg, arg_cast)?);
        }
        let text = format!("{}({})", target, arg_texts.join(","));

        let ret_ty = self.module.ty(inst).clone();
        if ret_ty.is_void() {
            return Ok(text);
        }
        if self.use_counts.get(&inst).copied().unwrap_or(0) == 0 {
            return Ok(text);
        }
        let assign = self.get_assign(inst)?;
        let result_cast = if ffi {
            Cast::NONSPECIFIC | Cast::FFI_IN
        } else {
            Cast::NONSPECIFIC
        };
        let coerced = self.cast_text(&text, &ret_ty, result_cast)?;
        Ok(format!("{}{}", assign, coerced))
    }

    fn call_args(&self, inst: ValueId) -> Vec<ValueId> {
        match self.module.as_instruction(inst) {
            Some(Instruction::Call { args, .. }) => args.clone(),
            _ => Vec::new(),
        }
    }
}

fn handle_memcpy(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    _name: &str,
) -> CompileResult<String> {
    cx.meta.declares.insert("memcpy".to_string());
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    let args = cx.call_args(inst);
    let dst = cx.get_value_as_cast_str(args[0], Cast::NONSPECIFIC)?;
    let src = cx.get_value_as_cast_str(args[1], Cast::NONSPECIFIC)?;
    let len = cx.get_value_as_cast_str(args[2], Cast::NONSPECIFIC)?;
    let assign = cx.get_assign_if_needed(inst)?;
    Ok(format!("{}_memcpy({},{},{})|0", assign, dst, src, len))
}

fn handle_memset(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    _name: &str,
) -> CompileResult<String> {
    cx.meta.declares.insert("memset".to_string());
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    let args = cx.call_args(inst);
    let dst = cx.get_value_as_cast_str(args[0], Cast::NONSPECIFIC)?;
    let val = cx.get_value_as_cast_str(args[1], Cast::NONSPECIFIC)?;
    let len = cx.get_value_as_cast_str(args[2], Cast::NONSPECIFIC)?;
    let assign = cx.get_assign_if_needed(inst)?;
    Ok(format!("{}_memset({},{},{})|0", assign, dst, val, len))
}

fn handle_memmove(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    _name: &str,
) -> CompileResult<String> {
    cx.meta.declares.insert("memmove".to_string());
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    let args = cx.call_args(inst);
    let dst = cx.get_value_as_cast_str(args[0], Cast::NONSPECIFIC)?;
    let src = cx.get_value_as_cast_str(args[1], Cast::NONSPECIFIC)?;
    let len = cx.get_value_as_cast_str(args[2], Cast::NONSPECIFIC)?;
    let assign = cx.get_assign_if_needed(inst)?;
    Ok(format!("{}_memmove({},{},{})|0", assign, dst, src, len))
}

fn handle_elided(
    _cx: &mut Codegen<'_, '_>,
    _inst: Option<ValueId>,
    _name: &str,
) -> CompileResult<String> {
    Ok(String::new())
}

fn handle_expect(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    _name: &str,
) -> CompileResult<String> {
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    let args = cx.call_args(inst);
    let assign = cx.get_assign_if_needed(inst)?;
    let value = cx.get_value_as_str(args[0], Cast::SIGNED)?;
    Ok(format!("{}{}", assign, value))
}

fn handle_math_builtin(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    name: &str,
) -> CompileResult<String> {
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    let builtin = math_builtin_for(name).ok_or(CompileError::UnsupportedInstruction {
        opcode: "unknown math intrinsic",
    })?;
    let args = cx.call_args(inst);
    let mut arg_texts = Vec::with_capacity(args.len());
    for &arg in &args {
        arg_texts.push(cx.get_value_as_cast_str(arg, Cast::SIGNED)?);
    }
    let ty = cx.module.ty(inst).clone();
    let assign = cx.get_assign_if_needed(inst)?;
    let call = ensure_float(
        format!("{}({})", builtin, arg_texts.join(",")),
        &ty,
        &cx.options,
    );
    Ok(format!("{}{}", assign, call))
}

fn handle_preinvoke(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    _name: &str,
) -> CompileResult<String> {
    let Some(_inst) = inst else {
        return Ok(String::new());
    };
    if cx.invoke_state != 0 {
        return Err(CompileError::InvokeState {
            reason: format!("preInvoke in state {}", cx.invoke_state),
        });
    }
    cx.invoke_state = 1;
    Ok("__THREW__ = 0".to_string())
}

fn handle_postinvoke(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    _name: &str,
) -> CompileResult<String> {
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    if cx.invoke_state != 2 {
        return Err(CompileError::InvokeState {
            reason: format!("postInvoke in state {}", cx.invoke_state),
        });
    }
    cx.invoke_state = 0;
    let assign = cx.get_assign_if_needed(inst)?;
    Ok(format!("{}__THREW__; __THREW__ = 0", assign))
}

fn handle_eh_bridge(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    name: &str,
) -> CompileResult<String> {
    cx.meta
        .declares
        .insert(name.trim_start_matches('_').to_string());
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    cx.generic_call_to(inst, name, false)
}

fn handle_longjmp(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    name: &str,
) -> CompileResult<String> {
    cx.meta.declares.insert("emscripten_longjmp".to_string());
    if name == "_longjmp" {
        cx.meta
            .redirects
            .insert("longjmp".to_string(), "_emscripten_longjmp".to_string());
    }
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    cx.generic_call_to(inst, "_emscripten_longjmp", true)
}

fn handle_setjmp_family(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    name: &str,
) -> CompileResult<String> {
    cx.meta
        .declares
        .insert(name.trim_start_matches('_').to_string());
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    cx.generic_call_to(inst, name, false)
}

fn handle_simd_builtin(
    cx: &mut Codegen<'_, '_>,
    inst: Option<ValueId>,
    name: &str,
) -> CompileResult<String> {
    cx.meta.uses_simd = true;
    let Some(inst) = inst else {
        return Ok(String::new());
    };
    let op = name
        .strip_prefix("_emscripten_")
        .expect("simd builtin prefix");
    let args = cx.call_args(inst);
    let mut arg_texts = Vec::with_capacity(args.len());
    for &arg in &args {
        arg_texts.push(cx.get_value_as_str(arg, Cast::SIGNED)?);
    }
    let assign = cx.get_assign_if_needed(inst)?;
    Ok(format!("{}SIMD_{}({})", assign, op, arg_texts.join(",")))
}
