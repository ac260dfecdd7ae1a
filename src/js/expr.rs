//! Scalar expression translation.
//!
//! One exhaustive dispatch per instruction, producing a textual statement
//! or expression in the target dialect. Vector instructions take the SIMD
//! path in [`super::simd`] first; calls go through the handler registry in
//! [`super::calls`].

use super::cast::{ensure_float, ftostr, Cast};
use super::frame::{stack_align, stack_align_str, stack_bump_text, AllocaColoring, STACK_ALIGN};
use super::Codegen;
use crate::core::{CompileError, CompileResult};
use crate::ir::{
    BinOp, CastOp, Constant, ConstExpr, FloatPredicate, Instruction, IntPredicate, RmwOp,
    Terminator, Type, ValueId,
};

fn lsb_mask(num_bits: u32) -> u64 {
    if num_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    }
}

impl<'m, 'a> Codegen<'m, 'a> {
    /// Spell a constant under the requested coercion.
    pub(crate) fn get_constant(&mut self, value: ValueId, cast: Cast) -> CompileResult<String> {
        let ty = self.module.ty(value).clone();

        if self.module.as_function(value).is_some() {
            return Ok(self.function_index(value)?.to_string());
        }
        if let Some(global) = self.module.as_global(value) {
            let name = self
                .module
                .value(value)
                .name
                .clone()
                .expect("global has a name");
            if global.initializer.is_none() {
                let mangled = self.js_name(value)?.to_string();
                self.meta.externals.insert(mangled.clone());
                return Ok(mangled);
            }
            return Ok(self.image.absolute(&name)?.to_string());
        }

        let constant = match self.module.as_constant(value) {
            Some(c) => c.clone(),
            None => {
                return Err(CompileError::InvalidValue {
                    reason: "expected a constant value".to_string(),
                })
            }
        };
        match constant {
            Constant::Null => Ok("0".to_string()),
            Constant::Alias { aliasee } => self.get_constant(aliasee, cast),
            Constant::Float(v) => self.float_constant_text(f64::from(v), &ty, cast),
            Constant::Double(v) => self.float_constant_text(v, &ty, cast),
            Constant::Int(v) => {
                let width = ty.int_width().unwrap_or(32);
                let mut cast = cast;
                if cast != Cast::UNSIGNED && width == 1 {
                    // bools must always be unsigned: either 0 or 1
                    cast = Cast::UNSIGNED;
                }
                if cast == Cast::UNSIGNED {
                    Ok(((v as u64) & lsb_mask(width)).to_string())
                } else {
                    Ok(v.to_string())
                }
            }
            Constant::Undef => {
                if let Type::Vector(elem, _) = &ty {
                    self.check_vector_type(&ty)?;
                    Ok(if elem.is_integer() {
                        "SIMD_int32x4_splat(0)".to_string()
                    } else {
                        "SIMD_float32x4_splat(Math_fround(0))".to_string()
                    })
                } else {
                    let mut s = if ty.is_floating_point() { "+0" } else { "0" }.to_string();
                    if self.options.precise_f32 && ty.is_float() && !cast.has(Cast::FFI_OUT) {
                        s = format!("Math_fround({})", s);
                    }
                    Ok(s)
                }
            }
            Constant::AggregateZero => {
                if let Type::Vector(elem, _) = &ty {
                    self.check_vector_type(&ty)?;
                    Ok(if elem.is_integer() {
                        "SIMD_int32x4_splat(0)".to_string()
                    } else {
                        "SIMD_float32x4_splat(Math_fround(0))".to_string()
                    })
                } else {
                    // something like [0 x i8*] zeroinitializer, which can
                    // appear for landingpads
                    Ok("0".to_string())
                }
            }
            Constant::Vector(elems) => {
                self.check_vector_type(&ty)?;
                let elem_ty = ty.vector_elem().unwrap().clone();
                let mut lanes = Vec::with_capacity(4);
                for i in 0..4 {
                    if i < elems.len() {
                        lanes.push(self.get_constant(elems[i], Cast::SIGNED)?);
                    } else {
                        lanes.push(self.undef_element_text(&elem_ty));
                    }
                }
                Ok(self.get_constant_vector(&elem_ty, &lanes[0], &lanes[1], &lanes[2], &lanes[3]))
            }
            Constant::Array(elems) => {
                // handle things like [i8* bitcast (... @sym to i8*)] which
                // clang can emit for landingpads
                if elems.len() != 1 {
                    return Err(CompileError::UnloweredConstant { kind: "array" });
                }
                let inner = self.module.strip_pointer_casts(elems[0]);
                self.get_constant(inner, Cast::SIGNED)
            }
            Constant::BlockAddress { function, block } => {
                Ok(self.block_address(function, block).to_string())
            }
            Constant::Expr(expr) => {
                let inner = self.generate_const_expr(&expr)?;
                Ok(format!("({})", inner))
            }
            Constant::Str(_) => Err(CompileError::UnloweredConstant { kind: "string" }),
            Constant::Struct(_) => Err(CompileError::UnloweredConstant { kind: "struct" }),
        }
    }

    fn float_constant_text(&mut self, v: f64, ty: &Type, cast: Cast) -> CompileResult<String> {
        let mut s = ftostr(v, ty, cast, &self.options)?;
        if self.options.precise_f32 && ty.is_float() && !cast.has(Cast::FFI_OUT) {
            s = format!("Math_fround({})", s);
        }
        Ok(s)
    }

    fn undef_element_text(&self, elem_ty: &Type) -> String {
        if elem_ty.is_integer() {
            "0".to_string()
        } else if self.options.precise_f32 {
            "Math_fround(+0)".to_string()
        } else {
            "+0".to_string()
        }
    }

    pub(crate) fn get_constant_vector(
        &self,
        elem_ty: &Type,
        x: &str,
        y: &str,
        z: &str,
        w: &str,
    ) -> String {
        // Check for a splat.
        if x == y && x == z && x == w {
            if elem_ty.is_integer() {
                return format!("SIMD_int32x4_splat({})", x);
            }
            return format!("SIMD_float32x4_splat(Math_fround({}))", x);
        }
        if elem_ty.is_integer() {
            format!("SIMD_int32x4({},{},{},{})", x, y, z, w)
        } else {
            format!(
                "SIMD_float32x4(Math_fround({}),Math_fround({}),Math_fround({}),Math_fround({}))",
                x, y, z, w
            )
        }
    }

    fn generate_const_expr(&mut self, expr: &ConstExpr) -> CompileResult<String> {
        match expr {
            ConstExpr::PtrToInt(v) => self.get_value_as_str(*v, Cast::SIGNED),
            ConstExpr::Bitcast(v) => self.get_value_as_str(*v, Cast::SIGNED),
            ConstExpr::Add(a, b) => {
                let lhs = self.get_value_as_paren_str(*a)?;
                let rhs = self.get_value_as_paren_str(*b)?;
                self.paren_cast_text(&format!("{} + {}", lhs, rhs), &Type::Int(32), Cast::SIGNED)
            }
            ConstExpr::GepOffset { base, offset } => {
                let base_text = self.get_value_as_paren_str(*base)?;
                Ok(format!("({} + {}|0)", base_text, offset))
            }
        }
    }

    pub(crate) fn get_value_as_str(&mut self, value: ValueId, cast: Cast) -> CompileResult<String> {
        let value = self.module.strip_pointer_casts(value);
        if self.module.is_global_namespace(value) {
            self.get_constant(value, cast)
        } else {
            Ok(self.js_name(value)?.to_string())
        }
    }

    pub(crate) fn get_value_as_cast_str(
        &mut self,
        value: ValueId,
        cast: Cast,
    ) -> CompileResult<String> {
        let value = self.module.strip_pointer_casts(value);
        if matches!(
            self.module.as_constant(value),
            Some(Constant::Int(_) | Constant::Float(_) | Constant::Double(_))
        ) {
            return self.get_constant(value, cast);
        }
        let inner = self.get_value_as_str(value, Cast::SIGNED)?;
        let ty = self.module.ty(value).clone();
        self.cast_text(&inner, &ty, cast)
    }

    pub(crate) fn get_value_as_paren_str(&mut self, value: ValueId) -> CompileResult<String> {
        let value = self.module.strip_pointer_casts(value);
        if self.module.is_global_namespace(value) {
            self.get_constant(value, Cast::SIGNED)
        } else {
            let inner = self.get_value_as_str(value, Cast::SIGNED)?;
            Ok(format!("({})", inner))
        }
    }

    pub(crate) fn get_value_as_cast_paren_str(
        &mut self,
        value: ValueId,
        cast: Cast,
    ) -> CompileResult<String> {
        let value = self.module.strip_pointer_casts(value);
        if matches!(
            self.module.as_constant(value),
            Some(
                Constant::Int(_) | Constant::Float(_) | Constant::Double(_) | Constant::Undef
            )
        ) {
            return self.get_constant(value, cast);
        }
        let inner = self.get_value_as_str(value, Cast::SIGNED)?;
        let ty = self.module.ty(value).clone();
        let cast_inner = self.cast_text(&inner, &ty, cast)?;
        Ok(format!("({})", cast_inner))
    }

    fn get_double_to_int(&self, s: &str) -> String {
        format!("~~({})", s)
    }

    /// Strength-reduced 32-bit multiply: shift for powers of two, a plain
    /// `*` when the constant is small enough to stay exact, `Math_imul`
    /// otherwise.
    pub(crate) fn get_imul(&mut self, a: ValueId, b: ValueId) -> CompileResult<String> {
        let (constant, other) = if let Some(c) = self.module.const_int_value(a) {
            (Some(c), b)
        } else if let Some(c) = self.module.const_int_value(b) {
            (Some(c), a)
        } else {
            (None, a)
        };
        // multiplying two constants is left alone; the optimizer removes those
        if let Some(c) = constant {
            let other_text = self.get_value_as_str(other, Cast::SIGNED)?;
            if let Some(text) = imul_by_const_text(&other_text, c as u32) {
                return Ok(text);
            }
        }
        let lhs = self.get_value_as_str(a, Cast::SIGNED)?;
        let rhs = self.get_value_as_str(b, Cast::SIGNED)?;
        Ok(format!("Math_imul({}, {})|0", lhs, rhs))
    }

    pub(crate) fn get_heap_access(&self, name: &str, bytes: u64, integer: bool) -> String {
        match bytes {
            8 => format!("HEAPF64[{}>>3]", name),
            4 => {
                if integer {
                    format!("HEAP32[{}>>2]", name)
                } else {
                    format!("HEAPF32[{}>>2]", name)
                }
            }
            2 => format!("HEAP16[{}>>1]", name),
            1 => format!("HEAP8[{}>>0]", name),
            _ => unreachable!("unsupported heap access width {}", bytes),
        }
    }

    /// Heap l-value for a pointer. Pointers into the global image fold to a
    /// constant element index.
    pub(crate) fn get_ptr_use(&mut self, ptr: ValueId) -> CompileResult<String> {
        let elem_ty = self
            .module
            .ty(ptr)
            .pointee()
            .cloned()
            .ok_or_else(|| CompileError::InvalidValue {
                reason: "pointer operand expected".to_string(),
            })?;
        let bytes = self.layout.alloc_size(&elem_ty);
        if self.module.as_global(ptr).is_some()
            && self.module.as_global(ptr).unwrap().initializer.is_some()
        {
            let name = self
                .module
                .value(ptr)
                .name
                .clone()
                .expect("global has a name");
            let addr = self.image.absolute(&name)?;
            return Ok(match bytes {
                8 => format!("HEAPF64[{}]", addr >> 3),
                4 => {
                    if elem_ty.is_integer() || elem_ty.is_pointer() {
                        format!("HEAP32[{}]", addr >> 2)
                    } else {
                        format!("HEAPF32[{}]", addr >> 2)
                    }
                }
                2 => format!("HEAP16[{}]", addr >> 1),
                1 => format!("HEAP8[{}]", addr),
                _ => {
                    return Err(CompileError::InvalidValue {
                        reason: format!("unsupported global access width {}", bytes),
                    })
                }
            });
        }
        let name = self.get_value_as_str(ptr, Cast::SIGNED)?;
        Ok(self.get_heap_access(&name, bytes, elem_ty.is_integer() || elem_ty.is_pointer()))
    }

    fn get_ptr_load(&mut self, ptr: ValueId) -> CompileResult<String> {
        let access = self.get_ptr_use(ptr)?;
        let elem_ty = self.module.ty(ptr).pointee().cloned().unwrap();
        self.cast_text(&access, &elem_ty, Cast::NONSPECIFIC)
    }

    /// Known-absolute pointers: either intentional segfaults or code bugs.
    fn is_absolute(&self, ptr: ValueId) -> bool {
        match &self.module.value(ptr).kind {
            crate::ir::ValueKind::Instruction(Instruction::Cast {
                op: CastOp::IntToPtr,
                value,
            }) => self.module.const_int_value(*value).is_some(),
            crate::ir::ValueKind::Constant(Constant::Null | Constant::Undef) => true,
            _ => false,
        }
    }

    pub(crate) fn get_load(
        &mut self,
        inst: ValueId,
        ptr: ValueId,
        ty: &Type,
        alignment: u32,
        sep: char,
    ) -> CompileResult<String> {
        let assign = self.get_assign(inst)?;
        let bytes = self.layout.alloc_size(ty);
        if bytes <= u64::from(alignment) || alignment == 0 {
            let mut text = format!("{}{}", assign, self.get_ptr_load(ptr)?);
            if self.is_absolute(ptr) {
                text.push_str("; abort() /* segfault, load from absolute addr */");
            }
            return Ok(text);
        }

        // unaligned in some manner
        self.warn_unaligned("load", inst);
        let ps = self.get_value_as_str(ptr, Cast::SIGNED)?;
        let text = match bytes {
            8 => {
                let moves = match alignment {
                    4 => format!(
                        "HEAP32[tempDoublePtr>>2]=HEAP32[{ps}>>2]{sep}\
                         HEAP32[tempDoublePtr+4>>2]=HEAP32[{ps}+4>>2]"
                    ),
                    2 => format!(
                        "HEAP16[tempDoublePtr>>1]=HEAP16[{ps}>>1]{sep}\
                         HEAP16[tempDoublePtr+2>>1]=HEAP16[{ps}+2>>1]{sep}\
                         HEAP16[tempDoublePtr+4>>1]=HEAP16[{ps}+4>>1]{sep}\
                         HEAP16[tempDoublePtr+6>>1]=HEAP16[{ps}+6>>1]"
                    ),
                    1 => format!(
                        "HEAP8[tempDoublePtr>>0]=HEAP8[{ps}>>0]{sep}\
                         HEAP8[tempDoublePtr+1>>0]=HEAP8[{ps}+1>>0]{sep}\
                         HEAP8[tempDoublePtr+2>>0]=HEAP8[{ps}+2>>0]{sep}\
                         HEAP8[tempDoublePtr+3>>0]=HEAP8[{ps}+3>>0]{sep}\
                         HEAP8[tempDoublePtr+4>>0]=HEAP8[{ps}+4>>0]{sep}\
                         HEAP8[tempDoublePtr+5>>0]=HEAP8[{ps}+5>>0]{sep}\
                         HEAP8[tempDoublePtr+6>>0]=HEAP8[{ps}+6>>0]{sep}\
                         HEAP8[tempDoublePtr+7>>0]=HEAP8[{ps}+7>>0]"
                    ),
                    _ => {
                        return Err(CompileError::InvalidValue {
                            reason: format!("bad alignment {} for 8-byte load", alignment),
                        })
                    }
                };
                format!("{moves}{sep}{assign}+HEAPF64[tempDoublePtr>>3]")
            }
            4 => {
                if ty.is_integer() || ty.is_pointer() {
                    match alignment {
                        2 => format!(
                            "{assign}HEAPU16[{ps}>>1]|(HEAPU16[{ps}+2>>1]<<16)"
                        ),
                        1 => format!(
                            "{assign}HEAPU8[{ps}>>0]|(HEAPU8[{ps}+1>>0]<<8)|\
                             (HEAPU8[{ps}+2>>0]<<16)|(HEAPU8[{ps}+3>>0]<<24)"
                        ),
                        _ => {
                            return Err(CompileError::InvalidValue {
                                reason: format!("bad alignment {} for 4-byte load", alignment),
                            })
                        }
                    }
                } else {
                    let moves = match alignment {
                        2 => format!(
                            "HEAP16[tempDoublePtr>>1]=HEAP16[{ps}>>1]{sep}\
                             HEAP16[tempDoublePtr+2>>1]=HEAP16[{ps}+2>>1]"
                        ),
                        1 => format!(
                            "HEAP8[tempDoublePtr>>0]=HEAP8[{ps}>>0]{sep}\
                             HEAP8[tempDoublePtr+1>>0]=HEAP8[{ps}+1>>0]{sep}\
                             HEAP8[tempDoublePtr+2>>0]=HEAP8[{ps}+2>>0]{sep}\
                             HEAP8[tempDoublePtr+3>>0]=HEAP8[{ps}+3>>0]"
                        ),
                        _ => {
                            return Err(CompileError::InvalidValue {
                                reason: format!("bad alignment {} for 4-byte load", alignment),
                            })
                        }
                    };
                    let reread = self.cast_text("HEAPF32[tempDoublePtr>>2]", &Type::Float, Cast::SIGNED)?;
                    format!("{moves}{sep}{assign}{reread}")
                }
            }
            2 => format!("{assign}HEAPU8[{ps}>>0]|(HEAPU8[{ps}+1>>0]<<8)"),
            _ => {
                return Err(CompileError::InvalidValue {
                    reason: format!("bad size {} for misaligned load", bytes),
                })
            }
        };
        Ok(text)
    }

    pub(crate) fn get_store(
        &mut self,
        inst: ValueId,
        ptr: ValueId,
        ty: &Type,
        value_text: &str,
        alignment: u32,
    ) -> CompileResult<String> {
        let vs = value_text;
        let bytes = self.layout.alloc_size(ty);
        if bytes <= u64::from(alignment) || alignment == 0 {
            let mut text = format!("{} = {}", self.get_ptr_use(ptr)?, vs);
            if alignment == 536870912 {
                text.push_str("; abort() /* segfault */");
            }
            return Ok(text);
        }

        // unaligned in some manner
        self.warn_unaligned("store", inst);
        let ps = self.get_value_as_str(ptr, Cast::SIGNED)?;
        let text = match bytes {
            8 => {
                let spill = format!("HEAPF64[tempDoublePtr>>3]={vs};");
                let moves = match alignment {
                    4 => format!(
                        "HEAP32[{ps}>>2]=HEAP32[tempDoublePtr>>2];\
                         HEAP32[{ps}+4>>2]=HEAP32[tempDoublePtr+4>>2]"
                    ),
                    2 => format!(
                        "HEAP16[{ps}>>1]=HEAP16[tempDoublePtr>>1];\
                         HEAP16[{ps}+2>>1]=HEAP16[tempDoublePtr+2>>1];\
                         HEAP16[{ps}+4>>1]=HEAP16[tempDoublePtr+4>>1];\
                         HEAP16[{ps}+6>>1]=HEAP16[tempDoublePtr+6>>1]"
                    ),
                    1 => format!(
                        "HEAP8[{ps}>>0]=HEAP8[tempDoublePtr>>0];\
                         HEAP8[{ps}+1>>0]=HEAP8[tempDoublePtr+1>>0];\
                         HEAP8[{ps}+2>>0]=HEAP8[tempDoublePtr+2>>0];\
                         HEAP8[{ps}+3>>0]=HEAP8[tempDoublePtr+3>>0];\
                         HEAP8[{ps}+4>>0]=HEAP8[tempDoublePtr+4>>0];\
                         HEAP8[{ps}+5>>0]=HEAP8[tempDoublePtr+5>>0];\
                         HEAP8[{ps}+6>>0]=HEAP8[tempDoublePtr+6>>0];\
                         HEAP8[{ps}+7>>0]=HEAP8[tempDoublePtr+7>>0]"
                    ),
                    _ => {
                        return Err(CompileError::InvalidValue {
                            reason: format!("bad alignment {} for 8-byte store", alignment),
                        })
                    }
                };
                format!("{spill}{moves}")
            }
            4 => {
                if ty.is_integer() || ty.is_pointer() {
                    match alignment {
                        2 => format!(
                            "HEAP16[{ps}>>1]={vs}&65535;HEAP16[{ps}+2>>1]={vs}>>>16"
                        ),
                        1 => format!(
                            "HEAP8[{ps}>>0]={vs}&255;HEAP8[{ps}+1>>0]=({vs}>>8)&255;\
                             HEAP8[{ps}+2>>0]=({vs}>>16)&255;HEAP8[{ps}+3>>0]={vs}>>24"
                        ),
                        _ => {
                            return Err(CompileError::InvalidValue {
                                reason: format!("bad alignment {} for 4-byte store", alignment),
                            })
                        }
                    }
                } else {
                    let spill = format!("HEAPF32[tempDoublePtr>>2]={vs};");
                    let moves = match alignment {
                        2 => format!(
                            "HEAP16[{ps}>>1]=HEAP16[tempDoublePtr>>1];\
                             HEAP16[{ps}+2>>1]=HEAP16[tempDoublePtr+2>>1]"
                        ),
                        1 => format!(
                            "HEAP8[{ps}>>0]=HEAP8[tempDoublePtr>>0];\
                             HEAP8[{ps}+1>>0]=HEAP8[tempDoublePtr+1>>0];\
                             HEAP8[{ps}+2>>0]=HEAP8[tempDoublePtr+2>>0];\
                             HEAP8[{ps}+3>>0]=HEAP8[tempDoublePtr+3>>0]"
                        ),
                        _ => {
                            return Err(CompileError::InvalidValue {
                                reason: format!("bad alignment {} for 4-byte store", alignment),
                            })
                        }
                    };
                    format!("{spill}{moves}")
                }
            }
            2 => format!("HEAP8[{ps}>>0]={vs}&255;HEAP8[{ps}+1>>0]={vs}>>8"),
            _ => {
                return Err(CompileError::InvalidValue {
                    reason: format!("bad size {} for misaligned store", bytes),
                })
            }
        };
        Ok(text)
    }

    fn warn_unaligned(&mut self, what: &str, inst: ValueId) {
        if !self.options.warn_on_unaligned {
            return;
        }
        let func = self
            .current_function
            .and_then(|f| self.module.value(f).name.clone())
            .unwrap_or_default();
        let inst_name = self.module.value(inst).name.clone().unwrap_or_default();
        log::warn!("unaligned {} in {}: {}", what, func, inst_name);
    }

    pub(crate) fn get_stack_bump(&self, size: &str) -> String {
        stack_bump_text(size, &self.options)
    }

    /// Translate one instruction into its statement/expression text.
    /// `None` means no in-body text (φ nodes, elided calls, nativized
    /// alloca declarations).
    pub(crate) fn generate_inst(&mut self, inst: ValueId) -> CompileResult<Option<String>> {
        let ty = self.module.ty(inst).clone();
        if let Some(width) = ty.int_width() {
            if width > 32 {
                return Err(CompileError::UnlegalizedInteger { width });
            }
        }
        self.session
            .record_instruction_emitted(self.module.as_instruction(inst).map_or("?", |i| i.opcode_name()));

        if let Some(text) = self.generate_simd_expression(inst)? {
            return Ok(if text.is_empty() { None } else { Some(text) });
        }

        let instruction = self
            .module
            .as_instruction(inst)
            .cloned()
            .ok_or_else(|| CompileError::InvalidValue {
                reason: "expected an instruction".to_string(),
            })?;

        let text = match instruction {
            Instruction::Phi { .. } => {
                // handled separately - pushed back into the structurer branchings
                return Ok(None);
            }
            Instruction::Binary { op, lhs, rhs } => {
                let assign = self.get_assign_if_needed(inst)?;
                let body = self.binary_text(op, lhs, rhs, &ty)?;
                format!("{}{}", assign, body)
            }
            Instruction::FCmp { pred, lhs, rhs } => {
                let assign = self.get_assign_if_needed(inst)?;
                let body = self.scalar_fcmp_text(pred, lhs, rhs)?;
                format!("{}{}", assign, body)
            }
            Instruction::ICmp { pred, lhs, rhs } => {
                let sign = if pred.is_unsigned() {
                    Cast::UNSIGNED
                } else {
                    Cast::SIGNED
                };
                let op = match pred {
                    IntPredicate::Eq => "==",
                    IntPredicate::Ne => "!=",
                    IntPredicate::Ule | IntPredicate::Sle => "<=",
                    IntPredicate::Uge | IntPredicate::Sge => ">=",
                    IntPredicate::Ult | IntPredicate::Slt => "<",
                    IntPredicate::Ugt | IntPredicate::Sgt => ">",
                };
                let assign = self.get_assign_if_needed(inst)?;
                let lhs_text = self.get_value_as_cast_str(lhs, sign)?;
                let rhs_text = self.get_value_as_cast_str(rhs, sign)?;
                format!("{}({}){}({})", assign, lhs_text, op, rhs_text)
            }
            Instruction::Alloca {
                allocated,
                count,
                align,
            } => return self.alloca_text(inst, &allocated, count, align),
            Instruction::Load { ptr, align } => {
                if self.nativized.contains(&ptr) {
                    let assign = self.get_assign(inst)?;
                    let value = self.get_value_as_str(ptr, Cast::SIGNED)?;
                    format!("{}{}", assign, value)
                } else {
                    self.get_load(inst, ptr, &ty, align, ';')?
                }
            }
            Instruction::Store { ptr, value, align } => {
                let value_ty = self.module.ty(value).clone();
                if let Some(width) = value_ty.int_width() {
                    if width > 32 {
                        return Err(CompileError::UnlegalizedInteger { width });
                    }
                }
                let vs = self.get_value_as_str(value, Cast::SIGNED)?;
                if self.nativized.contains(&ptr) {
                    let target = self.get_value_as_str(ptr, Cast::SIGNED)?;
                    format!("{} = {}", target, vs)
                } else {
                    self.get_store(inst, ptr, &value_ty, &vs, align)?
                }
            }
            Instruction::Gep { base, indices } => {
                let assign = self.get_assign_if_needed(inst)?;
                let body = self.gep_text(base, &indices)?;
                format!("{}{}", assign, body)
            }
            Instruction::Cast { op, value } => {
                let assign = self.get_assign_if_needed(inst)?;
                let body = self.cast_inst_text(op, value, &ty)?;
                format!("{}{}", assign, body)
            }
            Instruction::Select {
                cond,
                then_value,
                else_value,
            } => {
                let assign = self.get_assign_if_needed(inst)?;
                let c = self.get_value_as_str(cond, Cast::SIGNED)?;
                let a = self.get_value_as_str(then_value, Cast::SIGNED)?;
                let b = self.get_value_as_str(else_value, Cast::SIGNED)?;
                format!("{}{} ? {} : {}", assign, c, a, b)
            }
            Instruction::Call { .. } => {
                let call = self.handle_call(inst)?;
                if call.is_empty() {
                    return Ok(None);
                }
                call
            }
            Instruction::AtomicRmw { op, ptr, value } => {
                let vs = self.get_value_as_str(value, Cast::SIGNED)?;
                let load = self.get_load(inst, ptr, &ty, 0, ';')?;
                let name = self.js_name(inst)?.to_string();
                let stored = match op {
                    RmwOp::Xchg => vs,
                    RmwOp::Add => format!("(({}+{})|0)", name, vs),
                    RmwOp::Sub => format!("(({}-{})|0)", name, vs),
                    RmwOp::And => format!("({}&{})", name, vs),
                    RmwOp::Nand => format!("(~({}&{}))", name, vs),
                    RmwOp::Or => format!("({}|{})", name, vs),
                    RmwOp::Xor => format!("({}^{})", name, vs),
                    RmwOp::Max | RmwOp::Min | RmwOp::UMax | RmwOp::UMin => {
                        return Err(CompileError::InvalidAtomicOp { op: op.name() })
                    }
                };
                let store = self.get_store(inst, ptr, &ty, &stored, 0)?;
                format!("{};{}", load, store)
            }
            Instruction::Fence => "/* fence */".to_string(), // no threads
            Instruction::ExtractElement { .. }
            | Instruction::InsertElement { .. }
            | Instruction::ShuffleVector { .. } => {
                return Err(CompileError::UnsupportedInstruction {
                    opcode: "scalar use of a vector-only instruction",
                })
            }
        };
        Ok(Some(text))
    }

    fn binary_text(
        &mut self,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        ty: &Type,
    ) -> CompileResult<String> {
        match op {
            BinOp::Add | BinOp::Sub => {
                let a = self.get_value_as_paren_str(lhs)?;
                let b = self.get_value_as_paren_str(rhs)?;
                let sym = if op == BinOp::Add { "+" } else { "-" };
                self.paren_cast_text(&format!("{} {} {}", a, sym, b), ty, Cast::SIGNED)
            }
            BinOp::Mul => self.get_imul(lhs, rhs),
            BinOp::UDiv | BinOp::SDiv | BinOp::URem | BinOp::SRem => {
                let sign = if matches!(op, BinOp::SDiv | BinOp::SRem) {
                    Cast::SIGNED
                } else {
                    Cast::UNSIGNED
                };
                let sym = if matches!(op, BinOp::UDiv | BinOp::SDiv) {
                    " / "
                } else {
                    " % "
                };
                let a = self.get_value_as_cast_paren_str(lhs, sign)?;
                let b = self.get_value_as_cast_paren_str(rhs, sign)?;
                Ok(format!("({}{}{})&-1", a, sym, b))
            }
            BinOp::And | BinOp::Or | BinOp::Xor => {
                let sym = match op {
                    BinOp::And => "&",
                    BinOp::Or => "|",
                    _ => "^",
                };
                let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
                let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
                Ok(format!("{} {} {}", a, sym, b))
            }
            BinOp::Shl => {
                let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
                let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
                let shifted = format!("{} << {}", a, b);
                if ty.int_width().unwrap_or(32) < 32 {
                    // remove bits that are shifted beyond the size of this value
                    self.paren_cast_text(&shifted, ty, Cast::UNSIGNED)
                } else {
                    Ok(shifted)
                }
            }
            BinOp::AShr | BinOp::LShr => {
                let mut input = self.get_value_as_str(lhs, Cast::SIGNED)?;
                if ty.int_width().unwrap_or(32) < 32 {
                    // fill in high bits, as the shift is done in 32-bit
                    let sign = if op == BinOp::AShr {
                        Cast::SIGNED
                    } else {
                        Cast::UNSIGNED
                    };
                    input = format!("({})", self.cast_text(&input, ty, sign)?);
                }
                let sym = if op == BinOp::AShr { " >> " } else { " >>> " };
                let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
                Ok(format!("{}{}{}", input, sym, b))
            }
            BinOp::FAdd | BinOp::FMul | BinOp::FDiv | BinOp::FRem => {
                let sym = match op {
                    BinOp::FAdd => " + ",
                    BinOp::FMul => " * ",
                    BinOp::FDiv => " / ",
                    _ => " % ",
                };
                let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
                let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
                Ok(ensure_float(format!("{}{}{}", a, sym, b), ty, &self.options))
            }
            BinOp::FSub => {
                // fneg(x) arrives as -0.0 - x
                if self.is_negative_zero(lhs) {
                    let v = self.get_value_as_str(rhs, Cast::SIGNED)?;
                    Ok(ensure_float(format!("-{}", v), ty, &self.options))
                } else {
                    let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
                    let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
                    Ok(ensure_float(format!("{} - {}", a, b), ty, &self.options))
                }
            }
        }
    }

    pub(crate) fn is_negative_zero(&self, value: ValueId) -> bool {
        match self.module.as_constant(value) {
            Some(Constant::Float(v)) => *v == 0.0 && v.is_sign_negative(),
            Some(Constant::Double(v)) => *v == 0.0 && v.is_sign_negative(),
            _ => false,
        }
    }

    fn scalar_fcmp_text(
        &mut self,
        pred: FloatPredicate,
        lhs: ValueId,
        rhs: ValueId,
    ) -> CompileResult<String> {
        let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
        let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
        Ok(match pred {
            // Comparisons which are simple operators.
            FloatPredicate::Oeq => format!("{} == {}", a, b),
            FloatPredicate::Une => format!("{} != {}", a, b),
            FloatPredicate::Ogt => format!("{} > {}", a, b),
            FloatPredicate::Oge => format!("{} >= {}", a, b),
            FloatPredicate::Olt => format!("{} < {}", a, b),
            FloatPredicate::Ole => format!("{} <= {}", a, b),
            // Comparisons which are inverses of simple operators.
            FloatPredicate::Ugt => format!("!({} <= {})", a, b),
            FloatPredicate::Uge => format!("!({} < {})", a, b),
            FloatPredicate::Ult => format!("!({} >= {})", a, b),
            FloatPredicate::Ule => format!("!({} > {})", a, b),
            // Comparisons which require explicit NaN checks.
            FloatPredicate::Ueq => {
                format!("({a} != {a}) | ({b} != {b}) |({a} == {b})", a = a, b = b)
            }
            FloatPredicate::One => {
                format!("({a} == {a}) & ({b} == {b}) &({a} != {b})", a = a, b = b)
            }
            // Simple NaN checks.
            FloatPredicate::Ord => format!("({a} == {a}) & ({b} == {b})", a = a, b = b),
            FloatPredicate::Uno => format!("({a} != {a}) | ({b} != {b})", a = a, b = b),
            // Simple constants.
            FloatPredicate::False => "0".to_string(),
            FloatPredicate::True => "1".to_string(),
        })
    }

    fn alloca_text(
        &mut self,
        inst: ValueId,
        allocated: &Type,
        count: ValueId,
        align: u32,
    ) -> CompileResult<Option<String>> {
        // The stack was bumped, so returns must restore it. Nativized vars
        // are still counted in the frame offset, so the restore stays
        // needed even for them.
        self.stack_bumped = true;

        if self.nativized.contains(&inst) {
            // nativized stack variable, we just need a var declaration
            let name = self.js_name(inst)?.to_string();
            self.used_vars.insert(name, allocated.clone());
            return Ok(None);
        }

        // Fixed-size entry-block allocations were laid out all at once for
        // the function prologue.
        let is_static = self.module.const_int_value(count).is_some()
            && self
                .current_function
                .and_then(|f| self.module.as_function(f))
                .and_then(|f| f.blocks.first())
                .map(|&entry| self.module.block(entry).insts.contains(&inst))
                .unwrap_or(false);
        if is_static {
            let Some(offset) = self.frame.frame_offset(inst) else {
                // represented by another alloca, nothing to print
                return Ok(None);
            };
            let rep = self.frame.representative(inst);
            if rep != inst {
                return Ok(None);
            }
            let assign = self.get_assign(inst)?;
            let base = if self.frame.max_alignment() <= STACK_ALIGN {
                "sp"
            } else {
                // aligned base of stack is different, use that
                "sp_a"
            };
            let text = if offset != 0 {
                format!("{}{} + {}|0", assign, base, offset)
            } else {
                format!("{}{}", assign, base)
            };
            return Ok(Some(text));
        }

        if align > STACK_ALIGN {
            return Err(CompileError::OverAlignedDynamicAlloca { align });
        }

        let base_size = self.layout.alloc_size(allocated);
        let size = if let Some(c) = self.module.const_int_value(count) {
            stack_align(base_size * c as u64).to_string()
        } else {
            let count_text = self.get_value_as_str(count, Cast::SIGNED)?;
            stack_align_str(&format!("(({}*{})|0)", base_size, count_text))
        };
        let assign = self.get_assign(inst)?;
        Ok(Some(format!(
            "{}STACKTOP; {}",
            assign,
            self.get_stack_bump(&size)
        )))
    }

    fn gep_text(&mut self, base: ValueId, indices: &[ValueId]) -> CompileResult<String> {
        let mut cur = self
            .module
            .ty(base)
            .pointee()
            .cloned()
            .ok_or_else(|| CompileError::InvalidValue {
                reason: "gep base must be a pointer".to_string(),
            })?;
        let mut text = self.get_value_as_paren_str(base)?;
        let mut constant_offset: i64 = 0;

        for (i, &index) in indices.iter().enumerate() {
            if i > 0 && matches!(cur, Type::Struct { .. }) {
                // For a struct, add the member offset.
                let field = self
                    .module
                    .const_int_value(index)
                    .ok_or_else(|| CompileError::InvalidValue {
                        reason: "struct gep index must be constant".to_string(),
                    })? as usize;
                constant_offset =
                    (constant_offset as u32).wrapping_add(
                        self.layout.struct_field_offset(&cur, field) as u32,
                    ) as i32 as i64;
                cur = match &cur {
                    Type::Struct { fields, .. } => fields[field].clone(),
                    _ => unreachable!(),
                };
            } else {
                // For an array, add the element offset, explicitly scaled.
                let elem = if i == 0 {
                    cur.clone()
                } else {
                    match &cur {
                        Type::Array(e, _) | Type::Vector(e, _) => e.as_ref().clone(),
                        other => {
                            return Err(CompileError::InvalidValue {
                                reason: format!("cannot index into {}", other),
                            })
                        }
                    }
                };
                let elem_size = self.layout.alloc_size(&elem) as u32;
                if let Some(c) = self.module.const_int_value(index) {
                    constant_offset = (constant_offset as u32)
                        .wrapping_add((c as i32 as u32).wrapping_mul(elem_size))
                        as i32 as i64;
                } else {
                    let index_text = self.get_value_as_str(index, Cast::SIGNED)?;
                    let product = match imul_by_const_text(&index_text, elem_size) {
                        Some(t) => t,
                        None => format!("Math_imul({}, {})|0", index_text, elem_size),
                    };
                    text = format!("({} + ({})|0)", text, product);
                }
                if i > 0 {
                    cur = elem;
                }
            }
        }
        if constant_offset != 0 {
            text = format!("({} + {}|0)", text, constant_offset as i32);
        }
        Ok(text)
    }

    fn cast_inst_text(&mut self, op: CastOp, value: ValueId, ty: &Type) -> CompileResult<String> {
        match op {
            CastOp::PtrToInt | CastOp::IntToPtr => self.get_value_as_str(value, Cast::SIGNED),
            CastOp::Trunc => {
                let out_bits = ty.int_width().unwrap_or(32);
                let v = self.get_value_as_str(value, Cast::SIGNED)?;
                Ok(format!("{}&{}", v, lsb_mask(out_bits)))
            }
            CastOp::SExt => {
                let in_bits = self.module.ty(value).int_width().unwrap_or(32);
                let bits = 32 - in_bits;
                let v = self.get_value_as_str(value, Cast::SIGNED)?;
                Ok(format!("{} << {} >> {}", v, bits, bits))
            }
            CastOp::ZExt => self.get_value_as_cast_str(value, Cast::UNSIGNED),
            CastOp::FPExt => {
                let v = self.get_value_as_str(value, Cast::SIGNED)?;
                if self.options.precise_f32 {
                    Ok(format!("+{}", v))
                } else {
                    Ok(v)
                }
            }
            CastOp::FPTrunc => {
                let v = self.get_value_as_str(value, Cast::SIGNED)?;
                Ok(ensure_float(v, ty, &self.options))
            }
            CastOp::SIToFP => {
                let inner = self.get_value_as_cast_paren_str(value, Cast::SIGNED)?;
                Ok(format!("({})", self.cast_text(&inner, ty, Cast::SIGNED)?))
            }
            CastOp::UIToFP => {
                let inner = self.get_value_as_cast_paren_str(value, Cast::UNSIGNED)?;
                Ok(format!("({})", self.cast_text(&inner, ty, Cast::SIGNED)?))
            }
            CastOp::FPToSI => {
                let inner = self.get_value_as_paren_str(value)?;
                Ok(format!("({})", self.get_double_to_int(&inner)))
            }
            CastOp::FPToUI => {
                let inner = self.get_value_as_paren_str(value)?;
                let truncated = self.get_double_to_int(&inner);
                Ok(format!(
                    "({})",
                    self.cast_text(&truncated, ty, Cast::UNSIGNED)?
                ))
            }
            CastOp::BitCast => {
                // Most bitcasts are no-ops here; int<->float of the same
                // width round-trips through the scratch double pointer.
                let in_ty = self.module.ty(value).clone();
                let v = self.get_value_as_str(value, Cast::SIGNED)?;
                if in_ty.is_integer() && ty.is_floating_point() {
                    if in_ty.int_width() != Some(32) {
                        return Err(CompileError::UnlegalizedInteger {
                            width: in_ty.int_width().unwrap_or(0),
                        });
                    }
                    let reread = self.cast_text("HEAPF32[tempDoublePtr>>2]", &Type::Float, Cast::SIGNED)?;
                    Ok(format!("(HEAP32[tempDoublePtr>>2]={},{})", v, reread))
                } else if ty.is_integer() && in_ty.is_floating_point() {
                    if ty.int_width() != Some(32) {
                        return Err(CompileError::UnlegalizedInteger {
                            width: ty.int_width().unwrap_or(0),
                        });
                    }
                    Ok(format!(
                        "(HEAPF32[tempDoublePtr>>2]={},HEAP32[tempDoublePtr>>2]|0)",
                        v
                    ))
                } else {
                    Ok(v)
                }
            }
        }
    }

    /// Text for terminators that render in the block body. Branches and
    /// switches are handled by the CFG driver and produce nothing here.
    pub(crate) fn generate_terminator_text(
        &mut self,
        term: &Terminator,
    ) -> CompileResult<Option<String>> {
        match term {
            Terminator::Ret(value) => {
                let mut text = String::new();
                if self.stack_bumped {
                    text.push_str("STACKTOP = sp;");
                }
                text.push_str("return");
                if let Some(v) = value {
                    let coerced =
                        self.get_value_as_cast_paren_str(*v, Cast::NONSPECIFIC | Cast::MUST_CAST)?;
                    text.push(' ');
                    text.push_str(&coerced);
                }
                Ok(Some(text))
            }
            Terminator::Unreachable => {
                // an abort typically sits right before these
                Ok(Some("// unreachable".to_string()))
            }
            _ => Ok(None),
        }
    }
}

/// Multiply `other` by a constant using a shift or small multiply when the
/// constant allows it; `None` means `Math_imul` is required.
pub(crate) fn imul_by_const_text(other: &str, c: u32) -> Option<String> {
    match c {
        0 => Some("0".to_string()),
        1 => Some(other.to_string()),
        _ if c.is_power_of_two() => Some(format!("{}<<{}", other, c.trailing_zeros())),
        _ if c < (1 << 20) => Some(format!("({}*{})|0", other, c)),
        _ => None,
    }
}
