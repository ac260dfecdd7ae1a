//! Short-vector (SIMD) expression translation.
//!
//! Vector-producing and vector-consuming instructions lower to the
//! `SIMD_int32x4_*` / `SIMD_float32x4_*` builtin families. Splats are
//! recognized from the insertelement-into-undef-then-shuffle idiom, and
//! insertelement chains that fully initialize a vector become constructor
//! calls.

use super::cast::Cast;
use super::Codegen;
use crate::core::{CompileError, CompileResult};
use crate::ir::{
    BinOp, CastOp, Constant, FloatPredicate, Instruction, IntPredicate, Type, ValueId,
};
use super::{SIMD_LANE_LOWER, SIMD_LANE_UPPER};

fn simd_prefix(elem: &Type) -> &'static str {
    if elem.is_integer() {
        "SIMD_int32x4"
    } else {
        "SIMD_float32x4"
    }
}

const PARTIAL_ACCESS: [&str; 4] = ["X", "XY", "XYZ", ""];

impl<'m, 'a> Codegen<'m, 'a> {
    /// Translate a vector instruction, if this is one. Returns `Some("")`
    /// for vector φ nodes (handled at the CFG edges) and `None` when the
    /// instruction is not SIMD-shaped.
    pub(crate) fn generate_simd_expression(
        &mut self,
        inst: ValueId,
    ) -> CompileResult<Option<String>> {
        let ty = self.module.ty(inst).clone();
        let instruction = match self.module.as_instruction(inst) {
            Some(i) => i.clone(),
            None => return Ok(None),
        };

        if let Type::Vector(elem, lanes) = &ty {
            self.check_vector_type(&ty)?;
            let elem = elem.as_ref().clone();
            let lanes = *lanes;

            let text = match &instruction {
                // return value is just a SIMD value, no special handling
                Instruction::Call { .. } => return Ok(None),
                // handled separately - pushed back into the structurer branchings
                Instruction::Phi { .. } => return Ok(Some(String::new())),
                Instruction::ICmp { pred, lhs, rhs } => {
                    self.vector_icmp_text(inst, *pred, *lhs, *rhs)?
                }
                Instruction::FCmp { pred, lhs, rhs } => {
                    self.vector_fcmp_text(inst, *pred, *lhs, *rhs)?
                }
                Instruction::Cast {
                    op: CastOp::SExt,
                    value,
                } => {
                    // i1 vectors are stored sign-extended already, so
                    // widening them is a no-op.
                    let in_elem = self.module.ty(*value).vector_elem().cloned();
                    if in_elem.and_then(|t| t.int_width()) != Some(1) {
                        return Err(CompileError::InvalidSimdShape {
                            reason: "vector sext from non-i1 elements".to_string(),
                        });
                    }
                    let assign = self.get_assign_if_needed(inst)?;
                    let v = self.get_value_as_str(*value, Cast::SIGNED)?;
                    format!("{}{}", assign, v)
                }
                Instruction::Select {
                    cond,
                    then_value,
                    else_value,
                } => {
                    if !self.module.ty(*cond).is_vector() {
                        // scalar condition, plain ?: works on SIMD values
                        return Ok(None);
                    }
                    let assign = self.get_assign_if_needed(inst)?;
                    let c = self.get_value_as_str(*cond, Cast::SIGNED)?;
                    let a = self.get_value_as_str(*then_value, Cast::SIGNED)?;
                    let b = self.get_value_as_str(*else_value, Cast::SIGNED)?;
                    format!("{}{}_select({},{},{})", assign, simd_prefix(&elem), c, a, b)
                }
                Instruction::Binary { op, lhs, rhs } => match op {
                    BinOp::FAdd | BinOp::FMul | BinOp::FDiv => {
                        let name = match op {
                            BinOp::FAdd => "add",
                            BinOp::FMul => "mul",
                            _ => "div",
                        };
                        self.simd_binary_text(inst, "SIMD_float32x4", name, *lhs, *rhs)?
                    }
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::And | BinOp::Or => {
                        let name = match op {
                            BinOp::Add => "add",
                            BinOp::Sub => "sub",
                            BinOp::Mul => "mul",
                            BinOp::And => "and",
                            _ => "or",
                        };
                        self.simd_binary_text(inst, "SIMD_int32x4", name, *lhs, *rhs)?
                    }
                    BinOp::Xor => {
                        // not(x) arrives as x ^ -1
                        let assign = self.get_assign_if_needed(inst)?;
                        if self.is_all_ones_vector(*rhs) {
                            let v = self.get_value_as_str(*lhs, Cast::SIGNED)?;
                            format!("{}SIMD_int32x4_not({})", assign, v)
                        } else if self.is_all_ones_vector(*lhs) {
                            let v = self.get_value_as_str(*rhs, Cast::SIGNED)?;
                            format!("{}SIMD_int32x4_not({})", assign, v)
                        } else {
                            let a = self.get_value_as_str(*lhs, Cast::SIGNED)?;
                            let b = self.get_value_as_str(*rhs, Cast::SIGNED)?;
                            format!("{}SIMD_int32x4_xor({},{})", assign, a, b)
                        }
                    }
                    BinOp::FSub => {
                        // fneg(x) arrives as -0.0 - x
                        let assign = self.get_assign_if_needed(inst)?;
                        if self.is_neg_zero_vector(*lhs) {
                            let v = self.get_value_as_str(*rhs, Cast::SIGNED)?;
                            format!("{}SIMD_float32x4_neg({})", assign, v)
                        } else {
                            let a = self.get_value_as_str(*lhs, Cast::SIGNED)?;
                            let b = self.get_value_as_str(*rhs, Cast::SIGNED)?;
                            format!("{}SIMD_float32x4_sub({},{})", assign, a, b)
                        }
                    }
                    BinOp::SDiv | BinOp::UDiv | BinOp::SRem | BinOp::URem => {
                        // No SIMD API for these; unroll to scalar lanes the
                        // way the hardware would.
                        self.unrolled_vector_text(inst, *op, *lhs, *rhs, &elem, lanes)?
                    }
                    BinOp::AShr | BinOp::LShr | BinOp::Shl => {
                        self.vector_shift_text(inst, *op, *lhs, *rhs, &elem, lanes)?
                    }
                    BinOp::FRem => {
                        return Err(CompileError::UnsupportedInstruction {
                            opcode: "vector frem",
                        })
                    }
                },
                Instruction::Cast {
                    op: CastOp::BitCast,
                    value,
                } => {
                    let assign = self.get_assign_if_needed(inst)?;
                    let v = self.get_value_as_str(*value, Cast::SIGNED)?;
                    if elem.is_integer() {
                        format!("{}SIMD_int32x4_fromFloat32x4Bits({})", assign, v)
                    } else {
                        format!("{}SIMD_float32x4_fromInt32x4Bits({})", assign, v)
                    }
                }
                Instruction::Load { ptr, .. } => {
                    if lanes < 1 || lanes > 4 {
                        return Err(CompileError::InvalidSimdShape {
                            reason: "invalid number of lanes in SIMD operation".to_string(),
                        });
                    }
                    let part = PARTIAL_ACCESS[lanes as usize - 1];
                    let assign = self.get_assign_if_needed(inst)?;
                    let ps = self.get_value_as_str(*ptr, Cast::SIGNED)?;
                    format!("{}{}_load{}(HEAPU8, {})", assign, simd_prefix(&elem), part, ps)
                }
                Instruction::InsertElement { .. } => {
                    match self.insert_element_text(inst, &elem, lanes)? {
                        Some(text) => text,
                        None => return Ok(Some(String::new())),
                    }
                }
                Instruction::ShuffleVector { a, b, mask } => {
                    self.shuffle_vector_text(inst, *a, *b, mask, &elem, lanes)?
                }
                _ => {
                    return Err(CompileError::UnsupportedInstruction {
                        opcode: "invalid vector instruction",
                    })
                }
            };
            return Ok(Some(text));
        }

        // vector-consuming instructions
        match &instruction {
            Instruction::Store { ptr, value, .. } if self.module.ty(*value).is_vector() => {
                let vty = self.module.ty(*value).clone();
                self.check_vector_type(&vty)?;
                let lanes = vty.vector_lanes().unwrap();
                if lanes < 1 || lanes > 4 {
                    return Err(CompileError::InvalidSimdShape {
                        reason: "invalid number of lanes in SIMD operation".to_string(),
                    });
                }
                let elem = vty.vector_elem().unwrap().clone();
                let part = PARTIAL_ACCESS[lanes as usize - 1];
                let ps = self.js_name(*ptr)?.to_string();
                let ptr_ty = self.module.ty(*ptr).clone();
                let assign = self.get_ad_hoc_assign(&ps, &ptr_ty);
                let ptr_text = self.get_value_as_str(*ptr, Cast::SIGNED)?;
                let vs = self.get_value_as_str(*value, Cast::SIGNED)?;
                Ok(Some(format!(
                    "{}{};{}_store{}(HEAPU8, {}, {})",
                    assign,
                    ptr_text,
                    simd_prefix(&elem),
                    part,
                    ps,
                    vs
                )))
            }
            Instruction::ExtractElement { vector, index } => {
                let vty = self.module.ty(*vector).clone();
                self.check_vector_type(&vty)?;
                let Some(index) = self.module.const_int_value(*index) else {
                    return Err(CompileError::UnsupportedInstruction {
                        opcode: "SIMD extract element with non-constant index",
                    });
                };
                if !(0..=3).contains(&index) {
                    return Err(CompileError::InvalidSimdShape {
                        reason: format!("lane index {} out of range", index),
                    });
                }
                let assign = self.get_assign_if_needed(inst)?;
                let v = self.get_value_as_str(*vector, Cast::SIGNED)?;
                let lane_expr = format!("{}.{}", v, SIMD_LANE_LOWER[index as usize]);
                let elem_ty = self.module.ty(inst).clone();
                let coerced = self.cast_text(&lane_expr, &elem_ty, Cast::SIGNED)?;
                Ok(Some(format!("{}{}", assign, coerced)))
            }
            _ => Ok(None),
        }
    }

    fn simd_binary_text(
        &mut self,
        inst: ValueId,
        prefix: &str,
        name: &str,
        lhs: ValueId,
        rhs: ValueId,
    ) -> CompileResult<String> {
        let assign = self.get_assign_if_needed(inst)?;
        let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
        let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
        Ok(format!("{}{}_{}({},{})", assign, prefix, name, a, b))
    }

    fn vector_icmp_text(
        &mut self,
        inst: ValueId,
        pred: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
    ) -> CompileResult<String> {
        let (name, invert) = match pred {
            IntPredicate::Eq => ("equal", false),
            IntPredicate::Ne => ("equal", true),
            IntPredicate::Sle => ("greaterThan", true),
            IntPredicate::Sge => ("lessThan", true),
            IntPredicate::Ule => ("unsignedLessThanOrEqual", false),
            IntPredicate::Uge => ("unsignedGreaterThanOrEqual", false),
            IntPredicate::Ult => ("unsignedLessThan", false),
            IntPredicate::Slt => ("lessThan", false),
            IntPredicate::Ugt => ("unsignedGreaterThan", false),
            IntPredicate::Sgt => ("greaterThan", false),
        };
        let assign = self.get_assign_if_needed(inst)?;
        let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
        let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
        let compare = format!("SIMD_int32x4_{}({}, {})", name, a, b);
        Ok(if invert {
            format!("{}SIMD_int32x4_not({})", assign, compare)
        } else {
            format!("{}{}", assign, compare)
        })
    }

    fn vector_fcmp_text(
        &mut self,
        inst: ValueId,
        pred: FloatPredicate,
        lhs: ValueId,
        rhs: ValueId,
    ) -> CompileResult<String> {
        let assign = self.get_assign_if_needed(inst)?;
        let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
        let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
        let (name, invert) = match pred {
            FloatPredicate::False => return Ok(format!("{}SIMD_int32x4_splat(0)", assign)),
            FloatPredicate::True => return Ok(format!("{}SIMD_int32x4_splat(-1)", assign)),
            FloatPredicate::One => {
                return Ok(format!(
                    "{assign}SIMD_float32x4_and(SIMD_float32x4_and(\
                     SIMD_float32x4_equal({a}, {a}), SIMD_float32x4_equal({b}, {b})), \
                     SIMD_float32x4_notEqual({a}, {b}))"
                ))
            }
            FloatPredicate::Ueq => {
                return Ok(format!(
                    "{assign}SIMD_float32x4_or(SIMD_float32x4_or(\
                     SIMD_float32x4_notEqual({a}, {a}), SIMD_float32x4_notEqual({b}, {b})), \
                     SIMD_float32x4_equal({a}, {b}))"
                ))
            }
            FloatPredicate::Ord => {
                return Ok(format!(
                    "{assign}SIMD_float32x4_and(SIMD_float32x4_equal({a}, {a}), \
                     SIMD_float32x4_equal({b}, {b}))"
                ))
            }
            FloatPredicate::Uno => {
                return Ok(format!(
                    "{assign}SIMD_float32x4_or(SIMD_float32x4_notEqual({a}, {a}), \
                     SIMD_float32x4_notEqual({b}, {b}))"
                ))
            }
            FloatPredicate::Oeq => ("equal", false),
            FloatPredicate::Ogt => ("greaterThan", false),
            FloatPredicate::Oge => ("greaterThanOrEqual", false),
            FloatPredicate::Olt => ("lessThan", false),
            FloatPredicate::Ole => ("lessThanOrEqual", false),
            FloatPredicate::Ugt => ("lessThanOrEqual", true),
            FloatPredicate::Uge => ("lessThan", true),
            FloatPredicate::Ult => ("greaterThanOrEqual", true),
            FloatPredicate::Ule => ("greaterThan", true),
            FloatPredicate::Une => ("notEqual", false),
        };
        let compare = format!("SIMD_float32x4_{}({}, {})", name, a, b);
        Ok(if invert {
            format!("{}SIMD_int32x4_not({})", assign, compare)
        } else {
            format!("{}{}", assign, compare)
        })
    }

    fn is_all_ones_vector(&self, value: ValueId) -> bool {
        match self.module.as_constant(value) {
            Some(Constant::Vector(elems)) => elems
                .iter()
                .all(|&e| self.module.const_int_value(e) == Some(-1)),
            _ => false,
        }
    }

    fn is_neg_zero_vector(&self, value: ValueId) -> bool {
        match self.module.as_constant(value) {
            Some(Constant::Vector(elems)) => elems.iter().all(|&e| self.is_negative_zero(e)),
            _ => false,
        }
    }

    fn float_lane_operand(&mut self, value: ValueId) -> CompileResult<String> {
        // The splat and constructor builtins need a real float32 operand
        // even when we are otherwise not being precise about it.
        let operand = self.get_value_as_str(value, Cast::SIGNED)?;
        if !self.options.precise_f32 {
            Ok(format!("Math_fround({})", operand))
        } else {
            Ok(operand)
        }
    }

    /// Insertelement chains: skipped while mid-chain, then rendered as a
    /// splat, a constructor, or a series of lane writes at the chain head.
    /// `None` means this instruction is deferred.
    fn insert_element_text(
        &mut self,
        inst: ValueId,
        elem: &Type,
        lanes: u32,
    ) -> CompileResult<Option<String>> {
        let Instruction::InsertElement {
            vector,
            element,
            index,
        } = self.module.as_instruction(inst).unwrap().clone()
        else {
            unreachable!()
        };

        if self.use_counts.get(&inst).copied().unwrap_or(0) == 1 {
            let user = self
                .users
                .get(&inst)
                .and_then(|u| u.first().copied());
            if let Some(user) = user {
                match self.module.as_instruction(user) {
                    Some(Instruction::InsertElement { .. }) => return Ok(None),
                    Some(Instruction::ShuffleVector { mask, .. })
                        if mask.iter().all(|&m| m == 0)
                            && !matches!(
                                self.module.as_instruction(vector),
                                Some(Instruction::InsertElement { .. })
                            )
                            && self.module.const_int_value(index) == Some(0) =>
                    {
                        // splat idiom; the shuffle emits it
                        return Ok(None);
                    }
                    _ => {}
                }
            }
        }

        // Walk the chain and collect inserted lanes.
        let lanes = lanes as usize;
        let mut operands: Vec<Option<ValueId>> = vec![None; lanes];
        let mut inserted = 0usize;
        let mut splat: Option<ValueId> = Some(element);
        let mut base = inst;
        loop {
            let Some(Instruction::InsertElement {
                vector,
                element,
                index,
            }) = self.module.as_instruction(base).cloned()
            else {
                break;
            };
            let index = self
                .module
                .const_int_value(index)
                .ok_or_else(|| CompileError::InvalidSimdShape {
                    reason: "insertelement index must be constant".to_string(),
                })? as usize;
            if operands[index].is_none() {
                inserted += 1;
                operands[index] = Some(element);
                if Some(element) != splat {
                    splat = None;
                }
            }
            base = vector;
            if self.use_counts.get(&base).copied().unwrap_or(0) != 1
                || !matches!(
                    self.module.as_instruction(base),
                    Some(Instruction::InsertElement { .. })
                )
            {
                break;
            }
        }

        let assign = self.get_assign_if_needed(inst)?;
        if inserted == lanes {
            if let Some(splat) = splat {
                let text = if elem.is_integer() {
                    let v = self.get_value_as_str(splat, Cast::SIGNED)?;
                    format!("SIMD_int32x4_splat({})", v)
                } else {
                    format!("SIMD_float32x4_splat({})", self.float_lane_operand(splat)?)
                };
                return Ok(Some(format!("{}{}", assign, text)));
            }
            // Fully initialized: constructor call.
            let mut parts = Vec::with_capacity(lanes);
            for operand in operands.iter().take(lanes) {
                let operand = operand.expect("fully initialized chain");
                if elem.is_float() && !self.options.precise_f32 {
                    parts.push(self.float_lane_operand(operand)?);
                } else {
                    parts.push(self.get_value_as_str(operand, Cast::SIGNED)?);
                }
            }
            return Ok(Some(format!(
                "{}{}({})",
                assign,
                simd_prefix(elem),
                parts.join(", ")
            )));
        }

        // A series of lane writes over the base value.
        let mut result = self.get_value_as_str(base, Cast::SIGNED)?;
        for (index, operand) in operands.iter().enumerate() {
            let Some(operand) = operand else { continue };
            let operand_text = if elem.is_float() {
                self.float_lane_operand(*operand)?
            } else {
                self.get_value_as_str(*operand, Cast::SIGNED)?
            };
            result = format!(
                "{}_with{}({},{})",
                simd_prefix(elem),
                SIMD_LANE_UPPER[index],
                result,
                operand_text
            );
        }
        Ok(Some(format!("{}{}", assign, result)))
    }

    fn shuffle_vector_text(
        &mut self,
        inst: ValueId,
        a: ValueId,
        b: ValueId,
        mask: &[i32],
        elem: &Type,
        lanes: u32,
    ) -> CompileResult<String> {
        let assign = self.get_assign_if_needed(inst)?;

        // The splat idiom: insert into lane 0, then shuffle with a zero
        // mask. The insert was skipped; emit the splat here.
        if mask.iter().all(|&m| m == 0) {
            if let Some(Instruction::InsertElement { element, index, .. }) =
                self.module.as_instruction(a).cloned()
            {
                if self.module.const_int_value(index) == Some(0) {
                    let operand = if elem.is_integer() {
                        self.get_value_as_str(element, Cast::SIGNED)?
                    } else {
                        self.float_lane_operand(element)?
                    };
                    return Ok(format!("{}{}_splat({})", assign, simd_prefix(elem), operand));
                }
            }
        }

        let a_text = self.get_value_as_str(a, Cast::SIGNED)?;
        let b_text = self.get_value_as_str(b, Cast::SIGNED)?;
        let op_lanes = self.module.ty(a).vector_lanes().unwrap_or(4) as i32;
        let result_lanes = lanes as i32;

        let mask_at = |i: i32| -> i32 {
            if i < result_lanes {
                mask.get(i as usize).copied().unwrap_or(-1)
            } else {
                -1
            }
        };
        let swizzle_a = (0..4).all(|i| mask_at(i) < op_lanes);
        let swizzle_b = (0..4).all(|i| {
            let m = mask_at(i);
            m < 0 || (m >= op_lanes && m < op_lanes * 2)
        });

        if swizzle_a || swizzle_b {
            let source = if swizzle_a { a_text } else { b_text };
            let mut out = format!("{}_swizzle({}", simd_prefix(elem), source);
            for i in 0..result_lanes {
                let m = mask_at(i);
                let lane = if m < 0 {
                    0
                } else if m < op_lanes {
                    m
                } else {
                    m - op_lanes
                };
                out.push_str(&format!(", {}", lane));
            }
            for _ in result_lanes..4 {
                out.push_str(", 0");
            }
            out.push(')');
            return Ok(format!("{}{}", assign, out));
        }

        // Fully-general shuffle.
        let mut out = format!("{}_shuffle({}, {}, ", simd_prefix(elem), a_text, b_text);
        for (i, &m) in mask.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let lane = if m >= op_lanes {
                m - op_lanes + 4
            } else {
                m
            };
            out.push_str(&lane.max(0).to_string());
        }
        out.push(')');
        Ok(format!("{}{}", assign, out))
    }

    fn vector_shift_text(
        &mut self,
        inst: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        elem: &Type,
        lanes: u32,
    ) -> CompileResult<String> {
        // Shifting every lane by the same amount uses a ByScalar shift.
        if let Some(splat) = self.get_splat_value(rhs) {
            let assign = self.get_assign_if_needed(inst)?;
            let name = match op {
                BinOp::AShr => "shiftRightArithmeticByScalar",
                BinOp::LShr => "shiftRightLogicalByScalar",
                _ => "shiftLeftByScalar",
            };
            let v = self.get_value_as_str(lhs, Cast::SIGNED)?;
            let s = self.get_value_as_str(splat, Cast::SIGNED)?;
            return Ok(format!("{}SIMD_int32x4_{}({}, {})", assign, name, v, s));
        }
        // No vector-vector shifts in the SIMD API.
        self.unrolled_vector_text(inst, op, lhs, rhs, elem, lanes)
    }

    /// Value inserted into every lane, when one exists.
    fn get_splat_value(&self, value: ValueId) -> Option<ValueId> {
        if let Some(Constant::Vector(elems)) = self.module.as_constant(value) {
            let first = *elems.first()?;
            let first_c = self.module.as_constant(first)?;
            if elems
                .iter()
                .all(|&e| self.module.as_constant(e) == Some(first_c))
            {
                return Some(first);
            }
            return None;
        }
        let lanes = self.module.ty(value).vector_lanes()?;
        let mut result = None;
        for i in 0..lanes {
            let element = self.get_element(value, i)?;
            match result {
                None => result = Some(element),
                Some(r) if r == element => {}
                _ => return None,
            }
        }
        result
    }

    fn get_element(&self, value: ValueId, lane: u32) -> Option<ValueId> {
        if let Some(Instruction::InsertElement {
            vector,
            element,
            index,
        }) = self.module.as_instruction(value)
        {
            if self.module.const_int_value(*index) == Some(i64::from(lane)) {
                return Some(*element);
            }
            return self.get_element(*vector, lane);
        }
        None
    }

    fn unrolled_vector_text(
        &mut self,
        inst: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        elem: &Type,
        lanes: u32,
    ) -> CompileResult<String> {
        let assign = self.get_assign_if_needed(inst)?;
        let a = self.get_value_as_str(lhs, Cast::SIGNED)?;
        let b = self.get_value_as_str(rhs, Cast::SIGNED)?;
        let mut out = format!("{}{}(", assign, simd_prefix(elem));
        for index in 0..lanes as usize {
            if index != 0 {
                out.push_str(", ");
            }
            let wrap = elem.is_float() && !self.options.precise_f32;
            if wrap {
                out.push_str("Math_fround(");
            }
            let lane = format!(".{}", SIMD_LANE_LOWER[index]);
            let lane_text = match op {
                BinOp::SDiv => format!("({a}{lane}|0) / ({b}{lane}|0)|0"),
                BinOp::UDiv => format!("({a}{lane}>>>0) / ({b}{lane}>>>0)>>>0"),
                BinOp::SRem => format!("({a}{lane}|0) % ({b}{lane}|0)|0"),
                BinOp::URem => format!("({a}{lane}>>>0) % ({b}{lane}>>>0)>>>0"),
                BinOp::AShr => format!("({a}{lane}|0) >> ({b}{lane}|0)|0"),
                BinOp::LShr => format!("({a}{lane}|0) >>> ({b}{lane}|0)|0"),
                BinOp::Shl => format!("({a}{lane}|0) << ({b}{lane}|0)|0"),
                _ => {
                    return Err(CompileError::UnsupportedInstruction {
                        opcode: "invalid unrolled vector instruction",
                    })
                }
            };
            out.push_str(&lane_text);
            if wrap {
                out.push(')');
            }
        }
        out.push(')');
        Ok(out)
    }
}
